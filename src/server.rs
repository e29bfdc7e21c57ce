//! MCP Server implementation using rmcp

use crate::error::Error;
use crate::pdftk::{Pdftk, DEFAULT_BURST_PREFIX};
use crate::report::{Field, Report};
use crate::source::{
    resolve_base64, resolve_cache, resolve_form_content, resolve_form_path, resolve_path,
    CacheManager, CachedPdf, ResolvedPdf,
};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// PDF input source
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// Reference to a PDF produced by an earlier tool call
    CacheRef {
        /// Cache key from previous operation
        cache_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        let string_field = |key: &str| -> std::result::Result<Option<String>, D::Error> {
            match obj.get(key) {
                None => Ok(None),
                Some(v) => v
                    .as_str()
                    .map(|s| Some(s.to_string()))
                    .ok_or_else(|| serde::de::Error::custom(format!("\"{}\" must be a string", key))),
            }
        };

        if let Some(path) = string_field("path")? {
            return Ok(PdfSource::Path { path });
        }
        if let Some(base64) = string_field("base64")? {
            return Ok(PdfSource::Base64 { base64 });
        }
        if let Some(cache_key) = string_field("cache_key")? {
            return Ok(PdfSource::CacheRef { cache_key });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// FDF/XFDF form data input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FormDataSource {
    /// Path to an FDF or XFDF file
    Path {
        /// Path to the form data file
        path: String,
    },
    /// Inline FDF or XFDF document
    Content {
        /// Form data text (XFDF XML or FDF)
        content: String,
    },
    /// Base64 encoded FDF or XFDF document
    Base64 {
        /// Base64 encoded form data
        base64: String,
    },
}

/// Configuration for the pdftk MCP Server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Explicit pdftk executable; looked up on PATH when `None`
    pub pdftk_path: Option<PathBuf>,
    /// Directories tools may read from and write to. Empty allows any path.
    pub resource_dirs: Vec<String>,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pdftk_path: None,
            resource_dirs: Vec::new(),
            cache_max_bytes: 512 * 1024 * 1024, // 512MB
            cache_max_entries: 100,
        }
    }
}

impl ServerConfig {
    /// Read configuration from environment variables:
    ///
    /// - `PDFTK_PATH`: pdftk executable
    /// - `PDFTK_MCP_RESOURCE_DIRS`: allowed directories (OS path list separator)
    /// - `PDFTK_MCP_CACHE_MAX_BYTES`, `PDFTK_MCP_CACHE_MAX_ENTRIES`: cache limits
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("PDFTK_PATH").filter(|p| !p.is_empty()) {
            config.pdftk_path = Some(PathBuf::from(path));
        }
        if let Some(dirs) = lookup("PDFTK_MCP_RESOURCE_DIRS") {
            config.resource_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }

        let number = |key: &str| -> Option<usize> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring invalid numeric setting");
                    None
                }
            }
        };
        if let Some(n) = number("PDFTK_MCP_CACHE_MAX_BYTES") {
            config.cache_max_bytes = n;
        }
        if let Some(n) = number("PDFTK_MCP_CACHE_MAX_ENTRIES") {
            config.cache_max_entries = n;
        }

        config
    }
}

/// pdftk MCP Server
#[derive(Clone)]
pub struct PdftkServer {
    pdftk: Pdftk,
    cache: Arc<RwLock<CacheManager>>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Request/Response types for dump_data
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DumpDataParams {
    /// PDF sources to report on
    pub sources: Vec<PdfSource>,
    /// Request UTF-8 output (dump_data_utf8). Default: true
    #[serde(default = "default_true")]
    pub utf8: bool,
}

#[derive(Debug, Serialize)]
pub struct DumpDataResult {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for dump_data_fields
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DumpDataFieldsParams {
    /// PDF sources to report on
    pub sources: Vec<PdfSource>,
    /// Request UTF-8 output (dump_data_fields_utf8). Default: true
    #[serde(default = "default_true")]
    pub utf8: bool,
}

#[derive(Debug, Serialize)]
pub struct DumpDataFieldsResult {
    pub source: String,
    pub field_count: u32,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for fill_form
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillFormParams {
    /// PDF containing the form
    pub source: PdfSource,
    /// FDF or XFDF data to fill in
    pub form_data: FormDataSource,
    /// Merge the filled fields into the page content. Default: true
    #[serde(default = "default_true")]
    pub flatten: bool,
    /// Output file path (optional). If provided, saves PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Request/Response types for generate_fdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateFdfParams {
    /// PDF containing the form
    pub source: PdfSource,
    /// Output file path (optional). If provided, saves the FDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateFdfResult {
    pub source: String,
    /// Generated FDF document
    pub fdf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for cat_pdfs
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CatPdfsParams {
    /// PDF sources to concatenate (in order)
    pub sources: Vec<PdfSource>,
    /// pdftk page ranges (e.g. ["1-3", "5-end"]). Empty keeps every page.
    #[serde(default)]
    pub page_ranges: Vec<String>,
    /// Output file path (optional). If provided, saves PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Request/Response types for burst_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BurstPdfParams {
    /// PDF to split into single pages
    pub source: PdfSource,
    /// Directory to write the page files into (created if missing)
    pub output_dir: String,
    /// File name prefix for page files (default: "page_")
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BurstPdfResult {
    pub source: String,
    pub output_dir: String,
    /// Page files written, in page order
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request types for single-input transforms
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransformPdfParams {
    /// Source PDF
    pub source: PdfSource,
    /// Output file path (optional). If provided, saves PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OverlayPdfParams {
    /// Source PDF
    pub source: PdfSource,
    /// PDF whose first page is applied to every page of the source
    pub overlay: PdfSource,
    /// Output file path (optional). If provided, saves PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RotatePagesParams {
    /// Source PDF
    pub source: PdfSource,
    /// pdftk rotation ranges (e.g. ["1-endeast"], ["1south", "2-end"])
    pub page_ranges: Vec<String>,
    /// Output file path (optional). If provided, saves PDF to this path.
    #[serde(default)]
    pub output_path: Option<String>,
}

/// Result for every tool that produces a PDF
#[derive(Debug, Serialize)]
pub struct PdfOutputResult {
    pub source: String,
    /// Cache key for the output PDF, for chaining with other tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PdfOutputResult {
    fn failed(source: String, error: &Error) -> Self {
        Self {
            source,
            output_cache_key: None,
            output_page_count: None,
            output_path: None,
            error: Some(error.client_message()),
        }
    }
}

fn respond<T: Serialize>(results: Vec<T>) -> String {
    let response = serde_json::json!({ "results": results });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

/// Run blocking pdftk work off the async runtime
async fn blocking<T, F>(f: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal {
            reason: format!("Task join error: {}", e),
        })?
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl PdftkServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new PdftkServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let cache = CacheManager::new(config.cache_max_entries, config.cache_max_bytes);
        let pdftk = match &config.pdftk_path {
            Some(path) => Pdftk::with_executable(path),
            None => Pdftk::new(),
        };
        Self {
            pdftk,
            cache: Arc::new(RwLock::new(cache)),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Report document metadata
    #[tool(
        description = "Report PDF metadata with pdftk dump_data: info dictionary entries, document IDs, page count, bookmarks (title, level, page), per-page media box, crop box, rotation and dimensions, and page labels.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn dump_data(&self, Parameters(params): Parameters<DumpDataParams>) -> String {
        let mut results = Vec::new();

        for source in &params.sources {
            let result = self
                .process_dump_data(source, params.utf8)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "dump_data failed");
                    DumpDataResult {
                        source: Self::source_name(source),
                        report: None,
                        error: Some(e.client_message()),
                    }
                });
            results.push(result);
        }

        respond(results)
    }

    /// Report form fields
    #[tool(
        description = "List the interactive form fields of PDFs with pdftk dump_data_fields. Each field has a type (Text, Button, Choice), name, alternate name, flags, justification, current value and, for buttons and choices, the selectable state options.

Use the field names and state options to build XFDF data for fill_form.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn dump_data_fields(
        &self,
        Parameters(params): Parameters<DumpDataFieldsParams>,
    ) -> String {
        let mut results = Vec::new();

        for source in &params.sources {
            let result = self
                .process_dump_data_fields(source, params.utf8)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "dump_data_fields failed");
                    DumpDataFieldsResult {
                        source: Self::source_name(source),
                        field_count: 0,
                        fields: vec![],
                        error: Some(e.client_message()),
                    }
                });
            results.push(result);
        }

        respond(results)
    }

    /// Fill a form from FDF/XFDF data
    #[tool(
        description = "Fill a PDF form with data from an FDF or XFDF document (pdftk fill_form). Form data may be a file path {\"path\": ...}, inline text {\"content\": \"<?xml ...><xfdf>...\"}, or base64 {\"base64\": ...}.

flatten (default true) merges the filled values into the page content so they can no longer be edited.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn fill_form(&self, Parameters(params): Parameters<FillFormParams>) -> String {
        let result = self.process_fill_form(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "fill_form failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });

        respond(vec![result])
    }

    /// Generate FDF from a form
    #[tool(
        description = "Generate an FDF document listing the form fields of a PDF and their current values (pdftk generate_fdf). Edit it and pass it back to fill_form.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn generate_fdf(&self, Parameters(params): Parameters<GenerateFdfParams>) -> String {
        let result = self.process_generate_fdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "generate_fdf failed");
            GenerateFdfResult {
                source: Self::source_name(&params.source),
                fdf: String::new(),
                output_path: None,
                error: Some(e.client_message()),
            }
        });

        respond(vec![result])
    }

    /// Concatenate PDFs
    #[tool(
        description = "Concatenate PDFs in order (pdftk cat), optionally selecting pages with pdftk page ranges:
- \"1-3\" (pages 1 to 3), \"5-end\" (page 5 to the last), \"end-1\" (reversed)
- \"1-endodd\", \"1-endeven\" (odd/even pages)
- \"1-endeast\" (pages rotated 90 degrees clockwise)
Ranges select from the first input unless inputs carry pdftk handles.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn cat_pdfs(&self, Parameters(params): Parameters<CatPdfsParams>) -> String {
        let result = self.process_cat_pdfs(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cat_pdfs failed");
            PdfOutputResult::failed(format!("{} sources", params.sources.len()), &e)
        });

        respond(vec![result])
    }

    /// Split a PDF into single pages
    #[tool(
        description = "Split a PDF into one file per page (pdftk burst). Files are named <prefix>01.pdf, <prefix>02.pdf, ... in output_dir. The default prefix is \"page_\".

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn burst_pdf(&self, Parameters(params): Parameters<BurstPdfParams>) -> String {
        let result = self.process_burst_pdf(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "burst_pdf failed");
            BurstPdfResult {
                source: Self::source_name(&params.source),
                output_dir: params.output_dir.clone(),
                files: vec![],
                error: Some(e.client_message()),
            }
        });

        respond(vec![result])
    }

    /// Compress page streams
    #[tool(
        description = "Compress the page content streams of a PDF (pdftk output compress). The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn compress_pdf(&self, Parameters(params): Parameters<TransformPdfParams>) -> String {
        self.transform_tool("compress_pdf", &params, |pdftk, path| pdftk.compress(path))
            .await
    }

    /// Uncompress page streams
    #[tool(
        description = "Remove compression from the page content streams of a PDF so they can be read or edited as text (pdftk output uncompress). The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn uncompress_pdf(&self, Parameters(params): Parameters<TransformPdfParams>) -> String {
        self.transform_tool("uncompress_pdf", &params, |pdftk, path| pdftk.uncompress(path))
            .await
    }

    /// Rewrite a damaged PDF
    #[tool(
        description = "Rewrite a PDF through pdftk, repairing a corrupt cross-reference table or stream lengths where possible. The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn repair_pdf(&self, Parameters(params): Parameters<TransformPdfParams>) -> String {
        self.transform_tool("repair_pdf", &params, |pdftk, path| pdftk.repair(path))
            .await
    }

    /// Stamp every page
    #[tool(
        description = "Put the first page of the overlay PDF on top of every page of the source (pdftk stamp), e.g. a watermark or an \"APPROVED\" mark. The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn stamp_pdf(&self, Parameters(params): Parameters<OverlayPdfParams>) -> String {
        self.overlay_tool("stamp_pdf", &params, |pdftk, pdf, overlay| {
            pdftk.stamp(pdf, overlay)
        })
        .await
    }

    /// Apply a background to every page
    #[tool(
        description = "Put the first page of the overlay PDF behind every page of the source (pdftk background), e.g. letterhead. The source pages need transparent backgrounds for it to show. The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn background_pdf(&self, Parameters(params): Parameters<OverlayPdfParams>) -> String {
        self.overlay_tool("background_pdf", &params, |pdftk, pdf, overlay| {
            pdftk.background(pdf, overlay)
        })
        .await
    }

    /// Rotate pages
    #[tool(
        description = "Rotate pages of a PDF (pdftk rotate). Each range is a page range followed by a direction: north (0), east (90 clockwise), south (180), west (270), or relative left, right, down. Pages not named keep their rotation.
Examples: [\"1-endeast\"] rotates every page; [\"1south\", \"2-end\"] turns only page 1 upside down.

The output is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn rotate_pages(&self, Parameters(params): Parameters<RotatePagesParams>) -> String {
        let result = self.process_rotate_pages(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "rotate_pages failed");
            PdfOutputResult::failed(Self::source_name(&params.source), &e)
        });

        respond(vec![result])
    }
}

impl PdftkServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    async fn resolve_source(&self, source: &PdfSource) -> crate::error::Result<ResolvedPdf> {
        match source {
            PdfSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path)
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64),
            PdfSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache).await,
        }
    }

    fn resolve_form_data(&self, form_data: &FormDataSource) -> crate::error::Result<ResolvedPdf> {
        match form_data {
            FormDataSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_form_path(path)
            }
            FormDataSource::Content { content } => resolve_form_content(content.as_bytes()),
            FormDataSource::Base64 { base64 } => {
                let data = base64::engine::general_purpose::STANDARD.decode(base64.trim())?;
                resolve_form_content(&data)
            }
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        if self.is_within_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(Error::PathAccessDenied {
                path: path.to_string(),
            })
        }
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the target may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| Error::PathAccessDenied {
                path: path.to_string(),
            })?;

        let canonical_target = match path_obj.file_name() {
            Some(name) => canonical_parent.join(name),
            None => canonical_parent,
        };

        if self.is_within_resource_dirs(&canonical_target) {
            Ok(canonical_target)
        } else {
            Err(Error::PathAccessDenied {
                path: path.to_string(),
            })
        }
    }

    fn is_within_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|dir| canonical.starts_with(dir))
                .unwrap_or(false)
        })
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        let path = self.validate_output_path_access(path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&path, data)?;
        Ok(Some(path_str.clone()))
    }

    /// Cache a produced PDF, count its pages, and optionally save it.
    ///
    /// Outputs larger than the cache byte budget are neither cached nor counted.
    /// The page count is best effort: a failing count leaves it unset.
    async fn store_output(
        &self,
        source: String,
        data: Vec<u8>,
        output_path: &Option<String>,
    ) -> crate::error::Result<PdfOutputResult> {
        // Written outside the cache lock; dropped (and deleted) if saving fails
        let entry = if self.cache.read().await.accepts(data.len()) {
            let bytes = data.clone();
            Some(blocking(move || CachedPdf::write(&bytes)).await?)
        } else {
            tracing::debug!(bytes = data.len(), "output exceeds cache budget, not cached");
            None
        };
        let output_path = self.write_output(output_path, &data)?;

        let output_cache_key = match entry {
            Some(entry) => {
                let cache_guard = self.cache.write().await;
                let key = cache_guard.generate_unique_key();
                cache_guard.insert(key.clone(), entry).then_some(key)
            }
            None => None,
        };

        let output_page_count = match &output_cache_key {
            Some(key) => self.count_cached_pages(key).await,
            None => None,
        };

        Ok(PdfOutputResult {
            source,
            output_cache_key,
            output_page_count,
            output_path,
            error: None,
        })
    }

    async fn count_cached_pages(&self, key: &str) -> Option<u32> {
        let entry = self.cache.read().await.get(key)?;
        let pdftk = self.pdftk.clone();

        match blocking(move || pdftk.dump_data(entry.path(), true)).await {
            Ok(report) => report.number_of_pages,
            Err(e) => {
                tracing::warn!(error = %e, "counting output pages failed");
                None
            }
        }
    }

    async fn process_dump_data(
        &self,
        source: &PdfSource,
        utf8: bool,
    ) -> crate::error::Result<DumpDataResult> {
        let resolved = self.resolve_source(source).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();

        let report = blocking(move || pdftk.dump_data(resolved.path(), utf8)).await?;

        Ok(DumpDataResult {
            source: source_name,
            report: Some(report),
            error: None,
        })
    }

    async fn process_dump_data_fields(
        &self,
        source: &PdfSource,
        utf8: bool,
    ) -> crate::error::Result<DumpDataFieldsResult> {
        let resolved = self.resolve_source(source).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();

        let fields = blocking(move || pdftk.dump_data_fields(resolved.path(), utf8)).await?;

        Ok(DumpDataFieldsResult {
            source: source_name,
            field_count: fields.len() as u32,
            fields,
            error: None,
        })
    }

    async fn process_fill_form(
        &self,
        params: &FillFormParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let form_data = self.resolve_form_data(&params.form_data)?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();
        let flatten = params.flatten;

        let output = blocking(move || {
            pdftk.fill_form(resolved.path(), form_data.path(), flatten)
        })
        .await?;

        self.store_output(source_name, output, &params.output_path)
            .await
    }

    async fn process_generate_fdf(
        &self,
        params: &GenerateFdfParams,
    ) -> crate::error::Result<GenerateFdfResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();

        let fdf = blocking(move || pdftk.generate_fdf(resolved.path())).await?;
        let output_path = self.write_output(&params.output_path, &fdf)?;

        Ok(GenerateFdfResult {
            source: source_name,
            fdf: String::from_utf8_lossy(&fdf).into_owned(),
            output_path,
            error: None,
        })
    }

    async fn process_cat_pdfs(
        &self,
        params: &CatPdfsParams,
    ) -> crate::error::Result<PdfOutputResult> {
        if params.sources.is_empty() {
            return Err(Error::InvalidPdf {
                reason: "No PDF sources provided".to_string(),
            });
        }

        let mut resolved_pdfs = Vec::with_capacity(params.sources.len());
        for source in &params.sources {
            resolved_pdfs.push(self.resolve_source(source).await?);
        }

        let pdftk = self.pdftk.clone();
        let page_ranges = params.page_ranges.clone();
        let output = blocking(move || {
            let paths: Vec<&Path> = resolved_pdfs.iter().map(ResolvedPdf::path).collect();
            let ranges: Vec<&str> = page_ranges.iter().map(String::as_str).collect();
            pdftk.cat(&paths, &ranges)
        })
        .await?;

        self.store_output(
            format!("{} sources", params.sources.len()),
            output,
            &params.output_path,
        )
        .await
    }

    async fn process_burst_pdf(
        &self,
        params: &BurstPdfParams,
    ) -> crate::error::Result<BurstPdfResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name.clone();

        let output_dir = self.validate_output_path_access(&params.output_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        let prefix = params
            .prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_BURST_PREFIX.to_string());
        let pdftk = self.pdftk.clone();
        let dir = output_dir.clone();
        let burst_prefix = prefix.clone();
        let page_count = blocking(move || {
            let page_count = pdftk.dump_data(resolved.path(), true)?.number_of_pages;
            pdftk.burst(resolved.path(), Some(dir.as_path()), &burst_prefix)?;
            Ok(page_count)
        })
        .await?;

        Ok(BurstPdfResult {
            source: source_name,
            output_dir: params.output_dir.clone(),
            files: list_burst_files(&output_dir, &prefix, page_count)?,
            error: None,
        })
    }

    async fn process_rotate_pages(
        &self,
        params: &RotatePagesParams,
    ) -> crate::error::Result<PdfOutputResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();
        let page_ranges = params.page_ranges.clone();

        let output = blocking(move || {
            let ranges: Vec<&str> = page_ranges.iter().map(String::as_str).collect();
            pdftk.rotate(resolved.path(), &ranges)
        })
        .await?;

        self.store_output(source_name, output, &params.output_path)
            .await
    }

    async fn process_transform<F>(
        &self,
        params: &TransformPdfParams,
        operation: F,
    ) -> crate::error::Result<PdfOutputResult>
    where
        F: FnOnce(&Pdftk, &Path) -> crate::error::Result<Vec<u8>> + Send + 'static,
    {
        let resolved = self.resolve_source(&params.source).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();

        let output = blocking(move || operation(&pdftk, resolved.path())).await?;

        self.store_output(source_name, output, &params.output_path)
            .await
    }

    async fn transform_tool<F>(&self, tool: &str, params: &TransformPdfParams, operation: F) -> String
    where
        F: FnOnce(&Pdftk, &Path) -> crate::error::Result<Vec<u8>> + Send + 'static,
    {
        let result = self
            .process_transform(params, operation)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, tool, "pdftk transform failed");
                PdfOutputResult::failed(Self::source_name(&params.source), &e)
            });

        respond(vec![result])
    }

    async fn process_overlay<F>(
        &self,
        params: &OverlayPdfParams,
        operation: F,
    ) -> crate::error::Result<PdfOutputResult>
    where
        F: FnOnce(&Pdftk, &Path, &Path) -> crate::error::Result<Vec<u8>> + Send + 'static,
    {
        let resolved = self.resolve_source(&params.source).await?;
        let overlay = self.resolve_source(&params.overlay).await?;
        let source_name = resolved.source_name.clone();
        let pdftk = self.pdftk.clone();

        let output =
            blocking(move || operation(&pdftk, resolved.path(), overlay.path())).await?;

        self.store_output(source_name, output, &params.output_path)
            .await
    }

    async fn overlay_tool<F>(&self, tool: &str, params: &OverlayPdfParams, operation: F) -> String
    where
        F: FnOnce(&Pdftk, &Path, &Path) -> crate::error::Result<Vec<u8>> + Send + 'static,
    {
        let result = self
            .process_overlay(params, operation)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, tool, "pdftk overlay failed");
                PdfOutputResult::failed(Self::source_name(&params.source), &e)
            });

        respond(vec![result])
    }
}

/// Page files written by burst for `prefix`, sorted by page number.
///
/// With a known `page_count`, files numbered past it (left over from an
/// earlier burst into the same directory) are not listed.
fn list_burst_files(
    dir: &Path,
    prefix: &str,
    page_count: Option<u32>,
) -> crate::error::Result<Vec<String>> {
    let pattern = format!(
        "{}/{}[0-9][0-9]*.pdf",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(prefix)
    );

    let entries = glob::glob(&pattern).map_err(|e| Error::Internal {
        reason: format!("Invalid glob pattern: {}", e),
    })?;

    let mut files: Vec<(u32, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let number: u32 = name.strip_prefix(prefix)?.strip_suffix(".pdf")?.parse().ok()?;
            if page_count.is_some_and(|count| number == 0 || number > count) {
                return None;
            }
            Some((number, path.to_string_lossy().into_owned()))
        })
        .collect();
    files.sort();

    Ok(files.into_iter().map(|(_, path)| path).collect())
}

impl Default for PdftkServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PdftkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "pdftk MCP Server wraps the pdftk command-line tool: report metadata and form \
                 fields, fill forms, concatenate, split, stamp, rotate and (un)compress PDFs. \
                 PDF-producing tools return an output_cache_key usable as a source for later calls."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with default configuration
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = PdftkServer::with_config(config);

    match server.pdftk.executable() {
        Ok(path) => tracing::info!(pdftk = %path.display(), "using pdftk"),
        Err(e) => tracing::warn!(error = %e, "pdftk not available; tools will fail until it is installed"),
    }

    tracing::info!("pdftk MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
