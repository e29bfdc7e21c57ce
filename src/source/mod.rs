//! Source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::{CacheManager, CachedPdf};
pub use resolver::{
    resolve_base64, resolve_cache, resolve_form_content, resolve_form_path, resolve_path,
    PdfInput, ResolvedPdf,
};
