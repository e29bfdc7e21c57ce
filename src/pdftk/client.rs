//! pdftk operations
//!
//! Each method assembles the argument vector for one pdftk operation, runs
//! the executable and returns either its raw output (PDF or FDF bytes) or the
//! parsed report.

use super::command;
use super::locator::{check_configured, find_executable, PDFTK};
use crate::error::Result;
use crate::report::{parse_fields, parse_report, Field, Report};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default file name prefix for [`Pdftk::burst`]
pub const DEFAULT_BURST_PREFIX: &str = "page_";

/// Handle to the pdftk executable
///
/// Without an explicit path the executable is looked up on `PATH` each time
/// an operation runs, so a missing install is reported per call as
/// [`Error::ExecutableNotFound`](crate::Error::ExecutableNotFound).
#[derive(Debug, Clone, Default)]
pub struct Pdftk {
    executable: Option<PathBuf>,
}

impl Pdftk {
    /// Use `pdftk` from `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the executable at `path`
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
        }
    }

    /// Resolve the executable that operations will run
    pub fn executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) => check_configured(path),
            None => find_executable(PDFTK),
        }
    }

    fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>> {
        let executable = self.executable()?;
        command::run(&executable, &args)
    }

    /// Fill the PDF's form fields with data from an FDF or XFDF file.
    ///
    /// With `flatten`, the filled fields are merged into the page content.
    pub fn fill_form(
        &self,
        pdf: impl AsRef<Path>,
        form_data: impl AsRef<Path>,
        flatten: bool,
    ) -> Result<Vec<u8>> {
        self.run(fill_form_args(pdf.as_ref(), form_data.as_ref(), flatten))
    }

    /// Report the PDF's form fields
    pub fn dump_data_fields(&self, pdf: impl AsRef<Path>, utf8: bool) -> Result<Vec<Field>> {
        let output = self.run(dump_data_fields_args(pdf.as_ref(), utf8))?;
        parse_fields(&String::from_utf8_lossy(&output))
    }

    /// Concatenate PDFs, optionally selecting pages with pdftk page ranges
    /// (e.g. `1-3`, `A2-end`, `1-endeast`).
    pub fn cat<P: AsRef<Path>>(&self, pdfs: &[P], page_ranges: &[&str]) -> Result<Vec<u8>> {
        self.run(cat_args(pdfs, page_ranges))
    }

    /// Report metadata, bookmarks, page metrics and page labels
    pub fn dump_data(&self, pdf: impl AsRef<Path>, utf8: bool) -> Result<Report> {
        let output = self.run(dump_data_args(pdf.as_ref(), utf8))?;
        parse_report(&String::from_utf8_lossy(&output))
    }

    /// Generate an FDF file suitable for [`fill_form`](Self::fill_form)
    pub fn generate_fdf(&self, pdf: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.run(generate_fdf_args(pdf.as_ref()))
    }

    /// Split the PDF into one file per page named `<prefix>NN.pdf`.
    ///
    /// Files are written to `output_dir` (system temp dir when `None`).
    /// pdftk also writes a `doc_data.txt` report into the working directory.
    pub fn burst(
        &self,
        pdf: impl AsRef<Path>,
        output_dir: Option<&Path>,
        prefix: &str,
    ) -> Result<()> {
        let dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        self.run(burst_args(pdf.as_ref(), &dir, prefix))?;
        Ok(())
    }

    /// Remove page stream compression
    pub fn uncompress(&self, pdf: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.run(output_filter_args(pdf.as_ref(), Some("uncompress")))
    }

    /// Compress page streams
    pub fn compress(&self, pdf: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.run(output_filter_args(pdf.as_ref(), Some("compress")))
    }

    /// Rewrite the PDF, letting pdftk repair a broken xref table
    pub fn repair(&self, pdf: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.run(output_filter_args(pdf.as_ref(), None))
    }

    /// Put the first page of `background` behind every page
    pub fn background(
        &self,
        pdf: impl AsRef<Path>,
        background: impl AsRef<Path>,
    ) -> Result<Vec<u8>> {
        self.run(overlay_args(pdf.as_ref(), "background", background.as_ref()))
    }

    /// Put the first page of `stamp` on top of every page
    pub fn stamp(&self, pdf: impl AsRef<Path>, stamp: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.run(overlay_args(pdf.as_ref(), "stamp", stamp.as_ref()))
    }

    /// Rotate pages using pdftk rotation ranges (e.g. `1-endeast`, `2south`)
    pub fn rotate(&self, pdf: impl AsRef<Path>, page_ranges: &[&str]) -> Result<Vec<u8>> {
        self.run(rotate_args(pdf.as_ref(), page_ranges))
    }
}

fn os(s: &str) -> OsString {
    OsString::from(s)
}

fn to_stdout(mut args: Vec<OsString>) -> Vec<OsString> {
    args.push(os("output"));
    args.push(os("-"));
    args
}

fn fill_form_args(pdf: &Path, form_data: &Path, flatten: bool) -> Vec<OsString> {
    let mut args = to_stdout(vec![
        pdf.into(),
        os("fill_form"),
        form_data.into(),
    ]);
    if flatten {
        args.push(os("flatten"));
    }
    args
}

fn dump_data_fields_args(pdf: &Path, utf8: bool) -> Vec<OsString> {
    let operation = if utf8 {
        "dump_data_fields_utf8"
    } else {
        "dump_data_fields"
    };
    to_stdout(vec![pdf.into(), os(operation)])
}

fn cat_args<P: AsRef<Path>>(pdfs: &[P], page_ranges: &[&str]) -> Vec<OsString> {
    let mut args: Vec<OsString> = pdfs.iter().map(|p| p.as_ref().into()).collect();
    args.push(os("cat"));
    args.extend(page_ranges.iter().map(|r| os(r)));
    to_stdout(args)
}

fn dump_data_args(pdf: &Path, utf8: bool) -> Vec<OsString> {
    let operation = if utf8 { "dump_data_utf8" } else { "dump_data" };
    vec![pdf.into(), os(operation)]
}

fn generate_fdf_args(pdf: &Path) -> Vec<OsString> {
    to_stdout(vec![pdf.into(), os("generate_fdf")])
}

fn burst_args(pdf: &Path, dir: &Path, prefix: &str) -> Vec<OsString> {
    vec![
        pdf.into(),
        os("burst"),
        os("output"),
        dir.join(format!("{}%02d.pdf", prefix)).into(),
    ]
}

fn output_filter_args(pdf: &Path, filter: Option<&str>) -> Vec<OsString> {
    let mut args = to_stdout(vec![pdf.into()]);
    if let Some(filter) = filter {
        args.push(os(filter));
    }
    args
}

fn overlay_args(pdf: &Path, operation: &str, overlay: &Path) -> Vec<OsString> {
    to_stdout(vec![pdf.into(), os(operation), overlay.into()])
}

fn rotate_args(pdf: &Path, page_ranges: &[&str]) -> Vec<OsString> {
    let mut args = vec![pdf.into(), os("rotate")];
    args.extend(page_ranges.iter().map(|r| os(r)));
    to_stdout(args)
}
