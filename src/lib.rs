//! pdftk MCP Server Library
//!
//! Bindings for the external `pdftk` executable plus an MCP server exposing
//! them as tools:
//! - `pdftk`: operation builders (`fill_form`, `cat`, `burst`, `stamp`, ...)
//! - `report`: parsers for the `dump_data` and `dump_data_fields` reports
//! - `server`: MCP tools over stdio
//!
//! # Example
//!
//! ```no_run
//! use pdftk_mcp_server::pdftk::Pdftk;
//!
//! let pdftk = Pdftk::new();
//! let report = pdftk.dump_data("document.pdf", true)?;
//! println!("{:?} pages", report.number_of_pages);
//! # Ok::<(), pdftk_mcp_server::Error>(())
//! ```

pub mod error;
pub mod pdftk;
pub mod report;
pub mod server;
pub mod source;

pub use error::{Error, Result};
pub use server::{run_server, run_server_with_config, PdfSource, PdftkServer, ServerConfig};
