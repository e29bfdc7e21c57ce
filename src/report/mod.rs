//! Parsers for pdftk's plain-text reports
//!
//! `dump_data` describes the document (info dictionary, outline, page
//! metrics); `dump_data_fields` describes its interactive form fields.

mod data;
mod fields;

pub use data::{parse_report, Bookmark, Info, PageLabel, PageMedia, Report};
pub use fields::{parse_fields, Field, FieldKind, FieldType};
