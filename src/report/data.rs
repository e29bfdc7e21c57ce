//! `dump_data` report parsing
//!
//! pdftk reports document metadata as a flat list of `Key: value` lines.
//! Records are introduced by `InfoBegin`, `BookmarkBegin`, `PageMediaBegin`
//! and `PageLabelBegin` sentinels; `PdfID0`, `PdfID1` and `NumberOfPages`
//! are document-level keys that may appear anywhere.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Document information dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    pub key: String,
    pub value: String,
}

/// Outline entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub title: Option<String>,
    /// Nesting level, 1 for top-level entries
    pub level: Option<u32>,
    /// Target page (1-indexed)
    pub page_number: Option<u32>,
}

/// Per-page media metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMedia {
    /// Page number (1-indexed)
    pub number: u32,
    /// Rotation in degrees
    pub rotation: Option<i32>,
    /// Media box as `[x1, y1, x2, y2]`
    pub rect: Vec<i64>,
    /// Crop box as `[x1, y1, x2, y2]`, when it differs from the media box
    pub crop_rect: Vec<i64>,
    /// Width and height in points
    pub dimensions: Vec<i64>,
}

/// Page label range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLabel {
    /// First page (1-indexed) the label applies to
    pub new_index: Option<u32>,
    /// Starting number of the label sequence
    pub start: Option<u32>,
    pub prefix: Option<String>,
    /// Numbering style, e.g. `DecimalArabicNumerals`
    pub num_style: Option<String>,
}

/// Parsed `dump_data` report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub infos: Vec<Info>,
    pub pdf_id0: Option<String>,
    pub pdf_id1: Option<String>,
    pub number_of_pages: Option<u32>,
    pub bookmarks: Vec<Bookmark>,
    pub page_media: Vec<PageMedia>,
    pub page_labels: Vec<PageLabel>,
}

impl Report {
    /// Look up an info entry by key (e.g. `Title`, `Author`)
    pub fn info(&self, key: &str) -> Option<&str> {
        self.infos
            .iter()
            .find(|info| info.key == key)
            .map(|info| info.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Info,
    Bookmark,
    PageMedia,
    PageLabel,
}

impl Section {
    fn from_begin(line: &str) -> Option<Self> {
        match line {
            "InfoBegin" => Some(Section::Info),
            "BookmarkBegin" => Some(Section::Bookmark),
            "PageMediaBegin" => Some(Section::PageMedia),
            "PageLabelBegin" => Some(Section::PageLabel),
            _ => None,
        }
    }

    fn from_end(line: &str) -> Option<Self> {
        match line {
            "InfoEnd" => Some(Section::Info),
            "BookmarkEnd" => Some(Section::Bookmark),
            "PageMediaEnd" => Some(Section::PageMedia),
            "PageLabelEnd" => Some(Section::PageLabel),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Section::Info => "Info",
            Section::Bookmark => "Bookmark",
            Section::PageMedia => "PageMedia",
            Section::PageLabel => "PageLabel",
        }
    }
}

type Record = HashMap<String, String>;

#[derive(Default)]
struct Scanner {
    current: Option<Section>,
    infos: Vec<Record>,
    bookmarks: Vec<Record>,
    page_media: Vec<Record>,
    page_labels: Vec<Record>,
    pdf_id0: Option<String>,
    pdf_id1: Option<String>,
    number_of_pages: Option<String>,
}

impl Scanner {
    fn records_mut(&mut self, section: Section) -> &mut Vec<Record> {
        match section {
            Section::Info => &mut self.infos,
            Section::Bookmark => &mut self.bookmarks,
            Section::PageMedia => &mut self.page_media,
            Section::PageLabel => &mut self.page_labels,
        }
    }

    fn feed(&mut self, line: &str) -> Result<()> {
        if let Some(section) = Section::from_begin(line) {
            self.records_mut(section).push(Record::new());
            self.current = Some(section);
            return Ok(());
        }

        if let Some(section) = Section::from_end(line) {
            if self.current == Some(section) {
                self.current = None;
            }
            return Ok(());
        }

        // Document-level keys do not change the current section
        if line.starts_with("PdfID0") {
            self.pdf_id0 = Some(split_value(line)?.to_string());
            return Ok(());
        }
        if line.starts_with("PdfID1") {
            self.pdf_id1 = Some(split_value(line)?.to_string());
            return Ok(());
        }
        if line.starts_with("NumberOfPages") {
            self.number_of_pages = Some(split_value(line)?.to_string());
            return Ok(());
        }

        let Some(section) = self.current else {
            return Ok(());
        };

        let (key, value) = split_key_value(line)?;
        if let Some(record) = self.records_mut(section).last_mut() {
            record.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn finish(self) -> Result<Report> {
        let infos = self
            .infos
            .iter()
            .map(|r| -> Result<Info> {
                Ok(Info {
                    key: required(r, "InfoKey", Section::Info)?,
                    value: required(r, "InfoValue", Section::Info)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let bookmarks = self
            .bookmarks
            .iter()
            .map(|r| -> Result<Bookmark> {
                Ok(Bookmark {
                    title: r.get("BookmarkTitle").cloned(),
                    level: optional_number(r, "BookmarkLevel")?,
                    page_number: optional_number(r, "BookmarkPageNumber")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let page_media = self
            .page_media
            .iter()
            .map(|r| -> Result<PageMedia> {
                let number = required(r, "PageMediaNumber", Section::PageMedia)?;
                Ok(PageMedia {
                    number: parse_number("PageMediaNumber", &number)?,
                    rotation: r
                        .get("PageMediaRotation")
                        .map(|v| parse_rotation(v))
                        .transpose()?,
                    rect: number_list(r, "PageMediaRect")?,
                    crop_rect: number_list(r, "PageMediaCropRect")?,
                    dimensions: number_list(r, "PageMediaDimensions")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let page_labels = self
            .page_labels
            .iter()
            .map(|r| -> Result<PageLabel> {
                Ok(PageLabel {
                    new_index: optional_number(r, "PageLabelNewIndex")?,
                    start: optional_number(r, "PageLabelStart")?,
                    prefix: r.get("PageLabelPrefix").cloned(),
                    num_style: r.get("PageLabelNumStyle").cloned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let number_of_pages = self
            .number_of_pages
            .as_deref()
            .map(|v| parse_number("NumberOfPages", v))
            .transpose()?;

        Ok(Report {
            infos,
            pdf_id0: self.pdf_id0,
            pdf_id1: self.pdf_id1,
            number_of_pages,
            bookmarks,
            page_media,
            page_labels,
        })
    }
}

/// Parse the output of `pdftk <file> dump_data` (or `dump_data_utf8`)
pub fn parse_report(output: &str) -> Result<Report> {
    let mut scanner = Scanner::default();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        scanner.feed(line)?;
    }

    scanner.finish()
}

fn split_key_value(line: &str) -> Result<(&str, &str)> {
    line.split_once(':')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| Error::MalformedLine {
            line: line.to_string(),
        })
}

fn split_value(line: &str) -> Result<&str> {
    split_key_value(line).map(|(_, value)| value)
}

fn required(record: &Record, key: &str, section: Section) -> Result<String> {
    record.get(key).cloned().ok_or_else(|| Error::MissingKey {
        key: key.to_string(),
        record: section.name().to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn optional_number<T: std::str::FromStr>(record: &Record, key: &str) -> Result<Option<T>> {
    record
        .get(key)
        .filter(|v| !v.is_empty())
        .map(|v| parse_number(key, v))
        .transpose()
}

/// Rotation must be a whole number of degrees; `90.0` is accepted, `90.5` is not.
fn parse_rotation(value: &str) -> Result<i32> {
    if let Ok(degrees) = value.parse::<i32>() {
        return Ok(degrees);
    }
    match value.parse::<f64>() {
        Ok(degrees) if degrees.fract() == 0.0 && degrees.abs() <= i32::MAX as f64 => {
            Ok(degrees as i32)
        }
        _ => Err(Error::InvalidNumber {
            key: "PageMediaRotation".to_string(),
            value: value.to_string(),
        }),
    }
}

/// Space-separated coordinates; fractional points are truncated toward zero.
fn number_list(record: &Record, key: &str) -> Result<Vec<i64>> {
    let Some(value) = record.get(key) else {
        return Ok(Vec::new());
    };

    value
        .split_whitespace()
        .map(|part| {
            part.parse::<i64>()
                .or_else(|_| part.parse::<f64>().map(|f| f.trunc() as i64))
                .map_err(|_| Error::InvalidNumber {
                    key: key.to_string(),
                    value: value.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SAMPLE_REPORT: &str = "\
InfoBegin
InfoKey: Creator
InfoValue: Writer
InfoBegin
InfoKey: Producer
InfoValue: LibreOffice 7.3
PdfID0: 8b3c5ee1b76c5b4ab0d1a4f6c9e47f10
PdfID1: 8b3c5ee1b76c5b4ab0d1a4f6c9e47f10
NumberOfPages: 2
BookmarkBegin
BookmarkTitle: Chapter 1
BookmarkLevel: 1
BookmarkPageNumber: 1
BookmarkBegin
BookmarkTitle: Section 1.1
BookmarkLevel: 2
BookmarkPageNumber: 2
PageMediaBegin
PageMediaNumber: 1
PageMediaRotation: 0
PageMediaRect: 0 0 612 792
PageMediaDimensions: 612 792
PageMediaBegin
PageMediaNumber: 2
PageMediaRotation: 90
PageMediaRect: 0 0 595.276 841.89
PageMediaCropRect: 10 10 585 831
PageMediaDimensions: 595.276 841.89
PageLabelBegin
PageLabelNewIndex: 1
PageLabelStart: 1
PageLabelNumStyle: DecimalArabicNumerals
";

    #[test]
    fn test_parse_full_report() {
        let report = parse_report(SAMPLE_REPORT).unwrap();

        assert_eq!(report.number_of_pages, Some(2));
        assert_eq!(
            report.pdf_id0.as_deref(),
            Some("8b3c5ee1b76c5b4ab0d1a4f6c9e47f10")
        );
        assert_eq!(report.infos.len(), 2);
        assert_eq!(report.info("Producer"), Some("LibreOffice 7.3"));
        assert_eq!(
            report.bookmarks,
            vec![
                Bookmark {
                    title: Some("Chapter 1".to_string()),
                    level: Some(1),
                    page_number: Some(1),
                },
                Bookmark {
                    title: Some("Section 1.1".to_string()),
                    level: Some(2),
                    page_number: Some(2),
                },
            ]
        );
        assert_eq!(report.page_media.len(), 2);
        assert_eq!(report.page_media[1].rotation, Some(90));
        assert_eq!(report.page_media[1].rect, vec![0, 0, 595, 841]);
        assert_eq!(report.page_media[1].crop_rect, vec![10, 10, 585, 831]);
        assert_eq!(report.page_media[1].dimensions, vec![595, 841]);
        assert_eq!(
            report.page_labels,
            vec![PageLabel {
                new_index: Some(1),
                start: Some(1),
                prefix: None,
                num_style: Some("DecimalArabicNumerals".to_string()),
            }]
        );
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(1, 0, 0)]
    #[case(3, 2, 1)]
    #[case(0, 4, 2)]
    fn test_record_counts_follow_sentinels(
        #[case] infos: usize,
        #[case] bookmarks: usize,
        #[case] pages: usize,
    ) {
        let mut text = String::new();
        for i in 0..infos {
            text.push_str(&format!("InfoBegin\nInfoKey: K{i}\nInfoValue: V{i}\n"));
        }
        for i in 0..bookmarks {
            text.push_str(&format!("BookmarkBegin\nBookmarkTitle: B{i}\n"));
        }
        for i in 0..pages {
            text.push_str(&format!("PageMediaBegin\nPageMediaNumber: {}\n", i + 1));
        }

        let report = parse_report(&text).unwrap();
        assert_eq!(report.infos.len(), infos);
        assert_eq!(report.bookmarks.len(), bookmarks);
        assert_eq!(report.page_media.len(), pages);

        let keys: Vec<String> = report.infos.iter().map(|i| i.key.clone()).collect();
        let expected: Vec<String> = (0..infos).map(|i| format!("K{i}")).collect();
        assert_eq!(keys, expected);
        let numbers: Vec<u32> = report.page_media.iter().map(|p| p.number).collect();
        let expected: Vec<u32> = (1..=pages as u32).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn test_info_block_with_end_sentinel() {
        let report = parse_report("InfoBegin\nInfoKey: Title\nInfoValue: Test\nInfoEnd\n").unwrap();
        assert_eq!(
            report.infos,
            vec![Info {
                key: "Title".to_string(),
                value: "Test".to_string(),
            }]
        );
    }

    #[test]
    fn test_page_media_rect() {
        let report =
            parse_report("PageMediaBegin\nPageMediaNumber: 1\nPageMediaRect: 0 0 612 792\n")
                .unwrap();
        assert_eq!(report.page_media[0].rect, vec![0, 0, 612, 792]);
        assert!(report.page_media[0].dimensions.is_empty());
        assert_eq!(report.page_media[0].rotation, None);
    }

    #[test]
    fn test_document_keys_inside_section_keep_section() {
        let text = "BookmarkBegin\nBookmarkTitle: Intro\nNumberOfPages: 7\nBookmarkLevel: 1\n";
        let report = parse_report(text).unwrap();
        assert_eq!(report.number_of_pages, Some(7));
        assert_eq!(report.bookmarks[0].level, Some(1));
        assert_eq!(report.bookmarks[0].title.as_deref(), Some("Intro"));
    }

    #[test]
    fn test_value_containing_colon() {
        let text = "InfoBegin\nInfoKey: CreationDate\nInfoValue: D:20240102030405Z\n";
        let report = parse_report(text).unwrap();
        assert_eq!(report.info("CreationDate"), Some("D:20240102030405Z"));
    }

    #[test]
    fn test_keys_before_any_section_are_dropped() {
        let report = parse_report("InfoKey: Orphan\nInfoValue: Dropped\nNumberOfPages: 1\n").unwrap();
        assert!(report.infos.is_empty());
        assert_eq!(report.number_of_pages, Some(1));
    }

    #[test]
    fn test_windows_line_endings() {
        let report = parse_report("InfoBegin\r\nInfoKey: Title\r\nInfoValue: Test\r\n").unwrap();
        assert_eq!(report.info("Title"), Some("Test"));
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(parse_report("").unwrap(), Report::default());
    }

    #[test]
    fn test_malformed_line_in_section() {
        let result = parse_report("InfoBegin\nInfoKey Title\n");
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_missing_info_value() {
        let result = parse_report("InfoBegin\nInfoKey: Title\n");
        assert!(matches!(result, Err(Error::MissingKey { ref key, .. }) if key == "InfoValue"));
    }

    #[rstest]
    #[case("0", Some(0))]
    #[case("270", Some(270))]
    #[case("90.0", Some(90))]
    #[case("90.5", None)]
    #[case("ninety", None)]
    fn test_rotation_values(#[case] raw: &str, #[case] expected: Option<i32>) {
        let text = format!("PageMediaBegin\nPageMediaNumber: 1\nPageMediaRotation: {raw}\n");
        match expected {
            Some(degrees) => {
                assert_eq!(parse_report(&text).unwrap().page_media[0].rotation, Some(degrees))
            }
            None => assert!(matches!(
                parse_report(&text),
                Err(Error::InvalidNumber { .. })
            )),
        }
    }

    #[test]
    fn test_invalid_rect_component() {
        let text = "PageMediaBegin\nPageMediaNumber: 1\nPageMediaRect: 0 0 wide 792\n";
        assert!(matches!(
            parse_report(text),
            Err(Error::InvalidNumber { .. })
        ));
    }
}
