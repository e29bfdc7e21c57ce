//! `dump_data_fields` parsing
//!
//! Each form field is reported as a block of `Key: value` lines, blocks
//! separated by `---`. `FieldStateOption` may repeat; every other key is
//! single-valued.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Form field type as reported by `FieldType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Text,
    Button,
    Choice,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Button => "Button",
            FieldType::Choice => "Choice",
        }
    }

    fn from_report(value: &str) -> Option<Self> {
        match value {
            "Text" => Some(FieldType::Text),
            "Button" => Some(FieldType::Button),
            "Choice" => Some(FieldType::Choice),
            _ => None,
        }
    }
}

/// Variant-specific field data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum FieldKind {
    Text {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
    },
    Button {
        state_options: Vec<String>,
    },
    Choice {
        #[serde(skip_serializing_if = "Option::is_none")]
        value_default: Option<String>,
        state_options: Vec<String>,
    },
}

/// A form field reported by `dump_data_fields`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_alt: Option<String>,
    /// Field flags bitmask (`/Ff`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self.kind {
            FieldKind::Text { .. } => FieldType::Text,
            FieldKind::Button { .. } => FieldType::Button,
            FieldKind::Choice { .. } => FieldType::Choice,
        }
    }

    /// Selectable states (checkbox/radio export values, list entries).
    /// Always empty for text fields.
    pub fn state_options(&self) -> &[String] {
        match &self.kind {
            FieldKind::Text { .. } => &[],
            FieldKind::Button { state_options } | FieldKind::Choice { state_options, .. } => {
                state_options
            }
        }
    }
}

#[derive(Default)]
struct FieldBlock {
    values: HashMap<String, String>,
    state_options: Vec<String>,
}

impl FieldBlock {
    fn parse(chunk: &str) -> Result<Self> {
        let mut block = FieldBlock::default();

        for line in chunk.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (key, value) = split_field_line(line)?;
            if key == "FieldStateOption" {
                block.state_options.push(value.to_string());
            } else {
                block.values.insert(key.to_string(), value.to_string());
            }
        }

        Ok(block)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// Integer keys where an empty or zero value means "not set"
    fn flag_number(&self, key: &str) -> Result<Option<u32>> {
        match self.values.get(key).map(|v| v.trim()) {
            None | Some("") | Some("0") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| Error::InvalidNumber {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    fn into_field(self) -> Result<Option<Field>> {
        let Some(field_type) = self.values.get("FieldType").map(String::as_str) else {
            tracing::debug!("dropping field block without FieldType");
            return Ok(None);
        };
        let Some(field_type) = FieldType::from_report(field_type) else {
            tracing::debug!(field_type, "dropping field with unsupported type");
            return Ok(None);
        };

        let name = self.get("FieldName").ok_or_else(|| Error::MissingKey {
            key: "FieldName".to_string(),
            record: "Field".to_string(),
        })?;

        let kind = match field_type {
            FieldType::Text => FieldKind::Text {
                max_length: self.flag_number("FieldMaxLength")?,
            },
            FieldType::Button => FieldKind::Button {
                state_options: self.state_options.clone(),
            },
            FieldType::Choice => FieldKind::Choice {
                value_default: self.get("FieldValueDefault"),
                state_options: self.state_options.clone(),
            },
        };

        Ok(Some(Field {
            name,
            name_alt: self.get("FieldNameAlt"),
            flags: self.flag_number("FieldFlags")?,
            justification: self.get("FieldJustification"),
            value: self.get("FieldValue"),
            kind,
        }))
    }
}

/// Split `Key: value` on the first `": "`. A bare `Key:` has an empty value.
fn split_field_line(line: &str) -> Result<(&str, &str)> {
    if let Some((key, value)) = line.split_once(": ") {
        return Ok((key, value));
    }
    match line.strip_suffix(':') {
        Some(key) if !key.is_empty() => Ok((key, "")),
        _ => Err(Error::MalformedLine {
            line: line.to_string(),
        }),
    }
}

/// Parse the output of `pdftk <file> dump_data_fields` (or `dump_data_fields_utf8`)
///
/// Fields are returned in report order. Blocks with an unknown `FieldType`
/// (e.g. signature fields) are skipped.
pub fn parse_fields(output: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();

    for chunk in output.trim().split("---") {
        if chunk.trim().is_empty() {
            continue;
        }
        if let Some(field) = FieldBlock::parse(chunk)?.into_field()? {
            fields.push(field);
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const FORM_DUMP: &str = "---
FieldType: Text
FieldName: full_name
FieldNameAlt: Full name
FieldFlags: 0
FieldValue: Jane Doe
FieldJustification: Left
FieldMaxLength: 40
---
FieldType: Button
FieldName: subscribe
FieldFlags: 0
FieldJustification: Left
FieldStateOption: Off
FieldStateOption: Yes
---
FieldType: Choice
FieldName: country
FieldFlags: 131072
FieldValue: France
FieldValueDefault: Belgium
FieldJustification: Left
FieldStateOption: Belgium
FieldStateOption: France
";

    #[test]
    fn test_parse_form_dump() {
        let fields = parse_fields(FORM_DUMP).unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[0],
            Field {
                name: "full_name".to_string(),
                name_alt: Some("Full name".to_string()),
                flags: None,
                justification: Some("Left".to_string()),
                value: Some("Jane Doe".to_string()),
                kind: FieldKind::Text {
                    max_length: Some(40)
                },
            }
        );
        assert_eq!(fields[1].field_type(), FieldType::Button);
        assert_eq!(fields[1].state_options(), ["Off", "Yes"]);
        assert_eq!(fields[1].value, None);
        assert_eq!(
            fields[2].kind,
            FieldKind::Choice {
                value_default: Some("Belgium".to_string()),
                state_options: vec!["Belgium".to_string(), "France".to_string()],
            }
        );
        assert_eq!(fields[2].flags, Some(131072));
    }

    #[test]
    fn test_choice_state_options_in_order() {
        let dump = "---\nFieldType: Choice\nFieldName: size\nFieldStateOption: Large\nFieldStateOption: Small\n";
        let fields = parse_fields(dump).unwrap();
        assert_eq!(fields[0].state_options(), ["Large", "Small"]);
    }

    #[test]
    fn test_missing_optional_keys() {
        let fields = parse_fields("---\nFieldType: Text\nFieldName: notes\n").unwrap();
        assert_eq!(
            fields,
            vec![Field {
                name: "notes".to_string(),
                name_alt: None,
                flags: None,
                justification: None,
                value: None,
                kind: FieldKind::Text { max_length: None },
            }]
        );
        assert!(fields[0].state_options().is_empty());
    }

    #[rstest]
    #[case("---\nFieldType: Signature\nFieldName: sig\n")]
    #[case("---\nFieldName: untyped\n")]
    fn test_unsupported_blocks_are_skipped(#[case] dump: &str) {
        assert!(parse_fields(dump).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let dump = "---\nFieldType: Text\nFieldName: a\n---\nFieldType: Text\nFieldName: a\n";
        assert_eq!(parse_fields(dump).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_value_line() {
        let fields = parse_fields("---\nFieldType: Text\nFieldName: blank\nFieldValue:\n").unwrap();
        assert_eq!(fields[0].value.as_deref(), Some(""));
    }

    #[test]
    fn test_value_with_separator_inside() {
        let fields = parse_fields("---\nFieldType: Text\nFieldName: t\nFieldValue: a: b\n").unwrap();
        assert_eq!(fields[0].value.as_deref(), Some("a: b"));
    }

    #[test]
    fn test_malformed_line() {
        let result = parse_fields("---\nFieldType: Text\nFieldName: t\ncontinuation line\n");
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_missing_name() {
        let result = parse_fields("---\nFieldType: Button\n");
        assert!(matches!(result, Err(Error::MissingKey { .. })));
    }

    #[test]
    fn test_invalid_flags() {
        let result = parse_fields("---\nFieldType: Text\nFieldName: t\nFieldFlags: lots\n");
        assert!(matches!(result, Err(Error::InvalidNumber { .. })));
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_fields("").unwrap().is_empty());
        assert!(parse_fields("\n---\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let fields = parse_fields("---\nFieldType: Button\nFieldName: ok\nFieldStateOption: Yes\n")
            .unwrap();
        let json = serde_json::to_value(&fields[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "ok",
                "type": "Button",
                "state_options": ["Yes"],
            })
        );
    }
}
