//! Canonical dictionary records and the normalizer that shapes raw catalog payloads into them.

use crate::error::{DictionaryError, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Node};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Base URI that relative catalog `url` values are resolved against.
pub const DEFAULT_BASE_URI: &str = "https://alation.medcity.net/";

/// Identifier assigned by the upstream catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Text(id.to_string())
    }
}

/// A normalized "column name -> description" entry as stored in the dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Absolute link back to the catalog page
    pub source: String,
    /// Column name; not unique across records
    pub name: String,
    /// Plain-text description with markup removed
    pub description: String,
    /// Opaque metadata entries, preserved verbatim
    #[serde(default)]
    pub custom_fields: Vec<Value>,
}

/// Shapes raw catalog payloads into [`Record`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    base: Url,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_BASE_URI).expect("default base URI is valid"),
        }
    }
}

impl Normalizer {
    pub fn new(base_uri: &str) -> Result<Self> {
        let base = Url::parse(base_uri)
            .map_err(|e| DictionaryError::InvalidUri(format!("{}: {}", base_uri, e)))?;
        Ok(Self { base })
    }

    pub fn base_uri(&self) -> &str {
        self.base.as_str()
    }

    /// Convert a raw payload into a canonical record.
    ///
    /// `id`, `url`, `name` and `description` are required; a missing or `null` value, or a
    /// value of the wrong JSON type, is a [`DictionaryError::MalformedRecord`].
    pub fn normalize(&self, raw: &Value) -> Result<Record> {
        let fields = raw.as_object().ok_or_else(|| {
            DictionaryError::MalformedRecord(format!(
                "expected a JSON object, got {}",
                json_kind(raw)
            ))
        })?;

        let id: RecordId = required(fields, "id", None)?;
        let label = id.to_string();
        let url: String = required(fields, "url", Some(&label))?;
        let name: String = required(fields, "name", Some(&label))?;
        let description: String = required(fields, "description", Some(&label))?;

        let custom_fields = match fields.get("custom_fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries.clone(),
            Some(other) => {
                return Err(DictionaryError::MalformedRecord(format!(
                    "field `custom_fields` of record {} must be an array, got {}",
                    label,
                    json_kind(other)
                )))
            }
        };

        Ok(Record {
            source: self.resolve(&url)?,
            description: html_to_text(&description),
            id,
            name,
            custom_fields,
        })
    }

    /// Resolve a catalog link against the base URI. Absolute links replace the base.
    pub fn resolve(&self, reference: &str) -> Result<String> {
        self.base
            .join(reference)
            .map(String::from)
            .map_err(|e| DictionaryError::InvalidUri(format!("{}: {}", reference, e)))
    }
}

/// Normalize with the default base URI.
pub fn normalize(raw: &Value) -> Result<Record> {
    Normalizer::default().normalize(raw)
}

fn required<T: DeserializeOwned>(
    fields: &Map<String, Value>,
    field: &str,
    record: Option<&str>,
) -> Result<T> {
    let context = match record {
        Some(id) => format!(" of record {}", id),
        None => String::new(),
    };

    match fields.get(field) {
        None | Some(Value::Null) => Err(DictionaryError::MalformedRecord(format!(
            "missing required field `{}`{}",
            field, context
        ))),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            DictionaryError::MalformedRecord(format!(
                "field `{}`{} has unexpected {}: {}",
                field,
                context,
                json_kind(value),
                e
            ))
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "template"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "hr", "li", "ul", "ol", "dl", "dt", "dd", "tr", "td", "th", "table",
    "thead", "tbody", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "blockquote",
    "pre",
];

/// Extract visible text from an HTML fragment.
///
/// The fragment is parsed as HTML, so every named and numeric character reference is decoded
/// and attribute values never leak into the text. Block-level elements act as word
/// separators, comments and scripts are dropped, and whitespace is collapsed to single spaces
/// with the ends trimmed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push(' ');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}
