use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Strategy;

/// A single extracted value: a scalar string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::Text(_) => None,
            FieldValue::List(items) => Some(items),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

/// Field name to extracted value, keyed in sorted order.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Outcome of one scrape attempt for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub url: String,
    pub success: bool,
    pub data: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub mode: Strategy,
}

impl ScrapeResult {
    pub fn succeeded(url: impl Into<String>, data: FieldMap, mode: Strategy) -> Self {
        Self {
            url: url.into(),
            success: true,
            data,
            error: None,
            scraped_at: Utc::now(),
            mode,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>, mode: Strategy) -> Self {
        Self {
            url: url.into(),
            success: false,
            data: FieldMap::new(),
            error: Some(error.into()),
            scraped_at: Utc::now(),
            mode,
        }
    }

    /// True when at least one extracted field is non-empty.
    pub fn has_data(&self) -> bool {
        self.data.values().any(|value| !value.is_empty())
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.data.get(name)
    }
}
