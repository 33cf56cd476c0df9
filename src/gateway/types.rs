//! Result types returned by the capability operations.
//!
//! Fields the worker may omit fall back to their defaults, so a sparse payload
//! still projects cleanly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One search result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub metadata: Option<Value>,
}

/// One recommended item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub reason: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    #[default]
    Neutral,
    Mixed,
}

/// Sentiment of a text. The default is neutral with a score of zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// From -1.0 (negative) to 1.0 (positive).
    pub score: f64,
}

/// The category chosen for a piece of content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    /// `None` when the worker could not pick a category.
    pub category: Option<String>,
    pub confidence: f64,
}

/// A point in a series the worker considers anomalous.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Anomaly {
    /// Position in the submitted series.
    pub index: usize,
    pub value: f64,
    pub reason: Option<String>,
}
