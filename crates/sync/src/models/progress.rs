use super::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};

/// Reading position for one book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub book_id: String,
    /// EPUB canonical fragment identifier of the current location, when the
    /// reader has one.
    #[serde(default)]
    pub cfi: Option<String>,
    /// Fraction of the book read, always within `0.0..=1.0`.
    #[serde(default, deserialize_with = "deserialize_percent")]
    pub percent: f64,
    pub updated_at: Timestamp,
}
impl ProgressSnapshot {
    pub fn new(book_id: impl Into<String>, cfi: Option<String>, percent: f64, updated_at: Timestamp) -> Self {
        Self {
            book_id: book_id.into(),
            cfi,
            percent: clamp_percent(percent),
            updated_at,
        }
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_finite() { percent.clamp(0.0, 1.0) } else { 0.0 }
}

fn deserialize_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_percent)
}
