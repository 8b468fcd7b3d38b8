//! Configuration for blocking runs.
//!
//! Tuning defaults are compile-time constants. Per-run settings (method, field
//! paths, pruning threshold) are read from a JSON document into
//! [`BlockingConfig`] and validated before any record is processed.

use crate::error::BlockingError;
use crate::extract::FieldExtractor;
use crate::tokenize::{Method, Normalization, Tokenizer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default token-pruning threshold on the combined bucket size of both indexes.
///
/// A token whose bucket sizes sum to more than this is dropped before the join.
pub const DEFAULT_THRESHOLD: i64 = 100;

/// Smallest accepted q-gram size.
pub const MIN_QGRAM_SIZE: usize = 2;

/// Number of candidate pairs handed to a sink per write.
pub const DEFAULT_PAIR_BATCH_SIZE: usize = 1_024;

/// Pair batches buffered between candidate generation and the output writer.
pub const PAIR_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on pairs coalesced into a single output write.
pub const MAX_GROUP_WRITE_PAIRS: usize = 16_384;

/// Number of skipped records logged individually per build pass before only
/// the final summary is reported.
pub const MAX_LOGGED_SKIPS: u64 = 8;

/// File extension of block index snapshots.
pub const SNAPSHOT_EXTENSION: &str = "rbx";

/// Which of the two datasets a setting or index belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetSide {
    /// The first dataset; its identifiers fill `first_record_id`.
    First,
    /// The second dataset; its identifiers fill `second_record_id`.
    Second,
}

impl DatasetSide {
    /// Stable lowercase name, also used as the default index name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSide::First => "first",
            DatasetSide::Second => "second",
        }
    }
}

/// Field paths for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetKeys {
    /// Path of the record identifier; falls back to the top-level `id_path`.
    #[serde(default)]
    pub id_path: Option<String>,
    /// Blocking field paths; fall back to the top-level `json_path`.
    #[serde(default)]
    pub json_path: Vec<String>,
}

/// Blocking configuration as read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Exact or q-gram blocking.
    pub method: Method,
    /// Pruning threshold on combined bucket size. `<= 0` prunes every token.
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    /// Value normalization applied before tokenizing.
    #[serde(default)]
    pub normalization: Normalization,
    /// Identifier path shared by both datasets.
    #[serde(default)]
    pub id_path: Option<String>,
    /// Blocking field paths shared by both datasets.
    #[serde(default)]
    pub json_path: Vec<String>,
    /// Extra blocking paths appended to both datasets' fields.
    #[serde(default)]
    pub common: Vec<String>,
    /// Overrides for the first dataset.
    #[serde(default)]
    pub first_record: Option<DatasetKeys>,
    /// Overrides for the second dataset.
    #[serde(default)]
    pub second_record: Option<DatasetKeys>,
}

fn default_threshold() -> i64 {
    DEFAULT_THRESHOLD
}

impl BlockingConfig {
    /// A config applying the same paths to both datasets.
    pub fn new(method: Method, id_path: impl Into<String>, json_path: Vec<String>) -> Self {
        Self {
            method,
            threshold: DEFAULT_THRESHOLD,
            normalization: Normalization::default(),
            id_path: Some(id_path.into()),
            json_path,
            common: Vec::new(),
            first_record: None,
            second_record: None,
        }
    }

    /// Sets the pruning threshold.
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the value normalization.
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, BlockingError> {
        let config: BlockingConfig = serde_json::from_str(text)
            .map_err(|e| BlockingError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BlockingError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            BlockingError::Config(format!("cannot read configuration {:?}: {}", path, e))
        })?;
        Self::from_json(&text)
    }

    /// Checks that a tokenizer and both extractors can be constructed.
    pub fn validate(&self) -> Result<(), BlockingError> {
        self.tokenizer()?;
        self.extractor(DatasetSide::First)?;
        self.extractor(DatasetSide::Second)?;
        Ok(())
    }

    /// Resolved `(id_path, blocking paths)` for one dataset.
    ///
    /// Dataset-specific keys override the shared ones; `common` paths are
    /// appended after the dataset's own fields.
    pub fn keys_for(&self, side: DatasetSide) -> Result<(String, Vec<String>), BlockingError> {
        let overrides = match side {
            DatasetSide::First => self.first_record.as_ref(),
            DatasetSide::Second => self.second_record.as_ref(),
        };
        let id_path = overrides
            .and_then(|k| k.id_path.clone())
            .or_else(|| self.id_path.clone())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                BlockingError::Config(format!("missing id_path for {} dataset", side.as_str()))
            })?;

        let mut fields = match overrides {
            Some(keys) if !keys.json_path.is_empty() => keys.json_path.clone(),
            _ => self.json_path.clone(),
        };
        fields.extend(self.common.iter().cloned());
        if fields.is_empty() {
            return Err(BlockingError::Config(format!(
                "no blocking fields (json_path) for {} dataset",
                side.as_str()
            )));
        }
        Ok((id_path, fields))
    }

    /// Builds the tokenizer for the configured method.
    pub fn tokenizer(&self) -> Result<Tokenizer, BlockingError> {
        Tokenizer::new(self.method, self.normalization)
    }

    /// Builds the field extractor for one dataset.
    pub fn extractor(&self, side: DatasetSide) -> Result<FieldExtractor, BlockingError> {
        let (id_path, fields) = self.keys_for(side)?;
        FieldExtractor::new(&id_path, &fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distilled_schema() {
        let config = BlockingConfig::from_json(
            r#"{
                "method": {"type": "q-gram", "q": 2},
                "json_path": ["$.name"],
                "id_path": "$.id"
            }"#,
        )
        .unwrap();
        assert_eq!(config.method, Method::QGram { q: 2 });
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.normalization, Normalization::default());
        let (id, fields) = config.keys_for(DatasetSide::Second).unwrap();
        assert_eq!(id, "$.id");
        assert_eq!(fields, vec!["$.name"]);
    }

    #[test]
    fn test_per_dataset_keys_and_common() {
        let config = BlockingConfig::from_json(
            r#"{
                "method": {"type": "base-block"},
                "threshold": 5,
                "common": ["age"],
                "first_record": {"id_path": "id", "json_path": ["first_name", "last_name"]},
                "second_record": {"id_path": "rid", "json_path": ["fname", "lname"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.threshold, 5);
        let (id, fields) = config.keys_for(DatasetSide::First).unwrap();
        assert_eq!(id, "id");
        assert_eq!(fields, vec!["first_name", "last_name", "age"]);
        let (id, fields) = config.keys_for(DatasetSide::Second).unwrap();
        assert_eq!(id, "rid");
        assert_eq!(fields, vec!["fname", "lname", "age"]);
    }

    #[test]
    fn test_override_falls_back_to_shared_paths() {
        let config = BlockingConfig::from_json(
            r#"{
                "method": {"type": "base-block"},
                "id_path": "id",
                "json_path": ["name"],
                "second_record": {"id_path": "key"}
            }"#,
        )
        .unwrap();
        let (id, fields) = config.keys_for(DatasetSide::Second).unwrap();
        assert_eq!(id, "key");
        assert_eq!(fields, vec!["name"]);
    }

    #[test]
    fn test_missing_q_is_config_error() {
        let err = BlockingConfig::from_json(
            r#"{"method": {"type": "q-gram"}, "id_path": "id", "json_path": ["n"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }

    #[test]
    fn test_unknown_method_is_config_error() {
        let err = BlockingConfig::from_json(
            r#"{"method": {"type": "soundex"}, "id_path": "id", "json_path": ["n"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }

    #[test]
    fn test_small_q_is_config_error() {
        let err = BlockingConfig::from_json(
            r#"{"method": {"type": "q-gram", "q": 1}, "id_path": "id", "json_path": ["n"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }

    #[test]
    fn test_missing_id_path_is_config_error() {
        let err = BlockingConfig::from_json(r#"{"method": {"type": "base-block"}, "json_path": ["n"]}"#)
            .unwrap_err();
        match err {
            BlockingError::Config(msg) => assert!(msg.contains("id_path"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_fields_is_config_error() {
        let err = BlockingConfig::from_json(r#"{"method": {"type": "base-block"}, "id_path": "id"}"#)
            .unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }

    #[test]
    fn test_bad_path_expression_is_config_error() {
        let err = BlockingConfig::from_json(
            r#"{"method": {"type": "base-block"}, "id_path": "id", "json_path": ["names[oops"]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = BlockingConfig::from_path("/nonexistent/recblock.json").unwrap_err();
        assert!(matches!(err, BlockingError::Config(_)));
    }
}
