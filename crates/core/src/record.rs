//! Record references and candidate pairs.
//!
//! A [`RecordRef`] is what the field extractor keeps from a structured input
//! record: its identifier and the ordered blocking values. A [`CandidatePair`]
//! is the unit of output handed to downstream scoring.

use serde::{Deserialize, Serialize};

/// Identifier plus blocking values extracted from one input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    /// Record identifier, assumed unique within its dataset.
    pub id: String,
    /// Blocking values in field-path order.
    pub values: Vec<String>,
}

impl RecordRef {
    /// Creates a record reference from an identifier and its blocking values.
    pub fn new(id: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }
}

/// A pair of records, one from each dataset, proposed for detailed comparison.
///
/// Serialized as `{"first_record_id": ..., "second_record_id": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePair {
    /// Identifier from the first dataset.
    pub first_record_id: String,
    /// Identifier from the second dataset.
    pub second_record_id: String,
}

impl CandidatePair {
    /// Creates a candidate pair.
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first_record_id: first.into(),
            second_record_id: second.into(),
        }
    }
}
