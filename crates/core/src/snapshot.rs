//! Disk snapshots of finalized block indexes.
//!
//! An index is serialized with bincode and written as
//! `[bincode payload][magic "RBX1"][u32 CRC32 BE]` to `<name>.rbx.tmp`, then
//! atomically renamed to `<name>.rbx`. Loading verifies the checksum and the
//! index invariants; a loaded index is already frozen.

use crate::config::SNAPSHOT_EXTENSION;
use crate::error::BlockingError;
use crate::index::{BlockIndex, BuildStats};
use crate::tokenize::{Method, Normalization, Tokenizer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Magic bytes written before the CRC32 footer.
const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"RBX1";

/// On-disk layout. The method is flattened to `qgram_size` because bincode
/// cannot decode internally tagged enums.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    name: &'a str,
    qgram_size: Option<usize>,
    normalization: Normalization,
    buckets: &'a HashMap<String, Vec<String>>,
    stats: BuildStats,
}

#[derive(Deserialize)]
struct SnapshotData {
    name: String,
    qgram_size: Option<usize>,
    normalization: Normalization,
    buckets: HashMap<String, Vec<String>>,
    stats: BuildStats,
}

impl SnapshotData {
    fn into_index(self) -> Result<BlockIndex, BlockingError> {
        let method = match self.qgram_size {
            Some(q) => Method::QGram { q },
            None => Method::BaseBlock,
        };
        let tokenizer = Tokenizer::new(method, self.normalization)
            .map_err(|e| BlockingError::Snapshot(e.to_string()))?;
        Ok(BlockIndex::from_parts(
            self.name,
            tokenizer,
            self.buckets,
            self.stats,
        ))
    }
}

/// Saves `index` into `dir`, returning the snapshot path.
pub fn save_index(index: &BlockIndex, dir: impl AsRef<Path>) -> Result<PathBuf, BlockingError> {
    let name = index.name();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(BlockingError::Snapshot(format!(
            "index name '{}' is not usable as a file name",
            name
        )));
    }
    let tokenizer = index.tokenizer();
    let snapshot = SnapshotRef {
        name,
        qgram_size: match tokenizer.method() {
            Method::QGram { q } => Some(q),
            Method::BaseBlock => None,
        },
        normalization: tokenizer.normalization(),
        buckets: index.buckets(),
        stats: index.stats(),
    };
    let bytes =
        bincode::serialize(&snapshot).map_err(|e| BlockingError::Snapshot(e.to_string()))?;
    let crc = crc32fast::hash(&bytes);

    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", name, SNAPSHOT_EXTENSION));
    let tmp_path = dir.join(format!("{}.{}.tmp", name, SNAPSHOT_EXTENSION));

    let mut output = Vec::with_capacity(bytes.len() + 8);
    output.extend_from_slice(&bytes);
    output.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());

    fs::write(&tmp_path, &output)?;
    fs::rename(&tmp_path, &path)?;

    tracing::info!(
        "Saved index '{}' ({} tokens, {} bytes, CRC32={:#010x})",
        name,
        index.len(),
        bytes.len(),
        crc
    );
    Ok(path)
}

/// Loads and verifies a snapshot written by [`save_index`].
pub fn load_index(path: impl AsRef<Path>) -> Result<BlockIndex, BlockingError> {
    let path = path.as_ref();
    let raw = fs::read(path)?;

    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(BlockingError::Snapshot(format!(
            "{:?} is not an index snapshot (missing footer)",
            path
        )));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(BlockingError::Snapshot(format!(
            "CRC32 mismatch: expected {:#010x}, got {:#010x}. File may be corrupted: {:?}",
            stored_crc, computed_crc, path
        )));
    }
    tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored_crc);

    let data: SnapshotData =
        bincode::deserialize(payload).map_err(|e| BlockingError::Snapshot(e.to_string()))?;
    let index = data.into_index()?;
    index
        .validate()
        .map_err(|e| BlockingError::Snapshot(format!("snapshot validation failed: {}", e)))?;

    tracing::info!(
        "Loaded index '{}' ({} tokens) from {:?}",
        index.name(),
        index.len(),
        path
    );
    Ok(index)
}
