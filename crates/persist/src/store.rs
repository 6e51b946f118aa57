//! File-backed event stream persistence.
//!
//! Layout inside the store directory:
//! ```text
//! stream.meta.json          - metadata, schema versions, stream identity
//! segments/
//!   000001.log.cbor.zst     - CBOR+zstd compressed runs of log entries
//! integrity/
//!   manifest.json           - hash chain manifest
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use stockpile_common::StreamId;
use stockpile_kernel::{EventStream, LogEntry, StreamConfig};

/// Current schema versions.
const STREAM_SCHEMA_VERSION: u32 = 1;
const ENTRY_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "stream.meta.json";
const SEGMENTS_DIR: &str = "segments";
const INTEGRITY_DIR: &str = "integrity";
const MANIFEST_FILE: &str = "manifest.json";

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store holds stream {stored}, refusing to write stream {given}")]
    StreamMismatch { stored: StreamId, given: StreamId },
    #[error("stream has {given} entries but the store already holds {stored}")]
    Diverged { stored: u64, given: u64 },
    #[error("the stream's first {stored} entries differ from the stored log")]
    PrefixMismatch { stored: u64 },
}

/// Metadata stored in stream.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    pub stream_schema_version: u32,
    pub entry_schema_version: u32,
    /// Bound on the first write; `None` for a store that has never been written.
    pub stream_id: Option<StreamId>,
    pub entry_count: u64,
    pub segment_count: u32,
    /// SHA-256 over the CBOR encoding of every stored entry, in order.
    #[serde(default)]
    pub log_digest: Option<String>,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
    pub entry_count: u64,
}

/// Integrity manifest tracking all segment hashes in a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// File-backed store for a single event stream.
///
/// Each [`persist`](Self::persist) call writes the entries the store has not
/// seen yet as one new segment. The log is append-only on disk as well:
/// segments are never rewritten.
pub struct StreamStore {
    root: PathBuf,
    meta: StreamMeta,
    manifest: IntegrityManifest,
}

impl StreamStore {
    /// Open or create a stream store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(SEGMENTS_DIR))?;
        std::fs::create_dir_all(root.join(INTEGRITY_DIR))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join(INTEGRITY_DIR).join(MANIFEST_FILE);

        let (meta, manifest) = if meta_path.exists() {
            let meta: StreamMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            check_schema(meta.stream_schema_version, STREAM_SCHEMA_VERSION)?;
            check_schema(meta.entry_schema_version, ENTRY_SCHEMA_VERSION)?;
            let mut manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            // The meta file is the commit point; manifest entries past it
            // belong to a persist that never completed.
            if manifest.entries.len() > meta.segment_count as usize {
                tracing::warn!(
                    committed = meta.segment_count,
                    listed = manifest.entries.len(),
                    "dropping uncommitted manifest entries"
                );
                manifest.entries.truncate(meta.segment_count as usize);
            }
            (meta, manifest)
        } else {
            let meta = StreamMeta {
                stream_schema_version: STREAM_SCHEMA_VERSION,
                entry_schema_version: ENTRY_SCHEMA_VERSION,
                stream_id: None,
                entry_count: 0,
                segment_count: 0,
                log_digest: None,
            };
            let manifest = IntegrityManifest::default();
            write_json(&meta_path, &meta)?;
            write_json(&manifest_path, &manifest)?;
            tracing::info!(root = %root.display(), "created stream store");
            (meta, manifest)
        };

        Ok(Self {
            root,
            meta,
            manifest,
        })
    }

    /// Rebuild the stored stream, appending every entry in order.
    ///
    /// Entries are appended raw, so the config's auto-snapshot policy does
    /// not fire during loading.
    pub fn load<D: DeserializeOwned>(
        &self,
        config: StreamConfig,
    ) -> Result<EventStream<D>, StoreError> {
        let _span = tracing::info_span!("load_stream", root = %self.root.display()).entered();

        let mut stream = match self.meta.stream_id {
            Some(id) => EventStream::with_id(id, config),
            None => EventStream::with_config(config),
        };
        for seg_idx in 1..=self.meta.segment_count {
            let entries: Vec<LogEntry<D>> = self.load_segment(seg_idx)?;
            for entry in entries {
                stream.append(entry);
            }
        }

        if stream.len() as u64 != self.meta.entry_count {
            return Err(StoreError::IntegrityMismatch {
                expected: format!("{} entries", self.meta.entry_count),
                actual: format!("{} entries", stream.len()),
            });
        }
        tracing::info!(
            entries = stream.len(),
            segments = self.meta.segment_count,
            "stream loaded"
        );
        Ok(stream)
    }

    /// Write the entries of `stream` that are not stored yet as a new segment.
    ///
    /// Returns how many entries were written; zero means nothing was new and
    /// no segment was created. The stream must extend the stored log: its
    /// first `entry_count` entries are re-hashed and compared against the
    /// stored digest.
    ///
    /// Nothing in memory changes until the segment, the manifest and the meta
    /// file are all written, in that order, so a failed persist can simply be
    /// retried.
    pub fn persist<D: Serialize>(&mut self, stream: &EventStream<D>) -> Result<usize, StoreError> {
        if let Some(stored) = self.meta.stream_id.filter(|id| *id != stream.id()) {
            return Err(StoreError::StreamMismatch {
                stored,
                given: stream.id(),
            });
        }
        let given = stream.len() as u64;
        let stored = self.meta.entry_count;
        if given < stored {
            return Err(StoreError::Diverged { stored, given });
        }

        let mut digest = Sha256::new();
        for entry in stream.iter_forward().take(stored as usize) {
            digest.update(cbor_serialize(entry)?);
        }
        let prefix = format!("{:x}", digest.clone().finalize());
        if self
            .meta
            .log_digest
            .as_ref()
            .is_some_and(|expected| *expected != prefix)
        {
            return Err(StoreError::PrefixMismatch { stored });
        }

        let pending: Vec<&LogEntry<D>> = stream.iter_forward().skip(stored as usize).collect();
        if pending.is_empty() {
            return Ok(0);
        }
        for entry in &pending {
            digest.update(cbor_serialize(entry)?);
        }

        let seg_idx = self.meta.segment_count + 1;
        let filename = segment_filename(seg_idx);
        let path = self.root.join(SEGMENTS_DIR).join(&filename);

        let cbor_bytes = cbor_serialize(&pending)?;
        let compressed = zstd_compress(&cbor_bytes)?;

        let hash = sha256_hex(&compressed);
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(&path, &compressed)?;

        let mut manifest = self.manifest.clone();
        manifest.entries.push(ManifestEntry {
            filename,
            sha256: hash,
            prev_hash,
            entry_count: pending.len() as u64,
        });
        let meta = StreamMeta {
            stream_id: Some(stream.id()),
            entry_count: given,
            segment_count: seg_idx,
            log_digest: Some(format!("{:x}", digest.finalize())),
            ..self.meta.clone()
        };

        write_json(&self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE), &manifest)?;
        write_json(&self.root.join(META_FILE), &meta)?;
        self.manifest = manifest;
        self.meta = meta;

        tracing::info!(
            segment = seg_idx,
            written = pending.len(),
            total = given,
            "persisted segment"
        );
        Ok(pending.len())
    }

    /// Verify all integrity hashes in the manifest.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev_hash: Option<String> = None;
        let mut entry_total = 0u64;
        for entry in &self.manifest.entries {
            // Check chain continuity
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }

            let data = std::fs::read(self.root.join(SEGMENTS_DIR).join(&entry.filename))?;
            let actual_hash = sha256_hex(&data);
            if actual_hash != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual: actual_hash,
                });
            }

            entry_total += entry.entry_count;
            prev_hash = Some(entry.sha256.clone());
        }

        if self.manifest.entries.len() != self.meta.segment_count as usize {
            return Err(StoreError::IntegrityMismatch {
                expected: format!("{} segments", self.meta.segment_count),
                actual: format!("{} segments", self.manifest.entries.len()),
            });
        }
        if entry_total != self.meta.entry_count {
            return Err(StoreError::IntegrityMismatch {
                expected: format!("{} entries", self.meta.entry_count),
                actual: format!("{entry_total} entries"),
            });
        }
        Ok(())
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn load_segment<D: DeserializeOwned>(&self, index: u32) -> Result<Vec<LogEntry<D>>, StoreError> {
        let filename = segment_filename(index);
        let path = self.root.join(SEGMENTS_DIR).join(&filename);
        let compressed = std::fs::read(&path)?;

        self.verify_file_hash(&filename, &compressed)?;

        let cbor_bytes = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor_bytes)
    }

    fn verify_file_hash(&self, filename: &str, data: &[u8]) -> Result<(), StoreError> {
        let actual = sha256_hex(data);
        let entry = self
            .manifest
            .entries
            .iter()
            .find(|e| e.filename == filename)
            .ok_or_else(|| StoreError::IntegrityMismatch {
                expected: format!("manifest entry for {filename}"),
                actual: "none".into(),
            })?;
        if entry.sha256 != actual {
            return Err(StoreError::IntegrityMismatch {
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

fn check_schema(file_version: u32, expected_version: u32) -> Result<(), StoreError> {
    if file_version != expected_version {
        return Err(StoreError::SchemaMismatch {
            file_version,
            expected_version,
        });
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    serde_json::to_writer_pretty(std::fs::File::create(path)?, value)?;
    Ok(())
}

fn segment_filename(index: u32) -> String {
    format!("{index:06}.log.cbor.zst")
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
