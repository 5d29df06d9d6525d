//! Index persistence in a single SQLite file
//!
//! Schema:
//! - `index_meta`: one row describing how the index was built (model,
//!   dimension, chunking, source document, build time)
//! - `entries`: one row per chunk in insertion order, vector stored as a
//!   little-endian f32 blob
//!
//! Writes go to a sibling `.tmp` file which is renamed over the target once
//! committed, so a crash mid-save never leaves a half-written index behind.

use super::IndexEntry;
use crate::chunking::Chunk;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: i64 = 1;

/// How a persisted index was built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub model_id: String,
    pub dimension: usize,
    /// Variant in use when saved; load rebuilds whatever is configured
    pub index_kind: String,
    pub document_id: String,
    pub document_source: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_unit: String,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PersistedIndex {
    pub meta: IndexMeta,
    pub entries: Vec<IndexEntry>,
}

/// Convert f32 vector to bytes for SQLite blob
pub fn vec_f32_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|&f| f.to_le_bytes()).collect()
}

/// Inverse of [`vec_f32_to_bytes`]; `None` if the length isn't a multiple of 4
pub fn bytes_to_vec_f32(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                format_version INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                index_kind TEXT NOT NULL,
                document_id TEXT NOT NULL,
                document_source TEXT NOT NULL,
                chunk_size INTEGER NOT NULL,
                chunk_overlap INTEGER NOT NULL,
                chunk_unit TEXT NOT NULL,
                entry_count INTEGER NOT NULL,
                built_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                position INTEGER PRIMARY KEY,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                page INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Write the full index, replacing any previous file
    pub fn save(&self, meta: &IndexMeta, entries: &[IndexEntry]) -> Result<()> {
        if meta.entry_count != entries.len() {
            return Err(PipelineError::Storage(format!(
                "meta says {} entries but {} were given",
                meta.entry_count,
                entries.len()
            )));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }

        {
            let mut conn = Connection::open(&tmp)?;
            Self::init_schema(&conn)?;

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO index_meta (id, format_version, model_id, dimension, index_kind,
                    document_id, document_source, chunk_size, chunk_overlap, chunk_unit,
                    entry_count, built_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    FORMAT_VERSION,
                    meta.model_id,
                    meta.dimension as i64,
                    meta.index_kind,
                    meta.document_id,
                    meta.document_source,
                    meta.chunk_size as i64,
                    meta.chunk_overlap as i64,
                    meta.chunk_unit,
                    meta.entry_count as i64,
                    meta.built_at,
                ],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO entries (position, chunk_index, start_offset, end_offset, page, text, vector)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for (position, entry) in entries.iter().enumerate() {
                    if entry.vector.len() != meta.dimension {
                        return Err(PipelineError::DimensionMismatch {
                            expected: meta.dimension,
                            actual: entry.vector.len(),
                        });
                    }
                    stmt.execute(params![
                        position as i64,
                        entry.chunk.index as i64,
                        entry.chunk.start as i64,
                        entry.chunk.end as i64,
                        entry.chunk.page as i64,
                        entry.chunk.text,
                        vec_f32_to_bytes(&entry.vector),
                    ])?;
                }
            }
            tx.commit()?;
        }

        std::fs::rename(&tmp, &self.path)?;
        info!(
            path = %self.path.display(),
            entries = entries.len(),
            model = %meta.model_id,
            "index saved"
        );
        Ok(())
    }

    /// Read only the metadata row
    pub fn read_meta(&self) -> Result<IndexMeta> {
        let conn = self.open_existing()?;
        Self::meta_from(&conn)
    }

    /// Load entries, checking they were produced by `model_id` at `dimension`
    pub fn load(&self, model_id: &str, dimension: usize) -> Result<PersistedIndex> {
        let conn = self.open_existing()?;
        let meta = Self::meta_from(&conn)?;

        if meta.model_id != model_id {
            return Err(PipelineError::IndexModelMismatch {
                stored: meta.model_id,
                configured: model_id.to_string(),
            });
        }
        if meta.dimension != dimension {
            return Err(PipelineError::DimensionMismatch {
                expected: dimension,
                actual: meta.dimension,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT chunk_index, start_offset, end_offset, page, text, vector
             FROM entries ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        let mut entries = Vec::with_capacity(meta.entry_count);
        for row in rows {
            let (index, start, end, page, text, blob) = row?;
            let vector = bytes_to_vec_f32(&blob)
                .filter(|v| v.len() == meta.dimension)
                .ok_or_else(|| {
                    PipelineError::Storage(format!(
                        "entry {} has a {}-byte vector, expected {}",
                        index,
                        blob.len(),
                        meta.dimension * 4
                    ))
                })?;
            entries.push(IndexEntry {
                vector,
                chunk: Chunk {
                    document_id: meta.document_id.clone(),
                    index: index as usize,
                    start: start as usize,
                    end: end as usize,
                    page: page as usize,
                    text,
                },
            });
        }

        if entries.len() != meta.entry_count {
            return Err(PipelineError::Storage(format!(
                "index is truncated: {} of {} entries present",
                entries.len(),
                meta.entry_count
            )));
        }

        debug!(path = %self.path.display(), entries = entries.len(), "index loaded");
        Ok(PersistedIndex { meta, entries })
    }

    fn open_existing(&self) -> Result<Connection> {
        if !self.exists() {
            return Err(PipelineError::Storage(format!(
                "no index at {}",
                self.path.display()
            )));
        }
        Ok(Connection::open(&self.path)?)
    }

    fn meta_from(conn: &Connection) -> Result<IndexMeta> {
        let row = conn
            .query_row(
                "SELECT format_version, model_id, dimension, index_kind, document_id,
                        document_source, chunk_size, chunk_overlap, chunk_unit,
                        entry_count, built_at
                 FROM index_meta WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        IndexMeta {
                            model_id: row.get(1)?,
                            dimension: row.get::<_, i64>(2)? as usize,
                            index_kind: row.get(3)?,
                            document_id: row.get(4)?,
                            document_source: row.get(5)?,
                            chunk_size: row.get::<_, i64>(6)? as usize,
                            chunk_overlap: row.get::<_, i64>(7)? as usize,
                            chunk_unit: row.get(8)?,
                            entry_count: row.get::<_, i64>(9)? as usize,
                            built_at: row.get(10)?,
                        },
                    ))
                },
            )
            .optional()?;

        match row {
            Some((FORMAT_VERSION, meta)) => Ok(meta),
            Some((version, _)) => Err(PipelineError::Storage(format!(
                "unsupported index format version {}",
                version
            ))),
            None => Err(PipelineError::Storage("index has no metadata".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::random_entries;
    use super::*;
    use tempfile::TempDir;

    fn meta_for(entries: &[IndexEntry], dimension: usize) -> IndexMeta {
        IndexMeta {
            model_id: "hashed-bow-v1".into(),
            dimension,
            index_kind: "flat".into(),
            document_id: "doc".into(),
            document_source: "plan.txt".into(),
            chunk_size: 200,
            chunk_overlap: 40,
            chunk_unit: "tokens".into(),
            entry_count: entries.len(),
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_blob_conversion() {
        let v = vec![1.5f32, -0.25, 0.0, f32::MAX];
        let bytes = vec_f32_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_vec_f32(&bytes).unwrap(), v);
        assert!(bytes_to_vec_f32(&bytes[..5]).is_none());
    }

    #[test]
    fn test_save_and_load_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("nested/index.db"));
        let entries = random_entries(25, 8, 3);
        let meta = meta_for(&entries, 8);

        store.save(&meta, &entries).unwrap();
        assert!(store.exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load("hashed-bow-v1", 8).unwrap();
        assert_eq!(loaded.entries, entries);
        assert_eq!(loaded.meta.model_id, meta.model_id);
        assert_eq!(loaded.meta.built_at.timestamp(), meta.built_at.timestamp());
    }

    #[test]
    fn test_save_replaces_previous_index() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index.db"));

        let first = random_entries(10, 4, 1);
        store.save(&meta_for(&first, 4), &first).unwrap();
        let second = random_entries(3, 4, 2);
        store.save(&meta_for(&second, 4), &second).unwrap();

        let loaded = store.load("hashed-bow-v1", 4).unwrap();
        assert_eq!(loaded.entries, second);
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index.db"));
        let entries = random_entries(2, 4, 1);
        store.save(&meta_for(&entries, 4), &entries).unwrap();

        let err = store.load("all-minilm-l6-v2", 4).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IndexModelMismatch { ref stored, ref configured }
                if stored == "hashed-bow-v1" && configured == "all-minilm-l6-v2"
        ));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index.db"));
        let entries = random_entries(2, 4, 1);
        store.save(&meta_for(&entries, 4), &entries).unwrap();

        assert!(matches!(
            store.load("hashed-bow-v1", 8),
            Err(PipelineError::DimensionMismatch { expected: 8, actual: 4 })
        ));
    }

    #[test]
    fn test_missing_index_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("absent.db"));
        assert!(matches!(store.read_meta(), Err(PipelineError::Storage(_))));
    }

    #[test]
    fn test_empty_index_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index.db"));
        store.save(&meta_for(&[], 4), &[]).unwrap();
        assert!(store.load("hashed-bow-v1", 4).unwrap().entries.is_empty());
    }
}
