//! Relational-native vector store backend (`rusqlite` + `sqlite-vec`).
//!
//! The "relational, native runtime" backend: `sources`, `documents`, and a
//! `vec_documents` virtual table
//! created by the `sqlite-vec` extension. Searches join `documents` against
//! an approximate-nearest-neighbour query over `vec_documents` and convert
//! the extension's returned distance to a similarity via `1 - distance`.

// SQLite stores all integers as i64; these casts are intentional and bounded
// by the fact that we only ever store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rusqlite::{Connection, OptionalExtension, params};

use crate::core::{Fragment, Source};
use crate::error::{Result, StorageError};
use crate::storage::schema::{CHECK_SCHEMA_SQL, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL, CURRENT_SCHEMA_VERSION};
use crate::storage::traits::{Filter, Hit, ListOptions, SearchOptions, StoragePrimitives};

static REGISTER_VEC_EXTENSION: Once = Once::new();

fn register_vec_extension() {
    REGISTER_VEC_EXTENSION.call_once(|| {
        #[allow(unsafe_code)]
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut std::os::raw::c_char,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> std::os::raw::c_int,
                unsafe extern "C" fn(),
            >(sqlite_vec::sqlite3_vec_init)));
        }
    });
}

fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8], dimensions: usize) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .take(dimensions)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// `rusqlite` + `sqlite-vec` backed [`StoragePrimitives`] implementation.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    dimensions: usize,
}

impl SqliteStore {
    /// Opens or creates a database at `path` with the given vector
    /// dimension. Call [`StoragePrimitives::open`] (via the adapter's
    /// `initialize`) before use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database file or its parent directory cannot
    /// be created.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        register_vec_extension();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(&path).map_err(StorageError::from)?;
        Ok(Self {
            conn,
            path: Some(path),
            dimensions,
        })
    }

    /// Opens an in-memory database. Useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        Ok(Self {
            conn,
            path: None,
            dimensions,
        })
    }

    fn metadata_json(fragment: &Fragment) -> Result<String> {
        let encoded = crate::storage::metadata_codec::encode(fragment);
        serde_json::to_string(&encoded).map_err(|e| StorageError::Serialization(e.to_string()).into())
    }

    fn fragment_from_row(row: &rusqlite::Row) -> rusqlite::Result<(Fragment, i64)> {
        let id: String = row.get("id")?;
        let source_id: String = row.get("source_id")?;
        let content: String = row.get("content")?;
        let metadata_json: String = row.get("metadata_json")?;
        let chunk_index: i64 = row.get("chunk_index")?;
        let vec_rowid: i64 = row.get("vec_rowid")?;

        let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
        let boundary = crate::storage::metadata_codec::boundary_from_metadata(&metadata);
        let start_line = metadata.get("__start_line").and_then(|v| v.parse().ok());
        let end_line = metadata.get("__end_line").and_then(|v| v.parse().ok());
        let has_overlap = metadata.get("__has_overlap").is_some_and(|v| v == "true");

        let mut fragment = Fragment::with_boundary(source_id, chunk_index as usize, content, boundary);
        fragment.id = Some(id);
        fragment.start_line = start_line;
        fragment.end_line = end_line;
        fragment.has_overlap = has_overlap;
        fragment.metadata = metadata;

        Ok((fragment, vec_rowid))
    }

    fn apply_filter(fragment: &Fragment, filter: &Filter) -> bool {
        filter.iter().all(|(key, value)| fragment.metadata.get(key) == Some(value))
    }
}

impl StoragePrimitives for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn similarity_convention(&self) -> &'static str {
        "1 - distance (L2 via sqlite-vec)"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self))]
    fn open(&mut self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(StorageError::from)?;
        self.conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get::<_, String>(0))
            .map_err(StorageError::from)?;
        self.conn.execute_batch(SCHEMA_SQL).map_err(|e| StorageError::Migration(e.to_string()))?;

        let has_schema_info: i64 = self.conn.query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0)).map_err(StorageError::from)?;
        if has_schema_info == 0 {
            return Err(StorageError::Migration("schema_info table missing after creation".to_string()).into());
        }
        self.conn
            .execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])
            .map_err(StorageError::from)?;
        let _: Option<String> = self.conn.query_row(GET_VERSION_SQL, [], |row| row.get(0)).optional().map_err(StorageError::from)?;

        self.conn
            .execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS vec_documents USING vec0(embedding float[{}])",
                    self.dimensions
                ),
                [],
            )
            .map_err(|e| StorageError::VectorExtensionLoad(e.to_string()))?;

        Ok(())
    }

    fn shut(&mut self) -> Result<()> {
        if self.path.is_some() {
            let _ = self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
        Ok(())
    }

    fn store_document(&mut self, fragment: &Fragment, embedding: &[f32]) -> Result<()> {
        let id = fragment.id.as_deref().expect("id assigned before store_document");
        let metadata_json = Self::metadata_json(fragment)?;
        let tx = self.conn.transaction().map_err(StorageError::from)?;

        tx.execute(
            "INSERT INTO vec_documents(embedding) VALUES (?1)",
            params![serialize_embedding(embedding)],
        )
        .map_err(|e| StorageError::VectorExtensionLoad(e.to_string()))?;
        let vec_rowid = tx.last_insert_rowid();

        tx.execute(
            "INSERT OR REPLACE INTO documents (id, source_id, content, metadata_json, vec_rowid, chunk_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, fragment.source_id, fragment.content, metadata_json, vec_rowid, fragment.chunk_index as i64],
        )
        .map_err(StorageError::from)?;

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn retrieve_document(&self, id: &str) -> Result<Option<Fragment>> {
        self.conn
            .query_row("SELECT * FROM documents WHERE id = ?1", params![id], |row| {
                Self::fragment_from_row(row).map(|(fragment, _)| fragment)
            })
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()).into())
    }

    fn replace_document(&mut self, id: &str, content: Option<&str>, metadata: Option<&Filter>) -> Result<bool> {
        let Some(mut fragment) = self.retrieve_document(id)? else {
            return Ok(false);
        };
        if let Some(content) = content {
            fragment.content = content.to_string();
        }
        if let Some(metadata) = metadata {
            for (key, value) in metadata {
                fragment.metadata.insert(key.clone(), value.clone());
            }
        }
        let metadata_json = Self::metadata_json(&fragment)?;
        self.conn
            .execute(
                "UPDATE documents SET content = ?1, metadata_json = ?2 WHERE id = ?3",
                params![fragment.content, metadata_json, id],
            )
            .map_err(StorageError::from)?;
        Ok(true)
    }

    fn remove_document(&mut self, id: &str) -> Result<Option<String>> {
        let Some((fragment, vec_rowid)) = self
            .conn
            .query_row("SELECT * FROM documents WHERE id = ?1", params![id], Self::fragment_from_row)
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let tx = self.conn.transaction().map_err(StorageError::from)?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![id]).map_err(StorageError::from)?;
        tx.execute("DELETE FROM vec_documents WHERE rowid = ?1", params![vec_rowid])
            .map_err(|e| StorageError::VectorExtensionLoad(e.to_string()))?;
        tx.commit().map_err(StorageError::from)?;

        Ok(Some(fragment.source_id))
    }

    #[tracing::instrument(skip(self, vector, options), fields(k = options.k))]
    fn search_similar(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>> {
        let k = options.k.max(1);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT d.*, v.distance AS distance
                 FROM vec_documents v
                 JOIN documents d ON d.vec_rowid = v.rowid
                 WHERE v.embedding MATCH ?1 AND k = ?2
                 ORDER BY v.distance",
            )
            .map_err(|e| StorageError::VectorExtensionLoad(e.to_string()))?;

        let rows = stmt
            .query_map(params![serialize_embedding(vector), k as i64], |row| {
                let (fragment, _) = Self::fragment_from_row(row)?;
                let distance: f64 = row.get("distance")?;
                Ok((fragment, distance))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            let (fragment, distance) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            if let Some(filter) = &options.filter {
                if !Self::apply_filter(&fragment, filter) {
                    continue;
                }
            }
            hits.push(Hit {
                fragment,
                score: (1.0 - distance) as f32,
            });
        }
        Ok(hits)
    }

    fn count_for_source(&self, source_id: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents WHERE source_id = ?1", params![source_id], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    fn count_documents(&self, filter: Option<&Filter>) -> Result<usize> {
        if filter.is_none() {
            let count: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(StorageError::from)?;
            return Ok(count as usize);
        }
        Ok(self.list_documents(&ListOptions { limit: None, offset: None, filter: filter.cloned() })?.len())
    }

    fn list_documents(&self, options: &ListOptions) -> Result<Vec<Fragment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM documents ORDER BY source_id, chunk_index")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Self::fragment_from_row(row).map(|(fragment, _)| fragment))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut fragments = Vec::new();
        for row in rows {
            let fragment = row.map_err(|e| StorageError::Database(e.to_string()))?;
            if let Some(filter) = &options.filter {
                if !Self::apply_filter(&fragment, filter) {
                    continue;
                }
            }
            fragments.push(fragment);
        }

        let offset = options.offset.unwrap_or(0);
        let fragments: Vec<_> = fragments.into_iter().skip(offset).collect();
        Ok(match options.limit {
            Some(limit) => fragments.into_iter().take(limit).collect(),
            None => fragments,
        })
    }

    fn upsert_source(&mut self, source: &Source) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sources (source_id, title, url, source_type, original_content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_id) DO UPDATE SET
                    title = excluded.title, url = excluded.url,
                    source_type = excluded.source_type, original_content = excluded.original_content",
                params![
                    source.source_id,
                    source.title,
                    source.url,
                    source.source_type.as_str(),
                    source.original_content,
                    source.created_at,
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn delete_source(&mut self, source_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sources WHERE source_id = ?1", params![source_id])
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn source_exists(&self, source_id: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sources WHERE source_id = ?1", params![source_id], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }
}

// SAFETY: SqliteStore is only accessed from a single thread at a time.
// StoragePrimitives requires Send + Sync, and we ensure thread-safety
// through external synchronization (single-threaded CLI usage).
#[allow(unsafe_code)]
unsafe impl Send for SqliteStore {}
#[allow(unsafe_code)]
unsafe impl Sync for SqliteStore {}
