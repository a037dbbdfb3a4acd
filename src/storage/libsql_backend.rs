//! Relational-alternative vector store backend (`libsql`).
//!
//! Same schema and query shape as [`super::sqlite`] — the two relational
//! backends differ only in runtime and in how the vector extension is
//! loaded and how vector literals are written — but against
//! `libsql`'s own embedded-replica-capable engine. `libsql` ships its F32
//! vector support built in, so there's no extension to register: vectors
//! are written through `vector32(?)` and compared with `vector_distance_cos`.

use std::path::{Path, PathBuf};

use libsql::{Builder, Connection, Database, params};

use crate::core::{Fragment, Source};
use crate::error::{Error, Result, StorageError};
use crate::storage::schema::{CURRENT_SCHEMA_VERSION, SET_VERSION_SQL};
use crate::storage::traits::{Filter, Hit, ListOptions, SearchOptions, StoragePrimitives};

const LIBSQL_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sources (
    source_id TEXT PRIMARY KEY,
    title TEXT,
    url TEXT,
    source_type TEXT NOT NULL,
    original_content TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    embedding F32_BLOB
);

CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_id);
CREATE INDEX IF NOT EXISTS idx_documents_order ON documents(source_id, chunk_index);
";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building a current-thread tokio runtime never fails in practice")
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    runtime().block_on(fut)
}

/// `libsql`-backed [`StoragePrimitives`] implementation.
pub struct LibsqlStore {
    db: Database,
    conn: Option<Connection>,
    dimensions: usize,
}

impl LibsqlStore {
    /// Opens or creates a local `libsql` database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }
        let db = block_on(Builder::new_local(path)).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { db, conn: None, dimensions })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::NotInitialized)
    }

    fn vector_literal(vector: &[f32]) -> String {
        let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
        format!("[{}]", parts.join(","))
    }

    fn metadata_json(fragment: &Fragment) -> Result<String> {
        let encoded = crate::storage::metadata_codec::encode(fragment);
        serde_json::to_string(&encoded).map_err(|e| StorageError::Serialization(e.to_string()).into())
    }

    fn fragment_from_row(row: &libsql::Row) -> Result<Fragment> {
        let id: String = row.get(0).map_err(|e| StorageError::Database(e.to_string()))?;
        let source_id: String = row.get(1).map_err(|e| StorageError::Database(e.to_string()))?;
        let content: String = row.get(2).map_err(|e| StorageError::Database(e.to_string()))?;
        let metadata_json: String = row.get(3).map_err(|e| StorageError::Database(e.to_string()))?;
        let chunk_index: i64 = row.get(4).map_err(|e| StorageError::Database(e.to_string()))?;

        let metadata: std::collections::HashMap<String, String> =
            serde_json::from_str(&metadata_json).unwrap_or_default();
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
        Ok(fragment)
    }

    fn apply_filter(fragment: &Fragment, filter: &Filter) -> bool {
        filter.iter().all(|(key, value)| fragment.metadata.get(key) == Some(value))
    }
}

impl StoragePrimitives for LibsqlStore {
    fn backend_name(&self) -> &'static str {
        "libsql"
    }

    fn similarity_convention(&self) -> &'static str {
        "1 - vector_distance_cos"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self))]
    fn open(&mut self) -> Result<()> {
        let conn = self.db.connect().map_err(|e| StorageError::Database(e.to_string()))?;
        block_on(conn.execute_batch(LIBSQL_SCHEMA_SQL)).map_err(|e| StorageError::Migration(e.to_string()))?;
        block_on(conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_documents_embedding ON documents(libsql_vector_idx(embedding))"
            ),
            (),
        ))
        .map_err(|e| StorageError::VectorExtensionLoad(e.to_string()))?;
        block_on(conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()]))
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        self.conn = Some(conn);
        Ok(())
    }

    fn shut(&mut self) -> Result<()> {
        self.conn = None;
        Ok(())
    }

    fn store_document(&mut self, fragment: &Fragment, embedding: &[f32]) -> Result<()> {
        let conn = self.conn()?;
        let id = fragment.id.as_deref().expect("id assigned before store_document");
        let metadata_json = Self::metadata_json(fragment)?;
        let vector_sql = Self::vector_literal(embedding);
        block_on(conn.execute(
            &format!(
                "INSERT OR REPLACE INTO documents (id, source_id, content, metadata_json, chunk_index, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, vector32('{vector_sql}'))"
            ),
            params![id, fragment.source_id.clone(), fragment.content.clone(), metadata_json, fragment.chunk_index as i64],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn retrieve_document(&self, id: &str) -> Result<Option<Fragment>> {
        let conn = self.conn()?;
        let mut rows = block_on(conn.query(
            "SELECT id, source_id, content, metadata_json, chunk_index FROM documents WHERE id = ?1",
            params![id],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;
        match block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))? {
            Some(row) => Ok(Some(Self::fragment_from_row(&row)?)),
            None => Ok(None),
        }
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
        let conn = self.conn()?;
        block_on(conn.execute(
            "UPDATE documents SET content = ?1, metadata_json = ?2 WHERE id = ?3",
            params![fragment.content, metadata_json, id],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(true)
    }

    fn remove_document(&mut self, id: &str) -> Result<Option<String>> {
        let Some(fragment) = self.retrieve_document(id)? else {
            return Ok(None);
        };
        let conn = self.conn()?;
        block_on(conn.execute("DELETE FROM documents WHERE id = ?1", params![id]))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Some(fragment.source_id))
    }

    #[tracing::instrument(skip(self, vector, options), fields(k = options.k))]
    fn search_similar(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>> {
        let conn = self.conn()?;
        let k = options.k.max(1);
        let vector_sql = Self::vector_literal(vector);
        let mut rows = block_on(conn.query(
            &format!(
                "SELECT d.id, d.source_id, d.content, d.metadata_json, d.chunk_index,
                        vector_distance_cos(d.embedding, vector32('{vector_sql}')) AS distance
                 FROM documents d
                 ORDER BY distance
                 LIMIT ?1"
            ),
            params![k as i64],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut hits = Vec::new();
        while let Some(row) = block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))? {
            let fragment = Self::fragment_from_row(&row)?;
            let distance: f64 = row.get(5).map_err(|e| StorageError::Database(e.to_string()))?;
            if let Some(filter) = &options.filter {
                if !Self::apply_filter(&fragment, filter) {
                    continue;
                }
            }
            hits.push(Hit { fragment, score: (1.0 - distance) as f32 });
        }
        Ok(hits)
    }

    fn count_for_source(&self, source_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let mut rows = block_on(conn.query(
            "SELECT COUNT(*) FROM documents WHERE source_id = ?1",
            params![source_id],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;
        let row = block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))?;
        let count: i64 = row.map_or(Ok(0), |r| r.get(0)).map_err(|e: libsql::Error| StorageError::Database(e.to_string()))?;
        Ok(count as usize)
    }

    fn count_documents(&self, filter: Option<&Filter>) -> Result<usize> {
        if filter.is_none() {
            let conn = self.conn()?;
            let mut rows = block_on(conn.query("SELECT COUNT(*) FROM documents", ()))
                .map_err(|e| StorageError::Database(e.to_string()))?;
            let row = block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))?;
            let count: i64 = row.map_or(Ok(0), |r| r.get(0)).map_err(|e: libsql::Error| StorageError::Database(e.to_string()))?;
            return Ok(count as usize);
        }
        Ok(self.list_documents(&ListOptions { limit: None, offset: None, filter: filter.cloned() })?.len())
    }

    fn list_documents(&self, options: &ListOptions) -> Result<Vec<Fragment>> {
        let conn = self.conn()?;
        let mut rows = block_on(conn.query(
            "SELECT id, source_id, content, metadata_json, chunk_index FROM documents ORDER BY source_id, chunk_index",
            (),
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut fragments = Vec::new();
        while let Some(row) = block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))? {
            let fragment = Self::fragment_from_row(&row)?;
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
        let conn = self.conn()?;
        block_on(conn.execute(
            "INSERT INTO sources (source_id, title, url, source_type, original_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_id) DO UPDATE SET
                title = excluded.title, url = excluded.url,
                source_type = excluded.source_type, original_content = excluded.original_content",
            params![
                source.source_id.clone(),
                source.title.clone(),
                source.url.clone(),
                source.source_type.as_str(),
                source.original_content.clone(),
                source.created_at,
            ],
        ))
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete_source(&mut self, source_id: &str) -> Result<()> {
        let conn = self.conn()?;
        block_on(conn.execute("DELETE FROM sources WHERE source_id = ?1", params![source_id]))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn source_exists(&self, source_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let mut rows = block_on(conn.query("SELECT COUNT(*) FROM sources WHERE source_id = ?1", params![source_id]))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let row = block_on(rows.next()).map_err(|e| StorageError::Database(e.to_string()))?;
        let count: i64 = row.map_or(Ok(0), |r| r.get(0)).map_err(|e: libsql::Error| StorageError::Database(e.to_string()))?;
        Ok(count > 0)
    }
}
