//! Columnar analytical vector store backend (`duckdb`), optionally
//! accelerated by an HNSW index via `usearch`.
//!
//! A single `vectors` table carries content, metadata, and embedding
//! together; there's no separate `sources`/`documents` split like the
//! relational backends; `sources` rows live in their own small table so
//! orphan cleanup still works the same way through [`super::traits::BaseAdapter`].
//! Connections are cached and refcounted per database path, because
//! `duckdb::Connection` isn't `Clone` and callers (CLI + library users) may
//! open the same on-disk database from multiple `ColumnarStore` instances
//! in the same process.

use std::collections::HashMap as StdHashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use duckdb::Connection;

use crate::core::{Fragment, Source};
use crate::error::{Error, Result, StorageError};
use crate::storage::traits::{Filter, Hit, ListOptions, SearchOptions, StoragePrimitives};

#[cfg(feature = "columnar-hnsw")]
use usearch::{Index, IndexOptions, MetricKind};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sources (
    source_id VARCHAR PRIMARY KEY,
    title VARCHAR,
    url VARCHAR,
    source_type VARCHAR NOT NULL,
    original_content VARCHAR,
    created_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS vectors (
    id VARCHAR PRIMARY KEY,
    source_id VARCHAR NOT NULL,
    chunk_index BIGINT NOT NULL,
    content VARCHAR NOT NULL,
    metadata VARCHAR NOT NULL,
    embedding DOUBLE[] NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);
";

type ConnCache = Mutex<StdHashMap<PathBuf, (Arc<Mutex<Connection>>, usize)>>;

static CONN_CACHE: OnceLock<ConnCache> = OnceLock::new();

fn cache() -> &'static ConnCache {
    CONN_CACHE.get_or_init(|| Mutex::new(StdHashMap::new()))
}

/// HNSW metric exposed by the columnar backend's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HnswMetric {
    /// Squared Euclidean distance.
    L2Sq,
    /// Inner product.
    Ip,
    /// Cosine distance.
    Cosine,
}

/// `duckdb`-backed [`StoragePrimitives`] implementation.
pub struct ColumnarStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    dimensions: usize,
    enable_hnsw: bool,
    metric: HnswMetric,
    #[cfg(feature = "columnar-hnsw")]
    hnsw: Option<Index>,
    #[cfg(feature = "columnar-hnsw")]
    id_map: StdHashMap<u64, String>,
    #[cfg(feature = "columnar-hnsw")]
    reverse_map: StdHashMap<String, u64>,
    #[cfg(feature = "columnar-hnsw")]
    next_key: u64,
    hnsw_active: bool,
}

impl ColumnarStore {
    /// Opens (or reuses a cached connection to) a `duckdb` database at
    /// `path`, with ANN acceleration controlled by `enable_hnsw`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>, dimensions: usize, enable_hnsw: bool, metric: HnswMetric) -> Result<Self> {
        let path = path.into();
        let mut guard = cache().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let conn = if let Some((conn, count)) = guard.get_mut(&path) {
            *count += 1;
            Arc::clone(conn)
        } else {
            let conn = Connection::open(&path).map_err(|e| StorageError::Database(e.to_string()))?;
            let conn = Arc::new(Mutex::new(conn));
            guard.insert(path.clone(), (Arc::clone(&conn), 1));
            conn
        };
        drop(guard);

        Ok(Self {
            conn,
            path,
            dimensions,
            enable_hnsw,
            metric,
            #[cfg(feature = "columnar-hnsw")]
            hnsw: None,
            #[cfg(feature = "columnar-hnsw")]
            id_map: StdHashMap::new(),
            #[cfg(feature = "columnar-hnsw")]
            reverse_map: StdHashMap::new(),
            #[cfg(feature = "columnar-hnsw")]
            next_key: 0,
            hnsw_active: false,
        })
    }

    fn release(&self) {
        let mut guard = cache().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((_, count)) = guard.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                guard.remove(&self.path);
            }
        }
    }

    fn metadata_json(fragment: &Fragment) -> Result<String> {
        let encoded = crate::storage::metadata_codec::encode(fragment);
        serde_json::to_string(&encoded).map_err(|e| StorageError::Serialization(e.to_string()).into())
    }

    fn fragment_from_row(
        id: String,
        source_id: String,
        chunk_index: i64,
        content: String,
        metadata_json: String,
    ) -> Fragment {
        let metadata: StdHashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();
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
        fragment
    }

    fn apply_filter(fragment: &Fragment, filter: &Filter) -> bool {
        filter.iter().all(|(key, value)| fragment.metadata.get(key) == Some(value))
    }

    #[cfg(feature = "columnar-hnsw")]
    fn usearch_metric(metric: HnswMetric) -> MetricKind {
        match metric {
            HnswMetric::L2Sq => MetricKind::L2sq,
            HnswMetric::Ip => MetricKind::IP,
            HnswMetric::Cosine => MetricKind::Cos,
        }
    }

    /// Attempts to bring up the HNSW index and backfill it from the rows
    /// already on disk; on any failure, silently leaves `hnsw_active` false
    /// and search falls back to `array_distance`. The usearch index
    /// itself isn't persisted across process restarts, so every `open()`
    /// rebuilds it from the `vectors` table when HNSW is enabled.
    #[cfg(feature = "columnar-hnsw")]
    fn try_init_hnsw(&mut self) {
        if !self.enable_hnsw {
            return;
        }
        let options = IndexOptions {
            dimensions: self.dimensions,
            metric: Self::usearch_metric(self.metric),
            ..Default::default()
        };
        let Ok(index) = Index::new(&options) else {
            self.hnsw = None;
            self.hnsw_active = false;
            return;
        };

        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let row_count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0)).unwrap_or(0);
        if index.reserve(row_count.max(1024) as usize).is_err() {
            drop(conn);
            self.hnsw = None;
            self.hnsw_active = false;
            return;
        }

        let mut id_map = StdHashMap::new();
        let mut reverse_map = StdHashMap::new();
        let mut next_key = 0u64;
        let backfilled = (|| -> duckdb::Result<()> {
            let mut stmt = conn.prepare("SELECT id, embedding FROM vectors")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let embedding: Vec<f64> = row.get(1)?;
                Ok((id, embedding))
            })?;
            for row in rows {
                let (id, embedding) = row?;
                let vector: Vec<f32> = embedding.iter().map(|v| *v as f32).collect();
                if index.add(next_key, &vector).is_ok() {
                    id_map.insert(next_key, id.clone());
                    reverse_map.insert(id, next_key);
                    next_key += 1;
                }
            }
            Ok(())
        })();
        drop(conn);

        if backfilled.is_err() {
            self.hnsw = None;
            self.hnsw_active = false;
            return;
        }
        self.hnsw = Some(index);
        self.id_map = id_map;
        self.reverse_map = reverse_map;
        self.next_key = next_key;
        self.hnsw_active = true;
    }

    #[cfg(not(feature = "columnar-hnsw"))]
    const fn try_init_hnsw(&mut self) {}

    /// Adds or replaces `id`'s vector in the HNSW index when active; a no-op
    /// otherwise, leaving `search_similar` to fall back to `array_distance`.
    #[cfg(feature = "columnar-hnsw")]
    fn hnsw_upsert(&mut self, id: &str, embedding: &[f32]) {
        if !self.hnsw_active {
            return;
        }
        let Some(index) = self.hnsw.as_ref() else { return };
        if let Some(old_key) = self.reverse_map.remove(id) {
            let _ = index.remove(old_key);
            self.id_map.remove(&old_key);
        }
        let key = self.next_key;
        if index.add(key, embedding).is_err() {
            return;
        }
        self.next_key += 1;
        self.id_map.insert(key, id.to_string());
        self.reverse_map.insert(id.to_string(), key);
    }

    #[cfg(not(feature = "columnar-hnsw"))]
    fn hnsw_upsert(&mut self, _id: &str, _embedding: &[f32]) {}

    #[cfg(feature = "columnar-hnsw")]
    fn hnsw_remove(&mut self, id: &str) {
        if let Some(key) = self.reverse_map.remove(id) {
            if let Some(index) = self.hnsw.as_ref() {
                let _ = index.remove(key);
            }
            self.id_map.remove(&key);
        }
    }

    #[cfg(not(feature = "columnar-hnsw"))]
    fn hnsw_remove(&mut self, _id: &str) {}

    /// Returns `Some(hits)` if the HNSW index is active and the query
    /// succeeded, `None` to signal the caller should fall back to
    /// `array_distance`.
    #[cfg(feature = "columnar-hnsw")]
    fn hnsw_search(&self, vector: &[f32], k: usize, options: &SearchOptions) -> Result<Option<Vec<Hit>>> {
        if !self.hnsw_active {
            return Ok(None);
        }
        let Some(index) = self.hnsw.as_ref() else { return Ok(None) };
        let fetch_k = if options.filter.is_some() { k.saturating_mul(4).max(k) } else { k };
        let Ok(matches) = index.search(vector, fetch_k) else { return Ok(None) };

        let mut hits = Vec::new();
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let Some(id) = self.id_map.get(key) else { continue };
            let Some(fragment) = self.retrieve_document(id)? else { continue };
            if let Some(filter) = &options.filter {
                if !Self::apply_filter(&fragment, filter) {
                    continue;
                }
            }
            hits.push(Hit { fragment, score: 1.0 - *distance });
            if hits.len() >= k {
                break;
            }
        }
        Ok(Some(hits))
    }

    #[cfg(not(feature = "columnar-hnsw"))]
    fn hnsw_search(&self, _vector: &[f32], _k: usize, _options: &SearchOptions) -> Result<Option<Vec<Hit>>> {
        Ok(None)
    }
}

impl Drop for ColumnarStore {
    fn drop(&mut self) {
        self.release();
    }
}

impl StoragePrimitives for ColumnarStore {
    fn backend_name(&self) -> &'static str {
        "columnar"
    }

    fn similarity_convention(&self) -> &'static str {
        "1 - array_distance (or usearch HNSW distance when active)"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[tracing::instrument(skip(self))]
    fn open(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute_batch(SCHEMA_SQL).map_err(|e| StorageError::Migration(e.to_string()))?;
        drop(conn);
        self.try_init_hnsw();
        tracing::debug!(hnsw_active = self.hnsw_active, "columnar backend opened");
        Ok(())
    }

    fn shut(&mut self) -> Result<()> {
        Ok(())
    }

    fn store_document(&mut self, fragment: &Fragment, embedding: &[f32]) -> Result<()> {
        let id = fragment.id.as_deref().expect("id assigned before store_document").to_string();
        let metadata_json = Self::metadata_json(fragment)?;
        let embedding_f64: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO vectors (id, source_id, chunk_index, content, metadata, embedding, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0)",
            duckdb::params![id, fragment.source_id, fragment.chunk_index as i64, fragment.content, metadata_json, embedding_f64],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        drop(conn);
        self.hnsw_upsert(&id, embedding);
        Ok(())
    }

    fn retrieve_document(&self, id: &str) -> Result<Option<Fragment>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = conn.query_row(
            "SELECT id, source_id, chunk_index, content, metadata FROM vectors WHERE id = ?",
            duckdb::params![id],
            |row| {
                Ok(Self::fragment_from_row(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        );
        match result {
            Ok(fragment) => Ok(Some(fragment)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Database(e.to_string()).into()),
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
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE vectors SET content = ?, metadata = ? WHERE id = ?",
            duckdb::params![fragment.content, metadata_json, id],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(true)
    }

    fn remove_document(&mut self, id: &str) -> Result<Option<String>> {
        let Some(fragment) = self.retrieve_document(id)? else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute("DELETE FROM vectors WHERE id = ?", duckdb::params![id])
            .map_err(|e| StorageError::Database(e.to_string()))?;
        drop(conn);
        self.hnsw_remove(id);
        Ok(Some(fragment.source_id))
    }

    #[tracing::instrument(skip(self, vector, options), fields(k = options.k, hnsw_active = self.hnsw_active))]
    fn search_similar(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<Hit>> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        let k = options.k.max(1);
        if let Some(hits) = self.hnsw_search(vector, k, options)? {
            return Ok(hits);
        }
        let vector_f64: Vec<f64> = vector.iter().map(|v| f64::from(*v)).collect();
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn
            .prepare(
                "SELECT id, source_id, chunk_index, content, metadata,
                        array_distance(embedding, ?::DOUBLE[]) AS distance
                 FROM vectors
                 ORDER BY distance
                 LIMIT ?",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(duckdb::params![vector_f64, k as i64], |row| {
                let fragment = Self::fragment_from_row(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?);
                let distance: f64 = row.get(5)?;
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
            hits.push(Hit { fragment, score: (1.0 - distance) as f32 });
        }
        Ok(hits)
    }

    fn count_for_source(&self, source_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors WHERE source_id = ?", duckdb::params![source_id], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(count as usize)
    }

    fn count_documents(&self, filter: Option<&Filter>) -> Result<usize> {
        if filter.is_none() {
            let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
                .map_err(|e| StorageError::Database(e.to_string()))?;
            return Ok(count as usize);
        }
        Ok(self.list_documents(&ListOptions { limit: None, offset: None, filter: filter.cloned() })?.len())
    }

    fn list_documents(&self, options: &ListOptions) -> Result<Vec<Fragment>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn
            .prepare("SELECT id, source_id, chunk_index, content, metadata FROM vectors ORDER BY source_id, chunk_index")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Self::fragment_from_row(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
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
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO sources (source_id, title, url, source_type, original_content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(source_id) DO UPDATE SET
                title = excluded.title, url = excluded.url,
                source_type = excluded.source_type, original_content = excluded.original_content",
            duckdb::params![
                source.source_id,
                source.title,
                source.url,
                source.source_type.as_str(),
                source.original_content,
                source.created_at,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn delete_source(&mut self, source_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute("DELETE FROM sources WHERE source_id = ?", duckdb::params![source_id])
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    fn source_exists(&self, source_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sources WHERE source_id = ?", duckdb::params![source_id], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::{BaseAdapter, VectorStore};

    fn store(dir: &tempfile::TempDir) -> BaseAdapter<ColumnarStore> {
        BaseAdapter::new(ColumnarStore::open(dir.path().join("test.duckdb"), 3, false, HnswMetric::Cosine).unwrap())
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = store(&dir);
        adapter.initialize().unwrap();
        let fragment = Fragment::new("s1".to_string(), 0, "hello".to_string());
        let id = adapter.insert(fragment, vec![1.0, 0.0, 0.0]).unwrap();
        let fetched = adapter.get(&id).unwrap();
        assert_eq!(fetched.content, "hello");
    }

    #[test]
    fn test_search_returns_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = store(&dir);
        adapter.initialize().unwrap();
        adapter.insert(Fragment::new("s1".to_string(), 0, "a".to_string()), vec![1.0, 0.0, 0.0]).unwrap();
        adapter.insert(Fragment::new("s1".to_string(), 1, "b".to_string()), vec![0.0, 1.0, 0.0]).unwrap();
        let hits = adapter.search(&[1.0, 0.0, 0.0], &SearchOptions { k: 1, filter: None }).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment.content, "a");
    }

    #[cfg(feature = "columnar-hnsw")]
    #[test]
    #[ignore = "usearch segfaults on cleanup in some environments, run manually with --ignored"]
    fn test_hnsw_search_matches_array_distance() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = BaseAdapter::new(ColumnarStore::open(dir.path().join("hnsw.duckdb"), 3, true, HnswMetric::Cosine).unwrap());
        adapter.initialize().unwrap();
        adapter.insert(Fragment::new("s1".to_string(), 0, "a".to_string()), vec![1.0, 0.0, 0.0]).unwrap();
        adapter.insert(Fragment::new("s1".to_string(), 1, "b".to_string()), vec![0.0, 1.0, 0.0]).unwrap();
        let hits = adapter.search(&[1.0, 0.0, 0.0], &SearchOptions { k: 1, filter: None }).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment.content, "a");
    }

    #[cfg(feature = "columnar-hnsw")]
    #[test]
    #[ignore = "usearch segfaults on cleanup in some environments, run manually with --ignored"]
    fn test_hnsw_backfills_from_existing_rows_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("hnsw_reopen.duckdb");
        {
            let mut adapter = BaseAdapter::new(ColumnarStore::open(&db_path, 3, true, HnswMetric::Cosine).unwrap());
            adapter.initialize().unwrap();
            adapter.insert(Fragment::new("s1".to_string(), 0, "a".to_string()), vec![1.0, 0.0, 0.0]).unwrap();
        }
        let mut adapter = BaseAdapter::new(ColumnarStore::open(&db_path, 3, true, HnswMetric::Cosine).unwrap());
        adapter.initialize().unwrap();
        let hits = adapter.search(&[1.0, 0.0, 0.0], &SearchOptions { k: 1, filter: None }).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment.content, "a");
    }
}
