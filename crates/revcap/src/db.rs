//! Database module for revcap
//!
//! This module provides SQLite storage for reviews. Each changeset is stored
//! as a JSON document next to the columns needed to order and filter it.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::info;

use crate::migrations;
use crate::models::{Changeset, Review};
use crate::store::{ReviewStore, ReviewSummary, StoreError, new_review_id, validate_append};

/// Synchronous access to the review tables
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Database {
    /// Unmigrated in-memory store
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open it.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Unmigrated store backed by `path`
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot open the file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Run pending schema migrations
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let applied = migrations::migrate(&self.conn)?;
        if !applied.is_empty() {
            info!(?applied, "applied database migrations");
        }
        Ok(())
    }

    /// Every migration has run
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        migrations::is_current(&self.conn)
    }

    /// Highest migration applied
    ///
    /// # Errors
    ///
    /// Returns an error if `schema_migrations` cannot be read.
    pub fn schema_version(&self) -> Result<i32, StoreError> {
        Ok(migrations::schema_version(&self.conn)?)
    }

    /// Raw connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Row count of `table`
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn count(&self, table: &str) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    }

    // ========================================================================
    // Reviews
    // ========================================================================

    /// Insert a review and its changesets
    ///
    /// # Errors
    ///
    /// Returns an error if a changeset cannot be serialized or the insert fails.
    pub fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let created_at = review.created_at.to_rfc3339();
        tx.execute(
            "INSERT INTO reviews (id, title, version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![review.id, review.title, to_sql_version(review.version), created_at],
        )?;
        insert_changesets(&tx, &review.id, 0, &review.changesets)?;
        tx.commit()?;
        Ok(())
    }

    /// Load a review with its changesets in creation order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored document is corrupt.
    pub fn load_review(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, version, created_at FROM reviews WHERE id = ?1",
                [review_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, title, version, created_at)) = row else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT document FROM changesets WHERE review_id = ?1 ORDER BY seq")?;
        let documents = stmt
            .query_map([review_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let changesets = documents
            .iter()
            .map(|doc| serde_json::from_str::<Changeset>(doc))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Review {
            id,
            title,
            version: u64::try_from(version).unwrap_or_default(),
            created_at: parse_timestamp(&created_at)?,
            changesets,
        }))
    }

    /// Append changesets and bump the review version
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the review does not exist, or an
    /// error if the changesets break checkpoint ordering or the write fails.
    pub fn append_changesets(
        &self,
        review_id: &str,
        changesets: &[Changeset],
    ) -> Result<Review, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut review = self
            .load_review(review_id)?
            .ok_or_else(|| StoreError::NotFound {
                review_id: review_id.to_string(),
            })?;
        validate_append(&review.changesets, changesets)?;

        insert_changesets(&tx, review_id, review.changesets.len(), changesets)?;
        tx.execute(
            "UPDATE reviews SET version = version + 1, updated_at = ?2 WHERE id = ?1",
            params![review_id, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        review.changesets.extend_from_slice(changesets);
        review.version += 1;
        Ok(review)
    }

    /// Summaries of every review, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_reviews(&self) -> Result<Vec<ReviewSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.title, r.version, r.created_at, COUNT(c.seq)
             FROM reviews r LEFT JOIN changesets c ON c.review_id = r.id
             GROUP BY r.id
             ORDER BY r.created_at, r.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, title, version, created_at, changesets)| {
                Ok(ReviewSummary {
                    id,
                    title,
                    version: u64::try_from(version).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at)?,
                    changesets: usize::try_from(changesets).unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn insert_changesets(
    conn: &Connection,
    review_id: &str,
    first_seq: usize,
    changesets: &[Changeset],
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "INSERT INTO changesets (review_id, seq, repo_id, checkpoint, document) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (offset, changeset) in changesets.iter().enumerate() {
        let seq = i64::try_from(first_seq + offset).unwrap_or(i64::MAX);
        let document = serde_json::to_string(changeset)?;
        stmt.execute(params![
            review_id,
            seq,
            changeset.repo_id,
            changeset.checkpoint,
            document
        ])?;
    }
    Ok(())
}

fn to_sql_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

// ============================================================================
// Store
// ============================================================================

/// [`ReviewStore`] backed by SQLite
#[derive(Debug)]
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Wrap an initialized database
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (creating and migrating if needed) a database file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path)?;
        db.initialize()?;
        Ok(Self::new(db))
    }

    /// A migrated in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::in_memory()?;
        db.initialize()?;
        Ok(Self::new(db))
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn get(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        self.db.lock().await.load_review(review_id)
    }

    async fn create(&self, title: &str, changesets: Vec<Changeset>) -> Result<Review, StoreError> {
        validate_append(&[], &changesets)?;
        let review = Review {
            id: new_review_id(),
            title: title.to_string(),
            version: 1,
            created_at: Utc::now(),
            changesets,
        };
        self.db.lock().await.insert_review(&review)?;
        info!(review_id = %review.id, "created review");
        Ok(review)
    }

    async fn append_changesets(
        &self,
        review_id: &str,
        changesets: Vec<Changeset>,
    ) -> Result<Review, StoreError> {
        let review = self
            .db
            .lock()
            .await
            .append_changesets(review_id, &changesets)?;
        info!(review_id, version = review.version, "amended review");
        Ok(review)
    }

    async fn list(&self) -> Result<Vec<ReviewSummary>, StoreError> {
        self.db.lock().await.list_reviews()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{changeset, file};
    use revcap_git::FileStatus;
    use similar_asserts::assert_eq;

    fn migrated() -> Database {
        let db = Database::in_memory().expect("open");
        db.initialize().expect("migrate");
        db
    }

    #[test]
    fn test_initialize_twice() {
        let db = Database::in_memory().expect("open");
        assert!(!db.is_initialized());
        db.initialize().expect("first");
        db.initialize().expect("second");
        assert!(db.is_initialized());
        assert_eq!(db.schema_version().expect("version"), 1);
        assert_eq!(db.count("reviews").expect("count"), 0);
    }

    #[test]
    fn test_changesets_cascade_with_review() {
        let db = migrated();
        let review = Review {
            id: "r".to_string(),
            title: "t".to_string(),
            version: 1,
            created_at: Utc::now(),
            changesets: vec![changeset("repo", 0, Vec::new())],
        };
        db.insert_review(&review).expect("insert");
        assert_eq!(db.count("changesets").expect("count"), 1);
        db.connection()
            .execute("DELETE FROM reviews WHERE id = 'r'", [])
            .expect("delete");
        assert_eq!(db.count("changesets").expect("count"), 0);
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = SqliteStore::in_memory().expect("store");
        let first = changeset("repo", 0, vec![file("a.txt", FileStatus::Modified)]);
        let review = store.create("Title", vec![first]).await.expect("create");
        assert_eq!(review.version, 1);

        let loaded = store.get(&review.id).await.expect("get").expect("exists");
        assert_eq!(loaded.id, review.id);
        assert_eq!(loaded.changesets, review.changesets);
        assert_eq!(
            loaded.created_at.timestamp(),
            review.created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_store_append_and_list() {
        let store = SqliteStore::in_memory().expect("store");
        let review = store
            .create("Title", vec![changeset("repo", 0, Vec::new())])
            .await
            .expect("create");
        let amended = store
            .append_changesets(&review.id, vec![changeset("repo", 1, Vec::new())])
            .await
            .expect("append");
        assert_eq!(amended.version, 2);

        let loaded = store.get(&review.id).await.expect("get").expect("exists");
        assert_eq!(loaded.version, 2);
        let checkpoints: Vec<u32> = loaded.changesets.iter().map(|c| c.checkpoint).collect();
        assert_eq!(checkpoints, vec![0, 1]);

        let list = store.list().await.expect("list");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].changesets, 2);
        assert_eq!(list[0].version, 2);
    }

    #[tokio::test]
    async fn test_store_rejects_out_of_order_checkpoint() {
        let store = SqliteStore::in_memory().expect("store");
        let review = store
            .create("Title", vec![changeset("repo", 0, Vec::new())])
            .await
            .expect("create");
        let err = store
            .append_changesets(&review.id, vec![changeset("repo", 0, Vec::new())])
            .await
            .expect_err("rejected");
        assert!(matches!(err, StoreError::CheckpointOrder { .. }));
        let loaded = store.get(&review.id).await.expect("get").expect("exists");
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_store_missing_review() {
        let store = SqliteStore::in_memory().expect("store");
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[test]
    fn test_legacy_document_is_polyfilled() {
        let db = Database::in_memory().expect("db");
        db.initialize().expect("init");
        let mut doc = serde_json::to_value(changeset(
            "repo",
            0,
            vec![file("a.txt", FileStatus::Modified)],
        ))
        .expect("json");
        let object = doc.as_object_mut().expect("object");
        object.remove("checkpoint");
        object.remove("modified_files_in_checkpoint");
        let now = Utc::now().to_rfc3339();
        db.connection()
            .execute(
                "INSERT INTO reviews (id, title, version, created_at, updated_at) VALUES ('old', 'Old', 3, ?1, ?1)",
                [&now],
            )
            .expect("insert review");
        db.connection()
            .execute(
                "INSERT INTO changesets (review_id, seq, repo_id, checkpoint, document) VALUES ('old', 0, 'repo', 0, ?1)",
                [doc.to_string()],
            )
            .expect("insert changeset");

        let review = db.load_review("old").expect("load").expect("exists");
        assert_eq!(review.version, 3);
        assert_eq!(review.changesets[0].checkpoint, 0);
        assert_eq!(
            review.changesets[0].modified_files_in_checkpoint,
            review.changesets[0].modified_files
        );
    }
}
