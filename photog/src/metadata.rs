//! This module provides the [MetadataStore] trait, through which image records are found, created, patched, and
//! deleted, along with [SqliteStore], its SQLite-backed implementation.

use {
    anyhow::Result,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::FutureExt,
    photog_shared::{Action, Error, ImageRecord, NewImageRecord, RecordId, Thumbnail},
    sqlx::{
        sqlite::{SqliteConnectOptions, SqliteRow},
        ConnectOptions, Connection, Row, SqliteConnection,
    },
    std::ops::DerefMut,
    tokio::sync::Mutex as AsyncMutex,
};

/// Result of attempting to persist a new record
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CreateOutcome {
    Created(RecordId),

    /// A record with the same digest already exists, so nothing was written
    AlreadyExists,
}

/// Record store holding one `ImageRecord` per unique digest
///
/// Implementations must enforce digest uniqueness themselves: `create` reports `CreateOutcome::AlreadyExists`
/// rather than failing when it loses a race with a concurrent `create` of the same digest.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn find_by_digest(&self, digest: &str) -> Result<Option<ImageRecord>>;

    /// Whether a record with the specified digest exists, without loading it
    async fn contains_digest(&self, digest: &str) -> Result<bool>;

    async fn create(&self, record: &NewImageRecord) -> Result<CreateOutcome>;

    async fn delete_by_digest(&self, digest: &str) -> Result<()>;

    async fn find_by_id(&self, id: RecordId) -> Result<Option<ImageRecord>>;

    /// Apply `actions` in order to the record identified by `id`, failing with `Error::NotFound` if there is no
    /// such record.
    async fn update_by_id(&self, id: RecordId, actions: &[Action]) -> Result<()>;
}

/// `MetadataStore` backed by a single SQLite connection
pub struct SqliteStore {
    conn: AsyncMutex<SqliteConnection>,
}

async fn init(mut conn: SqliteConnection) -> Result<SqliteStore> {
    for statement in schema::DDL_STATEMENTS {
        sqlx::query(statement).execute(&mut conn).await?;
    }

    Ok(SqliteStore {
        conn: AsyncMutex::new(conn),
    })
}

impl SqliteStore {
    /// Open (creating if necessary) the database in `state_file`.
    pub async fn open(state_file: &str) -> Result<Self> {
        init(
            format!("sqlite://{}", state_file)
                .parse::<SqliteConnectOptions>()?
                .create_if_missing(true)
                .connect()
                .await?,
        )
        .await
    }

    /// Open a fresh, private in-memory database.
    pub async fn memory() -> Result<Self> {
        init(
            "sqlite::memory:"
                .parse::<SqliteConnectOptions>()?
                .connect()
                .await?,
        )
        .await
    }

    /// Convert a row of the `images` table to an `ImageRecord`, fetching its tags along the way.
    async fn find(
        conn: &mut SqliteConnection,
        row: Option<SqliteRow>,
    ) -> Result<Option<ImageRecord>> {
        Ok(if let Some(row) = row {
            let id = row.get::<i64, _>("id");

            let tags = sqlx::query("SELECT tag FROM tags WHERE image = ?1")
                .bind(id)
                .fetch_all(&mut *conn)
                .await?
                .iter()
                .map(|row| row.get::<String, _>("tag"))
                .collect();

            Some(ImageRecord {
                id: RecordId(id),
                digest: row.get("hash"),
                name: row.get("name"),
                title: row.get("title"),
                tags,
                uploaded: DateTime::parse_from_rfc3339(row.get::<&str, _>("uploaded"))?
                    .with_timezone(&Utc),
                thumbnail: Thumbnail {
                    data: row.get("thumbnail"),
                    content_type: row.get("thumbnail_type"),
                },
            })
        } else {
            None
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn find_by_digest(&self, digest: &str) -> Result<Option<ImageRecord>> {
        let mut conn = self.conn.lock().await;

        let row = sqlx::query(
            "SELECT id, hash, name, title, uploaded, thumbnail, thumbnail_type \
             FROM images \
             WHERE hash = ?1",
        )
        .bind(digest)
        .fetch_optional(conn.deref_mut())
        .await?;

        Self::find(conn.deref_mut(), row).await
    }

    async fn contains_digest(&self, digest: &str) -> Result<bool> {
        let mut conn = self.conn.lock().await;

        Ok(sqlx::query("SELECT 1 FROM images WHERE hash = ?1")
            .bind(digest)
            .fetch_optional(conn.deref_mut())
            .await?
            .is_some())
    }

    async fn create(&self, record: &NewImageRecord) -> Result<CreateOutcome> {
        let NewImageRecord {
            digest,
            name,
            title,
            uploaded,
            thumbnail,
        } = record.clone();

        self.conn
            .lock()
            .await
            .transaction(|conn| {
                async move {
                    let result = sqlx::query(
                        "INSERT OR IGNORE INTO images \
                         (hash, name, title, uploaded, thumbnail, thumbnail_type) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .bind(digest)
                    .bind(name)
                    .bind(title)
                    .bind(uploaded.to_rfc3339())
                    .bind(thumbnail.data)
                    .bind(thumbnail.content_type)
                    .execute(&mut *conn)
                    .await?;

                    Ok::<_, anyhow::Error>(if result.rows_affected() == 0 {
                        CreateOutcome::AlreadyExists
                    } else {
                        CreateOutcome::Created(RecordId(result.last_insert_rowid()))
                    })
                }
                .boxed()
            })
            .await
    }

    async fn delete_by_digest(&self, digest: &str) -> Result<()> {
        let digest = digest.to_owned();

        self.conn
            .lock()
            .await
            .transaction(|conn| {
                async move {
                    sqlx::query(
                        "DELETE FROM tags WHERE image IN (SELECT id FROM images WHERE hash = ?1)",
                    )
                    .bind(digest.clone())
                    .execute(&mut *conn)
                    .await?;

                    sqlx::query("DELETE FROM images WHERE hash = ?1")
                        .bind(digest)
                        .execute(&mut *conn)
                        .await?;

                    Ok::<_, anyhow::Error>(())
                }
                .boxed()
            })
            .await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<ImageRecord>> {
        let mut conn = self.conn.lock().await;

        let row = sqlx::query(
            "SELECT id, hash, name, title, uploaded, thumbnail, thumbnail_type \
             FROM images \
             WHERE id = ?1",
        )
        .bind(id.0)
        .fetch_optional(conn.deref_mut())
        .await?;

        Self::find(conn.deref_mut(), row).await
    }

    async fn update_by_id(&self, id: RecordId, actions: &[Action]) -> Result<()> {
        let actions = actions.to_vec();

        self.conn
            .lock()
            .await
            .transaction(|conn| {
                async move {
                    if sqlx::query("SELECT 1 FROM images WHERE id = ?1")
                        .bind(id.0)
                        .fetch_optional(&mut *conn)
                        .await?
                        .is_none()
                    {
                        return Err(anyhow::Error::from(Error::NotFound(id)));
                    }

                    for action in actions {
                        let tags = match action {
                            Action::SetTitle(title) => {
                                sqlx::query("UPDATE images SET title = ?2 WHERE id = ?1")
                                    .bind(id.0)
                                    .bind(title)
                                    .execute(&mut *conn)
                                    .await?;

                                continue;
                            }

                            Action::AddTags(tags) => tags,

                            Action::ReplaceTags(tags) => {
                                sqlx::query("DELETE FROM tags WHERE image = ?1")
                                    .bind(id.0)
                                    .execute(&mut *conn)
                                    .await?;

                                tags
                            }
                        };

                        for tag in tags {
                            sqlx::query("INSERT OR IGNORE INTO tags (image, tag) VALUES (?1, ?2)")
                                .bind(id.0)
                                .bind(tag)
                                .execute(&mut *conn)
                                .await?;
                        }
                    }

                    Ok::<_, anyhow::Error>(())
                }
                .boxed()
            })
            .await
    }
}
