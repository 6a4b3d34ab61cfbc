use super::{IdentityRecord, IdentityStore, NearestIdentity, StoreError};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::OnceCell;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL + pgvector backed identity store.
///
/// Connections are opened on demand, so a database that is down at startup
/// or goes away later only fails the requests made while it is unreachable.
pub struct PgIdentityStore {
    pool: PgPool,
    schema: OnceCell<()>,
}

/// Connectivity problems degrade the service; everything else is a real failure.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

fn classify_migration(err: MigrateError) -> StoreError {
    match err {
        MigrateError::Execute(e) => classify(e),
        other => StoreError::Query(format!("migration failed: {other}")),
    }
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    /// Build a pool without touching the database. Fails only on a malformed URL.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        Self::connect_lazy_with_timeout(database_url, ACQUIRE_TIMEOUT)
    }

    pub fn connect_lazy_with_timeout(
        database_url: &str,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)
            .map_err(|e| StoreError::Query(format!("invalid database url: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Connect eagerly and create the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let store = Self::connect_lazy(database_url)?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Run migrations once. A failed attempt is retried on the next call.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.schema
            .get_or_try_init(|| async {
                MIGRATOR.run(&self.pool).await.map_err(classify_migration)?;
                tracing::info!("identity store schema ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn enroll(&self, record: IdentityRecord) -> Result<(), StoreError> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Single-user session: the new document replaces whatever was there.
        sqlx::query("DELETE FROM pictures")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        sqlx::query("INSERT INTO pictures (picture, embedding) VALUES ($1, $2)")
            .bind(&record.photo_reference)
            .bind(Vector::from(record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn find_nearest(&self, query: &[f32]) -> Result<Option<NearestIdentity>, StoreError> {
        self.ensure_schema().await?;
        let row: Option<(String, f64)> = sqlx::query_as(
            r#"
            SELECT picture, (embedding <-> $1)::float8 AS distance
            FROM pictures
            ORDER BY embedding <-> $1 ASC
            LIMIT 1
            "#,
        )
        .bind(Vector::from(query.to_vec()))
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.map(|(photo_reference, distance)| NearestIdentity {
            photo_reference,
            distance,
        }))
    }
}
