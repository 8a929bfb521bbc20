//! PostgreSQL-backed schema repository
//!
//! Schema records live in `schema_definitions`, keyed by
//! `(tenant_id, version, name)`:
//! - Tenant isolation through the leading primary key column
//! - One transaction per batch write, serialized per (tenant, version)
//! - Snapshot reads in a `REPEATABLE READ, READ ONLY` transaction

use crate::{
    config::SchemaStoreConfig,
    error::{Result, SchemaError},
    models::*,
    repository::{duplicate_name, SchemaRepository},
};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};

/// PostgreSQL-backed schema repository
#[derive(Clone)]
pub struct PostgresSchemaRepository {
    pool: PgPool,
}

impl PostgresSchemaRepository {
    /// Create a new PostgreSQL repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pooled repository from configuration, applying migrations
    /// when enabled
    pub async fn connect(config: &SchemaStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| SchemaError::BackendUnavailable(format!("Failed to connect: {}", e)))?;

        info!(
            max_connections = config.max_connections,
            "Schema store connection pool created"
        );

        let repository = Self::new(pool);
        if config.run_migrations {
            repository.migrate().await?;
        }
        Ok(repository)
    }

    /// Create with connection string
    pub async fn from_connection_string(connection_string: &str) -> Result<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| SchemaError::BackendUnavailable(format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Create the `schema_definitions` table if it doesn't exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SchemaError::StorageError(format!("Failed to run migrations: {}", e)))?;

        info!("Schema store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the pool can reach the database
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Schema store health check failed: {}", e);
                false
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Schema store connection pool closed");
    }
}

/// Map a driver error onto the store's error kinds
fn classify(
    error: sqlx::Error,
    tenant_id: &TenantId,
    version: &SchemaVersion,
    action: &str,
) -> SchemaError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => SchemaError::WriteConflict {
            tenant_id: tenant_id.to_string(),
            version: version.to_string(),
            reason: format!("{}: {}", action, db.message()),
        },
        // serialization_failure, deadlock_detected
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
        {
            SchemaError::BackendUnavailable(format!("{}: {}", action, error))
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            SchemaError::BackendUnavailable(format!("{}: {}", action, error))
        }
        _ => SchemaError::StorageError(format!("{}: {}", action, error)),
    }
}

fn record_from_row(row: &PgRow, tenant_id: &TenantId, version: &SchemaVersion) -> Result<SchemaRecord> {
    let name: String = row
        .try_get("name")
        .map_err(|e| SchemaError::StorageError(format!("Failed to decode name: {}", e)))?;
    let serialized_definition: Vec<u8> = row.try_get("serialized_definition").map_err(|e| {
        SchemaError::StorageError(format!("Failed to decode definition '{}': {}", name, e))
    })?;

    Ok(SchemaRecord {
        tenant_id: tenant_id.clone(),
        name,
        serialized_definition,
        version: version.clone(),
    })
}

#[async_trait]
impl SchemaRepository for PostgresSchemaRepository {
    async fn insert_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
        records: &[SchemaRecord],
    ) -> Result<()> {
        debug!(%tenant_id, %version, records = records.len(), "Writing schema to PostgreSQL");

        if let Some(name) = duplicate_name(records) {
            return Err(SchemaError::WriteConflict {
                tenant_id: tenant_id.to_string(),
                version: version.to_string(),
                reason: format!("duplicate definition '{}' in batch", name),
            });
        }

        // Start transaction for atomicity. Dropping it on any early return
        // rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to start transaction"))?;

        // Serialize writers of the same snapshot so the emptiness check below
        // cannot race with a concurrent first write
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(tenant_id.as_str())
            .bind(version.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to lock snapshot"))?;

        let committed = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM schema_definitions
                WHERE tenant_id = $1 AND version = $2
            )
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(version.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(e, tenant_id, version, "Failed to check snapshot"))?;

        if committed {
            return Err(SchemaError::WriteConflict {
                tenant_id: tenant_id.to_string(),
                version: version.to_string(),
                reason: "version already committed".to_string(),
            });
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO schema_definitions (
                    tenant_id, version, name, serialized_definition
                ) VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(version.as_str())
            .bind(&record.name)
            .bind(&record.serialized_definition)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                classify(
                    e,
                    tenant_id,
                    version,
                    &format!("Failed to write definition '{}'", record.name),
                )
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to commit transaction"))?;

        info!(%tenant_id, %version, "Schema written successfully");
        Ok(())
    }

    async fn fetch_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<SchemaRecord>> {
        debug!(%tenant_id, %version, "Reading schema from PostgreSQL");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to start transaction"))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to set isolation level"))?;

        let rows = sqlx::query(
            r#"
            SELECT name, serialized_definition
            FROM schema_definitions
            WHERE tenant_id = $1 AND version = $2
            ORDER BY name
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(version.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| classify(e, tenant_id, version, "Failed to read schema"))?;

        tx.commit()
            .await
            .map_err(|e| classify(e, tenant_id, version, "Failed to end transaction"))?;

        let records = rows
            .iter()
            .map(|row| record_from_row(row, tenant_id, version))
            .collect::<Result<Vec<_>>>()?;

        debug!("Found {} schema records", records.len());
        Ok(records)
    }

    async fn fetch_definition(
        &self,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<Option<SchemaRecord>> {
        debug!(%tenant_id, %version, name, "Reading definition from PostgreSQL");

        let row = sqlx::query(
            r#"
            SELECT name, serialized_definition
            FROM schema_definitions
            WHERE tenant_id = $1 AND version = $2 AND name = $3
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(version.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, tenant_id, version, "Failed to read definition"))?;

        row.map(|row| record_from_row(&row, tenant_id, version))
            .transpose()
    }
}
