use crate::{
    context::OperationContext,
    error::{Result, SchemaError},
    models::*,
    repository::SchemaRepository,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Persists schema batches. Definition bytes are stored as given; their
/// structure is the compiler's responsibility.
#[derive(Clone)]
pub struct SchemaWriter {
    repository: Arc<dyn SchemaRepository>,
}

impl SchemaWriter {
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        Self { repository }
    }

    /// Atomically persist `records` as the complete snapshot of
    /// `(tenant_id, version)`.
    ///
    /// Fails with `WriteConflict` if any row cannot be stored or if the
    /// version already holds records; nothing from the batch is visible
    /// afterwards in either case.
    #[instrument(
        skip(self, ctx, records),
        fields(tenant_id = %tenant_id, version = %version, records = records.len())
    )]
    pub async fn write_schema(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
        records: &[SchemaRecord],
    ) -> Result<()> {
        validate_batch(tenant_id, version, records)?;

        ctx.run(
            "write_schema",
            self.repository.insert_schema(tenant_id, version, records),
        )
        .await?;

        info!("Schema version committed");
        Ok(())
    }
}

fn validate_batch(
    tenant_id: &TenantId,
    version: &SchemaVersion,
    records: &[SchemaRecord],
) -> Result<()> {
    if records.is_empty() {
        return Err(SchemaError::InvalidArgument(
            "schema batch must contain at least one record".to_string(),
        ));
    }

    for record in records {
        if record.name.trim().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "schema record name must not be empty".to_string(),
            ));
        }
        if &record.tenant_id != tenant_id {
            return Err(SchemaError::InvalidArgument(format!(
                "record '{}' belongs to tenant '{}', batch is for '{}'",
                record.name, record.tenant_id, tenant_id
            )));
        }
        if &record.version != version {
            return Err(SchemaError::InvalidArgument(format!(
                "record '{}' has version '{}', batch is for '{}'",
                record.name, record.version, version
            )));
        }
    }

    Ok(())
}
