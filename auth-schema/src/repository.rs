use crate::{
    error::{Result, SchemaError},
    models::*,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub mod postgres;

pub use postgres::PostgresSchemaRepository;

/// Storage backend for schema records, keyed by (tenant, version, name).
///
/// Implementations must make `insert_schema` all-or-nothing and must never
/// let two batches share a (tenant, version).
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Atomically persist a batch for a (tenant, version) that has no
    /// committed records yet
    async fn insert_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
        records: &[SchemaRecord],
    ) -> Result<()>;

    /// All records of one snapshot, ordered by name. Empty if absent.
    async fn fetch_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<SchemaRecord>>;

    /// A single record of one snapshot
    async fn fetch_definition(
        &self,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<Option<SchemaRecord>>;
}

pub(crate) fn duplicate_name(records: &[SchemaRecord]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(|record| record.name.as_str())
        .find(|name| !seen.insert(*name))
}

type SnapshotKey = (TenantId, SchemaVersion);

/// In-memory schema repository for testing and development.
///
/// Each snapshot is stored as one immutable value under its composite key,
/// so a reader sees either nothing or the whole batch.
#[derive(Clone, Default)]
pub struct InMemorySchemaRepository {
    snapshots: Arc<DashMap<SnapshotKey, Arc<Vec<SchemaRecord>>>>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed snapshots across all tenants
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

#[async_trait]
impl SchemaRepository for InMemorySchemaRepository {
    async fn insert_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
        records: &[SchemaRecord],
    ) -> Result<()> {
        if let Some(name) = duplicate_name(records) {
            return Err(SchemaError::WriteConflict {
                tenant_id: tenant_id.to_string(),
                version: version.to_string(),
                reason: format!("duplicate definition '{}' in batch", name),
            });
        }

        let mut snapshot = records.to_vec();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));

        match self.snapshots.entry((tenant_id.clone(), version.clone())) {
            Entry::Occupied(_) => Err(SchemaError::WriteConflict {
                tenant_id: tenant_id.to_string(),
                version: version.to_string(),
                reason: "version already committed".to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(snapshot));
                debug!(%tenant_id, %version, records = records.len(), "Snapshot committed");
                Ok(())
            }
        }
    }

    async fn fetch_schema(
        &self,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<SchemaRecord>> {
        let snapshot = self
            .snapshots
            .get(&(tenant_id.clone(), version.clone()))
            .map(|entry| Arc::clone(entry.value()));

        Ok(snapshot
            .map(|records| records.as_ref().clone())
            .unwrap_or_default())
    }

    async fn fetch_definition(
        &self,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<Option<SchemaRecord>> {
        let snapshot = self
            .snapshots
            .get(&(tenant_id.clone(), version.clone()))
            .map(|entry| Arc::clone(entry.value()));

        Ok(snapshot.and_then(|records| records.iter().find(|r| r.name == name).cloned()))
    }
}
