use crate::{
    context::OperationContext,
    dsl::DefinitionParser,
    error::{Result, SchemaError},
    models::*,
    reconstruct::{build_entity, reconstruct},
    repository::SchemaRepository,
    schema::Schema,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Loads schema snapshots and rebuilds their typed graph
#[derive(Clone)]
pub struct SchemaReader {
    repository: Arc<dyn SchemaRepository>,
    parser: Arc<dyn DefinitionParser>,
}

impl SchemaReader {
    pub fn new(repository: Arc<dyn SchemaRepository>, parser: Arc<dyn DefinitionParser>) -> Self {
        Self { repository, parser }
    }

    /// Reconstruct the schema committed under `(tenant_id, version)`.
    ///
    /// An unknown tenant or version is `NotFound`, never an empty schema.
    #[instrument(skip(self, ctx), fields(tenant_id = %tenant_id, version = %version))]
    pub async fn read_schema(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Schema> {
        let records = self.fetch_snapshot(ctx, tenant_id, version).await?;
        debug!(records = records.len(), "Reconstructing schema");
        reconstruct(&records, self.parser.as_ref())
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %tenant_id, version = %version))]
    pub async fn read_entity_definition(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<EntityDefinition> {
        match self.fetch_definition(ctx, tenant_id, name, version).await? {
            ParsedDefinition::Entity(declaration) => build_entity(declaration),
            ParsedDefinition::Rule(_) => Err(definition_not_found(tenant_id, name, version)),
        }
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %tenant_id, version = %version))]
    pub async fn read_rule_definition(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<RuleDefinition> {
        match self.fetch_definition(ctx, tenant_id, name, version).await? {
            ParsedDefinition::Rule(rule) => Ok(rule),
            ParsedDefinition::Entity(_) => Err(definition_not_found(tenant_id, name, version)),
        }
    }

    /// The stored definitions of a snapshot as schema-language text, ordered
    /// by name
    #[instrument(skip(self, ctx), fields(tenant_id = %tenant_id, version = %version))]
    pub async fn read_schema_source(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<String>> {
        let mut records = self.fetch_snapshot(ctx, tenant_id, version).await?;
        records.sort_by(|a, b| a.name.cmp(&b.name));

        records
            .into_iter()
            .map(|record| {
                String::from_utf8(record.serialized_definition).map_err(|e| {
                    SchemaError::malformed(&record.name, format!("not valid UTF-8: {}", e))
                })
            })
            .collect()
    }

    async fn fetch_snapshot(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<SchemaRecord>> {
        let records = ctx
            .run(
                "read_schema",
                self.repository.fetch_schema(tenant_id, version),
            )
            .await?;

        if records.is_empty() {
            return Err(SchemaError::NotFound {
                tenant_id: tenant_id.to_string(),
                version: version.to_string(),
            });
        }
        Ok(records)
    }

    async fn fetch_definition(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<ParsedDefinition> {
        let record = ctx
            .run(
                "read_definition",
                self.repository.fetch_definition(tenant_id, name, version),
            )
            .await?
            .ok_or_else(|| definition_not_found(tenant_id, name, version))?;

        let definition = self
            .parser
            .parse(&record.serialized_definition)
            .map_err(|e| SchemaError::malformed(name, e.to_string()))?;

        if definition.name() != name {
            return Err(SchemaError::malformed(
                name,
                format!("record holds a definition named '{}'", definition.name()),
            ));
        }
        Ok(definition)
    }
}

fn definition_not_found(tenant_id: &TenantId, name: &str, version: &SchemaVersion) -> SchemaError {
    SchemaError::DefinitionNotFound {
        tenant_id: tenant_id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
    }
}
