use crate::{
    config::SchemaStoreConfig,
    context::OperationContext,
    dsl::{DefinitionParser, DslParser},
    error::{Result, SchemaError},
    models::*,
    reader::SchemaReader,
    reconstruct::{build_schema, flatten},
    repository::{InMemorySchemaRepository, PostgresSchemaRepository, SchemaRepository},
    schema::Schema,
    version::{UuidVersionAllocator, VersionAllocator},
    writer::SchemaWriter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Schema storage entry point: writer, reader, compiler and version
/// allocator over one backend.
///
/// Holds no mutable state of its own; clones share the backend.
#[derive(Clone)]
pub struct SchemaStore {
    repository: Arc<dyn SchemaRepository>,
    writer: SchemaWriter,
    reader: SchemaReader,
    parser: Arc<dyn DefinitionParser>,
    allocator: Arc<dyn VersionAllocator>,
    operation_timeout: Option<Duration>,
}

impl SchemaStore {
    /// Create a store over the given backend with the default parser and
    /// UUID version tokens
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        let parser: Arc<dyn DefinitionParser> = Arc::new(DslParser::new());
        Self {
            writer: SchemaWriter::new(repository.clone()),
            reader: SchemaReader::new(repository.clone(), parser.clone()),
            repository,
            parser,
            allocator: Arc::new(UuidVersionAllocator),
            operation_timeout: None,
        }
    }

    /// Store backed by process memory, for tests and development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySchemaRepository::new()))
    }

    /// Store backed by PostgreSQL
    pub async fn connect(config: &SchemaStoreConfig) -> Result<Self> {
        let repository = PostgresSchemaRepository::connect(config).await?;
        info!("Schema store connected to PostgreSQL");
        Ok(Self::new(Arc::new(repository)).with_operation_timeout(config.operation_timeout))
    }

    /// Use a custom definition parser
    pub fn with_parser(mut self, parser: Arc<dyn DefinitionParser>) -> Self {
        self.reader = SchemaReader::new(self.repository.clone(), parser.clone());
        self.parser = parser;
        self
    }

    /// Use a custom version allocator
    pub fn with_version_allocator(mut self, allocator: Arc<dyn VersionAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Deadline for operations whose context carries none
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    fn context(&self, ctx: &OperationContext) -> OperationContext {
        ctx.clone().or_timeout(self.operation_timeout)
    }

    // =============================================================================
    // Schema Operations
    // =============================================================================

    pub fn new_version(&self) -> SchemaVersion {
        self.allocator.new_version()
    }

    pub async fn write_schema(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
        records: &[SchemaRecord],
    ) -> Result<()> {
        self.writer
            .write_schema(&self.context(ctx), tenant_id, version, records)
            .await
    }

    pub async fn read_schema(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Schema> {
        self.reader
            .read_schema(&self.context(ctx), tenant_id, version)
            .await
    }

    pub async fn read_entity_definition(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<EntityDefinition> {
        self.reader
            .read_entity_definition(&self.context(ctx), tenant_id, name, version)
            .await
    }

    pub async fn read_rule_definition(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        name: &str,
        version: &SchemaVersion,
    ) -> Result<RuleDefinition> {
        self.reader
            .read_rule_definition(&self.context(ctx), tenant_id, name, version)
            .await
    }

    pub async fn read_schema_source(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        version: &SchemaVersion,
    ) -> Result<Vec<String>> {
        self.reader
            .read_schema_source(&self.context(ctx), tenant_id, version)
            .await
    }

    /// Compile a schema document and commit it as a new version.
    ///
    /// Structural conflicts are rejected before anything is written.
    pub async fn write_source(
        &self,
        ctx: &OperationContext,
        tenant_id: &TenantId,
        source: &str,
    ) -> Result<SchemaVersion> {
        let definitions = self
            .parser
            .parse_source(source)
            .map_err(|e| SchemaError::malformed("schema source", e.to_string()))?;
        let schema = build_schema(definitions)?;
        if schema.references.is_empty() {
            return Err(SchemaError::InvalidArgument(
                "schema source declares no entities or rules".to_string(),
            ));
        }

        let version = self.allocator.new_version();
        let records = flatten(tenant_id, &version, &schema, self.parser.as_ref())?;
        self.write_schema(ctx, tenant_id, &version, &records).await?;

        info!(%tenant_id, %version, definitions = records.len(), "Schema source committed");
        Ok(version)
    }
}
