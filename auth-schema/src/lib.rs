//! Versioned authorization schema storage for RustCare Engine
//!
//! This module persists each tenant's relationship-based access control
//! schema as immutable, versioned snapshots and rebuilds the typed schema
//! graph from a stored snapshot on demand:
//! - Flat records, one per entity or rule, per tenant and version
//! - Atomic, write-once batch writes
//! - Deterministic reconstruction with relation/permission/attribute
//!   reference indexes
//! - Strict tenant partitioning on every operation
//! - Caller-controlled cancellation and deadlines
//!
//! # Core Concepts
//!
//! - **Tenant**: isolation boundary; nothing is resolved without one
//! - **Schema Version**: opaque token naming one immutable snapshot
//! - **Entity**: a resource type with relations, permissions and attributes
//! - **Rule**: a reusable named condition over attribute values
//!
//! # Example
//!
//! ```rust
//! use auth_schema::{OperationContext, SchemaRecord, SchemaStore, SchemaVersion, TenantId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SchemaStore::in_memory();
//!     let ctx = OperationContext::background();
//!     let tenant = TenantId::new("t1")?;
//!     let version = store.new_version();
//!
//!     store.write_schema(&ctx, &tenant, &version, &[
//!         SchemaRecord::new(tenant.clone(), "user", "entity user {}", version.clone()),
//!         SchemaRecord::new(
//!             tenant.clone(),
//!             "organization",
//!             "entity organization { relation admin @user }",
//!             version.clone(),
//!         ),
//!     ]).await?;
//!
//!     let schema = store.read_schema(&ctx, &tenant, &version).await?;
//!     assert!(schema.relation("organization", "admin").is_some());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dsl;
pub mod error;
pub mod models;
pub mod reader;
pub mod reconstruct;
pub mod repository;
pub mod schema;
pub mod store;
pub mod version;
pub mod writer;

pub use config::SchemaStoreConfig;
pub use context::{CancelHandle, OperationContext};
pub use dsl::{DefinitionParser, DslParser, ParseError};
pub use error::*;
pub use models::*;
pub use reader::SchemaReader;
pub use reconstruct::{build_schema, flatten, reconstruct};
pub use repository::{InMemorySchemaRepository, PostgresSchemaRepository, SchemaRepository};
pub use schema::*;
pub use store::SchemaStore;
pub use version::{SequentialVersionAllocator, UuidVersionAllocator, VersionAllocator};
pub use writer::SchemaWriter;
