use crate::models::SchemaVersion;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of version tokens for schema writes.
///
/// Tokens must be unique per call; nothing relies on their ordering.
pub trait VersionAllocator: Send + Sync {
    fn new_version(&self) -> SchemaVersion;
}

/// Random UUID tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidVersionAllocator;

impl VersionAllocator for UuidVersionAllocator {
    fn new_version(&self) -> SchemaVersion {
        SchemaVersion::from_token(Uuid::new_v4().simple().to_string())
    }
}

/// Deterministic `{prefix}{n}` tokens, for tests and fixtures
#[derive(Debug)]
pub struct SequentialVersionAllocator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialVersionAllocator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialVersionAllocator {
    fn default() -> Self {
        Self::new("v")
    }
}

impl VersionAllocator for SequentialVersionAllocator {
    fn new_version(&self) -> SchemaVersion {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        SchemaVersion::from_token(format!("{}{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uuid_versions_are_unique() {
        let allocator = UuidVersionAllocator;
        let versions: HashSet<_> = (0..1000).map(|_| allocator.new_version()).collect();
        assert_eq!(versions.len(), 1000);
    }

    #[test]
    fn test_sequential_versions() {
        let allocator = SequentialVersionAllocator::new("schema-");
        assert_eq!(allocator.new_version().as_str(), "schema-1");
        assert_eq!(allocator.new_version().as_str(), "schema-2");
    }

    #[test]
    fn test_empty_prefix_still_yields_tokens() {
        let allocator = SequentialVersionAllocator::new("");
        assert_eq!(allocator.new_version().as_str(), "1");
    }
}
