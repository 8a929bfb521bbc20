use thiserror::Error;

/// Coarse classification of a [`SchemaError`], for callers that branch on
/// the failure category rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MalformedDefinition,
    WriteConflict,
    Canceled,
    BackendUnavailable,
    Storage,
    InvalidArgument,
    Configuration,
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found for tenant '{tenant_id}' at version '{version}'")]
    NotFound { tenant_id: String, version: String },

    #[error("Definition '{name}' not found for tenant '{tenant_id}' at version '{version}'")]
    DefinitionNotFound {
        tenant_id: String,
        name: String,
        version: String,
    },

    #[error("Malformed definition '{name}': {reason}")]
    MalformedDefinition { name: String, reason: String },

    #[error("Write conflict for tenant '{tenant_id}' at version '{version}': {reason}")]
    WriteConflict {
        tenant_id: String,
        version: String,
        reason: String,
    },

    #[error("Operation canceled: {0}")]
    Canceled(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SchemaError {
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::DefinitionNotFound { .. } => ErrorKind::NotFound,
            Self::MalformedDefinition { .. } => ErrorKind::MalformedDefinition,
            Self::WriteConflict { .. } => ErrorKind::WriteConflict,
            Self::Canceled(_) => ErrorKind::Canceled,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::StorageError(_) => ErrorKind::Storage,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_share_kind() {
        let schema = SchemaError::NotFound {
            tenant_id: "t1".to_string(),
            version: "v1".to_string(),
        };
        let definition = SchemaError::DefinitionNotFound {
            tenant_id: "t1".to_string(),
            name: "user".to_string(),
            version: "v1".to_string(),
        };

        assert!(schema.is_not_found());
        assert!(definition.is_not_found());
        assert_ne!(
            SchemaError::malformed("user", "bad").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = SchemaError::WriteConflict {
            tenant_id: "t1".to_string(),
            version: "v1".to_string(),
            reason: "version already committed".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("t1"));
        assert!(message.contains("version already committed"));
    }
}
