use crate::error::{Result, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tenant isolation boundary. Every storage operation requires one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(tenant_id: impl Into<String>) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "tenant id must not be empty".to_string(),
            ));
        }
        Ok(Self(tenant_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying one immutable snapshot of a tenant's schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion(String);

impl SchemaVersion {
    pub fn new(version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "schema version must not be empty".to_string(),
            ));
        }
        Ok(Self(version))
    }

    /// For allocator-generated tokens, which are never empty
    pub(crate) fn from_token(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SchemaVersion> for String {
    fn from(value: SchemaVersion) -> Self {
        value.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flat, persisted form of one top-level definition (entity or rule).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub tenant_id: TenantId,
    pub name: String,
    pub serialized_definition: Vec<u8>,
    pub version: SchemaVersion,
}

impl SchemaRecord {
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        serialized_definition: impl Into<Vec<u8>>,
        version: SchemaVersion,
    ) -> Self {
        Self {
            tenant_id,
            name: name.into(),
            serialized_definition: serialized_definition.into(),
            version,
        }
    }
}

/// Category of a name declared inside an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityReference {
    Relation,
    Permission,
    Attribute,
}

impl EntityReference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relation => "RELATION",
            Self::Permission => "PERMISSION",
            Self::Attribute => "ATTRIBUTE",
        }
    }
}

impl FromStr for EntityReference {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RELATION" => Ok(Self::Relation),
            "PERMISSION" => Ok(Self::Permission),
            "ATTRIBUTE" => Ok(Self::Attribute),
            other => Err(SchemaError::malformed(
                other,
                "unrecognized entity reference tag",
            )),
        }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a top-level name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaReference {
    Entity,
    Rule,
}

impl SchemaReference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "ENTITY",
            Self::Rule => "RULE",
        }
    }
}

impl FromStr for SchemaReference {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ENTITY" => Ok(Self::Entity),
            "RULE" => Ok(Self::Rule),
            other => Err(SchemaError::malformed(
                other,
                "unrecognized schema reference tag",
            )),
        }
    }
}

impl fmt::Display for SchemaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of an attribute or rule argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Boolean,
    BooleanArray,
    String,
    StringArray,
    Integer,
    IntegerArray,
    Double,
    DoubleArray,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::BooleanArray => "boolean[]",
            Self::String => "string",
            Self::StringArray => "string[]",
            Self::Integer => "integer",
            Self::IntegerArray => "integer[]",
            Self::Double => "double",
            Self::DoubleArray => "double[]",
        }
    }
}

impl FromStr for AttributeType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "boolean" => Ok(Self::Boolean),
            "boolean[]" => Ok(Self::BooleanArray),
            "string" => Ok(Self::String),
            "string[]" => Ok(Self::StringArray),
            "integer" => Ok(Self::Integer),
            "integer[]" => Ok(Self::IntegerArray),
            "double" => Ok(Self::Double),
            "double[]" => Ok(Self::DoubleArray),
            other => Err(SchemaError::malformed(other, "unknown attribute type")),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One allowed subject of a relation: an entity type, optionally narrowed to
/// a relation on that type. An empty `relation` means the subject itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationReference {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub relation: String,
}

impl RelationReference {
    pub fn direct(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            relation: String::new(),
        }
    }

    pub fn userset(entity_type: &str, relation: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            relation: relation.to_string(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.relation.is_empty()
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_direct() {
            write!(f, "@{}", self.entity_type)
        } else {
            write!(f, "@{}#{}", self.entity_type, self.relation)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    /// Union of allowed subjects, in declaration order
    #[serde(default)]
    pub relation_references: Vec<RelationReference>,
}

impl RelationDefinition {
    pub fn new(name: &str, relation_references: Vec<RelationReference>) -> Self {
        Self {
            name: name.to_string(),
            relation_references,
        }
    }
}

/// Permission expression tree. Storage never evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionExpression {
    /// A relation, permission or attribute of the same entity
    Computed { name: String },
    /// `tupleset.computed`: follow a relation, then evaluate on its targets
    TupleToUserSet { tupleset: String, computed: String },
    /// Invocation of a rule with attribute arguments
    Call { rule: String, arguments: Vec<String> },
    Union { children: Vec<PermissionExpression> },
    Intersection { children: Vec<PermissionExpression> },
    Exclusion {
        base: Box<PermissionExpression>,
        subtract: Box<PermissionExpression>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub child: PermissionExpression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleArgument {
    pub name: String,
    pub argument_type: AttributeType,
}

/// Reusable named condition. The body is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<RuleArgument>,
    pub expression: String,
}

/// A resource type with its relations, permissions and attributes.
///
/// All maps are always materialized; an entity without members has empty
/// maps, never missing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDefinition>,
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionDefinition>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDefinition>,
    #[serde(default)]
    pub references: BTreeMap<String, EntityReference>,
}

impl EntityDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn reference(&self, name: &str) -> Option<EntityReference> {
        self.references.get(name).copied()
    }
}

/// A single member statement of an entity, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMember {
    Relation(RelationDefinition),
    Permission(PermissionDefinition),
    Attribute(AttributeDefinition),
}

impl EntityMember {
    pub fn name(&self) -> &str {
        match self {
            Self::Relation(relation) => &relation.name,
            Self::Permission(permission) => &permission.name,
            Self::Attribute(attribute) => &attribute.name,
        }
    }

    pub fn reference(&self) -> EntityReference {
        match self {
            Self::Relation(_) => EntityReference::Relation,
            Self::Permission(_) => EntityReference::Permission,
            Self::Attribute(_) => EntityReference::Attribute,
        }
    }
}

/// Entity as declared by the compiler: members are kept as a list so that
/// duplicate or conflicting declarations survive until reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDeclaration {
    pub name: String,
    pub members: Vec<EntityMember>,
}

impl From<&EntityDefinition> for EntityDeclaration {
    fn from(entity: &EntityDefinition) -> Self {
        let relations = entity
            .relations
            .values()
            .cloned()
            .map(EntityMember::Relation);
        let attributes = entity
            .attributes
            .values()
            .cloned()
            .map(EntityMember::Attribute);
        let permissions = entity
            .permissions
            .values()
            .cloned()
            .map(EntityMember::Permission);

        Self {
            name: entity.name.clone(),
            members: relations.chain(attributes).chain(permissions).collect(),
        }
    }
}

/// Output of the definition parser for one serialized definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDefinition {
    Entity(EntityDeclaration),
    Rule(RuleDefinition),
}

impl ParsedDefinition {
    pub fn name(&self) -> &str {
        match self {
            Self::Entity(entity) => &entity.name,
            Self::Rule(rule) => &rule.name,
        }
    }

    pub fn reference(&self) -> SchemaReference {
        match self {
            Self::Entity(_) => SchemaReference::Entity,
            Self::Rule(_) => SchemaReference::Rule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_rejects_empty() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("   ").is_err());
        assert_eq!(TenantId::new("t1").unwrap().as_str(), "t1");
    }

    #[test]
    fn test_tenant_id_deserialization_is_validated() {
        let result: std::result::Result<TenantId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_tags_reject_unknown_values() {
        assert_eq!(
            "RELATION".parse::<EntityReference>().unwrap(),
            EntityReference::Relation
        );
        assert_eq!("RULE".parse::<SchemaReference>().unwrap(), SchemaReference::Rule);
        assert!("relation".parse::<EntityReference>().is_err());
        assert!("TABLE".parse::<SchemaReference>().is_err());

        let unknown: std::result::Result<EntityReference, _> =
            serde_json::from_str("\"FUNCTION\"");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_relation_reference_display() {
        assert_eq!(RelationReference::direct("user").to_string(), "@user");
        assert_eq!(
            RelationReference::userset("team", "member").to_string(),
            "@team#member"
        );
    }

    #[test]
    fn test_attribute_type_round_trips_through_str() {
        for ty in [
            AttributeType::Boolean,
            AttributeType::StringArray,
            AttributeType::Integer,
            AttributeType::DoubleArray,
        ] {
            assert_eq!(ty.as_str().parse::<AttributeType>().unwrap(), ty);
        }
        assert!("decimal".parse::<AttributeType>().is_err());
    }

    #[test]
    fn test_empty_entity_serializes_all_maps() {
        let json = serde_json::to_value(EntityDefinition::new("user")).unwrap();
        assert_eq!(json["relations"], serde_json::json!({}));
        assert_eq!(json["permissions"], serde_json::json!({}));
        assert_eq!(json["attributes"], serde_json::json!({}));
        assert_eq!(json["references"], serde_json::json!({}));
    }
}
