//! Storage-independent conversion between the schema graph and flat records.
//!
//! Reconstruction indexes every definition by name: relations point at
//! their target entity type by name only, so the graph never holds cyclic
//! ownership.

use crate::{
    dsl::DefinitionParser,
    error::{Result, SchemaError},
    models::*,
    schema::Schema,
};
use std::collections::btree_map::Entry;
use tracing::debug;

/// Build an entity definition and its local reference index from the
/// declared members. A name may be declared once, under one category.
pub fn build_entity(declaration: EntityDeclaration) -> Result<EntityDefinition> {
    let mut entity = EntityDefinition::new(&declaration.name);

    for member in declaration.members {
        let member_name = member.name().to_string();
        let reference = member.reference();

        match entity.references.entry(member_name.clone()) {
            Entry::Occupied(existing) => {
                return Err(SchemaError::malformed(
                    &declaration.name,
                    format!(
                        "'{}' is declared as both {} and {}",
                        member_name,
                        existing.get(),
                        reference
                    ),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(reference);
            }
        }

        match member {
            EntityMember::Relation(relation) => {
                entity.relations.insert(member_name, relation);
            }
            EntityMember::Permission(permission) => {
                entity.permissions.insert(member_name, permission);
            }
            EntityMember::Attribute(attribute) => {
                entity.attributes.insert(member_name, attribute);
            }
        }
    }

    Ok(entity)
}

/// Assemble parsed top-level definitions into a schema graph
pub fn build_schema(definitions: Vec<ParsedDefinition>) -> Result<Schema> {
    let mut schema = Schema::new();

    for definition in definitions {
        let name = definition.name().to_string();
        let reference = definition.reference();

        match schema.references.entry(name.clone()) {
            Entry::Occupied(existing) => {
                return Err(SchemaError::malformed(
                    &name,
                    format!(
                        "top-level name is declared as both {} and {}",
                        existing.get(),
                        reference
                    ),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(reference);
            }
        }

        match definition {
            ParsedDefinition::Entity(declaration) => {
                schema
                    .entity_definitions
                    .insert(name, build_entity(declaration)?);
            }
            ParsedDefinition::Rule(rule) => {
                schema.rule_definitions.insert(name, rule);
            }
        }
    }

    schema.validate()?;
    Ok(schema)
}

/// Rebuild the schema graph of one (tenant, version) snapshot from its
/// records.
pub fn reconstruct(records: &[SchemaRecord], parser: &dyn DefinitionParser) -> Result<Schema> {
    let Some(first) = records.first() else {
        return Ok(Schema::new());
    };

    let mut definitions = Vec::with_capacity(records.len());
    for record in records {
        if record.tenant_id != first.tenant_id || record.version != first.version {
            return Err(SchemaError::InvalidArgument(format!(
                "record '{}' belongs to {}@{}, expected {}@{}",
                record.name, record.tenant_id, record.version, first.tenant_id, first.version
            )));
        }

        let definition = parser
            .parse(&record.serialized_definition)
            .map_err(|e| SchemaError::malformed(&record.name, e.to_string()))?;

        if definition.name() != record.name {
            return Err(SchemaError::malformed(
                &record.name,
                format!(
                    "record holds a definition named '{}'",
                    definition.name()
                ),
            ));
        }

        definitions.push(definition);
    }

    let schema = build_schema(definitions)?;
    debug!(
        tenant_id = %first.tenant_id,
        version = %first.version,
        entities = schema.entity_definitions.len(),
        rules = schema.rule_definitions.len(),
        "Schema reconstructed"
    );
    Ok(schema)
}

/// Decompose a schema graph into one record per entity and rule, ordered by
/// name.
///
/// Every record is checked to parse back into the definition it was printed
/// from. A committed version can't be rewritten, so a graph that would not
/// survive storage is rejected here with `MalformedDefinition`.
pub fn flatten(
    tenant_id: &TenantId,
    version: &SchemaVersion,
    schema: &Schema,
    parser: &dyn DefinitionParser,
) -> Result<Vec<SchemaRecord>> {
    schema.validate()?;
    for entity in schema.entity_definitions.values() {
        check_entity_shape(entity)?;
    }

    let entities = schema
        .entity_definitions
        .values()
        .map(|entity| ParsedDefinition::Entity(EntityDeclaration::from(entity)));
    let rules = schema
        .rule_definitions
        .values()
        .map(|rule| ParsedDefinition::Rule(rule.clone()));

    let mut records = Vec::with_capacity(schema.references.len());
    for definition in entities.chain(rules) {
        let name = definition.name().to_string();
        let serialized = parser.serialize(&definition);

        let reparsed = parser
            .parse(&serialized)
            .map_err(|e| SchemaError::malformed(&name, format!("does not serialize: {}", e)))?;
        if reparsed != definition {
            return Err(SchemaError::malformed(
                &name,
                "definition changes when serialized and parsed back",
            ));
        }

        records.push(SchemaRecord::new(
            tenant_id.clone(),
            name,
            serialized,
            version.clone(),
        ));
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

fn check_entity_shape(entity: &EntityDefinition) -> Result<()> {
    for relation in entity.relations.values() {
        if relation.relation_references.is_empty() {
            return Err(SchemaError::malformed(
                &entity.name,
                format!("relation '{}' has no target types", relation.name),
            ));
        }
    }
    for permission in entity.permissions.values() {
        check_expression_shape(&entity.name, &permission.name, &permission.child)?;
    }
    Ok(())
}

fn check_expression_shape(
    entity: &str,
    permission: &str,
    expression: &PermissionExpression,
) -> Result<()> {
    match expression {
        PermissionExpression::Union { children } | PermissionExpression::Intersection { children } => {
            if children.is_empty() {
                return Err(SchemaError::malformed(
                    entity,
                    format!("permission '{}' has an empty operand list", permission),
                ));
            }
            children
                .iter()
                .try_for_each(|child| check_expression_shape(entity, permission, child))
        }
        PermissionExpression::Exclusion { base, subtract } => {
            check_expression_shape(entity, permission, base)?;
            check_expression_shape(entity, permission, subtract)
        }
        PermissionExpression::Computed { .. }
        | PermissionExpression::TupleToUserSet { .. }
        | PermissionExpression::Call { .. } => Ok(()),
    }
}
