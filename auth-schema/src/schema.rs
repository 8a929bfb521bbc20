use crate::{error::SchemaError, models::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reconstructed schema graph for one (tenant, version) snapshot.
///
/// Cross-entity links are by name only: a relation's target type is a key
/// into `entity_definitions`, never a live reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entity_definitions: BTreeMap<String, EntityDefinition>,
    #[serde(default)]
    pub rule_definitions: BTreeMap<String, RuleDefinition>,
    #[serde(default)]
    pub references: BTreeMap<String, SchemaReference>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.entity_definitions.get(name)
    }

    pub fn rule(&self, name: &str) -> Option<&RuleDefinition> {
        self.rule_definitions.get(name)
    }

    pub fn reference(&self, name: &str) -> Option<SchemaReference> {
        self.references.get(name).copied()
    }

    /// Look up a relation declared on an entity
    pub fn relation(&self, entity: &str, relation: &str) -> Option<&RelationDefinition> {
        self.entity(entity)?.relations.get(relation)
    }

    /// Check that every reference index agrees with the definition maps it
    /// indexes, in both directions.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (name, entity) in &self.entity_definitions {
            if name != &entity.name {
                return Err(SchemaError::malformed(
                    name,
                    format!("entity key doesn't match name '{}'", entity.name),
                ));
            }
            if self.reference(name) != Some(SchemaReference::Entity) {
                return Err(SchemaError::malformed(
                    name,
                    "entity is not indexed as ENTITY",
                ));
            }
            validate_entity(entity)?;
        }

        for (name, rule) in &self.rule_definitions {
            if name != &rule.name {
                return Err(SchemaError::malformed(
                    name,
                    format!("rule key doesn't match name '{}'", rule.name),
                ));
            }
            if self.reference(name) != Some(SchemaReference::Rule) {
                return Err(SchemaError::malformed(name, "rule is not indexed as RULE"));
            }
        }

        for (name, reference) in &self.references {
            let defined = match reference {
                SchemaReference::Entity => self.entity_definitions.contains_key(name),
                SchemaReference::Rule => self.rule_definitions.contains_key(name),
            };
            if !defined {
                return Err(SchemaError::malformed(
                    name,
                    format!("referenced as {} but has no definition", reference),
                ));
            }
        }

        Ok(())
    }
}

fn validate_entity(entity: &EntityDefinition) -> Result<(), SchemaError> {
    let declared = entity
        .relations
        .iter()
        .map(|(key, def)| (key, def.name.as_str(), EntityReference::Relation))
        .chain(
            entity
                .permissions
                .iter()
                .map(|(key, def)| (key, def.name.as_str(), EntityReference::Permission)),
        )
        .chain(
            entity
                .attributes
                .iter()
                .map(|(key, def)| (key, def.name.as_str(), EntityReference::Attribute)),
        );

    let mut declared_count = 0usize;
    for (key, name, expected) in declared {
        declared_count += 1;
        if key != name {
            return Err(SchemaError::malformed(
                &entity.name,
                format!("member key '{}' doesn't match name '{}'", key, name),
            ));
        }
        match entity.reference(key) {
            Some(actual) if actual == expected => {}
            Some(actual) => {
                return Err(SchemaError::malformed(
                    &entity.name,
                    format!("'{}' is declared as {} but indexed as {}", key, expected, actual),
                ))
            }
            None => {
                return Err(SchemaError::malformed(
                    &entity.name,
                    format!("'{}' is declared but not indexed", key),
                ))
            }
        }
    }

    // Every declared member is indexed, so a size mismatch means the index
    // holds names with no definition.
    if declared_count != entity.references.len() {
        let orphan = entity.references.keys().find(|key| {
            !entity.relations.contains_key(*key)
                && !entity.permissions.contains_key(*key)
                && !entity.attributes.contains_key(*key)
        });
        return Err(SchemaError::malformed(
            &entity.name,
            format!(
                "reference '{}' has no definition",
                orphan.map(String::as_str).unwrap_or_default()
            ),
        ));
    }

    Ok(())
}
