//! Schema language parser implementation using pest

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::ParseError;
use crate::models::*;

#[derive(Parser)]
#[grammar = "dsl/schema.pest"]
struct SchemaLanguage;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse a document holding any number of entity and rule definitions
pub fn parse_document(source: &str) -> ParseResult<Vec<ParsedDefinition>> {
    let document = SchemaLanguage::parse(Rule::document, source)
        .map_err(|e| ParseError(format!("Parse error: {}", e)))?
        .next()
        .ok_or_else(|| ParseError("Expected document".to_string()))?;

    parse_definitions(document.into_inner())
}

/// Parse exactly one entity or rule definition
pub fn parse_single(source: &str) -> ParseResult<ParsedDefinition> {
    let pair = SchemaLanguage::parse(Rule::single_definition, source)
        .map_err(|e| ParseError(format!("Parse error: {}", e)))?
        .next()
        .ok_or_else(|| ParseError("Expected definition".to_string()))?;

    parse_definitions(pair.into_inner())?
        .pop()
        .ok_or_else(|| ParseError("Expected definition".to_string()))
}

fn parse_definitions(pairs: Pairs<Rule>) -> ParseResult<Vec<ParsedDefinition>> {
    let mut definitions = Vec::new();

    for pair in pairs {
        match pair.as_rule() {
            Rule::entity_def => definitions.push(ParsedDefinition::Entity(parse_entity(pair)?)),
            Rule::rule_def => definitions.push(ParsedDefinition::Rule(parse_rule(pair)?)),
            Rule::EOI => {}
            other => {
                return Err(ParseError(format!("Unexpected rule: {:?}", other)));
            }
        }
    }

    Ok(definitions)
}

/// Inner pairs of a node without its keyword and operator tokens
fn significant(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|inner| {
        !matches!(
            inner.as_rule(),
            Rule::kw_entity
                | Rule::kw_relation
                | Rule::kw_permission
                | Rule::kw_attribute
                | Rule::kw_rule
                | Rule::or_op
                | Rule::and_op
                | Rule::not_op
        )
    })
}

fn expect_ident<'a>(
    inner: &mut impl Iterator<Item = Pair<'a, Rule>>,
    what: &str,
) -> ParseResult<String> {
    inner
        .next()
        .filter(|pair| pair.as_rule() == Rule::ident)
        .map(|pair| pair.as_str().to_string())
        .ok_or_else(|| ParseError(format!("Expected {}", what)))
}

fn parse_entity(pair: Pair<Rule>) -> ParseResult<EntityDeclaration> {
    let mut inner = significant(pair);
    let name = expect_ident(&mut inner, "entity name")?;

    let mut members = Vec::new();
    for member in inner {
        let member = match member.as_rule() {
            Rule::relation_def => EntityMember::Relation(parse_relation(member)?),
            Rule::permission_def => EntityMember::Permission(parse_permission(member)?),
            Rule::attribute_def => EntityMember::Attribute(parse_attribute(member)?),
            other => {
                return Err(ParseError(format!(
                    "Unexpected member in entity '{}': {:?}",
                    name, other
                )))
            }
        };
        members.push(member);
    }

    Ok(EntityDeclaration { name, members })
}

fn parse_relation(pair: Pair<Rule>) -> ParseResult<RelationDefinition> {
    let mut inner = significant(pair);
    let name = expect_ident(&mut inner, "relation name")?;

    let mut relation_references = Vec::new();
    for reference in inner {
        let mut parts = reference.into_inner();
        let entity_type = expect_ident(&mut parts, "relation target type")?;
        let relation = parts
            .next()
            .map(|pair| pair.as_str().to_string())
            .unwrap_or_default();
        relation_references.push(RelationReference {
            entity_type,
            relation,
        });
    }

    Ok(RelationDefinition {
        name,
        relation_references,
    })
}

fn parse_attribute(pair: Pair<Rule>) -> ParseResult<AttributeDefinition> {
    let mut inner = significant(pair);
    let name = expect_ident(&mut inner, "attribute name")?;
    let attribute_type = parse_attribute_type(inner.next())?;

    Ok(AttributeDefinition {
        name,
        attribute_type,
    })
}

fn parse_attribute_type(pair: Option<Pair<Rule>>) -> ParseResult<AttributeType> {
    let pair = pair.ok_or_else(|| ParseError("Expected attribute type".to_string()))?;
    pair.as_str()
        .parse()
        .map_err(|_| ParseError(format!("Unknown attribute type: {}", pair.as_str())))
}

fn parse_permission(pair: Pair<Rule>) -> ParseResult<PermissionDefinition> {
    let mut inner = significant(pair);
    let name = expect_ident(&mut inner, "permission name")?;
    let child = parse_expr(
        inner
            .next()
            .ok_or_else(|| ParseError(format!("Expected expression for '{}'", name)))?,
    )?;

    Ok(PermissionDefinition { name, child })
}

fn parse_expr(pair: Pair<Rule>) -> ParseResult<PermissionExpression> {
    let mut children = significant(pair)
        .map(parse_and_expr)
        .collect::<ParseResult<Vec<_>>>()?;

    match children.len() {
        0 => Err(ParseError("Expected expression".to_string())),
        1 => Ok(children.remove(0)),
        _ => Ok(PermissionExpression::Union { children }),
    }
}

fn parse_and_expr(pair: Pair<Rule>) -> ParseResult<PermissionExpression> {
    let mut children = significant(pair)
        .map(parse_not_expr)
        .collect::<ParseResult<Vec<_>>>()?;

    match children.len() {
        0 => Err(ParseError("Expected expression".to_string())),
        1 => Ok(children.remove(0)),
        _ => Ok(PermissionExpression::Intersection { children }),
    }
}

fn parse_not_expr(pair: Pair<Rule>) -> ParseResult<PermissionExpression> {
    let mut inner = significant(pair);
    let base = parse_primary(
        inner
            .next()
            .ok_or_else(|| ParseError("Expected base expression".to_string()))?,
    )?;

    inner.try_fold(base, |base, subtract| {
        Ok(PermissionExpression::Exclusion {
            base: Box::new(base),
            subtract: Box::new(parse_primary(subtract)?),
        })
    })
}

fn parse_primary(pair: Pair<Rule>) -> ParseResult<PermissionExpression> {
    match pair.as_rule() {
        Rule::computed => Ok(PermissionExpression::Computed {
            name: pair.as_str().trim().to_string(),
        }),
        Rule::tuple_to_userset => {
            let mut inner = pair.into_inner();
            let tupleset = expect_ident(&mut inner, "tupleset relation")?;
            let computed = expect_ident(&mut inner, "computed relation")?;
            Ok(PermissionExpression::TupleToUserSet { tupleset, computed })
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let rule = expect_ident(&mut inner, "rule name")?;
            let arguments = inner.map(|arg| arg.as_str().to_string()).collect();
            Ok(PermissionExpression::Call { rule, arguments })
        }
        Rule::expr => parse_expr(pair),
        other => Err(ParseError(format!(
            "Unexpected primary expression: {:?}",
            other
        ))),
    }
}

fn parse_rule(pair: Pair<Rule>) -> ParseResult<RuleDefinition> {
    let mut inner = significant(pair);
    let name = expect_ident(&mut inner, "rule name")?;

    let mut arguments = Vec::new();
    let mut expression = None;
    for part in inner {
        match part.as_rule() {
            Rule::rule_arg => {
                let mut arg = part.into_inner();
                let arg_name = expect_ident(&mut arg, "argument name")?;
                let argument_type = parse_attribute_type(arg.next())?;
                arguments.push(RuleArgument {
                    name: arg_name,
                    argument_type,
                });
            }
            Rule::rule_body => expression = Some(part.as_str().trim().to_string()),
            other => {
                return Err(ParseError(format!(
                    "Unexpected token in rule '{}': {:?}",
                    name, other
                )))
            }
        }
    }

    let expression = expression
        .filter(|body| !body.is_empty())
        .ok_or_else(|| ParseError(format!("Rule '{}' has an empty body", name)))?;

    Ok(RuleDefinition {
        name,
        arguments,
        expression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(source: &str) -> EntityDeclaration {
        match parse_single(source).unwrap() {
            ParsedDefinition::Entity(entity) => entity,
            other => panic!("Expected entity, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_entity() {
        let user = entity("entity user {}");
        assert_eq!(user.name, "user");
        assert!(user.members.is_empty());
    }

    #[test]
    fn test_parse_relation_without_newline() {
        let org = entity("entity organization { relation admin @user}");
        assert_eq!(
            org.members,
            vec![EntityMember::Relation(RelationDefinition::new(
                "admin",
                vec![RelationReference::direct("user")]
            ))]
        );
    }

    #[test]
    fn test_parse_relation_union_keeps_order() {
        let team = entity(
            r#"
            entity repository {
                relation reader @user @team#member @organization#admin
            }
            "#,
        );

        match &team.members[0] {
            EntityMember::Relation(relation) => {
                assert_eq!(
                    relation.relation_references,
                    vec![
                        RelationReference::direct("user"),
                        RelationReference::userset("team", "member"),
                        RelationReference::userset("organization", "admin"),
                    ]
                );
            }
            other => panic!("Expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_attributes() {
        let account = entity(
            r#"
            entity account {
                attribute balance double
                attribute tags string[]
            }
            "#,
        );

        assert_eq!(account.members.len(), 2);
        assert_eq!(
            account.members[1],
            EntityMember::Attribute(AttributeDefinition {
                name: "tags".to_string(),
                attribute_type: AttributeType::StringArray,
            })
        );
    }

    #[test]
    fn test_parse_permission_precedence() {
        let doc = entity(
            r#"
            entity document {
                relation owner @user
                relation editor @user
                relation blocked @user
                permission edit = owner or editor and owner not blocked
            }
            "#,
        );

        let expected = PermissionExpression::Union {
            children: vec![
                PermissionExpression::Computed {
                    name: "owner".to_string(),
                },
                PermissionExpression::Intersection {
                    children: vec![
                        PermissionExpression::Computed {
                            name: "editor".to_string(),
                        },
                        PermissionExpression::Exclusion {
                            base: Box::new(PermissionExpression::Computed {
                                name: "owner".to_string(),
                            }),
                            subtract: Box::new(PermissionExpression::Computed {
                                name: "blocked".to_string(),
                            }),
                        },
                    ],
                },
            ],
        };

        match &doc.members[3] {
            EntityMember::Permission(permission) => assert_eq!(permission.child, expected),
            other => panic!("Expected permission, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tuple_to_userset_and_call() {
        let doc = entity(
            r#"
            entity document {
                relation parent @folder
                attribute public boolean
                permission view = parent.view or is_public(public)
            }
            "#,
        );

        match &doc.members[2] {
            EntityMember::Permission(permission) => match &permission.child {
                PermissionExpression::Union { children } => {
                    assert_eq!(
                        children[0],
                        PermissionExpression::TupleToUserSet {
                            tupleset: "parent".to_string(),
                            computed: "view".to_string(),
                        }
                    );
                    assert_eq!(
                        children[1],
                        PermissionExpression::Call {
                            rule: "is_public".to_string(),
                            arguments: vec!["public".to_string()],
                        }
                    );
                }
                other => panic!("Expected union, got {:?}", other),
            },
            other => panic!("Expected permission, got {:?}", other),
        }
    }

    #[test]
    fn test_identifiers_may_start_with_keywords() {
        let org = entity(
            r#"
            entity organization {
                relation order_owner @user
                permission notify = order_owner or android
            }
            "#,
        );
        assert_eq!(org.members[0].name(), "order_owner");
        assert_eq!(org.members[1].name(), "notify");
    }

    #[test]
    fn test_parse_rule() {
        let rule = match parse_single(
            "rule check_balance(balance double, limit integer) { balance >= limit && {\"a\": 1}.size() > 0 }",
        )
        .unwrap()
        {
            ParsedDefinition::Rule(rule) => rule,
            other => panic!("Expected rule, got {:?}", other),
        };

        assert_eq!(rule.name, "check_balance");
        assert_eq!(rule.arguments.len(), 2);
        assert_eq!(rule.arguments[1].argument_type, AttributeType::Integer);
        assert_eq!(rule.expression, "balance >= limit && {\"a\": 1}.size() > 0");
    }

    #[test]
    fn test_rule_body_braces_inside_strings() {
        let expression = |source: &str| match parse_single(source).unwrap() {
            ParsedDefinition::Rule(rule) => rule.expression,
            other => panic!("Expected rule, got {:?}", other),
        };

        assert_eq!(
            expression(r#"rule closing(name string) { name == "}" }"#),
            r#"name == "}""#
        );
        assert_eq!(
            expression(r#"rule opening(name string) { name == '{' || name == "\"{" }"#),
            r#"name == '{' || name == "\"{""#
        );

        // Unterminated literal swallows the closing brace
        assert!(parse_single(r#"rule broken(name string) { name == "} "#).is_err());
    }

    #[test]
    fn test_parse_document_with_comments() {
        let definitions = parse_document(
            r#"
            // people
            entity user {}

            /* organizations own everything */
            entity organization {
                relation admin @user // direct admins
            }

            rule is_weekday(day integer) { day < 6 }
            "#,
        )
        .unwrap();

        let names: Vec<_> = definitions.iter().map(ParsedDefinition::name).collect();
        assert_eq!(names, vec!["user", "organization", "is_weekday"]);
    }

    #[test]
    fn test_single_definition_rejects_multiple() {
        assert!(parse_single("entity user {} entity team {}").is_err());
        assert!(parse_single("").is_err());
    }

    #[test]
    fn test_invalid_syntax() {
        assert!(parse_single("entity user { relation }").is_err());
        assert!(parse_single("entity user { relation owner }").is_err());
        assert!(parse_single("entity rule {}").is_err());
        assert!(parse_single("entity doc { attribute size decimal }").is_err());
        assert!(parse_single("entity doc { permission view = }").is_err());
        assert!(parse_single("rule empty() { }").is_err());
    }
}
