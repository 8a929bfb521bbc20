use crate::models::*;

/// Render a definition back into schema language. The output parses to an
/// equal definition.
pub fn print_definition(definition: &ParsedDefinition) -> String {
    match definition {
        ParsedDefinition::Entity(entity) => print_entity(entity),
        ParsedDefinition::Rule(rule) => print_rule(rule),
    }
}

fn print_entity(entity: &EntityDeclaration) -> String {
    if entity.members.is_empty() {
        return format!("entity {} {{}}", entity.name);
    }

    let members: Vec<String> = entity.members.iter().map(print_member).collect();
    format!("entity {} {{\n{}\n}}", entity.name, members.join("\n"))
}

fn print_member(member: &EntityMember) -> String {
    match member {
        EntityMember::Relation(relation) => {
            let targets: Vec<String> = relation
                .relation_references
                .iter()
                .map(ToString::to_string)
                .collect();
            format!("    relation {} {}", relation.name, targets.join(" "))
        }
        EntityMember::Attribute(attribute) => format!(
            "    attribute {} {}",
            attribute.name, attribute.attribute_type
        ),
        EntityMember::Permission(permission) => format!(
            "    permission {} = {}",
            permission.name,
            print_expression(&permission.child)
        ),
    }
}

fn print_rule(rule: &RuleDefinition) -> String {
    let arguments: Vec<String> = rule
        .arguments
        .iter()
        .map(|arg| format!("{} {}", arg.name, arg.argument_type))
        .collect();

    format!(
        "rule {}({}) {{\n    {}\n}}",
        rule.name,
        arguments.join(", "),
        rule.expression
    )
}

fn precedence(expression: &PermissionExpression) -> u8 {
    match expression {
        PermissionExpression::Union { .. } => 1,
        PermissionExpression::Intersection { .. } => 2,
        PermissionExpression::Exclusion { .. } => 3,
        PermissionExpression::Computed { .. }
        | PermissionExpression::TupleToUserSet { .. }
        | PermissionExpression::Call { .. } => 4,
    }
}

pub fn print_expression(expression: &PermissionExpression) -> String {
    match expression {
        PermissionExpression::Computed { name } => name.clone(),
        PermissionExpression::TupleToUserSet { tupleset, computed } => {
            format!("{}.{}", tupleset, computed)
        }
        PermissionExpression::Call { rule, arguments } => {
            format!("{}({})", rule, arguments.join(", "))
        }
        PermissionExpression::Union { children } => join_children(expression, children, " or "),
        PermissionExpression::Intersection { children } => {
            join_children(expression, children, " and ")
        }
        PermissionExpression::Exclusion { base, subtract } => format!(
            "{} not {}",
            print_child(expression, base),
            print_child(expression, subtract)
        ),
    }
}

fn join_children(
    parent: &PermissionExpression,
    children: &[PermissionExpression],
    separator: &str,
) -> String {
    children
        .iter()
        .map(|child| print_child(parent, child))
        .collect::<Vec<_>>()
        .join(separator)
}

// Nested nodes of equal precedence are parenthesized so that the tree shape
// survives a parse.
fn print_child(parent: &PermissionExpression, child: &PermissionExpression) -> String {
    if precedence(child) <= precedence(parent) {
        format!("({})", print_expression(child))
    } else {
        print_expression(child)
    }
}
