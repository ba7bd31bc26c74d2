//! `${name}` template expressions.
//!
//! Used by derived schemas, account-link expressions and mandatory
//! conditions. Placeholders are looked up in the holder's plain attributes,
//! then its derived attributes (evaluated in declaration order), then its
//! identity fields. Unknown placeholders render empty.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::subject::Attributable;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([\w.]+)\}").expect("PLACEHOLDER is a valid regex pattern")
    })
}

/// Substitute placeholders from a flat variable map.
#[must_use]
pub fn render(expression: &str, variables: &HashMap<String, String>) -> String {
    placeholder()
        .replace_all(expression, |caps: &regex::Captures<'_>| {
            variables.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Variables visible to expressions evaluated against `holder`.
///
/// Multi-valued plain attributes render as their comma-joined values.
#[must_use]
pub fn variables(holder: &dyn Attributable) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for field in ["username", "name", "key"] {
        if let Some(value) = holder.identity_field(field) {
            vars.insert(field.to_string(), value);
        }
    }

    for attr in &holder.attributes().plain {
        let pattern = attr.schema().conversion_pattern.as_deref();
        let rendered: Vec<String> = attr.values().iter().map(|v| v.as_text(pattern)).collect();
        vars.insert(attr.schema().name.clone(), rendered.join(","));
    }

    for attr in &holder.attributes().derived {
        let value = render(&attr.schema.expression, &vars);
        vars.insert(attr.schema.name.clone(), value);
    }
    vars
}

/// Evaluate an expression against an attribute holder.
///
/// Returns `None` when the result is blank.
#[must_use]
pub fn evaluate(expression: &str, holder: &dyn Attributable) -> Option<String> {
    non_blank(render(expression, &variables(holder)))
}

/// Evaluate a derived attribute by schema name.
#[must_use]
pub fn evaluate_derived(name: &str, holder: &dyn Attributable) -> Option<String> {
    holder.der_attr(name)?;
    variables(holder).remove(name).and_then(non_blank)
}

/// Evaluate a boolean condition: `true`, `false`, or a template whose
/// non-blank result other than `false` means true.
#[must_use]
pub fn evaluate_condition(condition: &str, holder: &dyn Attributable) -> bool {
    match condition.trim() {
        "" | "false" => false,
        "true" => true,
        template => evaluate(template, holder).is_some_and(|v| !v.eq_ignore_ascii_case("false")),
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DerAttr, DerSchema, PlainAttr, PlainSchema, SchemaType};
    use crate::schema::AttrValue;
    use crate::subject::{Attributes, User};

    fn user() -> User {
        let mut user = User::new("jdoe");
        user.attributes = Attributes::new()
            .with_plain(PlainAttr::string("firstname", "John"))
            .with_plain(PlainAttr::string("surname", "Doe"))
            .with_derived(DerAttr {
                schema: DerSchema::new("cn", "${firstname} ${surname}"),
            })
            .with_derived(DerAttr {
                schema: DerSchema::new("display", "${cn} (${username})"),
            });
        user
    }

    #[test]
    fn test_render_unknown_is_empty() {
        let vars = HashMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(render("${a}-${b}", &vars), "1-");
    }

    #[test]
    fn test_evaluate_plain_and_identity() {
        let user = user();
        assert_eq!(
            evaluate("uid=${username},mail=${firstname}", &user).as_deref(),
            Some("uid=jdoe,mail=John")
        );
    }

    #[test]
    fn test_derived_in_declaration_order() {
        let user = user();
        assert_eq!(evaluate_derived("cn", &user).as_deref(), Some("John Doe"));
        assert_eq!(
            evaluate_derived("display", &user).as_deref(),
            Some("John Doe (jdoe)")
        );
        assert_eq!(evaluate_derived("missing", &user), None);
    }

    #[test]
    fn test_blank_result_is_none() {
        let user = user();
        assert_eq!(evaluate("  ${nothing} ", &user), None);
    }

    #[test]
    fn test_multivalued_joined() {
        let mut user = User::new("jdoe");
        let schema = PlainSchema::new("phones", SchemaType::Long).multivalued();
        user.attributes = Attributes::new().with_plain(
            PlainAttr::new(schema, vec![AttrValue::Long(1), AttrValue::Long(2)]).unwrap(),
        );
        assert_eq!(evaluate("${phones}", &user).as_deref(), Some("1,2"));
    }

    #[test]
    fn test_conditions() {
        let user = user();
        assert!(evaluate_condition("true", &user));
        assert!(!evaluate_condition("false", &user));
        assert!(!evaluate_condition("", &user));
        assert!(evaluate_condition("${firstname}", &user));
        assert!(!evaluate_condition("${missing}", &user));
    }
}
