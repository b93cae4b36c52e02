//! Label selector parsing
//!
//! Parses the Kubernetes label selector string form (the same syntax used in
//! `ListOptions::label_selector`) into a kube [`Selector`], which does the
//! matching and renders back to the string form.
//!
//! Supported expressions:
//! - `key`, `!key` (existence)
//! - `key=value`, `key==value`, `key!=value` (equality)
//! - `key in (a,b)`, `key notin (a,b)` (set)

use crate::error::{InformerError, Result};
pub use kube::core::{Expression, Selector, SelectorExt};
use std::collections::BTreeSet;

/// Parse a selector string such as `app=edge,tier notin (internal)`
///
/// An empty string selects everything.
pub fn parse_selector(input: &str) -> Result<Selector> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Selector::default());
    }

    split_terms(input)?
        .into_iter()
        .map(parse_expression)
        .collect::<Result<Selector>>()
}

/// Split on commas that are not inside a value set
fn split_terms(input: &str) -> Result<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    InformerError::InvalidSelector(format!("unbalanced ')' in {:?}", input))
                })?;
            }
            ',' if depth == 0 => {
                terms.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(InformerError::InvalidSelector(format!(
            "unbalanced '(' in {:?}",
            input
        )));
    }
    terms.push(&input[start..]);

    Ok(terms)
}

fn parse_expression(term: &str) -> Result<Expression> {
    let term = term.trim();
    if term.is_empty() {
        return Err(InformerError::InvalidSelector(
            "empty expression".to_string(),
        ));
    }

    if let Some(open) = term.find('(') {
        return parse_set_expression(term, open);
    }

    if let Some(key) = term.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(validate_key(key)?));
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Expression::NotEqual(
            validate_key(key)?,
            validate_value(value)?,
        ));
    }

    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Expression::Equal(validate_key(key)?, validate_value(value)?));
    }

    Ok(Expression::Exists(validate_key(term)?))
}

fn parse_set_expression(term: &str, open: usize) -> Result<Expression> {
    let inner = term[open + 1..].strip_suffix(')').ok_or_else(|| {
        InformerError::InvalidSelector(format!("expected ')' at end of {:?}", term))
    })?;

    let mut head = term[..open].split_whitespace();
    let (key, op) = match (head.next(), head.next(), head.next()) {
        (Some(key), Some(op), None) => (key, op),
        _ => {
            return Err(InformerError::InvalidSelector(format!(
                "expected `key in (...)` or `key notin (...)`, got {:?}",
                term
            )))
        }
    };

    let values = inner
        .split(',')
        .map(validate_value)
        .collect::<Result<BTreeSet<_>>>()?;
    if values.iter().all(|v| v.is_empty()) {
        return Err(InformerError::InvalidSelector(format!(
            "empty value set in {:?}",
            term
        )));
    }

    let key = validate_key(key)?;
    match op {
        "in" => Ok(Expression::In(key, values)),
        "notin" => Ok(Expression::NotIn(key, values)),
        other => Err(InformerError::InvalidSelector(format!(
            "unknown set operator {:?}",
            other
        ))),
    }
}

fn validate_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains(['=', '!', '(', ')'])
    {
        return Err(InformerError::InvalidSelector(format!(
            "invalid label key {:?}",
            key
        )));
    }
    Ok(key.to_string())
}

fn validate_value(value: &str) -> Result<String> {
    let value = value.trim();
    if value.contains(char::is_whitespace) || value.contains(['=', '!', '(', ')']) {
        return Err(InformerError::InvalidSelector(format!(
            "invalid label value {:?}",
            value
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expressions(selector: Selector) -> Vec<Expression> {
        selector.into_iter().collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = parse_selector("  ").expect("Empty selector should parse");
        assert!(selector.selects_all());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("app", "edge")])));
    }

    #[test]
    fn test_equality_expressions() {
        let selector = parse_selector("app=edge,tier==public,env!=dev").expect("Should parse");
        assert_eq!(
            expressions(selector.clone()),
            vec![
                Expression::Equal("app".into(), "edge".into()),
                Expression::Equal("tier".into(), "public".into()),
                Expression::NotEqual("env".into(), "dev".into()),
            ]
        );

        assert!(selector.matches(&labels(&[("app", "edge"), ("tier", "public")])));
        assert!(!selector.matches(&labels(&[
            ("app", "edge"),
            ("tier", "public"),
            ("env", "dev")
        ])));
        assert!(!selector.matches(&labels(&[("app", "edge")])));
    }

    #[test]
    fn test_not_equal_matches_missing_key() {
        let selector = parse_selector("env!=prod").expect("Should parse");
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("env", "dev")])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn test_set_expressions() {
        let selector =
            parse_selector("env in (prod, staging),team notin (legacy)").expect("Should parse");
        assert_eq!(
            expressions(selector.clone()),
            vec![
                Expression::In(
                    "env".into(),
                    BTreeSet::from(["prod".to_string(), "staging".to_string()])
                ),
                Expression::NotIn("team".into(), BTreeSet::from(["legacy".to_string()])),
            ]
        );

        assert!(selector.matches(&labels(&[("env", "prod")])));
        assert!(selector.matches(&labels(&[("env", "staging"), ("team", "edge")])));
        assert!(!selector.matches(&labels(&[("env", "dev")])));
        assert!(!selector.matches(&labels(&[("env", "prod"), ("team", "legacy")])));
        // `in` requires the key to be present
        assert!(!selector.matches(&labels(&[("team", "edge")])));
    }

    #[test]
    fn test_existence_expressions() {
        let selector = parse_selector("managed,!deprecated").expect("Should parse");

        assert!(selector.matches(&labels(&[("managed", "")])));
        assert!(!selector.matches(&labels(&[("managed", "yes"), ("deprecated", "true")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_invalid_selectors_rejected() {
        for input in ["app=edge,", "env in (prod", "env in ()", "env within (a)", "a b=c", "x)"] {
            let result = parse_selector(input);
            assert!(
                matches!(result, Err(InformerError::InvalidSelector(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_rendered_selector_parses_back() {
        let selector = parse_selector("app=edge, env in (staging,prod), !legacy").expect("Should parse");
        let rendered = selector.to_string();
        assert_eq!(rendered, "app=edge,env in (prod,staging),!legacy");

        let reparsed = parse_selector(&rendered).expect("Rendered selector should parse");
        assert_eq!(reparsed, selector);
    }
}
