//! Typed-operator condition evaluation.

use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionData {
    pub variable: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
}

/// Evaluate `condition` against an already-resolved context value. `ctx` is
/// `None` for MISSING and `Some(&Value::Null)` for present-but-null, per the
/// path resolver's sentinel rules; both are treated as null for coercion.
pub fn evaluate(condition: &ConditionData, ctx: Option<&Value>) -> bool {
    let (Some(operator), Some(value)) = (condition.operator.as_deref(), condition.value.as_deref())
    else {
        tracing::warn!(
            variable = ?condition.variable,
            "condition missing operator or value; treating as false"
        );
        return false;
    };
    let ctx_value = ctx.unwrap_or(&Value::Null);

    match operator {
        "equals" => smart_equals(ctx_value, value),
        "not_equals" => !smart_equals(ctx_value, value),
        "greater_than" => numeric_cmp(ctx_value, value, |a, b| a > b),
        "less_than" => numeric_cmp(ctx_value, value, |a, b| a < b),
        "greater_equals" => numeric_cmp(ctx_value, value, |a, b| a >= b),
        "less_equals" => numeric_cmp(ctx_value, value, |a, b| a <= b),
        "contains" => string_test(ctx_value, |s| s.contains(value)),
        "starts_with" => string_test(ctx_value, |s| s.starts_with(value)),
        "ends_with" => string_test(ctx_value, |s| s.ends_with(value)),
        "matches_regex" => match Regex::new(value) {
            Ok(re) => string_test(ctx_value, |s| re.is_match(&s)),
            Err(err) => {
                tracing::error!(pattern = value, error = %err, "invalid matches_regex pattern");
                false
            }
        },
        "exists" => !ctx_value.is_null(),
        "not_exists" => ctx_value.is_null(),
        "is_number" => matches!(ctx_value, Value::Number(n) if !n.is_nan()),
        "is_text" => matches!(ctx_value, Value::String(_)),
        "is_boolean" => matches!(ctx_value, Value::Bool(_)),
        "is_array" => matches!(ctx_value, Value::List(_)),
        "is_true" => matches!(ctx_value, Value::Bool(true)),
        "is_false" => matches!(ctx_value, Value::Bool(false)),
        other => {
            tracing::warn!(operator = other, "unknown condition operator; treating as false");
            false
        }
    }
}

fn smart_equals(ctx: &Value, value: &str) -> bool {
    match ctx {
        Value::Number(n) => value.trim().parse::<f64>().map(|v| v == *n).unwrap_or(false),
        Value::Bool(b) => match value.to_ascii_lowercase().as_str() {
            "true" => *b,
            "false" => !*b,
            _ => false,
        },
        Value::Null => value.is_empty(),
        other => other.to_display_string() == value,
    }
}

fn numeric_cmp(ctx: &Value, value: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let ctx_num = match ctx {
        Value::Number(n) => *n,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(value = %s, "context value is not numeric");
                return false;
            }
        },
        _ => {
            tracing::warn!("context value is not numeric");
            return false;
        }
    };
    match value.trim().parse::<f64>() {
        Ok(target) => cmp(ctx_num, target),
        Err(_) => {
            tracing::warn!(value, "condition value is not numeric");
            false
        }
    }
}

fn string_test(ctx: &Value, test: impl Fn(String) -> bool) -> bool {
    if ctx.is_null() {
        return false;
    }
    test(ctx.to_display_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(operator: &str, value: &str) -> ConditionData {
        ConditionData {
            variable: Some("x".into()),
            operator: Some(operator.into()),
            value: Some(value.into()),
        }
    }

    #[test]
    fn smart_equals_numeric() {
        assert!(evaluate(&cond("equals", "200"), Some(&Value::Number(200.0))));
        assert!(!evaluate(&cond("equals", "200x"), Some(&Value::Number(200.0))));
    }

    #[test]
    fn smart_equals_bool_case_insensitive() {
        assert!(evaluate(&cond("equals", "TRUE"), Some(&Value::Bool(true))));
    }

    #[test]
    fn smart_equals_null_and_empty_string() {
        assert!(evaluate(&cond("equals", ""), Some(&Value::Null)));
        assert!(evaluate(&cond("equals", ""), None));
    }

    #[test]
    fn numeric_comparisons_coerce_strings() {
        assert!(evaluate(
            &cond("greater_than", "10"),
            Some(&Value::String("15".into()))
        ));
    }

    #[test]
    fn numeric_comparison_false_on_parse_failure() {
        assert!(!evaluate(
            &cond("greater_than", "abc"),
            Some(&Value::Number(1.0))
        ));
    }

    #[test]
    fn contains_false_on_null() {
        assert!(!evaluate(&cond("contains", "x"), Some(&Value::Null)));
    }

    #[test]
    fn exists_handles_missing_and_null() {
        assert!(!evaluate(&cond("exists", ""), None));
        assert!(!evaluate(&cond("exists", ""), Some(&Value::Null)));
        assert!(evaluate(&cond("exists", ""), Some(&Value::Number(1.0))));
    }

    #[test]
    fn is_number_excludes_bool_and_nan() {
        assert!(!evaluate(&cond("is_number", ""), Some(&Value::Bool(true))));
        assert!(!evaluate(&cond("is_number", ""), Some(&Value::Number(f64::NAN))));
        assert!(evaluate(&cond("is_number", ""), Some(&Value::Number(3.0))));
    }

    #[test]
    fn unknown_operator_is_false() {
        assert!(!evaluate(&cond("frobnicate", "x"), Some(&Value::Number(1.0))));
    }

    #[test]
    fn missing_operator_is_false() {
        let c = ConditionData {
            variable: Some("x".into()),
            operator: None,
            value: Some("1".into()),
        };
        assert!(!evaluate(&c, Some(&Value::Number(1.0))));
    }
}
