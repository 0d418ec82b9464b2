//! Step run conditions.
//!
//! Recognised forms:
//!
//! - empty or absent: always run
//! - `true` / `false`
//! - `${config.path}` / `${not config.path}`: truthiness of a config value
//! - `${steps.<id>.success}` / `${steps.<id>.skipped}` (and `not` forms):
//!   a field of an earlier step result; an unknown step reads as false
//!
//! Anything else evaluates to true and logs a warning.

use serde_json::Value;
use tracing::warn;

use super::result::StepResult;
use super::template::lookup;

/// Decide whether a step with this condition should run.
pub fn evaluate_condition(condition: Option<&str>, config: &Value, results: &[StepResult]) -> bool {
    let Some(condition) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
        return true;
    };

    if condition.eq_ignore_ascii_case("true") {
        return true;
    }
    if condition.eq_ignore_ascii_case("false") {
        return false;
    }

    let Some(expr) = condition
        .strip_prefix("${")
        .and_then(|c| c.strip_suffix('}'))
        .map(str::trim)
    else {
        return unrecognised(condition);
    };

    let (negated, expr) = match expr.strip_prefix("not ") {
        Some(rest) => (true, rest.trim()),
        None => (false, expr),
    };

    let value = if let Some(path) = expr.strip_prefix("config.") {
        lookup(path, config).map(truthy).unwrap_or(false)
    } else if let Some(rest) = expr.strip_prefix("steps.") {
        match rest.rsplit_once('.') {
            Some((step, "success")) => step_field(results, step, |r| r.success),
            Some((step, "skipped")) => step_field(results, step, |r| r.skipped),
            _ => return unrecognised(condition),
        }
    } else {
        return unrecognised(condition);
    };

    value != negated
}

fn step_field(results: &[StepResult], step: &str, field: impl Fn(&StepResult) -> bool) -> bool {
    results
        .iter()
        .find(|r| r.step_id == step)
        .map(field)
        .unwrap_or(false)
}

fn unrecognised(condition: &str) -> bool {
    warn!("Unrecognised condition '{}', treating as true", condition);
    true
}

/// Truthiness of a configuration value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::StepOutputs;
    use serde_json::json;

    fn eval(condition: &str, config: &Value) -> bool {
        evaluate_condition(Some(condition), config, &[])
    }

    #[test]
    fn absent_or_empty_is_true() {
        assert!(evaluate_condition(None, &json!({}), &[]));
        assert!(eval("   ", &json!({})));
    }

    #[test]
    fn literals() {
        assert!(eval("true", &json!({})));
        assert!(!eval("False", &json!({})));
    }

    #[test]
    fn config_truthiness() {
        let config = json!({
            "without_html": true,
            "zero": 0,
            "empty": "",
            "list": [1],
            "nested": {"on": 1},
        });
        assert!(eval("${config.without_html}", &config));
        assert!(!eval("${config.zero}", &config));
        assert!(!eval("${config.empty}", &config));
        assert!(eval("${config.list}", &config));
        assert!(eval("${config.nested.on}", &config));
        assert!(!eval("${config.missing}", &config));
    }

    #[test]
    fn negated_config() {
        assert!(!eval("${not config.without_html}", &json!({"without_html": true})));
        assert!(eval("${not config.without_html}", &json!({"without_html": false})));
        assert!(eval("${not config.without_html}", &json!({})));
    }

    #[test]
    fn step_results() {
        let results = vec![
            StepResult::completed("extraction", StepOutputs::new()),
            StepResult::skipped("visualization"),
        ];
        let config = json!({});

        assert!(evaluate_condition(Some("${steps.extraction.success}"), &config, &results));
        assert!(!evaluate_condition(Some("${steps.extraction.skipped}"), &config, &results));
        assert!(evaluate_condition(Some("${steps.visualization.skipped}"), &config, &results));
        assert!(!evaluate_condition(Some("${steps.ghost.success}"), &config, &results));
        assert!(evaluate_condition(Some("${not steps.ghost.success}"), &config, &results));
    }

    #[test]
    fn unrecognised_is_true() {
        assert!(eval("maybe", &json!({})));
        assert!(eval("${env.HOME}", &json!({})));
        assert!(eval("${steps.a.duration}", &json!({})));
    }
}
