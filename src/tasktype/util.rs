//! Shared config validation helpers for task types.

use crate::quest::{ConfigProblem, ConfigValue, TaskConfig};

fn location(root: &str, field: &str) -> String {
    format!("{}.{}", root, field)
}

/// Push an error when `field` is missing. Returns whether it is present.
pub fn validate_exists(
    root: &str,
    config: &TaskConfig,
    field: &str,
    type_id: &str,
    problems: &mut Vec<ConfigProblem>,
) -> bool {
    if config.get(field).is_some() {
        return true;
    }
    problems.push(ConfigProblem::error(
        &location(root, field),
        format!("required field '{}' is missing for task type '{}'", field, type_id),
    ));
    false
}

/// Push an error unless `field` holds an integer in the allowed range.
///
/// A missing field is not reported here; pair with [`validate_exists`].
pub fn validate_int(
    root: &str,
    config: &TaskConfig,
    field: &str,
    allow_negative: bool,
    allow_zero: bool,
    problems: &mut Vec<ConfigProblem>,
) -> bool {
    let Some(value) = config.get(field) else {
        return true;
    };
    let at = location(root, field);
    let ConfigValue::Integer(n) = value else {
        problems.push(ConfigProblem::error(
            &at,
            format!("expected an integer for '{}', found {}", field, value.kind()),
        ));
        return false;
    };
    if *n < 0 && !allow_negative {
        problems.push(ConfigProblem::error(&at, format!("'{}' must not be negative", field)));
        return false;
    }
    if *n == 0 && !allow_zero {
        problems.push(ConfigProblem::error(&at, format!("'{}' must not be zero", field)));
        return false;
    }
    true
}

/// Push an error unless `field` holds text.
pub fn validate_text(
    root: &str,
    config: &TaskConfig,
    field: &str,
    problems: &mut Vec<ConfigProblem>,
) -> bool {
    match config.get(field) {
        None | Some(ConfigValue::Text(_)) => true,
        Some(other) => {
            problems.push(ConfigProblem::error(
                &location(root, field),
                format!("expected text for '{}', found {}", field, other.kind()),
            ));
            false
        }
    }
}
