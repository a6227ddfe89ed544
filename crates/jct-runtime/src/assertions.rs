// SPDX-License-Identifier: MIT OR Apache-2.0
//! Assertion helpers for check bodies.
//!
//! Every helper returns `Err(AssertionFailure)` on mismatch so a body can
//! bail out with `?`. The optional `message` replaces the default text.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

/// A failed assertion inside a check body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AssertionFailure {
    /// What went wrong.
    pub message: String,
}

impl AssertionFailure {
    /// A failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Shorthand for assertion results.
pub type Check<T = ()> = Result<T, AssertionFailure>;

const EXCERPT: usize = 200;

fn render<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".into())
}

fn fail(message: Option<&str>, default: impl FnOnce() -> String) -> AssertionFailure {
    AssertionFailure::new(message.map_or_else(default, str::to_string))
}

fn excerpt(s: &str) -> &str {
    match s.char_indices().nth(EXCERPT) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// JSON type name of a value: `null`, `boolean`, `number`, `string`,
/// `array` or `object`.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""` are falsy. Absent
/// properties index as `null` and are falsy too.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Structural equality. Arrays compare in order, objects by key set then
/// values, numbers by numeric value. No coercion between types.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Fail with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> Check {
    if condition {
        Ok(())
    } else {
        Err(AssertionFailure::new(message))
    }
}

/// `actual == expected`.
pub fn ensure_eq<T>(actual: &T, expected: &T, message: Option<&str>) -> Check
where
    T: PartialEq + Serialize + ?Sized,
{
    if actual == expected {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected {}, got {}", render(expected), render(actual))
    }))
}

/// `actual != unexpected`.
pub fn ensure_ne<T>(actual: &T, unexpected: &T, message: Option<&str>) -> Check
where
    T: PartialEq + Serialize + ?Sized,
{
    if actual != unexpected {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected value to differ from {}", render(unexpected))
    }))
}

/// Structural JSON equality, see [`json_equal`].
pub fn ensure_deep_eq(actual: &Value, expected: &Value, message: Option<&str>) -> Check {
    if json_equal(actual, expected) {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Deep equality failed.\nExpected: {expected:#}\nActual:   {actual:#}")
    }))
}

/// The value is truthy, see [`is_truthy`].
pub fn ensure_truthy(value: &Value, message: Option<&str>) -> Check {
    if is_truthy(value) {
        return Ok(());
    }
    Err(fail(message, || format!("Expected truthy value, got {value}")))
}

/// The value is falsy, see [`is_truthy`].
pub fn ensure_falsy(value: &Value, message: Option<&str>) -> Check {
    if !is_truthy(value) {
        return Ok(());
    }
    Err(fail(message, || format!("Expected falsy value, got {value}")))
}

/// `items` contains `item`.
pub fn ensure_includes<T>(items: &[T], item: &T, message: Option<&str>) -> Check
where
    T: PartialEq + Serialize,
{
    if items.contains(item) {
        return Ok(());
    }
    Err(fail(message, || {
        format!(
            "Expected array to include {}, got {}",
            render(item),
            render(items)
        )
    }))
}

/// `items` does not contain `item`.
pub fn ensure_not_includes<T>(items: &[T], item: &T, message: Option<&str>) -> Check
where
    T: PartialEq + Serialize,
{
    if !items.contains(item) {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected array to NOT include {}", render(item))
    }))
}

/// `object` is a JSON object holding `key` (a `null` value counts).
pub fn ensure_has_property(object: &Value, key: &str, message: Option<&str>) -> Check {
    if object.as_object().is_some_and(|o| o.contains_key(key)) {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected object to have property '{key}'")
    }))
}

/// `value` has the JSON type `expected` (see [`json_type`]).
pub fn ensure_type(value: &Value, expected: &str, message: Option<&str>) -> Check {
    let actual = json_type(value);
    if actual == expected {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected type '{expected}', got '{actual}'")
    }))
}

/// `actual > min`.
pub fn ensure_gt<T: PartialOrd + Display>(actual: T, min: T, message: Option<&str>) -> Check {
    if actual > min {
        return Ok(());
    }
    Err(fail(message, || format!("Expected {actual} > {min}")))
}

/// `actual >= min`.
pub fn ensure_ge<T: PartialOrd + Display>(actual: T, min: T, message: Option<&str>) -> Check {
    if actual >= min {
        return Ok(());
    }
    Err(fail(message, || format!("Expected {actual} >= {min}")))
}

/// `actual < max`.
pub fn ensure_lt<T: PartialOrd + Display>(actual: T, max: T, message: Option<&str>) -> Check {
    if actual < max {
        return Ok(());
    }
    Err(fail(message, || format!("Expected {actual} < {max}")))
}

/// `items.len() == expected`.
pub fn ensure_len<T>(items: &[T], expected: usize, message: Option<&str>) -> Check {
    if items.len() == expected {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected array length {expected}, got {}", items.len())
    }))
}

/// `haystack` contains `needle`.
pub fn ensure_contains(haystack: &str, needle: &str, message: Option<&str>) -> Check {
    if haystack.contains(needle) {
        return Ok(());
    }
    Err(fail(message, || {
        format!(
            "Expected string to contain '{needle}', got '{}'",
            excerpt(haystack)
        )
    }))
}

/// `text` matches the regular expression `pattern`.
pub fn ensure_matches(text: &str, pattern: &str, message: Option<&str>) -> Check {
    let re = Regex::new(pattern)
        .map_err(|e| AssertionFailure::new(format!("invalid pattern /{pattern}/: {e}")))?;
    if re.is_match(text) {
        return Ok(());
    }
    Err(fail(message, || {
        format!("Expected string to match /{pattern}/, got '{}'", excerpt(text))
    }))
}

/// `id` is a well-formed JMAP id.
pub fn ensure_id(id: &str, message: Option<&str>) -> Check {
    if jct_core::is_valid_id(id) {
        return Ok(());
    }
    Err(fail(message, || format!("Invalid JMAP Id format: '{id}'")))
}

// ---------------------------------------------------------------------------
// Accessors that fail like assertions
// ---------------------------------------------------------------------------

/// `value` as an array.
pub fn array<'a>(value: &'a Value, what: &str) -> Check<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| AssertionFailure::new(format!("Expected {what} to be an array, got {}", json_type(value))))
}

/// `value` as a string.
pub fn string<'a>(value: &'a Value, what: &str) -> Check<&'a str> {
    value
        .as_str()
        .ok_or_else(|| AssertionFailure::new(format!("Expected {what} to be a string, got {}", json_type(value))))
}

/// `value` as a non-negative integer.
pub fn count(value: &Value, what: &str) -> Check<u64> {
    value
        .as_u64()
        .ok_or_else(|| AssertionFailure::new(format!("Expected {what} to be a non-negative integer, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(json_equal(&json!(1), &json!(1.0)));
        assert!(!json_equal(&json!(1), &json!("1")));
        assert!(!json_equal(&json!(0), &json!(false)));
    }

    #[test]
    fn objects_compare_key_sets() {
        assert!(json_equal(&json!({"a": 1, "b": [1, 2]}), &json!({"b": [1, 2], "a": 1})));
        assert!(!json_equal(&json!({"a": 1}), &json!({"a": 1, "b": null})));
        assert!(!json_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn truthiness_follows_json() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!({})["absent"].clone()] {
            assert!(!is_truthy(&falsy), "{falsy}");
        }
        for truthy in [json!(true), json!(-1), json!("x"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy}");
        }
    }

    #[test]
    fn default_and_override_messages() {
        let err = ensure_eq(&json!(2), &json!(3), None).unwrap_err();
        assert_eq!(err.message, "Expected 3, got 2");
        let err = ensure_eq(&1, &2, Some("custom")).unwrap_err();
        assert_eq!(err.message, "custom");
    }

    #[test]
    fn type_names() {
        assert!(ensure_type(&json!([]), "array", None).is_ok());
        let err = ensure_type(&json!(null), "object", None).unwrap_err();
        assert_eq!(err.message, "Expected type 'object', got 'null'");
    }

    #[test]
    fn membership_and_properties() {
        let ids = vec![json!("a"), json!("b")];
        assert!(ensure_includes(&ids, &json!("a"), None).is_ok());
        assert!(ensure_not_includes(&ids, &json!("c"), None).is_ok());
        assert!(ensure_has_property(&json!({"k": null}), "k", None).is_ok());
        assert!(ensure_has_property(&json!([1]), "k", None).is_err());
    }

    #[test]
    fn ranges_and_lengths() {
        assert!(ensure_gt(2, 1, None).is_ok());
        assert!(ensure_ge(1, 1, None).is_ok());
        assert_eq!(ensure_lt(5, 5, None).unwrap_err().message, "Expected 5 < 5");
        assert!(ensure_len(&[1, 2], 2, None).is_ok());
    }

    #[test]
    fn strings_and_ids() {
        assert!(ensure_contains("hello world", "lo w", None).is_ok());
        let long = "y".repeat(500);
        let err = ensure_contains(&long, "z", None).unwrap_err();
        assert!(err.message.len() < 300);
        assert!(ensure_matches("s123", r"^s\d+$", None).is_ok());
        assert!(ensure_matches("x", "(", None).is_err());
        assert!(ensure_id("Mabc-_1", None).is_ok());
        assert_eq!(ensure_id("a b", None).unwrap_err().message, "Invalid JMAP Id format: 'a b'");
    }
}
