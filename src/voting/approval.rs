use serde_json::Value;

/// Marker stored for an approved option in loosely typed session data.
pub const SELECTED: &str = "selected";

/// Approval input is valid when truthy: everything except `null` and `false`.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(is_truthy(&json!(SELECTED)));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
    }
}
