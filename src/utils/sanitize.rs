use serde_json::Value;

/// Masks credentials, one-time tokens and card numbers in a gateway payload before logging.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

/// Sanitizes a raw response body, falling back to a length marker for non-JSON text.
pub fn sanitize_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => sanitize_json(&value).to_string(),
        Err(_) if body.len() > 256 => format!("<{} bytes>", body.len()),
        Err(_) => body.to_string(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "nonce"
            | "token"
            | "accesstoken"
            | "access_token"
            | "client_token"
            | "authorization"
            | "client_secret"
            | "secret"
            | "password"
            | "number"
            | "card_number"
            | "cvv"
            | "cvc"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        Value::Null => Value::Null,
        _ => Value::String("****".to_string()),
    }
}
