use serde::de::DeserializeOwned;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(src);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => Err(located(err)),
    }
}

/// Same as [`from_str_with_path`] for an already parsed value.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    match serde_path_to_error::deserialize::<_, T>(value) {
        Ok(v) => Ok(v),
        Err(err) => Err(located(err)),
    }
}

fn located<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> String {
    let path = err.path().to_string();
    if path == "." {
        err.into_inner().to_string()
    } else {
        format!("at JSON path {path} → {}", err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Envelope {
        code: String,
        retries: u32,
    }

    #[test]
    fn errors_name_the_offending_field() {
        let err = from_str_with_path::<Envelope>(r#"{"code": "x", "retries": "three"}"#).unwrap_err();
        assert!(err.starts_with("at JSON path retries"), "{err}");
    }

    #[test]
    fn root_level_errors_have_no_path_prefix() {
        let err = from_value_with_path::<Envelope>(serde_json::json!(7)).unwrap_err();
        assert!(!err.contains("JSON path"), "{err}");
    }
}
