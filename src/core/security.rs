use std::env;

use axum::http::HeaderMap;

use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared API key for the admin and chat routes.
///
/// Read once at startup from `SMARTCOAT_API_KEY`; when unset the check is
/// disabled (local development).
#[derive(Debug, Clone, Default)]
pub struct ApiKey {
    value: Option<String>,
}

impl ApiKey {
    pub fn from_env() -> Self {
        let value = env::var("SMARTCOAT_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if value.is_none() {
            tracing::warn!("SMARTCOAT_API_KEY is not set; API key check disabled");
        }

        ApiKey { value }
    }

    #[cfg(test)]
    pub fn fixed(value: &str) -> Self {
        ApiKey {
            value: Some(value.to_string()),
        }
    }
}

pub fn require_api_key(headers: &HeaderMap, expected: &ApiKey) -> Result<(), ApiError> {
    let Some(expected) = expected.value.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided == expected {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn disabled_key_allows_everything() {
        let headers = HeaderMap::new();
        require_api_key(&headers, &ApiKey::default()).expect("no key configured");
    }

    #[test]
    fn matching_key_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("sekrit"));
        require_api_key(&headers, &ApiKey::fixed("sekrit")).expect("key matches");
    }

    #[test]
    fn missing_or_wrong_key_is_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(
            require_api_key(&headers, &ApiKey::fixed("sekrit")),
            Err(ApiError::Unauthorized)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("nope"));
        assert!(matches!(
            require_api_key(&headers, &ApiKey::fixed("sekrit")),
            Err(ApiError::Unauthorized)
        ));
    }
}
