use std::time::Duration;

use archive_logging::archive_trace;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::{ApiError, Params};

/// Remote error codes with special handling.
const CODE_UNKNOWN: i64 = 1;
const CODE_AUTH_FAILED: i64 = 5;
const CODE_TOO_MANY_REQUESTS: i64 = 6;
const CODE_INTERNAL: i64 = 10;
const CODE_RATE_LIMIT_REACHED: i64 = 29;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_version: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.vk.com".to_string(),
            api_version: "5.199".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The remote social-network API, one method call at a time.
#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError>;
}

/// `RemoteApi` over the VK HTTP endpoint.
#[derive(Debug, Clone)]
pub struct VkHttpClient {
    client: reqwest::Client,
    settings: ClientSettings,
    token: String,
}

impl VkHttpClient {
    pub fn new(token: impl Into<String>, settings: ClientSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::Transient(err.to_string()))?;
        Ok(Self {
            client,
            settings,
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/method/{method}", self.settings.base_url.trim_end_matches('/'))
    }

    fn encode_form(&self, params: &Params) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params.iter() {
            form.append_pair(key, value);
        }
        form.append_pair("access_token", &self.token);
        form.append_pair("v", &self.settings.api_version);
        form.finish()
    }
}

#[async_trait::async_trait]
impl RemoteApi for VkHttpClient {
    async fn call(&self, method: &str, params: &Params) -> Result<Value, ApiError> {
        archive_trace!("POST {method}");
        let response = self
            .client
            .post(self.method_url(method))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.encode_form(params))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ApiError::RateLimitExceeded);
        }
        if status.is_server_error() {
            return Err(ApiError::Transient(format!("http status {status}")));
        }
        if !status.is_success() {
            return Err(ApiError::Remote {
                code: i64::from(status.as_u16()),
                message: format!("http status {status}"),
            });
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let envelope: Value = serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::Transient(format!("malformed response body: {err}")))?;
        parse_envelope(envelope)
    }
}

/// Unwraps `{"response": ...}` or maps `{"error": {...}}` onto [`ApiError`].
pub fn parse_envelope(envelope: Value) -> Result<Value, ApiError> {
    let Value::Object(mut fields) = envelope else {
        return Err(ApiError::Transient("response is not an object".into()));
    };
    if let Some(error) = fields.get("error") {
        let code = error.get("error_code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(map_error_code(code, message));
    }
    fields
        .remove("response")
        .ok_or_else(|| ApiError::Transient("response field missing".into()))
}

pub fn map_error_code(code: i64, message: String) -> ApiError {
    match code {
        CODE_TOO_MANY_REQUESTS => ApiError::RateLimitExceeded,
        CODE_AUTH_FAILED => ApiError::Auth(message),
        CODE_RATE_LIMIT_REACHED => ApiError::QuotaExhausted,
        CODE_UNKNOWN | CODE_INTERNAL => ApiError::Transient(format!("remote error {code}: {message}")),
        _ => ApiError::Remote { code, message },
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Transient(format!("timeout: {err}"));
    }
    if err.is_connect() {
        return ApiError::Transient(format!("connect failed: {err}"));
    }
    ApiError::Transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_error_codes_map_to_kinds() {
        let err = |code: i64| {
            parse_envelope(json!({"error": {"error_code": code, "error_msg": "m"}})).unwrap_err()
        };
        assert_eq!(err(6), ApiError::RateLimitExceeded);
        assert_eq!(err(5), ApiError::Auth("m".into()));
        assert_eq!(err(29), ApiError::QuotaExhausted);
        assert!(matches!(err(10), ApiError::Transient(_)));
        assert_eq!(
            err(15),
            ApiError::Remote {
                code: 15,
                message: "m".into()
            }
        );
    }

    #[test]
    fn response_field_is_unwrapped() {
        assert_eq!(
            parse_envelope(json!({"response": {"count": 0, "items": []}})),
            Ok(json!({"count": 0, "items": []}))
        );
        assert!(parse_envelope(json!([1, 2])).is_err());
    }
}
