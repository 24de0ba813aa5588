//! Outbound HTTP actions: `http_request` and `webhook`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;

use super::params::{present, required_str, secs_or, str_param, string_pairs};
use super::ActionHandler;
use crate::errors::ActionError;
use crate::models::value::{Map, Params, Value};

fn parse_method(raw: Option<&str>, default: Method) -> Result<Method, ActionError> {
    match raw.filter(|m| !m.is_empty()) {
        None => Ok(default),
        Some(m) => m
            .to_uppercase()
            .parse::<Method>()
            .map_err(|_| ActionError::InvalidParams(format!("invalid HTTP method: {m}"))),
    }
}

fn header_map(pairs: Vec<(String, String)>) -> Result<HeaderMap, ActionError> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ActionError::InvalidParams(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| ActionError::InvalidParams(format!("invalid value for header {name}")))?;
        headers.insert(header, value);
    }
    Ok(headers)
}

fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> ActionError {
    if e.is_timeout() {
        ActionError::Timeout(timeout_secs)
    } else {
        ActionError::Http(e)
    }
}

/// Response headers as a map; repeated headers are joined with `", "`.
fn joined_headers(headers: &HeaderMap) -> Map {
    let mut joined = Map::new();
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        joined.insert(name.as_str().to_string(), Value::from(values.join(", ")));
    }
    joined
}

fn is_success(status: reqwest::StatusCode) -> Value {
    Value::Bool(status.is_success())
}

/// Generic HTTP call with JSON or raw body in the result.
pub struct HttpRequest {
    client: reqwest::Client,
}

impl HttpRequest {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for HttpRequest {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let url = required_str(params, "url")?;
        let method = parse_method(str_param(params, "method"), Method::GET)?;
        let timeout = secs_or(params, "timeout", Self::DEFAULT_TIMEOUT_SECS);
        let headers = header_map(string_pairs(params, "headers"))?;

        tracing::info!(method = %method, url, timeout_secs = timeout, "HTTP request action");

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(Duration::from_secs(timeout));
        if let Some(body) = present(params, "body") {
            request = request.json(&serde_json::Value::from(body));
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;
        let status = response.status();

        let response_headers = joined_headers(response.headers());

        let text = response
            .text()
            .await
            .map_err(|e| map_send_error(e, timeout))?;
        let body = serde_json::from_str::<serde_json::Value>(&text)
            .map(Value::from)
            .unwrap_or(Value::String(text));

        Ok(Value::map([
            ("status_code", Value::Int(i64::from(status.as_u16()))),
            ("headers", Value::Map(response_headers)),
            ("body", body),
            ("success", is_success(status)),
        ]))
    }
}

/// JSON POST (by default) to a webhook URL.
pub struct Webhook {
    client: reqwest::Client,
}

impl Webhook {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn default_payload() -> Value {
        Value::map([
            ("event", Value::from("incident")),
            (
                "timestamp",
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ),
        ])
    }
}

#[async_trait]
impl ActionHandler for Webhook {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let url = required_str(params, "url")?;
        let method = parse_method(str_param(params, "method"), Method::POST)?;
        let timeout = secs_or(params, "timeout", Self::DEFAULT_TIMEOUT_SECS);
        let mut headers = header_map(string_pairs(params, "headers"))?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let payload = present(params, "payload")
            .cloned()
            .unwrap_or_else(Self::default_payload);
        let body = serde_json::to_vec(&serde_json::Value::from(&payload))
            .map_err(|e| ActionError::InvalidParams(format!("payload is not serializable: {e}")))?;

        tracing::info!(method = %method, url, timeout_secs = timeout, "Webhook action");

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .timeout(Duration::from_secs(timeout))
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        if !status.is_success() {
            tracing::warn!(url, %status, "Webhook returned non-2xx status");
        }

        Ok(Value::map([
            ("status_code", Value::Int(i64::from(status.as_u16()))),
            ("response", Value::from(text)),
            ("success", is_success(status)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        response::AppendHeaders,
        routing::{get, post},
        Json, Router,
    };
    use tokio::net::TcpListener;

    /// Local server echoing request details back as JSON.
    async fn echo_server() -> String {
        async fn echo(headers: axum::http::HeaderMap, body: String) -> Json<serde_json::Value> {
            let content_type = headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let trace = headers
                .get("x-trace")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(serde_json::json!({
                "content_type": content_type,
                "trace": trace,
                "body": body,
            }))
        }

        let app = Router::new()
            .route("/echo", post(echo))
            .route("/plain", post(|| async { "accepted" }))
            .route(
                "/cookies",
                get(|| async {
                    (
                        AppendHeaders([("set-cookie", "a=1"), ("set-cookie", "b=2")]),
                        "ok",
                    )
                }),
            )
            .route(
                "/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    fn params(json: serde_json::Value) -> Params {
        match Value::from(json) {
            Value::Map(m) => m,
            _ => Params::new(),
        }
    }

    #[tokio::test]
    async fn http_request_requires_url() {
        let err = HttpRequest::new(reqwest::Client::new())
            .execute(&Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn http_request_rejects_bad_method() {
        let err = HttpRequest::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({"url": "http://127.0.0.1:9", "method": "GE T"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn http_request_parses_json_body() {
        let base = echo_server().await;
        let out = HttpRequest::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({
                "url": format!("{base}/echo"),
                "method": "post",
                "headers": {"X-Trace": "abc"},
                "body": {"ip": "10.0.0.1"}
            })))
            .await
            .unwrap();
        assert_eq!(out.get_path("status_code"), Some(&Value::Int(200)));
        assert_eq!(out.get_path("success"), Some(&Value::Bool(true)));
        assert_eq!(out.get_path("body.trace"), Some(&Value::from("abc")));
        assert_eq!(
            out.get_path("body.body"),
            Some(&Value::from(r#"{"ip":"10.0.0.1"}"#))
        );
    }

    #[tokio::test]
    async fn http_request_keeps_raw_text_body() {
        let base = echo_server().await;
        let out = HttpRequest::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({"url": format!("{base}/plain"), "method": "POST"})))
            .await
            .unwrap();
        assert_eq!(out.get_path("body"), Some(&Value::from("accepted")));
    }

    #[tokio::test]
    async fn http_request_reports_non_2xx_as_result() {
        let base = echo_server().await;
        let out = HttpRequest::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({"url": format!("{base}/missing")})))
            .await
            .unwrap();
        assert_eq!(out.get_path("status_code"), Some(&Value::Int(404)));
        assert_eq!(out.get_path("success"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn webhook_sends_default_payload_as_json() {
        let base = echo_server().await;
        let out = Webhook::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({
                "url": format!("{base}/echo"),
                "headers": {"Content-Type": "text/plain"}
            })))
            .await
            .unwrap();
        assert_eq!(out.get_path("success"), Some(&Value::Bool(true)));

        let response = out.get_path("response").and_then(Value::as_str).unwrap();
        let echoed: serde_json::Value = serde_json::from_str(response).unwrap();
        assert_eq!(echoed["content_type"], "application/json");
        let sent: serde_json::Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent["event"], "incident");
        assert!(sent["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn http_request_joins_repeated_response_headers() {
        let base = echo_server().await;
        let out = HttpRequest::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({"url": format!("{base}/cookies")})))
            .await
            .unwrap();
        assert_eq!(
            out.get_path("headers.set-cookie"),
            Some(&Value::from("a=1, b=2"))
        );
    }

    #[tokio::test]
    async fn webhook_honours_timeout_param() {
        let base = echo_server().await;
        let err = Webhook::new(reqwest::Client::new())
            .execute(&params(serde_json::json!({
                "url": format!("{base}/slow"),
                "timeout": 1
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Timeout(1)));
    }
}
