//! Gateway relay
//!
//! Public edge in front of the conversation service. It tags the inbound
//! body with the caller identifier, POSTs it to the configured upstream once,
//! and wraps whatever comes back in a `{success, ...}` envelope with CORS
//! headers attached.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::config::{ConfigError, GatewayConfig};
use crate::core::GenerationResponse;
use crate::error::RelayError;

/// Header a caller may use to supply its own identifier
pub const FUNCTION_ARN_HEADER: &str = "x-invoked-function-arn";

const ALLOW_HEADERS: &str =
    "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token";
const ALLOW_METHODS: &str = "OPTIONS,POST";

/// One inbound invocation
#[derive(Debug, Clone)]
pub struct RelayEvent {
    /// Raw JSON body as received
    pub body: Option<Bytes>,
    /// Identifier of the invocation context
    pub invoked_function_arn: String,
}

/// Envelope returned to the public caller
#[derive(Debug)]
pub struct RelayResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        (self.status, cors_headers(), Json(self.body)).into_response()
    }
}

fn cors_headers() -> [(axum::http::HeaderName, HeaderValue); 3] {
    [
        (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        (ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS)),
        (ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS)),
    ]
}

pub struct GatewayRelay {
    client: Client,
    upstream_url: String,
}

impl GatewayRelay {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            upstream_url: config.upstream_url.clone(),
        })
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Forward the event upstream and return the decoded reply
    pub async fn forward(&self, event: RelayEvent) -> Result<GenerationResponse, RelayError> {
        let mut payload = parse_body(event.body.as_deref())?;
        payload.insert(
            "invoked_function_arn".to_string(),
            Value::String(event.invoked_function_arn),
        );

        tracing::debug!(upstream = %self.upstream_url, "Forwarding request");

        let response = self
            .client
            .post(&self.upstream_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(RelayError::UpstreamResponse(format!(
                "HTTP {}: {}",
                status, detail
            )));
        }

        Ok(response.json().await?)
    }

    /// Forward the event and wrap the outcome for the public caller
    pub async fn relay(&self, event: RelayEvent) -> RelayResponse {
        match self.forward(event).await {
            Ok(reply) => RelayResponse {
                status: StatusCode::OK,
                body: json!({
                    "success": true,
                    "response": reply.generated_text,
                    "conversationHistory": reply.conversation_history,
                }),
            },
            Err(err) => {
                tracing::warn!(error = %err, "Relay failed");
                RelayResponse {
                    status: err.status_code(),
                    body: json!({ "success": false, "error": err.to_string() }),
                }
            }
        }
    }
}

fn parse_body(body: Option<&[u8]>) -> Result<Map<String, Value>, RelayError> {
    let body = match body {
        Some(body) if !body.iter().all(u8::is_ascii_whitespace) => body,
        _ => return Ok(Map::new()),
    };

    let body = std::str::from_utf8(body).map_err(|e| {
        RelayError::MalformedRequest(format!("request body is not UTF-8: {}", e))
    })?;

    match serde_json::from_str(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RelayError::MalformedRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(RelayError::MalformedRequest(format!("invalid JSON body: {}", e))),
    }
}

#[derive(Clone)]
struct GatewayState {
    relay: Arc<GatewayRelay>,
    function_arn: String,
}

async fn invoke(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> RelayResponse {
    let invoked_function_arn = headers
        .get(FUNCTION_ARN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.function_arn.clone());

    state
        .relay
        .relay(RelayEvent {
            body: Some(body),
            invoked_function_arn,
        })
        .await
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, cors_headers())
}

/// Router serving the relay at `/`
pub fn router(relay: Arc<GatewayRelay>, function_arn: String) -> Router {
    Router::new()
        .route("/", post(invoke).options(preflight))
        .with_state(GatewayState { relay, function_arn })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::{lookup_from, GatewaySection};

    /// Upstream that echoes the caller identifier back as the generated text
    async fn spawn_upstream() -> SocketAddr {
        async fn echo(Json(body): Json<Value>) -> Response {
            match body.get("prompt").and_then(Value::as_str) {
                Some("fail") => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "model exploded" })),
                )
                    .into_response(),
                Some(prompt) => {
                    let arn = body["invoked_function_arn"].as_str().unwrap_or_default();
                    Json(json!({
                        "generated_text": arn,
                        "conversation_history": [
                            { "role": "user", "content": prompt },
                            { "role": "assistant", "content": arn }
                        ]
                    }))
                    .into_response()
                }
                None => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "detail": "no prompt" })),
                )
                    .into_response(),
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(echo));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn relay_to(url: String) -> GatewayRelay {
        let lookup = lookup_from(&[("UPSTREAM_URL", url.as_str())]);
        let config = GatewayConfig::resolve(GatewaySection::default(), lookup).unwrap();
        GatewayRelay::new(&config).unwrap()
    }

    fn event(body: &'static str, arn: &str) -> RelayEvent {
        RelayEvent {
            body: Some(Bytes::from_static(body.as_bytes())),
            invoked_function_arn: arn.to_string(),
        }
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(None).unwrap().is_empty());
        assert!(parse_body(Some(&b"  "[..])).unwrap().is_empty());
        assert_eq!(parse_body(Some(&br#"{"prompt":"hi"}"#[..])).unwrap()["prompt"], "hi");
        assert!(matches!(
            parse_body(Some(&b"[1, 2]"[..])),
            Err(RelayError::MalformedRequest(_))
        ));
        assert!(matches!(
            parse_body(Some(&b"{nope"[..])),
            Err(RelayError::MalformedRequest(_))
        ));
        assert!(matches!(
            parse_body(Some(&b"{\"prompt\":\"\xff\"}"[..])),
            Err(RelayError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_client_with_timeout_builds() {
        let lookup = lookup_from(&[
            ("UPSTREAM_URL", "http://127.0.0.1:9/"),
            ("GATEWAY_TIMEOUT_SECS", "5"),
        ]);
        let config = GatewayConfig::resolve(GatewaySection::default(), lookup).unwrap();

        let relay = GatewayRelay::new(&config).unwrap();
        assert_eq!(relay.upstream_url(), "http://127.0.0.1:9/");
    }

    #[tokio::test]
    async fn test_relay_attaches_identifier() {
        let addr = spawn_upstream().await;
        let relay = relay_to(format!("http://{}/", addr));

        let response = relay
            .relay(event(
                r#"{"prompt":"hello","conversation_history":[]}"#,
                "arn:aws:lambda:us-west-2:1:function:f",
            ))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["success"], true);
        assert_eq!(response.body["response"], "arn:aws:lambda:us-west-2:1:function:f");
        assert_eq!(
            response.body["conversationHistory"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_upstream_error_detail_surfaces() {
        let addr = spawn_upstream().await;
        let relay = relay_to(format!("http://{}/", addr));

        let response = relay
            .relay(event(r#"{"prompt":"fail"}"#, ""))
            .await;

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.body["success"], false);
        assert!(response.body["error"].as_str().unwrap().contains("model exploded"));
        assert!(response.body.get("conversationHistory").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let relay = relay_to(format!("http://{}/", addr));

        let err = relay
            .forward(event(r#"{"prompt":"hello"}"#, ""))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::UpstreamTransport(_)));
    }

    #[tokio::test]
    async fn test_router_uses_header_then_default_arn() {
        let addr = spawn_upstream().await;
        let relay = Arc::new(relay_to(format!("http://{}/", addr)));
        let app = router(relay, "arn:aws:lambda:eu-west-1:1:function:default".to_string());

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"prompt":"hello"}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["response"], "arn:aws:lambda:eu-west-1:1:function:default");

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(FUNCTION_ARN_HEADER, "arn:aws:lambda:us-west-2:1:function:caller")
            .body(Body::from(r#"{"prompt":"hello"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["response"], "arn:aws:lambda:us-west-2:1:function:caller");
    }

    #[tokio::test]
    async fn test_non_utf8_body_gets_envelope() {
        let relay = Arc::new(relay_to("http://127.0.0.1:9/".to_string()));
        let app = router(relay, String::new());

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b'{', 0xff, 0xfe, b'}']))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_preflight_returns_cors_headers() {
        let relay = Arc::new(relay_to("http://127.0.0.1:9/".to_string()));
        let app = router(relay, String::new());

        let req = Request::builder()
            .method("OPTIONS")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_METHODS], "OPTIONS,POST");
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
