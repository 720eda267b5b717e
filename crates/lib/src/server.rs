//! HTTP server: Slack interaction endpoint and health probe.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::context::RequestContext;
use crate::interaction::{InboundCallback, InteractionReply, InteractionRouter, MalformedRequest};
use crate::remote::RemoteGateway;
use crate::signature::{AuthFailure, SignatureContext, SignatureVerifier};
use crate::transport::{HttpTransport, ReqwestTransport};

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared, read-only state for all requests.
#[derive(Clone)]
pub struct AppState {
    /// Trimmed signing secret; empty when unset (every request is then rejected).
    pub signing_secret: Arc<str>,
    pub verifier: SignatureVerifier,
    pub router: InteractionRouter,
    pub allowed_hosts: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(config: RelayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let remote = RemoteGateway::new(&config, transport);
        Self {
            signing_secret: Arc::from(config.signing_secret()),
            verifier: SignatureVerifier::new(config.slack.debug),
            router: InteractionRouter::new(remote),
            allowed_hosts: Arc::new(config.allowed_hosts()),
        }
    }
}

/// Terminal rejections at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Auth(#[from] AuthFailure),
    #[error(transparent)]
    Malformed(#[from] MalformedRequest),
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        match self {
            ActionError::Auth(_) => (StatusCode::FORBIDDEN, "Unauthorized").into_response(),
            ActionError::Malformed(_) => (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
        }
    }
}

impl IntoResponse for InteractionReply {
    fn into_response(self) -> Response {
        match self {
            InteractionReply::Empty => StatusCode::OK.into_response(),
            InteractionReply::Json(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}

/// Routes plus host authorization.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_http))
        .route("/slack/actions", post(slack_actions))
        .route("/actions", post(slack_actions))
        .layer(middleware::from_fn_with_state(state.clone(), authorize_host))
        .with_state(state)
}

/// Run the relay on config.server.bind:config.server.port until SIGINT/SIGTERM.
pub async fn run_server(config: RelayConfig) -> Result<()> {
    for missing in config.missing_settings() {
        log::warn!("setting not configured: {}", missing);
    }
    let transport = ReqwestTransport::new(Some(OUTBOUND_TIMEOUT)).context("building http client")?;
    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let state = AppState::new(config, Arc::new(transport));
    log::info!("host authorization permitted_hosts={:?}", state.allowed_hosts);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Strip an optional port (and IPv6 brackets) from a Host header value.
fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Exact match, or for entries starting with "." the domain itself and any subdomain.
pub fn host_permitted(host: &str, allowed: &[String]) -> bool {
    let host = host_without_port(host.trim()).to_ascii_lowercase();
    allowed.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        match entry.strip_prefix('.') {
            Some(domain) => host == domain || host.ends_with(&entry),
            None => host == entry,
        }
    })
}

async fn authorize_host(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));
    match host {
        Some(ref h) if host_permitted(h, &state.allowed_hosts) => next.run(request).await,
        _ => {
            log::warn!("rejected request for host {:?}", host);
            (StatusCode::FORBIDDEN, "Host not permitted").into_response()
        }
    }
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /slack/actions: verify signature against the raw body, decode the payload, route it.
async fn slack_actions(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<InteractionReply, ActionError> {
    let ctx = RequestContext::new();
    ctx.log_event("request.received", None, Some(&format!("{} {}", method, uri.path())));

    let sig = SignatureContext::from_headers(&headers, &body, &state.signing_secret);
    state.verifier.verify(&ctx, &sig)?;

    let callback = InboundCallback::from_form_body(&body).map_err(|e| {
        ctx.warn_event("payload.rejected", Some("400"), Some(&e.to_string()));
        e
    })?;
    ctx.log_event("interaction.decoded", None, Some(&format!("type={}", callback.kind())));

    let reply = state.router.route(&ctx, callback).await.map_err(|e| {
        ctx.warn_event("payload.rejected", Some("400"), Some(&e.to_string()));
        e
    })?;
    ctx.log_event("request.responded", Some("200"), None);
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_ports_and_brackets() {
        assert_eq!(host_without_port("localhost:4567"), "localhost");
        assert_eq!(host_without_port("[::1]:4567"), "::1");
        assert_eq!(host_without_port("::1"), "::1");
        assert_eq!(host_without_port("example.com"), "example.com");
    }

    #[test]
    fn dotted_entries_match_subdomains() {
        let allowed = hosts(&[".up.railway.app", "localhost"]);
        assert!(host_permitted("relay-production.up.railway.app", &allowed));
        assert!(host_permitted("up.railway.app", &allowed));
        assert!(host_permitted("LOCALHOST:4567", &allowed));
        assert!(!host_permitted("evil-up.railway.app.example.com", &allowed));
        assert!(!host_permitted("notup.railway.app", &allowed));
        assert!(!host_permitted("example.com", &allowed));
    }

    #[test]
    fn default_hosts_include_loopback_v6() {
        let allowed = RelayConfig::default().allowed_hosts();
        assert!(host_permitted("[::1]:4567", &allowed));
        assert!(host_permitted("127.0.0.1:4567", &allowed));
    }
}
