//! 🚪 The HTTP front door: six webhook endpoints, a liveness probe, and the
//! static report frontend.
//!
//! 🎬 *[a POST arrives. it says "ResponseID=R_abc". we say "200". we mean it.]*
//!
//! 🧠 Knowledge graph:
//! - Four endpoints ack with an empty 200 and hand the event to
//!   [`Pipeline::spawn_acknowledged`]. The survey platform never waits on a browser.
//! - The two Mindset-Athlete endpoints are synchronous: they run the pipeline
//!   inline and answer `{success, reportUrl}` or 500 `{error, details}`.
//! - Bodies are form-encoded or JSON, field names read loosely
//!   (see [`SurveyEvent::from_fields`]).
//! - Nothing a caller sends turns into a 4xx. Garbage gets a 200 and a `warn!`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::common::{ReportVariant, SurveyEvent};
use crate::pipeline::Pipeline;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// 📁 The built report frontend. `None` serves no static files.
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("build"))
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "https://psp-backend.fly.dev".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// 🔍 Form or JSON, flattened to strings. Anything unparseable is an empty bag.
pub fn parse_fields(headers: &HeaderMap, body: &[u8]) -> HashMap<String, String> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let looks_like_json = content_type.contains("json")
        || (content_type.is_empty() && body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{'));

    if looks_like_json {
        let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
            return HashMap::new();
        };
        map.into_iter()
            .filter_map(|(key, value)| {
                let flat = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, flat))
            })
            .collect()
    } else {
        url::form_urlencoded::parse(body).into_owned().collect()
    }
}

async fn handle_webhook(
    pipeline: Arc<Pipeline>,
    variant: ReportVariant,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let fields = parse_fields(&headers, &body);
    debug!("📨 {variant} webhook fields: {fields:?}");
    let Some(event) = SurveyEvent::from_fields(&fields) else {
        warn!("⚠️ {variant} webhook without a response id. Acknowledged and dropped.");
        return StatusCode::OK.into_response();
    };

    if !variant.is_synchronous() {
        pipeline.spawn_acknowledged(variant, event);
        return StatusCode::OK.into_response();
    }

    let announcer = Arc::clone(&pipeline);
    let announced = event.clone();
    tokio::spawn(async move { announcer.announce_received(&announced).await });

    if !pipeline.recognizes(variant, &event) {
        info!(
            "🚫 survey {:?} is not the {variant} survey. Response {} dropped.",
            event.survey_id, event.response_id
        );
        return (
            StatusCode::OK,
            axum::Json(json!({ "success": false, "error": "Unrecognized survey" })),
        )
            .into_response();
    }

    match pipeline.run(variant, &event).await {
        Ok(report) => (
            StatusCode::OK,
            axum::Json(json!({ "success": true, "reportUrl": report.report_url })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({
                "error": err.stage.headline(),
                "details": format!("{:#}", err.source),
            })),
        )
            .into_response(),
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("⚠️ ignoring unparseable CORS origin '{origin}'");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

/// 🗺️ Every route, every layer.
pub fn router(pipeline: Arc<Pipeline>, config: &ServerConfig) -> Router {
    let mut router = Router::new().route("/test", get(|| async { "Hello world" }));
    for variant in ReportVariant::ALL {
        router = router.route(
            variant.route(),
            post(
                move |State(pipeline): State<Arc<Pipeline>>, headers: HeaderMap, body: Bytes| {
                    handle_webhook(pipeline, variant, headers, body)
                },
            ),
        );
    }
    if let Some(dir) = &config.static_dir {
        let frontend = ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html")));
        router = router.fallback_service(frontend);
    }
    router
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// 🛑 Ctrl-C or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("⚠️ could not listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("⚠️ could not listen for SIGTERM: {err}");
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
    info!("🛑 shutdown signal received. Finishing in-flight requests.");
}

/// 🚀 Bind, serve, and return once a shutdown signal drained the server.
pub async fn serve(config: &ServerConfig, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("💀 Could not bind {addr}. Is something else already listening on port {}?", config.port))?;
    info!("🚀 listening on http://{addr}");
    axum::serve(listener, router(pipeline, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("💀 The HTTP server stopped with an error")
}
