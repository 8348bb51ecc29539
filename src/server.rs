use crate::constants::readable_duration;
use crate::error::ProxyError;
use crate::metrics::render_metrics;
use crate::proxy::Proxy;
use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<Proxy>,
}

impl AppState {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self { proxy }
    }

    fn prefix(&self) -> &str {
        &self.proxy.config().path_prefix
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    prefix: &'a str,
    cache_lifetime: String,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    prefix: &'a str,
    url: &'a str,
    detail_label: &'a str,
    detail: String,
}

fn render<T: Template>(template: &T) -> Html<String> {
    match template.render() {
        Ok(body) => Html(body),
        Err(e) => {
            error!("Template rendering failed: {}", e);
            Html("<h1>Internal error</h1>".to_string())
        }
    }
}

/// Landing page with the URL form.
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    render(&IndexTemplate {
        prefix: state.prefix(),
        cache_lifetime: readable_duration(state.proxy.config().default_cache_ttl.as_secs()),
    })
}

async fn proxy_handler(State(state): State<AppState>, Query(query): Query<ProxyQuery>) -> Response {
    let Some(url) = query.url.filter(|u| !u.trim().is_empty()) else {
        return Redirect::to(&format!("{}/", state.prefix())).into_response();
    };

    match state.proxy.serve(&url).await {
        Ok(served) => ([(CONTENT_TYPE, served.content_type)], served.body.into_bytes()).into_response(),
        Err(e) => error_page(state.prefix(), &url, &e),
    }
}

/// HTML error page carrying the offending URL and the failure detail.
pub fn error_page(prefix: &str, requested: &str, err: &ProxyError) -> Response {
    let (detail_label, detail) = match err {
        ProxyError::UpstreamHttp { status, .. } => ("Status Code", status.to_string()),
        other => ("Error", other.to_string()),
    };
    let page = render(&ErrorTemplate {
        prefix,
        url: err.url().unwrap_or(requested),
        detail_label,
        detail,
    });
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, page).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "caching-proxy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler() -> Response {
    match render_metrics() {
        Some(text) => text.into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Routes are mounted under the configured path prefix.
pub fn create_server(state: AppState) -> Router {
    let prefix = state.prefix().to_string();

    let mut router: Router<AppState> = Router::new().route(&format!("{}/", prefix), get(index));
    if !prefix.is_empty() {
        router = router.route(&prefix, get(index));
    }

    router
        .route(&format!("{}/proxy", prefix), get(proxy_handler))
        .route(&format!("{}/health", prefix), get(health))
        .route(&format!("{}/metrics", prefix), get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), hyper::Error> {
    let prefix = state.prefix().to_string();
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Caching proxy listening on http://localhost:{}{}/", port, prefix);
    Server::bind(&addr).serve(app.into_make_service()).await
}
