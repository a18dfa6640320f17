use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use log::info;
use tokio::net::TcpListener;

use crate::reconcile::{Outcome, Reconciler};

pub struct AppState {
    pub reconciler: Arc<Reconciler>,
}

pub fn create_router(reconciler: Arc<Reconciler>, endpoint: &str) -> Router {
    let state = Arc::new(AppState { reconciler });

    let mut router = Router::new().route(endpoint, any(update_dns));
    if endpoint != "/health" {
        router = router.route("/health", get(health_check));
    }

    router
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Serves until `shutdown` resolves. Requests already running are drained.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or("-").trim().to_string())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    // Access log format: method path "user-agent" ip status duration
    info!(
        target: "access",
        "{} {} \"{}\" {} {} {:.3}ms",
        method,
        path,
        user_agent,
        ip,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    response
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn update_dns(State(state): State<Arc<AppState>>) -> Response {
    let result = state.reconciler.run().await;
    result.log();

    (status_for(&result.outcome), format!("{}\n", result.message())).into_response()
}

fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::NoUpdateNeeded | Outcome::Updated => StatusCode::OK,
        Outcome::NoMatchingRecord { .. } => StatusCode::NOT_FOUND,
        Outcome::Failed(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        Outcome::Failed(_) => StatusCode::BAD_GATEWAY,
    }
}
