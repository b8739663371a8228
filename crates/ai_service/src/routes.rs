//! HTTP routes
//!
//! Handlers are thin pass-throughs to the engine and the cache; every
//! failure is turned into a JSON error body by [`handle_rejection`].

use matchday_prediction_engine::{BatchPredictionRequest, HealthStatus, PredictionRequest};
use serde_json::json;
use std::convert::Infallible;
use std::time::Instant;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::context::AppContext;
use crate::errors::ServiceError;
use crate::metrics::Endpoint;

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

fn with_ctx(ctx: AppContext) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Every route, with rejections recovered into JSON errors
pub fn routes(ctx: AppContext) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(health);

    let predict = warp::path!("predict")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(predict);

    let batch = warp::path!("predict" / "batch")
        .and(warp::post())
        .and(json_body())
        .and(with_ctx(ctx.clone()))
        .and_then(predict_batch);

    let performance = warp::path!("model" / "performance")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(model_performance);

    let retrain = warp::path!("model" / "retrain")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(retrain);

    let features = warp::path!("model" / "features")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(model_features);

    let cache_stats = warp::path!("cache" / "stats")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(cache_stats);

    let cache_clear = warp::path!("cache" / "clear")
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and_then(cache_clear);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_ctx(ctx))
        .and_then(prometheus_metrics);

    health
        .or(predict)
        .or(batch)
        .or(performance)
        .or(retrain)
        .or(features)
        .or(cache_stats)
        .or(cache_clear)
        .or(metrics)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn reject(
    ctx: &AppContext,
    endpoint: Endpoint,
    started: Instant,
    err: impl Into<ServiceError>,
) -> Rejection {
    ctx.metrics.record_request(endpoint, false, started);
    warp::reject::custom(err.into())
}

async fn health(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let report = ctx.engine.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    ctx.metrics.record_request(Endpoint::Health, true, started);
    Ok(warp::reply::with_status(warp::reply::json(&report), status))
}

async fn predict(request: PredictionRequest, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    if request.game_id.trim().is_empty() {
        return Err(reject(
            &ctx,
            Endpoint::Predict,
            started,
            ServiceError::BadRequest("game_id must not be empty".to_string()),
        ));
    }

    match ctx.engine.predict(&request).await {
        Ok(result) => {
            if result.is_demo() {
                ctx.metrics.record_demo_predictions(1);
            }
            ctx.metrics.record_request(Endpoint::Predict, true, started);
            Ok(warp::reply::json(&result))
        }
        Err(e) => Err(reject(&ctx, Endpoint::Predict, started, e)),
    }
}

async fn predict_batch(
    request: BatchPredictionRequest,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    if request.game_requests.is_empty() {
        return Err(reject(
            &ctx,
            Endpoint::Batch,
            started,
            ServiceError::BadRequest("game_requests must not be empty".to_string()),
        ));
    }

    match ctx.engine.predict_batch(request).await {
        Ok(response) => {
            let demo = response.predictions.iter().filter(|e| e.result.is_demo()).count();
            ctx.metrics.record_demo_predictions(demo as u64);
            ctx.metrics.record_request(Endpoint::Batch, true, started);
            Ok(warp::reply::json(&response))
        }
        Err(e) => Err(reject(&ctx, Endpoint::Batch, started, e)),
    }
}

async fn model_performance(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let metrics = ctx.engine.performance_metrics();
    ctx.metrics.record_request(Endpoint::Model, true, started);
    Ok(warp::reply::json(&metrics))
}

async fn retrain(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let handle = match ctx.engine.retrain() {
        Ok(handle) => handle,
        Err(e) => return Err(reject(&ctx, Endpoint::Retrain, started, e)),
    };
    ctx.metrics.record_retrain_started();

    let metrics = ctx.metrics.clone();
    tokio::spawn(async move {
        match handle.wait().await {
            Ok(info) => info!(version = %info.version, "Background retrain installed new bundle"),
            Err(e) => {
                metrics.record_retrain_failed();
                warn!(error = %e, "Background retrain did not complete");
            }
        }
    });

    ctx.metrics.record_request(Endpoint::Retrain, true, started);
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "status": "started",
            "message": "Model retraining started in background",
        })),
        StatusCode::ACCEPTED,
    ))
}

async fn model_features(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let info = ctx.engine.feature_info();
    ctx.metrics.record_request(Endpoint::Model, true, started);
    Ok(warp::reply::json(&info))
}

async fn cache_stats(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    match ctx.cache.stats().await {
        Ok(stats) => {
            ctx.metrics.record_request(Endpoint::Cache, true, started);
            Ok(warp::reply::json(&stats))
        }
        Err(e) => Err(reject(&ctx, Endpoint::Cache, started, e)),
    }
}

async fn cache_clear(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    match ctx.cache.clear().await {
        Ok(cleared) => {
            ctx.metrics.record_request(Endpoint::Cache, true, started);
            Ok(warp::reply::json(&json!({
                "cleared": cleared,
                "message": format!("Cleared {cleared} cached predictions"),
            })))
        }
        Err(e) => Err(reject(&ctx, Endpoint::Cache, started, e)),
    }
}

async fn prometheus_metrics(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let body = ctx.metrics.get_snapshot().render_prometheus();
    Ok(warp::reply::with_header(
        body,
        "Content-Type",
        "text/plain; version=0.0.4",
    ))
}

/// Convert rejections into `{"error", "message"}` bodies
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, kind, message) = if let Some(e) = err.find::<ServiceError>() {
        if e.status_code().is_server_error() {
            warn!(kind = e.kind(), error = %e, "Request failed");
        }
        (e.status_code(), e.kind(), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Request body too large".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method not allowed".to_string(),
        )
    } else {
        warn!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_server_error",
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": kind, "message": message })),
        status,
    ))
}
