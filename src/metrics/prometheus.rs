//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Lifecycle operations by terminal outcome
    pub static ref OPERATIONS: CounterVec = register_counter_vec!(
        "dbaas_engine_operations_total",
        "Total number of lifecycle operations by outcome",
        &["kind", "engine", "outcome"]
    ).unwrap();

    /// Time from launch to terminal event
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "dbaas_engine_operation_duration_seconds",
        "Duration of lifecycle operations in seconds",
        &["kind", "engine"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]
    ).unwrap();

    /// Operations currently holding a cluster
    pub static ref IN_FLIGHT: GaugeVec = register_gauge_vec!(
        "dbaas_engine_operations_in_flight",
        "Number of lifecycle operations currently running",
        &["engine"]
    ).unwrap();

    /// Status polls issued
    pub static ref POLL_ATTEMPTS: CounterVec = register_counter_vec!(
        "dbaas_engine_poll_attempts_total",
        "Total number of status polls",
        &["engine"]
    ).unwrap();

    /// Status payloads that failed to decode
    pub static ref STATUS_DECODE_ERRORS: CounterVec = register_counter_vec!(
        "dbaas_engine_status_decode_errors_total",
        "Total number of undecodable status payloads",
        &["engine"]
    ).unwrap();

    /// Progress events derived from operator logs
    pub static ref LOG_EVENTS: CounterVec = register_counter_vec!(
        "dbaas_engine_log_events_total",
        "Total number of operator log events by level",
        &["engine", "level"]
    ).unwrap();

    /// Engine health (1 = healthy, 0 = unhealthy)
    pub static ref ENGINE_HEALTH: Gauge = register_gauge!(
        "dbaas_engine_health",
        "Engine health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    ENGINE_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" => text_response(StatusCode::OK, "ok"),
        "/readyz" if ENGINE_HEALTH.get() > 0.0 => text_response(StatusCode::OK, "ok"),
        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_exported_with_engine_prefix() {
        OPERATIONS
            .with_label_values(&["create", "pxc", "success"])
            .inc();
        POLL_ATTEMPTS.with_label_values(&["pxc"]).inc();

        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"dbaas_engine_operations_total".to_string()));
        assert!(names.contains(&"dbaas_engine_poll_attempts_total".to_string()));
    }

    #[test]
    fn text_response_sets_status() {
        let response = text_response(StatusCode::NOT_FOUND, "Not Found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
