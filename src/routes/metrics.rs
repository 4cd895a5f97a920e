use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — render the dispatch counters and gauges for scraping.
///
/// Served with the Prometheus text exposition content type so scrapers
/// don't have to sniff the body.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    let body = handle.render();
    tracing::trace!(bytes = body.len(), "metrics scraped");
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
