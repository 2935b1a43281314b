use crate::serving::{self, serving_status_at, ServingStatus};
use crate::status::{InstanceStatus, RoleBreakdown, Status, StatusEvent};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::server::ServerState;

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    /// Pipeline name; absent or empty means the whole system
    #[serde(default)]
    pub pipeline: Option<String>,
}

impl HealthQuery {
    fn pipeline(&self) -> &str {
        self.pipeline.as_deref().unwrap_or("")
    }
}

/// JSON body for one status event
#[derive(Debug, Serialize)]
pub struct EventBody {
    pub healthy: bool,
    pub status: Status,
    pub status_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventBody {
    fn new(event: &StatusEvent, grace: Duration, now: Instant) -> Self {
        Self {
            healthy: serving_status_at(event, grace, now).is_serving(),
            status: event.status(),
            status_time: DateTime::<Utc>::from(event.reported_at()).to_rfc3339(),
            error: event.err().map(str::to_string),
        }
    }
}

/// JSON body for an aggregate with its per-role breakdown
#[derive(Debug, Serialize)]
pub struct StatusBody {
    #[serde(flatten)]
    pub aggregate: EventBody,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub receivers: BTreeMap<String, EventBody>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub processors: BTreeMap<String, EventBody>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exporters: BTreeMap<String, EventBody>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pipelines: BTreeMap<String, StatusBody>,
}

impl StatusBody {
    fn new(aggregate: &StatusEvent, components: &RoleBreakdown, grace: Duration, now: Instant) -> Self {
        let role = |group: &[InstanceStatus]| {
            group
                .iter()
                .map(|s| {
                    (
                        s.instance.component().to_string(),
                        EventBody::new(&s.event, grace, now),
                    )
                })
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            aggregate: EventBody::new(aggregate, grace, now),
            receivers: role(components.receivers.as_slice()),
            processors: role(components.processors.as_slice()),
            exporters: role(components.exporters.as_slice()),
            pipelines: BTreeMap::new(),
        }
    }

    /// A recoverable error inside the grace window still answers 200
    fn code(&self) -> StatusCode {
        if self.aggregate.healthy {
            return StatusCode::OK;
        }
        match self.aggregate.status {
            Status::PermanentError => StatusCode::BAD_REQUEST,
            Status::FatalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Point-in-time detailed status for the system or one pipeline
pub async fn status_handler(
    State(state): State<ServerState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let now = Instant::now();
    let grace = state.failure_duration;

    let body = match query.pipeline() {
        "" => {
            let details = state.aggregator.collector_status_detailed();
            let mut body = StatusBody::new(&details.aggregate, &details.components, grace, now);
            body.pipelines = details
                .pipelines
                .iter()
                .map(|p| {
                    (
                        p.pipeline.to_string(),
                        StatusBody::new(&p.aggregate, &p.components, grace, now),
                    )
                })
                .collect();
            body
        }
        pipeline => match state.aggregator.pipeline_status_detailed(pipeline) {
            Ok(details) => StatusBody::new(&details.aggregate, &details.components, grace, now),
            Err(e) => {
                debug!("Status query failed: {}", e);
                let error = serde_json::json!({ "error": e.to_string() });
                return (StatusCode::NOT_FOUND, Json(error)).into_response();
            }
        },
    };

    (body.code(), Json(body)).into_response()
}

/// Host configuration as last delivered; 503 until the host provides one
pub async fn config_handler(State(state): State<ServerState>) -> Response {
    let config = state.host_config.read().clone();
    match config {
        Some(config) => (StatusCode::OK, Json(config)).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Newline-delimited stream of serving verdicts
pub async fn watch_handler(
    State(state): State<ServerState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let subscription = match state.aggregator.subscribe(query.pipeline()) {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("Watch rejected: {}", e);
            let error = serde_json::json!({ "error": e.to_string() });
            return (StatusCode::SERVICE_UNAVAILABLE, Json(error)).into_response();
        }
    };

    info!("New watch client on {}", subscription.scope());

    let stream = serving::watch(subscription, state.failure_duration).map(|verdict| {
        Ok::<_, axum::Error>(Bytes::from(verdict_line(verdict)))
    });

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache, private"),
        ],
        axum::body::Body::from_stream(stream),
    )
        .into_response()
}

fn verdict_line(verdict: ServingStatus) -> String {
    format!("{}\n", serde_json::json!({ "status": verdict }))
}
