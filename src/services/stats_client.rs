//! Gateway side of the CFR request/reply exchange with the stats worker

use shared::{
    AppError, BusError, CfrReply, CfrRequest, MessageBus, Result, WorkerReply,
    SUBJECT_CALCULATE_CFR,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::observability::record_stats_rpc;

const STATS_SERVICE: &str = "stats-service";

#[derive(Clone)]
pub struct StatsClient {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl StatsClient {
    pub fn new(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    pub async fn request_cfr(&self, country: Option<String>) -> Result<CfrReply> {
        self.request_cfr_with_timeout(country, self.timeout).await
    }

    /// One request, at most one reply, no retry.
    pub async fn request_cfr_with_timeout(
        &self,
        country: Option<String>,
        timeout: Duration,
    ) -> Result<CfrReply> {
        let payload = serde_json::to_vec(&CfrRequest { country })?;

        let reply = match self.bus.request(SUBJECT_CALCULATE_CFR, payload, timeout).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.map_bus_error(e)),
        };

        let outcome = classify_reply(&reply);
        match &outcome {
            Ok(reply) => {
                record_stats_rpc("replied");
                debug!(country = ?reply.country, cfr = ?reply.cfr, "CFR reply received");
            }
            Err(AppError::Upstream { code, message }) => {
                record_stats_rpc("worker_error");
                warn!(error_code = code, "Stats worker returned an error: {}", message);
            }
            Err(e) => {
                record_stats_rpc("malformed");
                error!("Malformed reply from stats worker: {}", e);
            }
        }
        outcome
    }

    fn map_bus_error(&self, err: BusError) -> AppError {
        match err {
            BusError::NoResponders { .. } => {
                record_stats_rpc("no_responders");
                warn!("No stats worker is subscribed to {}", SUBJECT_CALCULATE_CFR);
                AppError::service_unavailable(STATS_SERVICE)
            }
            BusError::TimedOut { timeout, .. } => {
                record_stats_rpc("timed_out");
                warn!(timeout_ms = timeout.as_millis() as u64, "CFR request timed out");
                AppError::timeout(format!("{} request", SUBJECT_CALCULATE_CFR))
            }
            other => {
                record_stats_rpc("transport");
                error!("Message bus failure during CFR request: {}", other);
                AppError::service_unavailable(STATS_SERVICE)
            }
        }
    }
}

/// Interprets reply bytes as a result, a worker error, or garbage.
pub fn classify_reply(bytes: &[u8]) -> Result<CfrReply> {
    match serde_json::from_slice::<WorkerReply>(bytes) {
        Ok(WorkerReply::Cfr(reply)) => Ok(reply),
        Ok(WorkerReply::Error(envelope)) => {
            Err(AppError::upstream(envelope.error_code, envelope.error_message))
        }
        Err(e) => Err(AppError::bad_gateway(
            STATS_SERVICE,
            format!("unrecognized reply: {}", e),
        )),
    }
}
