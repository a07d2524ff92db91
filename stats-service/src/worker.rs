//! Request/reply handler for `stats.calculate.cfr`
//!
//! Every request that carries a reply address gets exactly one reply: the
//! computed CFR or an error envelope. Successful results are then broadcast
//! on `stats.events.cfr`.

use futures::StreamExt;
use shared::{
    CfrReply, CfrRequest, Message, MessageBus, Subscription, WorkerErrorCode,
    SUBJECT_EVENTS_CFR,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::store::{CaseTotals, RecordType};

/// Default bound on how long in-flight requests may run after shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CfrWorker {
    bus: Arc<dyn MessageBus>,
    totals: Arc<dyn CaseTotals>,
    drain_timeout: Duration,
}

impl CfrWorker {
    pub fn new(bus: Arc<dyn MessageBus>, totals: Arc<dyn CaseTotals>) -> Self {
        Self {
            bus,
            totals,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Consumes requests until `shutdown` resolves or the subscription ends.
    /// Each request is handled on its own task. On the way out the
    /// subscription is dropped and in-flight handlers get up to the drain
    /// timeout to send their replies; stragglers are aborted.
    pub async fn run<S>(self: Arc<Self>, mut requests: Subscription, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();
        info!("CFR worker accepting requests");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("CFR worker stopping");
                    break;
                }
                next = requests.next() => match next {
                    Some(message) => {
                        let worker = Arc::clone(&self);
                        in_flight.spawn(async move { worker.handle(message).await });
                    }
                    None => {
                        warn!("Request subscription closed");
                        break;
                    }
                },
                Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = finished {
                        error!("CFR handler task failed: {}", e);
                    }
                }
            }
        }

        drop(requests);
        self.drain(&mut in_flight).await;
    }

    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        info!(pending = in_flight.len(), "Draining in-flight CFR requests");

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(finished) = in_flight.join_next().await {
                if let Err(e) = finished {
                    error!("CFR handler task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                abandoned = in_flight.len(),
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "Drain timed out, aborting remaining CFR requests"
            );
            in_flight.abort_all();
        }
    }

    pub async fn handle(&self, message: Message) {
        if message.reply_to.is_none() {
            warn!(subject = %message.subject, "Request without reply address, skipping");
            return;
        }

        let outcome = self.compute(&message.payload).await;
        let body = match &outcome {
            Ok(reply) => serde_json::to_vec(reply),
            Err(code) => serde_json::to_vec(&code.envelope()),
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode reply: {}", e);
                return;
            }
        };

        if let Err(e) = self.bus.respond(&message, body.clone()).await {
            error!(subject = %message.subject, "Failed to send reply: {}", e);
        }

        if let Ok(reply) = outcome {
            match self.bus.publish(SUBJECT_EVENTS_CFR, body).await {
                Ok(()) => debug!(country = ?reply.country, "Broadcast CFR"),
                Err(e) => error!("Failed to broadcast CFR: {}", e),
            }
        }
    }

    async fn compute(&self, payload: &[u8]) -> Result<CfrReply, WorkerErrorCode> {
        let request: CfrRequest = serde_json::from_slice(payload).map_err(|e| {
            warn!("Invalid CFR request: {}", e);
            WorkerErrorCode::InvalidInput
        })?;
        let country = request.country.filter(|c| !c.is_empty());

        let cases = self
            .totals
            .total(RecordType::Confirmed, country.as_deref())
            .await
            .map_err(|e| {
                error!(country = ?country, "Failed to sum confirmed cases: {}", e);
                WorkerErrorCode::DatabaseError
            })?;
        let deaths = self
            .totals
            .total(RecordType::Death, country.as_deref())
            .await
            .map_err(|e| {
                error!(country = ?country, "Failed to sum deaths: {}", e);
                WorkerErrorCode::DatabaseError
            })?;

        let reply = CfrReply::new(country, cases, deaths);
        info!(
            country = ?reply.country,
            total_cases = reply.total_cases,
            total_deaths = reply.total_deaths,
            cfr = ?reply.cfr,
            "Computed CFR"
        );
        Ok(reply)
    }
}
