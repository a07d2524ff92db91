pub mod endpoints;

use std::time::Instant;
use tracing::info;

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Marks process start for uptime reporting
pub fn init_monitoring() {
    START_TIME.set(Instant::now()).ok();
    info!("Monitoring system initialized");
}

pub fn uptime_seconds() -> u64 {
    START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}
