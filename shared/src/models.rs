//! Messages exchanged between the gateway and the stats worker

use serde::{Deserialize, Serialize};

/// Request/reply subject served by the stats worker.
pub const SUBJECT_CALCULATE_CFR: &str = "stats.calculate.cfr";
/// Broadcast subject the worker emits computed CFRs on.
pub const SUBJECT_EVENTS_CFR: &str = "stats.events.cfr";
/// Pattern matching every stats broadcast.
pub const SUBJECT_EVENTS_ALL: &str = "stats.events.*";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CfrRequest {
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfrReply {
    #[serde(default)]
    pub country: Option<String>,
    pub total_cases: u64,
    pub total_deaths: u64,
    pub cfr: Option<f64>,
}

impl CfrReply {
    pub fn new(country: Option<String>, total_cases: u64, total_deaths: u64) -> Self {
        Self {
            country,
            total_cases,
            total_deaths,
            cfr: compute_cfr(total_cases, total_deaths),
        }
    }
}

/// Case-fatality ratio in percent; absent when there are no cases.
pub fn compute_cfr(total_cases: u64, total_deaths: u64) -> Option<f64> {
    if total_cases == 0 {
        return None;
    }
    Some(total_deaths as f64 * 100.0 / total_cases as f64)
}

/// Structured error reply sent by the worker instead of a `CfrReply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error_code: i64,
    pub error_message: String,
}

/// Error codes the worker puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorCode {
    DatabaseError,
    InvalidInput,
}

impl WorkerErrorCode {
    pub fn code(self) -> i64 {
        match self {
            WorkerErrorCode::DatabaseError => 1001,
            WorkerErrorCode::InvalidInput => 1002,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            WorkerErrorCode::DatabaseError => "A database error occurred",
            WorkerErrorCode::InvalidInput => "Invalid input provided",
        }
    }

    pub fn envelope(self) -> ErrorEnvelope {
        ErrorEnvelope {
            error_code: self.code(),
            error_message: self.message().to_string(),
        }
    }
}

/// Any well-formed reply body from the worker.
///
/// The error shape is tried first: its two required fields never appear in
/// a `CfrReply`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    Error(ErrorEnvelope),
    Cfr(CfrReply),
}
