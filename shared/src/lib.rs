//! Shared library for the COVID data services
//!
//! This library contains common functionality used by the gateway and the stats worker:
//! - Configuration and error taxonomy
//! - Cache store (Redis and in-process)
//! - Message bus with request/reply over pub/sub
//! - Wire messages exchanged with the stats worker
//! - Row model and database pool

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod messaging;
pub mod models;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use config::Config;
pub use database::DatabaseService;
pub use error::{AppError, Result};
pub use messaging::{BusError, MemoryBus, Message, MessageBus, RedisBus, Subscription};
pub use models::*;
pub use types::{CellValue, Row};
