pub mod cfr_listener;
pub mod data_service;
pub mod row_source;
pub mod stats_client;

pub use cfr_listener::start_cfr_listener;
pub use data_service::DataService;
pub use row_source::{PgRowSource, RowSource};
pub use stats_client::StatsClient;
