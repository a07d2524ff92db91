pub mod builder;
pub mod tables;

pub use builder::{country_filter, BuiltQuery, QueryBuilder, QuerySpec, ROW_LIMIT};
pub use tables::{AggregateColumn, DataTable, TableFamily};
