// Utils module for utility functions
pub mod normalize;

pub use normalize::{normalize_row, normalize_rows, normalize_value};
