//! Parameterized statement construction and bind-value conversion.

pub mod builder;
pub mod params;

pub use builder::{count_rows, delete_by_key, insert_row, select_page, update_by_key, QueryBuf};
pub use params::PgBindValue;
