//! Tablegate: generic read/write access to relational tables driven by
//! runtime schema introspection, with no per-table code.

pub mod access;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod pk;
pub mod response;
pub mod routes;
pub mod source;
pub mod sql;
pub mod state;

pub use access::{AccessGate, AccessStrategy, GrantStore, SqlGrantStore, StaticGrants, DEV_SUPERUSER_ID};
pub use catalog::{ColumnDescriptor, SchemaCatalog, TableDescriptor};
pub use config::{ConfigStore, ConnectionConfig};
pub use connection::ConnectionManager;
pub use error::AppError;
pub use pk::{PrimaryKeyInfo, PrimaryKeyResolver};
pub use routes::{api_routes, common_routes};
pub use source::{
    DataSource, FixtureDataSource, InsertOutcome, LiveDatabase, PageRequest, PageResult, RowFilter,
};
pub use state::AppState;
