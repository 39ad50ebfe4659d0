//! Destination-side Postgres plumbing: a single exclusively-owned connection
//! (§4.3), scoped table acquisition (§4.4), and the source-type-to-column
//! schema mapper (§4.2).

mod client;
mod error_map;
mod managed_table;
mod schema_map;
mod tls;

pub use client::{ConnectionState, PgClient, PgConnectOptions};
pub use managed_table::ManagedTable;
pub use schema_map::{map_field, map_schema};
