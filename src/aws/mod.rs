//! AWS control-plane integration.
//!
//! `api` defines the `EcsApi`/`ElbApi` traits every component is written
//! against; `cli` is the production implementation over the `aws` CLI;
//! `types` models the wire entities.

pub mod api;
pub mod cli;
pub mod types;

pub use api::{AwsError, EcsApi, ElbApi};
pub use cli::AwsCli;
