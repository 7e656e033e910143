//! vcd-provider
//!
//! Resource lifecycle core of a declarative-deployment provider for VMware
//! Cloud Director style datacenters: schema declarations, CRUD and import
//! dispatchers, edge gateway locking, import-path parsing, frozen set
//! hashers, validators and the REST backend facade.

pub mod config;
pub mod error;
pub mod import;
pub mod locks;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod state;
pub mod vcd;

/// Version injected at compile time via VCD_PROVIDER_VERSION env var (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("VCD_PROVIDER_VERSION") {
    Some(v) => v,
    None => "dev",
};

pub use provider::{Applied, Provider};
