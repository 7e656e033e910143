//! Backend facade
//!
//! Everything that speaks to the virtualization platform lives here. The
//! dispatchers only see the typed surface of [`backend::VcdBackend`] through
//! the session handle [`client::VcdClient`].
//!
//! # Module Structure
//!
//! - [`types`] - typed remote entities
//! - [`backend`] - the backend trait, one method per domain operation
//! - [`client`] - session handle: parent resolution, locks, cancellation
//! - [`auth`] - session login and token caching
//! - [`http`] - REST implementation of the backend trait
//!
//! # Example
//!
//! ```ignore
//! use vcd_provider::vcd::{client::VcdClient, http::RestBackend};
//!
//! async fn example(config: ProviderConfig) -> anyhow::Result<()> {
//!     let backend = std::sync::Arc::new(RestBackend::new(&config)?);
//!     let client = VcdClient::new(config, backend);
//!     let org = client.get_org("my-org").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod client;
pub mod http;
pub mod types;

pub use backend::VcdBackend;
pub use client::VcdClient;
