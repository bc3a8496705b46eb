//! Drive-style REST provider adapter
//!
//! A complete [`ProviderAdapter`](polysync_core::ports::provider_adapter::ProviderAdapter)
//! implementation over a Drive-flavored REST API:
//!
//! - [`auth`]: OAuth token lifecycle (expiry buffer, transparent refresh)
//! - [`client`]: authenticated HTTP client with status-to-error mapping
//! - [`upload`]: simple vs resumable session upload selection
//! - [`wire`]: serde DTOs for the API's JSON bodies
//! - [`adapter`]: the port implementation itself

pub mod adapter;
pub mod auth;
pub mod client;
pub mod upload;
pub mod wire;

pub use adapter::{DriveAdapter, DriveEndpoints};
pub use auth::TokenManager;
pub use client::DriveClient;
