//! The Stratum SDK client.

#[allow(clippy::module_inception)]
mod client;
mod internal;
mod sessions_client;

pub use client::Client;
pub use internal::InternalClient;
pub use sessions_client::SessionsClient;
