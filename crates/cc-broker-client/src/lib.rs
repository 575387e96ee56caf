//! # cc-broker-client: Service Broker Clients
//!
//! Binding lifecycle calls against the backend of a service instance.
//!
//! | Instance kind | Client | Orphan mitigation |
//! |---|---|---|
//! | managed | [`HttpBrokerClient`] | [`BrokerOrphanMitigator`] (background unbind with retry) |
//! | user-provided | [`UserProvidedClient`] | [`NoopOrphanMitigator`] |
//!
//! A [`ClientProvider`] picks the client for an instance; the API layer only
//! sees `Arc<dyn ServiceBrokerClient>`. The [`mock`] module provides
//! scriptable doubles.

pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod orphan;
pub(crate) mod retry;
pub mod user_provided;

pub use client::{ClientAttrs, ClientProvider, DefaultClientProvider, OrphanMitigator, ServiceBrokerClient};
pub use error::BrokerError;
pub use http::{BrokerClientConfig, HttpBrokerClient, BROKER_API_VERSION};
pub use orphan::{BrokerOrphanMitigator, NoopOrphanMitigator};
pub use user_provided::UserProvidedClient;
