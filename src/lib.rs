//! A MongoDB data-service layer: one connected client per deployment,
//! exposed through a uniform request/response surface.
//!
//! The crate delegates wire protocol, authentication and topology monitoring
//! to the `mongodb` driver and adds the glue a management frontend needs:
//!
//! - [`connection`] — passive connection descriptors, URI building and TOML
//!   persistence;
//! - [`tunnel`] — SSH tunnel establishment with lifecycle events and an
//!   end-to-end verification probe;
//! - [`client`] — the operation adapter, one method per database primitive
//!   with user-facing error translation;
//! - [`instance`] — the deployment snapshot aggregator, concurrent admin
//!   command fan-out with privilege-derived fallbacks;
//! - [`sampling`] — random document sampling with a client-side fallback for
//!   servers without `$sample`;
//! - [`store`] — the owned connection state gating every operation.

pub mod client;
pub mod connection;
pub mod error;
pub mod instance;
pub mod logging;
pub mod namespace;
pub mod sampling;
pub mod store;
pub mod tunnel;

pub use client::{CollectionOverview, CollectionStats, DataClient, DatabaseOverview, ShardDetail};
pub use connection::{ConnectionDescriptor, SshTunnelSettings};
pub use error::{DataServiceError, Result};
pub use instance::{CollectionDetail, DatabaseDetail, InstanceDetail};
pub use namespace::Namespace;
pub use sampling::{SampleOptions, SampleStream};
pub use store::{DataServiceStore, StoreEvent};
pub use tunnel::{SshTunnel, SshTunnelConnector, TunnelEvent};
