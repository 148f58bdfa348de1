//! `cluster_monitor` maintains a live, consistent view of a multi-server deployment's topology
//! by merging asynchronous health notifications from its members.
//!
//! The [`cluster::MultiServerCluster`] is the entry point: construct one from [`settings::ClusterSettings`]
//! and a [`factory::ServerFactory`], feed it notifications through the [`server::Server`] handles
//! it hands back from [`cluster::MultiServerCluster::get_server`], and read its aggregate view
//! back through [`cluster::MultiServerCluster::description`] or
//! [`cluster::MultiServerCluster::select_server`].
//!
//! This crate does not perform I/O and does not schedule heartbeats; a caller supplies both
//! through its own [`factory::ServerFactory`] implementation and by calling
//! [`server::Server::send_notification`] as replies arrive.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod address;
pub mod cluster;
pub mod description;
pub mod error;
pub mod factory;
pub mod listener;
pub mod selection;
pub mod server;
pub mod settings;

pub use address::ServerAddress;
pub use cluster::MultiServerCluster;
pub use description::{cluster::ClusterDescription, server::ServerDescription};
pub use error::{Error, ErrorKind, Result};
pub use factory::ServerFactory;
pub use listener::{ChangeEvent, ChangeListener};
pub use selection::ServerSelector;
pub use server::Server;
pub use settings::ClusterSettings;
