//! Cluster formation over pairwise peer links.
//!
//! A coordinator (name node) and its peers (storage nodes, a standby
//! coordinator, clients) each publish a small field/value document on
//! every link and derive boolean readiness flags from the other side's
//! document. Each lifecycle event triggers one full reconciliation pass;
//! nothing is incremental, so passes are idempotent and safe to re-run.
//!
//! * [`coordinator`] publishes spec, ports, readiness, the hosts map and
//!   the ssh key, and tracks registered storage nodes and standbys.
//! * [`peer`] registers with the coordinator and derives `available`,
//!   `spec.match`, `registered`, `ready` and `ssh-key.available`.
//! * [`agent`] feeds [`types::Input`]s from a [`transport::Transport`]
//!   into either role.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod flags;
pub mod link;
pub mod peer;
pub mod resolver;
pub mod transport;
pub mod types;

pub use agent::{handle_input, role_from_config, run_agent, Reconcile};
pub use config::{Config, MissingSpecPolicy, Role};
pub use coordinator::Coordinator;
pub use document::{Document, HostsMap, Spec};
pub use error::{Error, Result};
pub use flags::FlagSet;
pub use link::LinkId;
pub use peer::{Capabilities, Derived, Peer, PeerRole};
pub use types::{Command, Input, LinkEvent, NodeRecord, Output};
