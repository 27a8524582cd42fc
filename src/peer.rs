//! Peer side: storage nodes, standby coordinators and plain clients.
//!
//! A peer registers its identity with the coordinator and derives its
//! readiness flags from the coordinator's document. All three variants
//! share one derivation; they differ only in which registrations they
//! may publish (see [`Capabilities`]).
//!
//! Flags are process-wide for the peer rather than per link, and every
//! `changed` pass recomputes all of them from the delivered document.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::agent::Reconcile;
use crate::config::MissingSpecPolicy;
use crate::document::{fields, Document, HostsMap, Spec};
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::link::{LinkId, LinkTable};
use crate::resolver::AddressResolver;
use crate::types::{Command, LinkEvent, Output};

pub mod flag {
    pub const RELATED: &str = "related";
    pub const AVAILABLE: &str = "available";
    pub const SPEC_MATCH: &str = "spec.match";
    pub const SPEC_MISMATCH: &str = "spec.mismatch";
    pub const REGISTERED: &str = "registered";
    pub const READY: &str = "ready";
    pub const SSH_KEY_AVAILABLE: &str = "ssh-key.available";

    pub const ALL: [&str; 7] = [
        RELATED,
        AVAILABLE,
        SPEC_MATCH,
        SPEC_MISMATCH,
        REGISTERED,
        READY,
        SSH_KEY_AVAILABLE,
    ];
}

/// Link-scoped marker: the remote unit is leaving and its late documents
/// no longer count.
const LINK_DEPARTED: &str = "departed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub registers_as_datanode: bool,
    pub registers_as_secondary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Datanode,
    Secondary,
    Client,
}

impl PeerRole {
    pub const fn capabilities(self) -> Capabilities {
        match self {
            PeerRole::Datanode => Capabilities {
                registers_as_datanode: true,
                registers_as_secondary: false,
            },
            PeerRole::Secondary => Capabilities {
                registers_as_datanode: false,
                registers_as_secondary: true,
            },
            PeerRole::Client => Capabilities {
                registers_as_datanode: false,
                registers_as_secondary: false,
            },
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PeerRole::Datanode => "datanode",
            PeerRole::Secondary => "secondary",
            PeerRole::Client => "client",
        }
    }
}

/// Result of one reconciliation pass over the coordinator's document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Derived {
    pub available: bool,
    pub spec_match: bool,
    pub registered: bool,
    pub ready: bool,
    pub ssh_key_available: bool,
}

impl Derived {
    /// Pure function of the observed document and local settings.
    pub fn compute(
        observed: &Document,
        local_spec: Option<&Spec>,
        policy: MissingSpecPolicy,
        hostname: &str,
    ) -> Result<Self> {
        let remote_spec: Spec = observed.get_json(fields::SPEC)?;
        let hosts_map: HostsMap = observed.get_json(fields::HOSTS_MAP)?;

        let available = !remote_spec.is_empty()
            && !observed.get(fields::PRIVATE_ADDRESS).is_empty()
            && !observed.get(fields::PORT).is_empty()
            && !observed.get(fields::WEBHDFS_PORT).is_empty();

        let spec_match = match local_spec {
            Some(local) if !local.is_empty() => local.is_satisfied_by(&remote_spec),
            _ => policy == MissingSpecPolicy::Vacuous,
        };

        let registered = !hostname.is_empty() && hosts_map.contains_hostname(hostname);
        let ready = available && spec_match && observed.get_bool(fields::HDFS_READY);
        let ssh_key_available = !observed.get(fields::SSH_KEY).is_empty();

        Ok(Self {
            available,
            spec_match,
            registered,
            ready,
            ssh_key_available,
        })
    }

    fn apply(&self, flags: &mut FlagSet) {
        flags.toggle(flag::AVAILABLE, self.available);
        flags.toggle(flag::SPEC_MATCH, self.spec_match);
        flags.toggle(flag::SPEC_MISMATCH, self.available && !self.spec_match);
        flags.toggle(flag::REGISTERED, self.registered);
        flags.toggle(flag::READY, self.ready);
        flags.toggle(flag::SSH_KEY_AVAILABLE, self.ssh_key_available);
    }
}

pub struct Peer {
    role: PeerRole,
    hostname: String,
    policy: MissingSpecPolicy,
    local_spec: Option<Spec>,
    /// Fields this unit publishes on every link, including links that
    /// join after a registration call.
    registration: Document,
    links: LinkTable,
    /// Link whose document the flags were last derived from.
    current: Option<LinkId>,
    flags: FlagSet,
}

impl Peer {
    pub fn new(role: PeerRole, relation_name: &str, hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let mut registration = Document::new();
        registration.set(fields::PRIVATE_ADDRESS, hostname.clone());
        Self {
            role,
            hostname,
            policy: MissingSpecPolicy::default(),
            local_spec: None,
            registration,
            links: LinkTable::new(relation_name),
            current: None,
            flags: FlagSet::new(relation_name),
        }
    }

    pub fn with_private_address(mut self, address: impl Into<String>) -> Self {
        self.registration.set(fields::PRIVATE_ADDRESS, address);
        self
    }

    pub fn with_missing_spec_policy(mut self, policy: MissingSpecPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the spec the coordinator's spec is checked against. Takes
    /// effect on the next `changed` pass.
    pub fn set_spec(&mut self, spec: Spec) {
        self.local_spec = Some(spec);
    }

    pub fn register_datanode(&mut self) -> Result<()> {
        if !self.role.capabilities().registers_as_datanode {
            return Err(self.unsupported("register as a datanode"));
        }
        self.registration.set_bool(fields::DATANODE, true);
        self.registration.set(fields::HOSTNAME, self.hostname.clone());
        self.publish_registration();
        Ok(())
    }

    pub fn register_secondary(&mut self, port: u16) -> Result<()> {
        if !self.role.capabilities().registers_as_secondary {
            return Err(self.unsupported("register as a secondary"));
        }
        self.registration.set_bool(fields::SECONDARY, true);
        self.registration.set(fields::HOSTNAME, self.hostname.clone());
        self.registration.set(fields::PORT, port.to_string());
        self.publish_registration();
        Ok(())
    }

    /// The coordinator document the current flags were derived from.
    pub fn remote(&self) -> Option<&Document> {
        let id = self.current.as_ref()?;
        self.links.get(id).map(|link| link.observed())
    }

    pub fn remote_spec(&self) -> Result<Spec> {
        match self.remote() {
            Some(doc) => doc.get_json(fields::SPEC),
            None => Ok(Spec::default()),
        }
    }

    pub fn hdfs_ready(&self) -> bool {
        self.remote()
            .map(|doc| doc.get_bool(fields::HDFS_READY))
            .unwrap_or(false)
    }

    pub fn port(&self) -> Result<Option<u16>> {
        self.remote()
            .map_or(Ok(None), |doc| doc.get_port(fields::PORT))
    }

    pub fn webhdfs_port(&self) -> Result<Option<u16>> {
        self.remote()
            .map_or(Ok(None), |doc| doc.get_port(fields::WEBHDFS_PORT))
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            role: self.role.as_str(),
            operation,
        }
    }

    fn publish_registration(&mut self) {
        for (_, link) in self.links.iter_mut() {
            let registration = &self.registration;
            link.publish(|doc| copy_fields(registration, doc));
        }
    }

    fn on_joined(&mut self, id: LinkId) {
        let (link, _) = self.links.entry(&id);
        let registration = &self.registration;
        link.publish(|doc| copy_fields(registration, doc));
        link.flags.clear(LINK_DEPARTED);
        self.flags.set(flag::RELATED);
        info!("Related to {}", id);
    }

    fn on_changed(&mut self, id: LinkId, document: Document) -> Result<()> {
        if let Some(link) = self.links.get_mut(&id) {
            if link.flags.is_set(LINK_DEPARTED) {
                link.observe(document);
                self.clear_all();
                debug!("Ignoring late document from departing {}", id);
                return Ok(());
            }
        }

        // Compute before touching any state so a bad document changes nothing.
        let derived = Derived::compute(
            &document,
            self.local_spec.as_ref(),
            self.policy,
            &self.hostname,
        )?;

        let (link, known) = self.links.entry(&id);
        if !known {
            // Joined may not have been seen yet.
            let registration = &self.registration;
            link.publish(|doc| copy_fields(registration, doc));
        }
        link.observe(document);
        self.current = Some(id.clone());

        self.flags.set(flag::RELATED);
        derived.apply(&mut self.flags);
        debug!("Reconciled {}: {:?}", id, derived);
        Ok(())
    }

    fn on_departed(&mut self, id: LinkId) {
        self.clear_all();
        match self.links.get_mut(&id) {
            Some(link) => {
                link.flags.set(LINK_DEPARTED);
            }
            None => debug!("Departed event for unknown link {}", id),
        }
        info!("Coordinator {} departing; flags cleared", id);
    }

    fn on_broken(&mut self, id: LinkId) {
        self.clear_all();
        if self.links.remove(&id).is_none() {
            debug!("Broken event for unknown link {}", id);
        }
        if self.current.as_ref() == Some(&id) {
            self.current = None;
        }
        info!("Link to {} broken; flags cleared", id);
    }

    fn clear_all(&mut self) {
        for name in flag::ALL {
            self.flags.clear(name);
        }
    }
}

fn copy_fields(from: &Document, to: &mut Document) -> bool {
    let mut changed = false;
    for (field, value) in from.iter() {
        changed |= to.set(field, value);
    }
    changed
}

#[async_trait]
impl Reconcile for Peer {
    fn dispatch(&mut self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Joined { link } => self.on_joined(link),
            LinkEvent::Changed { link, document } => self.on_changed(link, document)?,
            LinkEvent::Departed { link } => self.on_departed(link),
            LinkEvent::Broken { link } => self.on_broken(link),
        }
        Ok(())
    }

    fn flags(&self) -> FlagSet {
        self.flags.clone()
    }

    fn take_outgoing(&mut self) -> Vec<(LinkId, Document)> {
        self.links.take_outgoing()
    }

    async fn execute(
        &mut self,
        command: Command,
        _resolver: &dyn AddressResolver,
    ) -> Result<Option<Output>> {
        match command {
            Command::RegisterDatanode => self.register_datanode()?,
            Command::RegisterSecondary { port } => self.register_secondary(port)?,
            Command::SetSpec { spec } => self.set_spec(spec),
            Command::Flags => {
                return Ok(Some(Output::Flags {
                    flags: self.flags.clone(),
                }))
            }
            other => {
                return Err(Error::Unsupported {
                    role: self.role.as_str(),
                    operation: other.name(),
                })
            }
        }
        Ok(None)
    }
}
