//! Coordinator side of the link.
//!
//! Publishes cluster identity and configuration to every related unit and
//! tracks which of them registered as storage nodes or standby
//! coordinators. Flags live on each link; [`Coordinator::flags`] folds
//! them together so a flag reads as set while any link has it.

use async_trait::async_trait;
use log::{debug, info};

use crate::agent::Reconcile;
use crate::document::{fields, Document, HostsMap, Spec};
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::link::{LinkId, LinkTable};
use crate::resolver::AddressResolver;
use crate::types::{Command, LinkEvent, NodeRecord, Output};

pub mod flag {
    pub const CLIENT_CONNECTED: &str = "client.connected";
    pub const DATANODE_CONNECTED: &str = "datanode.connected";
    pub const SECONDARY_CONNECTED: &str = "secondary.connected";
    pub const DATANODE_LEAVING: &str = "datanode.leaving";
    pub const SECONDARY_LEAVING: &str = "secondary.leaving";
}

/// Role markers a peer may publish, with the flags they drive.
const ROLES: [(&str, &str, &str); 2] = [
    (
        fields::DATANODE,
        flag::DATANODE_CONNECTED,
        flag::DATANODE_LEAVING,
    ),
    (
        fields::SECONDARY,
        flag::SECONDARY_CONNECTED,
        flag::SECONDARY_LEAVING,
    ),
];

pub struct Coordinator {
    relation_name: String,
    private_address: String,
    links: LinkTable,
}

impl Coordinator {
    pub fn new(relation_name: &str, hostname: impl Into<String>) -> Self {
        Self {
            relation_name: relation_name.to_string(),
            private_address: hostname.into(),
            links: LinkTable::new(relation_name),
        }
    }

    pub fn with_private_address(mut self, address: impl Into<String>) -> Self {
        self.private_address = address.into();
        self
    }

    /// Flags of a single link, if it is known.
    pub fn link_flags(&self, id: &LinkId) -> Option<&FlagSet> {
        self.links.get(id).map(|link| &link.flags)
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkId> {
        self.links.iter().map(|(id, _)| id)
    }

    /// Published document for `id`, as the remote side will see it.
    pub fn published(&self, id: &LinkId) -> Option<&Document> {
        self.links.get(id).map(|link| link.published())
    }

    fn on_joined(&mut self, id: LinkId) {
        let (link, known) = self.links.entry(&id);
        link.flags.set(flag::CLIENT_CONNECTED);
        let address = &self.private_address;
        link.publish(|doc| doc.set(fields::PRIVATE_ADDRESS, address.as_str()));
        if !known {
            info!("Unit {} joined", id);
        }
    }

    fn on_changed(&mut self, id: LinkId, document: Document) {
        let (link, known) = self.links.entry(&id);
        if !known {
            // Joined may not have been seen yet.
            let address = &self.private_address;
            link.publish(|doc| doc.set(fields::PRIVATE_ADDRESS, address.as_str()));
        }
        for (field, connected, leaving) in ROLES {
            let wanted = document.get_bool(field) && !link.flags.is_set(leaving);
            if link.flags.toggle(connected, wanted) {
                info!("Unit {} {}: {}", id, connected, wanted);
            }
        }
        link.observe(document);
    }

    fn on_departed(&mut self, id: LinkId) {
        let Some(link) = self.links.get_mut(&id) else {
            debug!("Departed event for unknown link {}", id);
            return;
        };
        for (_, connected, leaving) in ROLES {
            if link.flags.is_set(connected) {
                link.flags.set(leaving);
                link.flags.clear(connected);
            }
        }
        let active: Vec<_> = link.flags.active().collect();
        info!("Unit {} departing, flags: {:?}", id, active);
    }

    fn on_broken(&mut self, id: LinkId) {
        // Dropping the entry drops its flags with it.
        if self.links.remove(&id).is_none() {
            debug!("Broken event for unknown link {}", id);
            return;
        }
        info!("Link to {} broken", id);
    }

    /// Registered storage nodes. Treat the result as a set.
    pub async fn list_datanodes(&self, resolver: &dyn AddressResolver) -> Result<Vec<NodeRecord>> {
        let mut nodes = Vec::new();
        for (_, link) in self.links.iter() {
            if !link.flags.is_set(flag::DATANODE_CONNECTED) {
                continue;
            }
            let doc = link.observed();
            nodes.push(NodeRecord {
                hostname: doc.get(fields::HOSTNAME).to_string(),
                ip: resolver.resolve(doc.get(fields::PRIVATE_ADDRESS)).await?,
                port: None,
            });
        }
        Ok(nodes)
    }

    /// Registered standby coordinators, with their service port.
    pub async fn list_secondaries(
        &self,
        resolver: &dyn AddressResolver,
    ) -> Result<Vec<NodeRecord>> {
        let mut nodes = Vec::new();
        for (_, link) in self.links.iter() {
            if !link.flags.is_set(flag::SECONDARY_CONNECTED) {
                continue;
            }
            let doc = link.observed();
            nodes.push(NodeRecord {
                hostname: doc.get(fields::HOSTNAME).to_string(),
                ip: resolver.resolve(doc.get(fields::PRIVATE_ADDRESS)).await?,
                port: doc.get_port(fields::PORT)?,
            });
        }
        Ok(nodes)
    }

    fn broadcast(&mut self, field: &str, value: &str) {
        for (_, link) in self.links.iter_mut() {
            link.publish(|doc| doc.set(field, value));
        }
    }

    pub fn publish_spec(&mut self, spec: &Spec) -> Result<()> {
        let encoded = serde_json::to_string(spec)?;
        self.broadcast(fields::SPEC, &encoded);
        Ok(())
    }

    pub fn publish_ports(&mut self, port: u16, webhdfs_port: u16) {
        self.broadcast(fields::PORT, &port.to_string());
        self.broadcast(fields::WEBHDFS_PORT, &webhdfs_port.to_string());
    }

    pub fn publish_ready(&mut self, ready: bool) {
        for (_, link) in self.links.iter_mut() {
            link.publish(|doc| doc.set_bool(fields::HDFS_READY, ready));
        }
    }

    pub fn publish_hosts_map(&mut self, hosts_map: &HostsMap) -> Result<()> {
        let encoded = serde_json::to_string(hosts_map)?;
        self.broadcast(fields::HOSTS_MAP, &encoded);
        Ok(())
    }

    /// Only links currently registered as a datanode or secondary get the
    /// key.
    pub fn publish_ssh_key(&mut self, ssh_key: &str) {
        for (id, link) in self.links.iter_mut() {
            let trusted = link.flags.is_set(flag::DATANODE_CONNECTED)
                || link.flags.is_set(flag::SECONDARY_CONNECTED);
            if trusted {
                link.publish(|doc| doc.set(fields::SSH_KEY, ssh_key));
            } else {
                debug!("Withholding ssh key from unregistered unit {}", id);
            }
        }
    }
}

#[async_trait]
impl Reconcile for Coordinator {
    fn dispatch(&mut self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Joined { link } => self.on_joined(link),
            LinkEvent::Changed { link, document } => self.on_changed(link, document),
            LinkEvent::Departed { link } => self.on_departed(link),
            LinkEvent::Broken { link } => self.on_broken(link),
        }
        Ok(())
    }

    fn flags(&self) -> FlagSet {
        let mut all = FlagSet::new(self.relation_name.as_str());
        for (_, link) in self.links.iter() {
            all.union_with(&link.flags);
        }
        all
    }

    fn take_outgoing(&mut self) -> Vec<(LinkId, Document)> {
        self.links.take_outgoing()
    }

    async fn execute(
        &mut self,
        command: Command,
        resolver: &dyn AddressResolver,
    ) -> Result<Option<Output>> {
        match command {
            Command::PublishSpec { spec } => self.publish_spec(&spec)?,
            Command::PublishPorts { port, webhdfs_port } => self.publish_ports(port, webhdfs_port),
            Command::PublishReady { ready } => self.publish_ready(ready),
            Command::PublishHostsMap { hosts_map } => self.publish_hosts_map(&hosts_map)?,
            Command::PublishSshKey { ssh_key } => self.publish_ssh_key(&ssh_key),
            Command::ListDatanodes => {
                let nodes = self.list_datanodes(resolver).await?;
                return Ok(Some(Output::Datanodes { nodes }));
            }
            Command::ListSecondaries => {
                let nodes = self.list_secondaries(resolver).await?;
                return Ok(Some(Output::Secondaries { nodes }));
            }
            Command::Flags => return Ok(Some(Output::Flags { flags: self.flags() })),
            other => {
                return Err(Error::Unsupported {
                    role: "coordinator",
                    operation: other.name(),
                })
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;

    fn changed(link: &str, fields: &[(&str, &str)]) -> LinkEvent {
        LinkEvent::Changed {
            link: link.into(),
            document: fields.iter().copied().collect(),
        }
    }

    #[test]
    fn test_roles_are_independent() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        let id = LinkId::from("odd/0");
        coord
            .dispatch(changed(
                "odd/0",
                &[(fields::DATANODE, "true"), (fields::SECONDARY, "true")],
            ))
            .unwrap();
        let flags = coord.link_flags(&id).unwrap();
        assert!(flags.is_set(flag::DATANODE_CONNECTED));
        assert!(flags.is_set(flag::SECONDARY_CONNECTED));
    }

    #[test]
    fn test_changed_clears_withdrawn_role() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        let id = LinkId::from("datanode/0");
        coord
            .dispatch(changed("datanode/0", &[(fields::DATANODE, "true")]))
            .unwrap();
        coord
            .dispatch(changed("datanode/0", &[(fields::DATANODE, "")]))
            .unwrap();
        assert!(!coord.link_flags(&id).unwrap().is_set(flag::DATANODE_CONNECTED));
    }

    #[test]
    fn test_departed_marks_leaving() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        let id = LinkId::from("datanode/0");
        coord.dispatch(LinkEvent::Joined { link: id.clone() }).unwrap();
        coord
            .dispatch(changed("datanode/0", &[(fields::DATANODE, "true")]))
            .unwrap();
        coord
            .dispatch(LinkEvent::Departed { link: id.clone() })
            .unwrap();

        let flags = coord.link_flags(&id).unwrap();
        assert!(flags.is_set(flag::DATANODE_LEAVING));
        assert!(!flags.is_set(flag::DATANODE_CONNECTED));
        assert!(!flags.is_set(flag::SECONDARY_LEAVING));

        // Late data from the leaving unit does not reconnect it.
        coord
            .dispatch(changed("datanode/0", &[(fields::DATANODE, "true")]))
            .unwrap();
        assert!(!coord
            .link_flags(&id)
            .unwrap()
            .is_set(flag::DATANODE_CONNECTED));
    }

    #[test]
    fn test_unknown_link_events_are_ignored() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        coord
            .dispatch(LinkEvent::Departed {
                link: "ghost/0".into(),
            })
            .unwrap();
        coord
            .dispatch(LinkEvent::Broken {
                link: "ghost/0".into(),
            })
            .unwrap();
        assert_eq!(coord.links().count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_every_link() {
        let mut coord = Coordinator::new("hdfs", "namenode-0").with_private_address("10.0.0.1");
        for link in ["datanode/0", "datanode/1", "client/0"] {
            coord.dispatch(LinkEvent::Joined { link: link.into() }).unwrap();
        }
        coord.take_outgoing();

        coord.publish_ports(8020, 50070);
        coord.publish_ready(false);
        let out = coord.take_outgoing();
        assert_eq!(out.len(), 3);
        for (_, doc) in &out {
            assert_eq!(doc.get(fields::PORT), "8020");
            assert_eq!(doc.get(fields::WEBHDFS_PORT), "50070");
            assert_eq!(doc.get(fields::HDFS_READY), "false");
            assert_eq!(doc.get(fields::PRIVATE_ADDRESS), "10.0.0.1");
        }
    }

    #[tokio::test]
    async fn test_list_secondaries_includes_port() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        coord
            .dispatch(changed(
                "secondary/0",
                &[
                    (fields::SECONDARY, "true"),
                    (fields::HOSTNAME, "standby-0"),
                    (fields::PRIVATE_ADDRESS, "standby-0.lan"),
                    (fields::PORT, "50090"),
                ],
            ))
            .unwrap();
        coord
            .dispatch(changed(
                "datanode/0",
                &[
                    (fields::DATANODE, "true"),
                    (fields::HOSTNAME, "datanode-0"),
                    (fields::PRIVATE_ADDRESS, "10.0.0.5"),
                ],
            ))
            .unwrap();

        let resolver =
            StaticResolver::new().with_host("standby-0.lan", "10.0.0.9".parse().unwrap());
        let secondaries = coord.list_secondaries(&resolver).await.unwrap();
        assert_eq!(
            secondaries,
            vec![NodeRecord {
                hostname: "standby-0".into(),
                ip: "10.0.0.9".parse().unwrap(),
                port: Some(50090),
            }]
        );

        let datanodes = coord.list_datanodes(&resolver).await.unwrap();
        assert_eq!(datanodes.len(), 1);
        assert_eq!(datanodes[0].hostname, "datanode-0");
        assert_eq!(datanodes[0].port, None);
    }

    #[tokio::test]
    async fn test_unresolvable_address_fails_listing() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        coord
            .dispatch(changed(
                "datanode/0",
                &[(fields::DATANODE, "true"), (fields::PRIVATE_ADDRESS, "nowhere")],
            ))
            .unwrap();
        let err = coord.list_datanodes(&StaticResolver::new()).await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }

    #[tokio::test]
    async fn test_peer_commands_are_rejected() {
        let mut coord = Coordinator::new("hdfs", "namenode-0");
        let err = coord
            .execute(Command::RegisterDatanode, &StaticResolver::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unsupported {
                operation: "register-datanode",
                ..
            }
        ));
    }
}
