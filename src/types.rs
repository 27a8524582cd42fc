//! Messages flowing into and out of a role agent.
//!
//! Lifecycle events and commands arrive as [`Input`]; everything the
//! agent wants the outside world to see leaves as [`Output`]. All of them
//! are plain serde types so a transport can carry them as JSON.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::document::{Document, HostsMap, Spec};
use crate::flags::FlagSet;
use crate::link::LinkId;

/// A lifecycle event for one link, as fired by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LinkEvent {
    /// The remote unit has appeared.
    Joined { link: LinkId },
    /// The remote unit published a new document. `document` is the full
    /// current document, not a delta.
    Changed {
        link: LinkId,
        #[serde(default)]
        document: Document,
    },
    /// The remote unit is leaving. Its data may still be readable.
    Departed { link: LinkId },
    /// The link is gone.
    Broken { link: LinkId },
}

impl LinkEvent {
    pub fn link(&self) -> &LinkId {
        match self {
            LinkEvent::Joined { link }
            | LinkEvent::Changed { link, .. }
            | LinkEvent::Departed { link }
            | LinkEvent::Broken { link } => link,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Joined { .. } => "joined",
            LinkEvent::Changed { .. } => "changed",
            LinkEvent::Departed { .. } => "departed",
            LinkEvent::Broken { .. } => "broken",
        }
    }
}

/// Requests from local orchestration logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Command {
    // Coordinator side.
    PublishSpec { spec: Spec },
    PublishPorts { port: u16, webhdfs_port: u16 },
    PublishReady { ready: bool },
    PublishHostsMap { hosts_map: HostsMap },
    PublishSshKey { ssh_key: String },
    ListDatanodes,
    ListSecondaries,
    // Peer side.
    RegisterDatanode,
    RegisterSecondary { port: u16 },
    SetSpec { spec: Spec },
    // Either side.
    Flags,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PublishSpec { .. } => "publish-spec",
            Command::PublishPorts { .. } => "publish-ports",
            Command::PublishReady { .. } => "publish-ready",
            Command::PublishHostsMap { .. } => "publish-hosts-map",
            Command::PublishSshKey { .. } => "publish-ssh-key",
            Command::ListDatanodes => "list-datanodes",
            Command::ListSecondaries => "list-secondaries",
            Command::RegisterDatanode => "register-datanode",
            Command::RegisterSecondary { .. } => "register-secondary",
            Command::SetSpec { .. } => "set-spec",
            Command::Flags => "flags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Event(LinkEvent),
    Command(Command),
}

/// A registered storage node or standby coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub hostname: String,
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Output {
    /// A published document the transport must deliver to `link`.
    Publish { link: LinkId, document: Document },
    Flags { flags: FlagSet },
    Datanodes { nodes: Vec<NodeRecord> },
    Secondaries { nodes: Vec<NodeRecord> },
    /// A local fault. Never forwarded to the remote side.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let input: Input = serde_json::from_str(
            r#"{"event":"changed","link":"namenode/0","document":{"hdfs-ready":"true"}}"#,
        )
        .unwrap();
        match input {
            Input::Event(LinkEvent::Changed { link, document }) => {
                assert_eq!(link.as_str(), "namenode/0");
                assert!(document.get_bool("hdfs-ready"));
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }

    #[test]
    fn test_command_wire_format() {
        let input: Input =
            serde_json::from_str(r#"{"op":"publish-ports","port":8020,"webhdfs-port":50070}"#)
                .unwrap();
        assert_eq!(
            input,
            Input::Command(Command::PublishPorts {
                port: 8020,
                webhdfs_port: 50070
            })
        );

        let input: Input = serde_json::from_str(r#"{"op":"register-datanode"}"#).unwrap();
        assert_eq!(input, Input::Command(Command::RegisterDatanode));
    }

    #[test]
    fn test_node_record_omits_missing_port() {
        let record = NodeRecord {
            hostname: "datanode-0".into(),
            ip: "10.0.0.5".parse().unwrap(),
            port: None,
        };
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"hostname":"datanode-0","ip":"10.0.0.5"}"#
        );
    }
}
