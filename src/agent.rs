//! The dispatch loop tying a role to its transport.
//!
//! Each [`Input`] is handled to completion before the next is read, so
//! reconciliation passes never overlap within one process.

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::config::{Config, Role};
use crate::coordinator::Coordinator;
use crate::document::Document;
use crate::error::Result;
use crate::flags::FlagSet;
use crate::link::LinkId;
use crate::peer::{Peer, PeerRole};
use crate::resolver::AddressResolver;
use crate::types::{Command, Input, LinkEvent, Output};

/// One side of the link.
#[async_trait]
pub trait Reconcile: Send {
    /// Runs one reconciliation pass for the event's link.
    fn dispatch(&mut self, event: LinkEvent) -> Result<()>;

    /// Current flags, as downstream logic should see them.
    fn flags(&self) -> FlagSet;

    /// Published documents that changed since the previous call.
    fn take_outgoing(&mut self) -> Vec<(LinkId, Document)>;

    async fn execute(
        &mut self,
        command: Command,
        resolver: &dyn AddressResolver,
    ) -> Result<Option<Output>>;
}

/// Builds the role named by the configuration.
pub fn role_from_config(config: &Config) -> Box<dyn Reconcile> {
    let address = config.advertised_address().to_string();
    let peer_role = match config.role {
        Role::Coordinator => {
            return Box::new(
                Coordinator::new(&config.relation_name, config.unit_hostname.clone())
                    .with_private_address(address),
            )
        }
        Role::Datanode => PeerRole::Datanode,
        Role::Secondary => PeerRole::Secondary,
        Role::Client => PeerRole::Client,
    };
    Box::new(
        Peer::new(peer_role, &config.relation_name, config.unit_hostname.clone())
            .with_private_address(address)
            .with_missing_spec_policy(config.missing_local_spec),
    )
}

/// Handles one input, returning everything that should go out.
pub async fn handle_input<R>(
    role: &mut R,
    resolver: &dyn AddressResolver,
    input: Input,
) -> Vec<Output>
where
    R: Reconcile + ?Sized,
{
    let mut replies = Vec::new();
    match input {
        Input::Event(event) => {
            let name = event.name();
            let link = event.link().clone();
            debug!("Dispatching {} for {}", name, link);
            match role.dispatch(event) {
                Ok(()) => replies.push(Output::Flags {
                    flags: role.flags(),
                }),
                Err(e) => {
                    error!("Reconciliation of {} for {} failed: {}", name, link, e);
                    replies.push(Output::Error {
                        message: format!("{} {}: {}", name, link, e),
                    });
                }
            }
        }
        Input::Command(command) => {
            let name = command.name();
            match role.execute(command, resolver).await {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {}
                Err(e) => {
                    error!("Command {} failed: {}", name, e);
                    replies.push(Output::Error {
                        message: format!("{}: {}", name, e),
                    });
                }
            }
        }
    }

    let mut outputs: Vec<Output> = role
        .take_outgoing()
        .into_iter()
        .map(|(link, document)| Output::Publish { link, document })
        .collect();
    outputs.extend(replies);
    outputs
}

/// Runs until the input channel closes.
pub async fn run_agent<R>(
    role: &mut R,
    resolver: &dyn AddressResolver,
    mut inputs: mpsc::Receiver<Input>,
    outputs: mpsc::Sender<Output>,
) -> anyhow::Result<()>
where
    R: Reconcile + ?Sized,
{
    while let Some(input) = inputs.recv().await {
        for output in handle_input(role, resolver, input).await {
            if let Err(e) = outputs.send(output).await {
                error!("Failed to send output: {}", e);
                return Err(anyhow::anyhow!("Channel closed"));
            }
        }
    }
    info!("Input channel closed, shutting down");
    Ok(())
}
