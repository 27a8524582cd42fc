use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{Input, Output};

pub mod lines;
pub use lines::{LineTransport, StdioTransport};

#[async_trait]
pub trait Transport {
    /// Read lifecycle events and commands until the source is exhausted.
    /// Inputs should be sent to the provided channel.
    async fn run(&self, input_tx: mpsc::Sender<Input>) -> Result<()>;

    /// Hand one output to whoever is on the other end.
    async fn deliver(&self, output: &Output) -> Result<()>;
}
