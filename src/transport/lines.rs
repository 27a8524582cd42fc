//! JSON-lines transport: one [`Input`] per line in, one [`Output`] per
//! line out.

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::{mpsc, Mutex};

use super::Transport;
use crate::types::{Input, Output};

pub struct LineTransport<R, W> {
    reader: Mutex<Option<R>>,
    writer: Mutex<W>,
}

pub type StdioTransport = LineTransport<Stdin, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn run(&self, input_tx: mpsc::Sender<Input>) -> anyhow::Result<()> {
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Transport is already running"))?;
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Input>(line) {
                Ok(input) => {
                    debug!("Received input: {:?}", input);
                    if let Err(e) = input_tx.send(input).await {
                        warn!("Failed to forward input: {}", e);
                        return Err(anyhow!("Channel closed"));
                    }
                }
                Err(e) => warn!("Skipping malformed input line {:?}: {}", line, e),
            }
        }
        info!("Input stream ended");
        Ok(())
    }

    async fn deliver(&self, output: &Output) -> anyhow::Result<()> {
        let mut bytes = serde_json::to_vec(output)?;
        bytes.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }
}
