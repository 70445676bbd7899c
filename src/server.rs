//! TCP listener
//!
//! Every accepted connection gets its own task running the full pipeline.
//! Workers share nothing mutable; a failing worker never affects the listener
//! or other workers. Accept errors are logged and retried.

use crate::config::DeploycConfig;
use crate::pipeline::{handle_connection, PipelineContext};
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, Instrument};

/// Pause after a failed accept, so resource exhaustion does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    ctx: Arc<PipelineContext>,
}

impl Server {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: &DeploycConfig) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Could not listen on {}", addr))?;

        Ok(Self {
            listener,
            ctx: Arc::new(PipelineContext::from_config(config)),
        })
    }

    pub fn from_listener(listener: TcpListener, ctx: PipelineContext) -> Self {
        Self {
            listener,
            ctx: Arc::new(ctx),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// In-flight workers keep running after the listener stops.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!("Listening on {}", addr);
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down listener");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => self.spawn_worker(stream, peer),
                    Err(e) => {
                        error!("Could not accept client: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }

    fn spawn_worker(&self, stream: TcpStream, peer: SocketAddr) {
        let ctx = Arc::clone(&self.ctx);
        let span = info_span!("connection", peer = %peer, tag = tracing::field::Empty);

        tokio::spawn(
            async move {
                info!("Accepted connection");
                let (reader, writer) = stream.into_split();
                let result = handle_connection(reader, writer, &ctx).await;
                info!(success = result.is_success(), "Connection closed");
            }
            .instrument(span),
        );
    }
}
