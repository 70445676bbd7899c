//! The per-connection worker
//!
//! Extract → Detect → (Write descriptor) → Build → Push → Result. Each stage
//! completes before the next starts. Whatever happens, the client receives
//! exactly one result line, the connection is closed and the staging
//! directory is removed.

use crate::archive::{self, ExtractSummary};
use crate::builder::Builder;
use crate::config::DeploycConfig;
use crate::detection::{detect, write_descriptor, Detection};
use crate::error::{DetectionError, ExtractionError, PipelineError};
use crate::fs::RealFileSystem;
use crate::protocol::{ResultLine, Stream};
use crate::relay::{self, ConnectionWriter, OutputSink, Redactor};
use crate::staging::StagingDir;
use crate::tag::ImageTag;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, error, info, Span};

/// Read-only state shared by all workers
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub registry: String,
    pub staging_root: PathBuf,
    pub builder: Builder,
}

impl PipelineContext {
    pub fn from_config(config: &DeploycConfig) -> Self {
        Self {
            registry: config.registry.clone(),
            staging_root: config.staging_dir.clone(),
            builder: config.builder(),
        }
    }
}

/// Run the full pipeline for one connection and return the result that was
/// sent to the client.
pub async fn handle_connection<R, W>(reader: R, writer: W, ctx: &PipelineContext) -> ResultLine
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let tag = ImageTag::generate(&ctx.registry);
    let redactor = match &tag {
        Ok(tag) => {
            Span::current().record("tag", tag.as_str());
            Redactor::for_tag(tag)
        }
        Err(_) => Redactor::disabled(),
    };

    let (sink, rx) = relay::channel();
    let writer_task = tokio::spawn(ConnectionWriter::new(writer, redactor).run(rx));

    let mut worker = Worker {
        ctx,
        sink: sink.clone(),
        staging: None,
        drain: None,
    };
    let outcome = match tag {
        Ok(tag) => worker.run(reader, &tag).await.map(|()| tag),
        Err(e) => Err(e.into()),
    };

    let result = match outcome {
        Ok(tag) => {
            info!("Image pushed");
            sink.line(Stream::Stdout, "").await;
            ResultLine::Success(tag)
        }
        Err(e) => {
            error!(stage = e.stage(), "Pipeline failed: {}", e);
            sink.text(Stream::Stderr, &e.to_string()).await;
            ResultLine::Failed
        }
    };
    sink.result(result.clone()).await;

    drop(sink);
    drop(worker.sink);
    if let Err(e) = writer_task.await {
        error!("Connection writer failed: {}", e);
    }
    if let Some(drain) = worker.drain.take() {
        drain.abort();
    }
    if let Some(staging) = worker.staging.take() {
        if let Err(e) = staging.close() {
            error!("{}", e);
        }
    }

    result
}

struct Worker<'a> {
    ctx: &'a PipelineContext,
    sink: OutputSink,
    staging: Option<StagingDir>,
    drain: Option<JoinHandle<()>>,
}

impl Worker<'_> {
    async fn run<R>(&mut self, reader: R, tag: &ImageTag) -> Result<(), PipelineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let root = self
            .staging
            .insert(StagingDir::create(&self.ctx.staging_root)?)
            .path()
            .to_path_buf();
        debug!("Staging directory: {}", root.display());

        let summary = self.extract(reader, root.clone()).await?;
        info!(
            files = summary.files,
            directories = summary.directories,
            "Archive extracted"
        );
        for (path, kind) in &summary.skipped {
            self.sink
                .line(
                    Stream::Stderr,
                    format!("Unable to untar type {} in file {}", kind, path),
                )
                .await;
        }

        let detection = prepare_descriptor(root.clone()).await?;

        self.sink
            .text(
                Stream::Stdout,
                &format!("\nFound {} app. Building.\n", detection.project_type),
            )
            .await;

        self.ctx.builder.build_and_push(tag, &root, &self.sink).await
    }

    /// Decode the inbound byte stream on a blocking thread.
    ///
    /// Whatever the client sends after the archive's end marker is drained in
    /// the background until the connection closes, so unread input never turns
    /// our close into a reset.
    async fn extract<R>(&mut self, reader: R, root: PathBuf) -> Result<ExtractSummary, PipelineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut bridge = SyncIoBridge::new(reader);
        let (result, bridge) = tokio::task::spawn_blocking(move || {
            let result = archive::extract(&mut bridge, &root);
            (result, bridge)
        })
        .await
        .map_err(|e| ExtractionError::Aborted(e.to_string()))?;

        let mut reader = bridge.into_inner();
        self.drain = Some(tokio::spawn(async move {
            let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
        }));

        Ok(result?)
    }
}

/// Detect the project type and write its descriptor, on a blocking thread
async fn prepare_descriptor(root: PathBuf) -> Result<Detection, PipelineError> {
    tokio::task::spawn_blocking(move || -> Result<Detection, PipelineError> {
        let fs = RealFileSystem::new();
        let detection = detect(&fs, &root)?;
        write_descriptor(&fs, &root, &detection)?;
        Ok(detection)
    })
    .await
    .map_err(|e| DetectionError::Aborted(e.to_string()))?
}
