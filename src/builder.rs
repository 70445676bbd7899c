//! Build and push orchestration around the external image builder
//!
//! The builder binary is opaque: it is invoked as `<builder> build -t <tag>
//! <dir>` and then `<builder> push <tag>`. Both output streams of each
//! invocation are relayed line by line to the client.

use crate::error::{CommandError, PipelineError};
use crate::protocol::Stream;
use crate::relay::{spawn_relay, OutputSink};
use crate::tag::ImageTag;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default builder executable, resolved through `PATH`
pub const DEFAULT_BUILDER: &str = "img";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Build,
    Push,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Build => "build",
            Step::Push => "push",
        }
    }
}

/// Handle on the external builder executable
#[derive(Debug, Clone)]
pub struct Builder {
    program: PathBuf,
}

impl Builder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one step
    pub fn args(&self, step: Step, tag: &ImageTag, context_dir: &Path) -> Vec<OsString> {
        match step {
            Step::Build => vec![
                "build".into(),
                "-t".into(),
                tag.as_str().into(),
                context_dir.as_os_str().to_owned(),
            ],
            Step::Push => vec!["push".into(), tag.as_str().into()],
        }
    }

    /// Build the image from `context_dir`, then push it.
    ///
    /// Push only starts once the build process has exited successfully and its
    /// output has been fully relayed.
    pub async fn build_and_push(
        &self,
        tag: &ImageTag,
        context_dir: &Path,
        sink: &OutputSink,
    ) -> Result<(), PipelineError> {
        self.run(Step::Build, tag, context_dir, sink)
            .await
            .map_err(PipelineError::BuildCommand)?;
        self.run(Step::Push, tag, context_dir, sink)
            .await
            .map_err(PipelineError::PushCommand)?;
        Ok(())
    }

    /// Run a single step to completion, relaying its output.
    pub async fn run(
        &self,
        step: Step,
        tag: &ImageTag,
        context_dir: &Path,
        sink: &OutputSink,
    ) -> Result<(), CommandError> {
        let program = self.program.display().to_string();
        let args = self.args(step, tag, context_dir);
        info!(step = step.name(), "Running {}", program);
        debug!("Arguments: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| spawn_relay(Stream::Stdout, out, sink.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|err| spawn_relay(Stream::Stderr, err, sink.clone()));

        let status = child.wait().await;
        let relays: Vec<_> = [stdout, stderr].into_iter().flatten().collect();
        join_relays(relays, status.is_err()).await;

        let status = status.map_err(|source| CommandError::Wait {
            program: program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(CommandError::Exit {
                program,
                step: step.name(),
                status,
            });
        }

        info!(step = step.name(), "Step finished");
        Ok(())
    }
}

/// Wait for the relay tasks, aborting them first when `abort` is set.
///
/// Once this returns no relay holds a sink, so nothing they read can be queued
/// behind a later result line.
async fn join_relays(relays: Vec<JoinHandle<usize>>, abort: bool) {
    for relay in relays {
        if abort {
            relay.abort();
        }
        match relay.await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => debug!("Relay task ended abnormally: {}", e),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new(DEFAULT_BUILDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{channel, OutputRecord};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn stub(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("img");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn tag() -> ImageTag {
        ImageTag::with_id("registry.local", Uuid::nil()).unwrap()
    }

    async fn lines(mut rx: tokio::sync::mpsc::Receiver<OutputRecord>) -> Vec<(Stream, String)> {
        let mut out = Vec::new();
        while let Some(record) = rx.recv().await {
            if let OutputRecord::Line { stream, text } = record {
                out.push((stream, text));
            }
        }
        out
    }

    #[test]
    fn test_args() {
        let builder = Builder::default();
        let tag = tag();
        assert_eq!(builder.program(), Path::new("img"));
        assert_eq!(
            builder.args(Step::Build, &tag, Path::new("/tmp/build-1")),
            vec!["build", "-t", tag.as_str(), "/tmp/build-1"]
        );
        assert_eq!(
            builder.args(Step::Push, &tag, Path::new("/tmp/build-1")),
            vec!["push", tag.as_str()]
        );
    }

    #[tokio::test]
    async fn test_build_and_push_relays_both_streams() {
        let temp = TempDir::new().unwrap();
        let builder = Builder::new(stub(temp.path(), r#"echo "out $1"; echo "err $1" >&2"#));
        let (sink, rx) = channel();

        builder
            .build_and_push(&tag(), temp.path(), &sink)
            .await
            .unwrap();
        drop(sink);

        let mut got = lines(rx).await;
        got.sort();
        assert_eq!(
            got,
            vec![
                (Stream::Stdout, "out build".to_string()),
                (Stream::Stdout, "out push".to_string()),
                (Stream::Stderr, "err build".to_string()),
                (Stream::Stderr, "err push".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_build_never_pushes() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("pushed");
        let body = format!(
            r#"if [ "$1" = push ]; then touch {}; exit 0; fi; echo boom >&2; exit 3"#,
            marker.display()
        );
        let builder = Builder::new(stub(temp.path(), &body));
        let (sink, rx) = channel();

        let err = builder
            .build_and_push(&tag(), temp.path(), &sink)
            .await
            .unwrap_err();
        drop(sink);

        assert!(matches!(
            err,
            PipelineError::BuildCommand(CommandError::Exit { .. })
        ));
        assert!(!marker.exists());
        assert_eq!(lines(rx).await, vec![(Stream::Stderr, "boom".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_push() {
        let temp = TempDir::new().unwrap();
        let builder = Builder::new(stub(temp.path(), r#"[ "$1" = build ]"#));
        let (sink, _rx) = channel();

        let err = builder
            .build_and_push(&tag(), temp.path(), &sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PushCommand(CommandError::Exit { step: "push", .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_builder() {
        let temp = TempDir::new().unwrap();
        let builder = Builder::new(temp.path().join("does-not-exist"));
        let (sink, _rx) = channel();

        let err = builder
            .build_and_push(&tag(), temp.path(), &sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BuildCommand(CommandError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_aborted_relays_release_the_sink() {
        let (sink, mut rx) = channel();
        // Keep the write side open so the relay would otherwise never finish
        let (_open, reader) = tokio::io::duplex(64);
        let relay = spawn_relay(Stream::Stdout, reader, sink.clone());

        join_relays(vec![relay], true).await;
        drop(sink);

        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn test_joined_relays_deliver_everything() {
        let (sink, rx) = channel();
        let input: &[u8] = b"one\ntwo";
        let relay = spawn_relay(Stream::Stderr, input, sink.clone());

        join_relays(vec![relay], false).await;
        drop(sink);

        assert_eq!(
            lines(rx).await,
            vec![
                (Stream::Stderr, "one".to_string()),
                (Stream::Stderr, "two".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_silent_process_does_not_hang() {
        let temp = TempDir::new().unwrap();
        let builder = Builder::new(stub(temp.path(), "exit 0"));
        let (sink, rx) = channel();

        builder
            .run(Step::Build, &tag(), temp.path(), &sink)
            .await
            .unwrap();
        drop(sink);
        assert!(lines(rx).await.is_empty());
    }
}
