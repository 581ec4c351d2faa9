// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote command execution with stdout piped into a local consumer.
//!
//! The exec channel's stdout is bridged into a blocking [`Read`] and handed
//! to the consumer on a blocking thread while the transfer is still in
//! flight, so memory stays bounded by the channel buffers. Stderr is drained
//! concurrently and kept for diagnostics.

use std::io::{self, Read};
use std::pin::Pin;

use monitoring_k8s::{ExecSession, K8sClient, K8sError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::ExtractError;
use crate::unpack::ArchiveError;

const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;

/// Blocking view of the remote stdout handed to the consumer.
pub type StreamReader = CancellableReader<SyncIoBridge<Pin<Box<dyn AsyncRead + Send>>>>;

/// `tar cf - -C <mount_path> .`
pub fn archive_command(mount_path: &str) -> Vec<String> {
	["tar", "cf", "-", "-C", mount_path, "."]
		.into_iter()
		.map(String::from)
		.collect()
}

/// The container a command runs in.
#[derive(Debug, Clone, Copy)]
pub struct ExecTarget<'a> {
	pub namespace: &'a str,
	pub pod: &'a str,
	pub container: &'a str,
}

impl ExecTarget<'_> {
	fn cancelled(&self) -> ExtractError {
		ExtractError::Cancelled {
			namespace: self.namespace.to_string(),
			name: self.pod.to_string(),
		}
	}

	fn stream_error(&self, err: &K8sError, stderr: String) -> ExtractError {
		ExtractError::Stream {
			namespace: self.namespace.to_string(),
			name: self.pod.to_string(),
			message: err.to_string(),
			stderr,
		}
	}

	fn archive_error(&self, source: ArchiveError) -> ExtractError {
		ExtractError::Archive {
			namespace: self.namespace.to_string(),
			name: self.pod.to_string(),
			source,
		}
	}
}

/// Run `command` once in `target` and feed its stdout to `consume`.
///
/// Failure precedence: cancellation, then a failed remote command (with its
/// stderr), then a consumer error, then a channel error.
#[instrument(skip(client, cancel, consume), fields(pod = %target.pod, namespace = %target.namespace))]
pub async fn run_streamed<T, F>(
	client: &dyn K8sClient,
	target: &ExecTarget<'_>,
	command: Vec<String>,
	cancel: &CancellationToken,
	consume: F,
) -> Result<T, ExtractError>
where
	T: Send + 'static,
	F: FnOnce(StreamReader) -> Result<T, ArchiveError> + Send + 'static,
{
	debug!(?command, container = %target.container, "Opening exec channel");

	let opened = tokio::select! {
		_ = cancel.cancelled() => return Err(target.cancelled()),
		opened = client.exec(target.pod, target.namespace, target.container, command) => opened,
	};
	let ExecSession {
		stdout,
		stderr,
		completion,
	} = opened.map_err(|e| target.stream_error(&e, String::new()))?;

	let stderr_task = tokio::spawn(capture_stderr(stderr));
	let reader = CancellableReader::new(SyncIoBridge::new(stdout), cancel.clone());
	let consumer = tokio::task::spawn_blocking(move || consume(reader));

	// Dropping `completion` on cancellation tears the channel down, which
	// unblocks the consumer thread with end-of-stream.
	let (status, consumed) = tokio::select! {
		_ = cancel.cancelled() => {
			stderr_task.abort();
			return Err(target.cancelled());
		}
		outcome = async { tokio::join!(completion, consumer) } => outcome,
	};

	let stderr = stderr_task.await.unwrap_or_default();
	if cancel.is_cancelled() {
		return Err(target.cancelled());
	}
	if !stderr.is_empty() {
		debug!(%stderr, "Remote command wrote to stderr");
	}

	let consumed =
		consumed.unwrap_or_else(|join_err| Err(ArchiveError::Aborted(join_err.to_string())));

	match (status, consumed) {
		(Err(err @ K8sError::CommandFailed { .. }), _) => Err(target.stream_error(&err, stderr)),
		(_, Err(source)) => Err(target.archive_error(source)),
		(Err(err), Ok(_)) => {
			warn!(error = %err, "Exec channel failed after stream was consumed");
			Err(target.stream_error(&err, stderr))
		}
		(Ok(()), Ok(value)) => Ok(value),
	}
}

async fn capture_stderr(mut stderr: Pin<Box<dyn AsyncRead + Send>>) -> String {
	let mut captured = Vec::new();
	let mut buf = [0u8; 4096];
	loop {
		match stderr.read(&mut buf).await {
			Ok(0) | Err(_) => break,
			Ok(n) => {
				let room = STDERR_CAPTURE_LIMIT.saturating_sub(captured.len());
				captured.extend_from_slice(&buf[..n.min(room)]);
			}
		}
	}
	String::from_utf8_lossy(&captured).trim_end().to_string()
}

/// Fails every read once `cancel` has fired, so a consumer stops at the
/// next buffer boundary.
pub struct CancellableReader<R> {
	inner: R,
	cancel: CancellationToken,
}

impl<R> CancellableReader<R> {
	pub fn new(inner: R, cancel: CancellationToken) -> Self {
		Self { inner, cancel }
	}
}

impl<R: Read> Read for CancellableReader<R> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if self.cancel.is_cancelled() {
			return Err(io::Error::other("extraction cancelled"));
		}
		self.inner.read(buf)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use monitoring_k8s::{MockExec, MockK8sClient, ObjectMeta, Pod};
	use std::time::Duration;

	const TARGET: ExecTarget<'static> = ExecTarget {
		namespace: "monitoring",
		pod: "extractor",
		container: "copy",
	};

	async fn client_with(exec: MockExec) -> MockK8sClient {
		let client = MockK8sClient::new().with_exec(exec);
		client
			.create_pod(
				"monitoring",
				Pod {
					metadata: ObjectMeta {
						name: Some("extractor".to_string()),
						..Default::default()
					},
					..Default::default()
				},
			)
			.await
			.unwrap();
		client
	}

	fn read_all(mut reader: StreamReader) -> Result<Vec<u8>, ArchiveError> {
		let mut out = Vec::new();
		reader
			.read_to_end(&mut out)
			.map_err(ArchiveError::Malformed)?;
		Ok(out)
	}

	#[test]
	fn test_archive_command() {
		assert_eq!(
			archive_command("/data"),
			vec!["tar", "cf", "-", "-C", "/data", "."]
		);
	}

	#[test]
	fn test_cancellable_reader_stops_after_cancel() {
		let cancel = CancellationToken::new();
		let mut reader = CancellableReader::new(io::Cursor::new(vec![1u8; 16]), cancel.clone());
		let mut buf = [0u8; 8];
		assert_eq!(reader.read(&mut buf).unwrap(), 8);

		cancel.cancel();
		assert!(reader.read(&mut buf).is_err());
	}

	#[tokio::test]
	async fn test_stdout_reaches_consumer() {
		let client = client_with(MockExec::Success {
			stdout: b"archive bytes".to_vec(),
			stderr: Vec::new(),
		})
		.await;

		let out = run_streamed(
			&client,
			&TARGET,
			archive_command("/data"),
			&CancellationToken::new(),
			read_all,
		)
		.await
		.unwrap();

		assert_eq!(out, b"archive bytes");
		assert_eq!(client.exec_calls(), vec![archive_command("/data")]);
	}

	#[tokio::test]
	async fn test_command_failure_carries_stderr() {
		let client = client_with(MockExec::CommandFailed {
			stdout: Vec::new(),
			stderr: b"tar: ./collector: Permission denied\n".to_vec(),
			message: "command terminated with non-zero exit code: exit status 1".to_string(),
		})
		.await;

		let err = run_streamed(
			&client,
			&TARGET,
			archive_command("/data"),
			&CancellationToken::new(),
			read_all,
		)
		.await
		.unwrap_err();

		match err {
			ExtractError::Stream {
				message, stderr, ..
			} => {
				assert!(message.contains("exit status 1"));
				assert_eq!(stderr, "tar: ./collector: Permission denied");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_command_failure_wins_over_consumer_failure() {
		let client = client_with(MockExec::CommandFailed {
			stdout: b"partial".to_vec(),
			stderr: b"tar: write error".to_vec(),
			message: "exit status 2".to_string(),
		})
		.await;

		let err = run_streamed(
			&client,
			&TARGET,
			archive_command("/data"),
			&CancellationToken::new(),
			|_reader| -> Result<(), ArchiveError> {
				Err(ArchiveError::Aborted("bad header".to_string()))
			},
		)
		.await
		.unwrap_err();

		assert!(matches!(err, ExtractError::Stream { .. }));
	}

	#[tokio::test]
	async fn test_consumer_failure_is_archive_error() {
		let client = client_with(MockExec::Success {
			stdout: b"not a tar".to_vec(),
			stderr: Vec::new(),
		})
		.await;

		let err = run_streamed(
			&client,
			&TARGET,
			archive_command("/data"),
			&CancellationToken::new(),
			|_reader| -> Result<(), ArchiveError> {
				Err(ArchiveError::Aborted("bad header".to_string()))
			},
		)
		.await
		.unwrap_err();

		assert!(matches!(err, ExtractError::Archive { .. }));
	}

	#[tokio::test]
	async fn test_open_failure_is_stream_error() {
		let client = client_with(MockExec::OpenFailed {
			message: "upgrade request failed: 403 Forbidden".to_string(),
		})
		.await;

		let err = run_streamed(
			&client,
			&TARGET,
			archive_command("/data"),
			&CancellationToken::new(),
			read_all,
		)
		.await
		.unwrap_err();

		match err {
			ExtractError::Stream { message, .. } => assert!(message.contains("403")),
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_cancel_mid_stream() {
		let client = client_with(MockExec::Hang).await;
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			trigger.cancel();
		});

		let result = tokio::time::timeout(
			Duration::from_secs(5),
			run_streamed(
				&client,
				&TARGET,
				archive_command("/data"),
				&cancel,
				read_all,
			),
		)
		.await
		.expect("cancellation should abort the stream promptly");

		assert!(matches!(result, Err(ExtractError::Cancelled { .. })));
	}

	#[tokio::test]
	async fn test_stderr_capture_is_bounded() {
		let noisy = vec![b'e'; STDERR_CAPTURE_LIMIT * 2];
		let captured = capture_stderr(Box::pin(io::Cursor::new(noisy))).await;
		assert_eq!(captured.len(), STDERR_CAPTURE_LIMIT);
	}
}
