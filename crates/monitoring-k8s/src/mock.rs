// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Scriptable in-memory [`K8sClient`] used by tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{duplex, AsyncWriteExt};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{ExecSession, Pod, PodCondition, PodStatus};

/// How the next `exec` call behaves.
#[derive(Debug, Clone)]
pub enum MockExec {
	/// The command exits 0 after writing these streams.
	Success { stdout: Vec<u8>, stderr: Vec<u8> },
	/// The command writes these streams, then exits nonzero.
	CommandFailed {
		stdout: Vec<u8>,
		stderr: Vec<u8>,
		message: String,
	},
	/// The command exits 0 after writing `stdout` through a pipe of
	/// `capacity` bytes. If the reader goes away before everything is
	/// written, the completion fails with a broken pipe.
	Piped { stdout: Vec<u8>, capacity: usize },
	/// The channel cannot be opened at all.
	OpenFailed { message: String },
	/// The channel opens but never produces output nor completes.
	Hang,
}

/// When `get_pod` starts reporting the `Ready` condition.
#[derive(Debug, Clone, Copy)]
pub enum MockReadiness {
	/// Ready on the nth successful fetch (1-based).
	After(u32),
	/// Stays `Pending` forever.
	Never,
	/// Container exited; phase `Failed`, never ready.
	Crashed,
}

#[derive(Debug, Default)]
struct State {
	pods: HashMap<String, Pod>,
	deleted: Vec<String>,
	get_calls: u32,
	exec_calls: Vec<Vec<String>>,
}

/// In-memory pod store with scripted readiness and exec behavior.
pub struct MockK8sClient {
	state: Mutex<State>,
	readiness: MockReadiness,
	not_found_polls: u32,
	exec: MockExec,
	create_error: Option<fn(&str) -> K8sError>,
	delete_error: Option<fn(&str) -> K8sError>,
	status_error_on_poll: Option<u32>,
}

impl Default for MockK8sClient {
	fn default() -> Self {
		Self::new()
	}
}

impl MockK8sClient {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State::default()),
			readiness: MockReadiness::After(1),
			not_found_polls: 0,
			exec: MockExec::Success {
				stdout: Vec::new(),
				stderr: Vec::new(),
			},
			create_error: None,
			delete_error: None,
			status_error_on_poll: None,
		}
	}

	pub fn with_readiness(mut self, readiness: MockReadiness) -> Self {
		self.readiness = readiness;
		self
	}

	/// The first `polls` fetches after creation return `PodNotFound`.
	pub fn with_not_found_polls(mut self, polls: u32) -> Self {
		self.not_found_polls = polls;
		self
	}

	pub fn with_exec(mut self, exec: MockExec) -> Self {
		self.exec = exec;
		self
	}

	pub fn with_create_error(mut self, err: fn(&str) -> K8sError) -> Self {
		self.create_error = Some(err);
		self
	}

	pub fn with_delete_error(mut self, err: fn(&str) -> K8sError) -> Self {
		self.delete_error = Some(err);
		self
	}

	/// The nth fetch (1-based) fails with an API error.
	pub fn with_status_error_on_poll(mut self, poll: u32) -> Self {
		self.status_error_on_poll = Some(poll);
		self
	}

	/// Pods currently present, keyed by `namespace/name`.
	pub fn live_pods(&self) -> Vec<String> {
		let mut pods: Vec<String> = self.lock().pods.keys().cloned().collect();
		pods.sort();
		pods
	}

	/// The stored descriptor of a live pod.
	pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
		self.lock().pods.get(&key(namespace, name)).cloned()
	}

	/// Pods deleted so far, keyed by `namespace/name`, in call order.
	pub fn deleted_pods(&self) -> Vec<String> {
		self.lock().deleted.clone()
	}

	pub fn get_pod_calls(&self) -> u32 {
		self.lock().get_calls
	}

	/// Commands passed to `exec`, in call order.
	pub fn exec_calls(&self) -> Vec<Vec<String>> {
		self.lock().exec_calls.clone()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn observed_status(&self, fetch: u32) -> PodStatus {
		let (phase, ready) = match self.readiness {
			MockReadiness::After(n) if fetch >= n => ("Running", true),
			MockReadiness::After(_) | MockReadiness::Never => ("Pending", false),
			MockReadiness::Crashed => ("Failed", false),
		};
		PodStatus {
			phase: Some(phase.to_string()),
			conditions: Some(vec![PodCondition {
				type_: "Ready".to_string(),
				status: if ready { "True" } else { "False" }.to_string(),
				..Default::default()
			}]),
			..Default::default()
		}
	}
}

fn key(namespace: &str, name: &str) -> String {
	format!("{namespace}/{name}")
}

fn finished(stdout: Vec<u8>, stderr: Vec<u8>, outcome: Result<(), K8sError>) -> ExecSession {
	ExecSession {
		stdout: Box::pin(Cursor::new(stdout)),
		stderr: Box::pin(Cursor::new(stderr)),
		completion: Box::pin(async move { outcome }),
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let name = pod.metadata.name.clone().unwrap_or_default();
		if let Some(err) = self.create_error {
			return Err(err(&name));
		}

		let mut state = self.lock();
		let key = key(namespace, &name);
		if state.pods.contains_key(&key) {
			return Err(K8sError::AlreadyExists { name });
		}
		state.pods.insert(key, pod.clone());
		Ok(pod)
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		let mut state = self.lock();
		state.get_calls += 1;
		let call = state.get_calls;

		if self.status_error_on_poll == Some(call) {
			return Err(K8sError::ApiError {
				message: "connection reset by peer".to_string(),
			});
		}
		if call <= self.not_found_polls {
			return Err(K8sError::PodNotFound { name: name.into() });
		}

		let mut pod = state
			.pods
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| K8sError::PodNotFound { name: name.into() })?;
		pod.status = Some(self.observed_status(call - self.not_found_polls));
		Ok(pod)
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		_grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		if let Some(err) = self.delete_error {
			return Err(err(name));
		}

		let mut state = self.lock();
		let key = key(namespace, name);
		if state.pods.remove(&key).is_none() {
			return Err(K8sError::PodNotFound { name: name.into() });
		}
		state.deleted.push(key);
		Ok(())
	}

	async fn exec(
		&self,
		name: &str,
		namespace: &str,
		_container: &str,
		command: Vec<String>,
	) -> Result<ExecSession, K8sError> {
		{
			let mut state = self.lock();
			state.exec_calls.push(command);
			if !state.pods.contains_key(&key(namespace, name)) {
				return Err(K8sError::PodNotFound { name: name.into() });
			}
		}

		match &self.exec {
			MockExec::Success { stdout, stderr } => {
				Ok(finished(stdout.clone(), stderr.clone(), Ok(())))
			}
			MockExec::CommandFailed {
				stdout,
				stderr,
				message,
			} => Ok(finished(
				stdout.clone(),
				stderr.clone(),
				Err(K8sError::CommandFailed {
					message: message.clone(),
				}),
			)),
			MockExec::Piped { stdout, capacity } => {
				let (mut writer, reader) = duplex(*capacity);
				let payload = stdout.clone();
				Ok(ExecSession {
					stdout: Box::pin(reader),
					stderr: Box::pin(Cursor::new(Vec::new())),
					completion: Box::pin(async move {
						writer
							.write_all(&payload)
							.await
							.map_err(|e| K8sError::ExecError {
								message: format!("failed to write to stdout: {e}"),
							})?;
						Ok(())
					}),
				})
			}
			MockExec::OpenFailed { message } => Err(K8sError::ExecError {
				message: message.clone(),
			}),
			MockExec::Hang => {
				// Writers live inside the completion, so dropping it closes both readers.
				let (stdout_writer, stdout) = duplex(64);
				let (stderr_writer, stderr) = duplex(64);
				Ok(ExecSession {
					stdout: Box::pin(stdout),
					stderr: Box::pin(stderr),
					completion: Box::pin(async move {
						let _writers = (stdout_writer, stderr_writer);
						std::future::pending::<Result<(), K8sError>>().await
					}),
				})
			}
		}
	}
}
