// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::error::K8sError;

pub use k8s_openapi::api::core::v1::{
	Capabilities, Container, PersistentVolumeClaimVolumeSource, Pod, PodCondition, PodSpec,
	PodStatus, SeccompProfile, SecurityContext, Volume, VolumeMount,
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Where to load cluster credentials from.
///
/// With both fields unset the session falls back to ambient inference:
/// `KUBECONFIG`, then `~/.kube/config`, then the in-cluster service account.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
	pub kubeconfig: Option<PathBuf>,
	pub context: Option<String>,
}

/// Resolves once the remote command has exited and the channel has closed.
pub type ExecCompletion = Pin<Box<dyn Future<Output = Result<(), K8sError>> + Send>>;

/// One live remote execution.
///
/// Dropping `completion` before it resolves tears the channel down, after
/// which both readers report end-of-stream.
pub struct ExecSession {
	pub stdout: Pin<Box<dyn AsyncRead + Send>>,
	pub stderr: Pin<Box<dyn AsyncRead + Send>>,
	pub completion: ExecCompletion,
}
