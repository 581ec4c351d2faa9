// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Extraction error types.

use std::time::Duration;

use monitoring_k8s::K8sError;

use crate::unpack::ArchiveError;

/// Errors that can abort an extraction run.
///
/// Every variant raised after the session is open names the namespace and
/// pod so the operator can clean up or inspect by hand.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
	/// Cluster session could not be established
	#[error("Failed to open cluster session: {0}")]
	Auth(#[source] K8sError),

	/// Pod creation was rejected
	#[error("Failed to create pod {namespace}/{name}: {source}")]
	Create {
		namespace: String,
		name: String,
		#[source]
		source: K8sError,
	},

	/// Fetching pod status failed while waiting for readiness
	#[error("Failed to read status of pod {namespace}/{name}: {source}")]
	Status {
		namespace: String,
		name: String,
		#[source]
		source: K8sError,
	},

	/// Pod did not report ready in time
	#[error("Pod {namespace}/{name} not ready after {timeout:?}")]
	ReadinessTimeout {
		namespace: String,
		name: String,
		timeout: Duration,
	},

	/// Remote archiving command or its channel failed
	#[error("Stream from pod {namespace}/{name} failed: {message}\nstderr: {stderr}")]
	Stream {
		namespace: String,
		name: String,
		message: String,
		stderr: String,
	},

	/// Archive could not be unpacked locally
	#[error("Failed to unpack archive from pod {namespace}/{name}: {source}")]
	Archive {
		namespace: String,
		name: String,
		#[source]
		source: ArchiveError,
	},

	/// Pod teardown failed after the files were written
	#[error("Failed to delete pod {namespace}/{name}: {source}")]
	Delete {
		namespace: String,
		name: String,
		#[source]
		source: K8sError,
	},

	/// Run was interrupted
	#[error("Extraction from pod {namespace}/{name} cancelled")]
	Cancelled { namespace: String, name: String },
}

impl ExtractError {
	/// Stable label used in the terminal diagnostic.
	pub fn kind(&self) -> &'static str {
		match self {
			ExtractError::Auth(_) => "auth",
			ExtractError::Create { .. } => "create",
			ExtractError::Status { .. } => "status",
			ExtractError::ReadinessTimeout { .. } => "readiness_timeout",
			ExtractError::Stream { .. } => "stream",
			ExtractError::Archive { .. } => "archive",
			ExtractError::Delete { .. } => "delete",
			ExtractError::Cancelled { .. } => "cancelled",
		}
	}
}
