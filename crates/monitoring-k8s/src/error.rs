// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s session error: {message}")]
	Auth { message: String },

	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("Pod not found: {name}")]
	PodNotFound { name: String },

	#[error("Pod already exists: {name}")]
	AlreadyExists { name: String },

	#[error("Exec channel error: {message}")]
	ExecError { message: String },

	#[error("Remote command failed: {message}")]
	CommandFailed { message: String },
}

impl K8sError {
	pub(crate) fn auth(err: impl std::fmt::Display) -> Self {
		K8sError::Auth {
			message: err.to_string(),
		}
	}

	pub(crate) fn exec(err: impl std::fmt::Display) -> Self {
		K8sError::ExecError {
			message: err.to_string(),
		}
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
