// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for the monitoring cold-extract tool.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate, including session setup
//! - A scriptable in-memory client for tests (`mock` feature)
//! - Common types for pod management and remote exec streaming

mod client;
mod error;
mod kube_client;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod types;

pub use client::K8sClient;
pub use error::K8sError;
pub use kube_client::KubeClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockExec, MockK8sClient, MockReadiness};
pub use types::{
	Capabilities, Container, ExecCompletion, ExecSession, ObjectMeta,
	PersistentVolumeClaimVolumeSource, Pod, PodCondition, PodSpec, PodStatus, SeccompProfile,
	SecurityContext, SessionOptions, Volume, VolumeMount,
};
