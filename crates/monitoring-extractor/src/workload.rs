// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The ephemeral pod that mounts the collector volume.

use std::sync::Arc;

use monitoring_k8s::{
	Capabilities, Container, K8sClient, K8sError, ObjectMeta, PersistentVolumeClaimVolumeSource,
	Pod, PodSpec, SeccompProfile, SecurityContext, Volume, VolumeMount,
};
use tracing::{debug, info};

use crate::error::ExtractError;

pub const DEFAULT_POD_NAME: &str = "extractor";
pub const DEFAULT_IMAGE: &str = "library/busybox:1.37.0";
pub const CONTAINER_NAME: &str = "copy";
pub const MOUNT_PATH: &str = "/data";
const VOLUME_NAME: &str = "data";
const RUN_AS_USER: i64 = 1000;
const DELETE_GRACE_SECONDS: u32 = 5;
const UNIQUE_SUFFIX_MAX: u32 = 0x00ff_ffff;

/// Everything needed to describe the extraction pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
	pub namespace: String,
	pub name: String,
	pub claim_name: String,
	pub image: String,
}

impl WorkloadSpec {
	pub fn new(namespace: impl Into<String>, claim_name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			name: DEFAULT_POD_NAME.to_string(),
			claim_name: claim_name.into(),
			image: DEFAULT_IMAGE.to_string(),
		}
	}

	/// Build the pod descriptor.
	///
	/// Operational tooling inspects this pod, so its shape must not drift:
	/// one idle container, the claim mounted at [`MOUNT_PATH`], the
	/// "restricted" security profile, and restart policy `Never`.
	pub fn to_pod(&self) -> Pod {
		let security_context = SecurityContext {
			allow_privilege_escalation: Some(false),
			capabilities: Some(Capabilities {
				drop: Some(vec!["ALL".to_string()]),
				add: None,
			}),
			run_as_user: Some(RUN_AS_USER),
			run_as_non_root: Some(true),
			seccomp_profile: Some(SeccompProfile {
				type_: "RuntimeDefault".to_string(),
				localhost_profile: None,
			}),
			..Default::default()
		};

		let container = Container {
			name: CONTAINER_NAME.to_string(),
			image: Some(self.image.clone()),
			command: Some(vec![
				"/bin/sh".to_string(),
				"-c".to_string(),
				"--".to_string(),
			]),
			args: Some(vec!["while true; do sleep 30; done;".to_string()]),
			volume_mounts: Some(vec![VolumeMount {
				name: VOLUME_NAME.to_string(),
				mount_path: MOUNT_PATH.to_string(),
				..Default::default()
			}]),
			security_context: Some(security_context),
			..Default::default()
		};

		Pod {
			metadata: ObjectMeta {
				name: Some(self.name.clone()),
				namespace: Some(self.namespace.clone()),
				..Default::default()
			},
			spec: Some(PodSpec {
				restart_policy: Some("Never".to_string()),
				containers: vec![container],
				volumes: Some(vec![Volume {
					name: VOLUME_NAME.to_string(),
					persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
						claim_name: self.claim_name.clone(),
						read_only: None,
					}),
					..Default::default()
				}]),
				..Default::default()
			}),
			status: None,
		}
	}
}

/// Append a random hex token so concurrent runs in one namespace do not
/// collide on the pod name.
pub fn unique_name(base: &str) -> String {
	format!("{base}-{:06x}", fastrand::u32(..=UNIQUE_SUFFIX_MAX))
}

/// A created extraction pod.
///
/// Callers must call [`Workload::delete`] on every exit path once this
/// exists; the orchestrator is the only owner.
#[must_use = "a created workload must be deleted"]
pub struct Workload {
	client: Arc<dyn K8sClient>,
	namespace: String,
	name: String,
}

impl Workload {
	/// Submit the pod. Nothing needs cleaning up if this fails.
	pub async fn create(
		client: Arc<dyn K8sClient>,
		spec: &WorkloadSpec,
	) -> Result<Self, ExtractError> {
		info!(
			name = %spec.name,
			namespace = %spec.namespace,
			claim = %spec.claim_name,
			image = %spec.image,
			"Creating pod"
		);

		client
			.create_pod(&spec.namespace, spec.to_pod())
			.await
			.map_err(|source| ExtractError::Create {
				namespace: spec.namespace.clone(),
				name: spec.name.clone(),
				source,
			})?;

		Ok(Self {
			client,
			namespace: spec.namespace.clone(),
			name: spec.name.clone(),
		})
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn client(&self) -> &dyn K8sClient {
		self.client.as_ref()
	}

	/// Delete the pod. A pod that is already gone counts as released.
	pub async fn delete(self) -> Result<(), ExtractError> {
		info!(name = %self.name, namespace = %self.namespace, "Deleting pod");

		let deleted = self
			.client
			.delete_pod(&self.name, &self.namespace, DELETE_GRACE_SECONDS)
			.await;
		match deleted {
			Ok(()) => Ok(()),
			Err(K8sError::PodNotFound { .. }) => {
				debug!(name = %self.name, "Pod already deleted");
				Ok(())
			}
			Err(source) => Err(ExtractError::Delete {
				namespace: self.namespace,
				name: self.name,
				source,
			}),
		}
	}
}
