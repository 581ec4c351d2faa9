// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Level-triggered readiness polling for the extraction pod.

use std::collections::BTreeMap;
use std::time::Duration;

use monitoring_k8s::{K8sClient, K8sError, Pod};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::ExtractError;

const READY_CONDITION: &str = "Ready";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 120;

/// How often and how long to wait for the pod to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
	pub interval: Duration,
	pub timeout: Duration,
}

impl Default for ReadinessPolicy {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
			timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
		}
	}
}

/// Pod phase plus its named boolean conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
	pub phase: String,
	pub conditions: BTreeMap<String, bool>,
}

impl WorkloadStatus {
	pub fn from_pod(pod: &Pod) -> Self {
		let Some(status) = pod.status.as_ref() else {
			return Self {
				phase: "Unknown".to_string(),
				..Default::default()
			};
		};

		let conditions = status
			.conditions
			.iter()
			.flatten()
			.map(|c| (c.type_.clone(), c.status == "True"))
			.collect();

		Self {
			phase: status.phase.clone().unwrap_or_else(|| "Unknown".to_string()),
			conditions,
		}
	}

	pub fn is_ready(&self) -> bool {
		self.conditions.get(READY_CONDITION).copied().unwrap_or(false)
	}
}

/// Poll until the pod reports `Ready`, the deadline passes, or `cancel`
/// fires.
///
/// A missing pod counts as not ready yet. Any other fetch error is returned
/// immediately.
#[instrument(skip(client, cancel), fields(pod = %name, namespace = %namespace))]
pub async fn await_ready(
	client: &dyn K8sClient,
	namespace: &str,
	name: &str,
	policy: &ReadinessPolicy,
	cancel: &CancellationToken,
) -> Result<(), ExtractError> {
	let deadline = Instant::now() + policy.timeout;
	let cancelled = || ExtractError::Cancelled {
		namespace: namespace.to_string(),
		name: name.to_string(),
	};

	loop {
		let fetched = tokio::select! {
			_ = cancel.cancelled() => return Err(cancelled()),
			fetched = client.get_pod(name, namespace) => fetched,
		};

		match fetched {
			Ok(pod) => {
				let status = WorkloadStatus::from_pod(&pod);
				if status.is_ready() {
					info!(phase = %status.phase, "Pod ready");
					return Ok(());
				}
				debug!(phase = %status.phase, conditions = ?status.conditions, "Pod not ready yet");
			}
			Err(K8sError::PodNotFound { .. }) => {
				debug!("Pod not visible yet");
			}
			Err(source) => {
				return Err(ExtractError::Status {
					namespace: namespace.to_string(),
					name: name.to_string(),
					source,
				});
			}
		}

		if Instant::now() >= deadline {
			return Err(ExtractError::ReadinessTimeout {
				namespace: namespace.to_string(),
				name: name.to_string(),
				timeout: policy.timeout,
			});
		}

		tokio::select! {
			_ = cancel.cancelled() => return Err(cancelled()),
			_ = tokio::time::sleep(policy.interval) => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use monitoring_k8s::{MockK8sClient, MockReadiness, ObjectMeta, PodCondition, PodStatus};

	const NS: &str = "monitoring";
	const NAME: &str = "extractor";

	fn policy() -> ReadinessPolicy {
		ReadinessPolicy {
			interval: Duration::from_secs(2),
			timeout: Duration::from_secs(120),
		}
	}

	async fn client_with(readiness: MockReadiness) -> MockK8sClient {
		let client = MockK8sClient::new().with_readiness(readiness);
		client
			.create_pod(
				NS,
				Pod {
					metadata: ObjectMeta {
						name: Some(NAME.to_string()),
						..Default::default()
					},
					..Default::default()
				},
			)
			.await
			.unwrap();
		client
	}

	#[test]
	fn test_workload_status_ready() {
		let pod = Pod {
			status: Some(PodStatus {
				phase: Some("Running".to_string()),
				conditions: Some(vec![
					PodCondition {
						type_: "PodScheduled".to_string(),
						status: "True".to_string(),
						..Default::default()
					},
					PodCondition {
						type_: "Ready".to_string(),
						status: "True".to_string(),
						..Default::default()
					},
				]),
				..Default::default()
			}),
			..Default::default()
		};
		let status = WorkloadStatus::from_pod(&pod);
		assert!(status.is_ready());
		assert_eq!(status.phase, "Running");
		assert_eq!(status.conditions.get("PodScheduled"), Some(&true));
	}

	#[test]
	fn test_workload_status_without_status_is_not_ready() {
		let status = WorkloadStatus::from_pod(&Pod::default());
		assert!(!status.is_ready());
		assert_eq!(status.phase, "Unknown");
	}

	#[test]
	fn test_running_without_ready_condition_is_not_ready() {
		let pod = Pod {
			status: Some(PodStatus {
				phase: Some("Running".to_string()),
				conditions: Some(vec![PodCondition {
					type_: "Ready".to_string(),
					status: "False".to_string(),
					..Default::default()
				}]),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(!WorkloadStatus::from_pod(&pod).is_ready());
	}

	#[tokio::test(start_paused = true)]
	async fn test_ready_after_a_few_polls() {
		let client = client_with(MockReadiness::After(3)).await;
		let start = Instant::now();

		await_ready(&client, NS, NAME, &policy(), &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(client.get_pod_calls(), 3);
		assert_eq!(start.elapsed(), Duration::from_secs(4));
	}

	#[tokio::test(start_paused = true)]
	async fn test_not_found_tolerated_until_ready() {
		let client = MockK8sClient::new().with_not_found_polls(2);
		client
			.create_pod(
				NS,
				Pod {
					metadata: ObjectMeta {
						name: Some(NAME.to_string()),
						..Default::default()
					},
					..Default::default()
				},
			)
			.await
			.unwrap();

		await_ready(&client, NS, NAME, &policy(), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(client.get_pod_calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_timeout_within_one_interval_of_deadline() {
		let client = client_with(MockReadiness::Never).await;
		let policy = policy();
		let start = Instant::now();

		let err = await_ready(&client, NS, NAME, &policy, &CancellationToken::new())
			.await
			.unwrap_err();

		let elapsed = start.elapsed();
		assert!(matches!(err, ExtractError::ReadinessTimeout { .. }));
		assert!(elapsed >= policy.timeout);
		assert!(elapsed <= policy.timeout + policy.interval);
	}

	#[tokio::test(start_paused = true)]
	async fn test_crashed_pod_times_out() {
		let client = client_with(MockReadiness::Crashed).await;
		let policy = ReadinessPolicy {
			interval: Duration::from_secs(1),
			timeout: Duration::from_secs(5),
		};

		let err = await_ready(&client, NS, NAME, &policy, &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, ExtractError::ReadinessTimeout { .. }));
	}

	#[tokio::test(start_paused = true)]
	async fn test_status_error_propagates_without_retry() {
		let client = client_with(MockReadiness::Never)
			.await
			.with_status_error_on_poll(2);

		let err = await_ready(&client, NS, NAME, &policy(), &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, ExtractError::Status { .. }));
		assert_eq!(client.get_pod_calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_mid_poll() {
		let client = client_with(MockReadiness::Never).await;
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(5)).await;
			trigger.cancel();
		});
		let start = Instant::now();

		let err = await_ready(&client, NS, NAME, &policy(), &cancel)
			.await
			.unwrap_err();

		assert!(matches!(err, ExtractError::Cancelled { .. }));
		assert!(start.elapsed() < Duration::from_secs(5) + policy().interval);
	}
}
