// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sequencing of one cold-extract run.

use std::path::PathBuf;
use std::sync::Arc;

use monitoring_k8s::K8sClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::ExtractError;
use crate::exec::{archive_command, run_streamed, ExecTarget};
use crate::readiness::{await_ready, ReadinessPolicy};
use crate::unpack::{unpack, UnpackSummary};
use crate::workload::{Workload, WorkloadSpec, CONTAINER_NAME, MOUNT_PATH};

/// Inputs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
	pub workload: WorkloadSpec,
	pub directory: PathBuf,
	pub readiness: ReadinessPolicy,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
	pub namespace: String,
	pub pod_name: String,
	pub directory: PathBuf,
	pub summary: UnpackSummary,
}

/// Runs one extraction: create, wait for ready, exec and unpack, then delete.
pub struct Extractor {
	client: Arc<dyn K8sClient>,
}

impl Extractor {
	pub fn new(client: Arc<dyn K8sClient>) -> Self {
		Self { client }
	}

	/// Execute one run.
	///
	/// Once the pod exists it is deleted before this returns, whatever the
	/// later stages did. When a stage fails and teardown fails too, the stage
	/// error is returned and the teardown error is only logged.
	#[instrument(
		name = "extract",
		skip(self, req, cancel),
		fields(
			namespace = %req.workload.namespace,
			pod = %req.workload.name,
			claim = %req.workload.claim_name,
		)
	)]
	pub async fn run(
		&self,
		req: &ExtractRequest,
		cancel: &CancellationToken,
	) -> Result<ExtractReport, ExtractError> {
		if cancel.is_cancelled() {
			return Err(ExtractError::Cancelled {
				namespace: req.workload.namespace.clone(),
				name: req.workload.name.clone(),
			});
		}

		let workload = Workload::create(self.client.clone(), &req.workload).await?;
		let extracted = extract_from(&workload, req, cancel).await;
		let released = workload.delete().await;

		match (extracted, released) {
			(Ok(summary), Ok(())) => {
				let report = ExtractReport {
					namespace: req.workload.namespace.clone(),
					pod_name: req.workload.name.clone(),
					directory: req.directory.clone(),
					summary,
				};
				info!(
					directory = %report.directory.display(),
					files = summary.files,
					directories = summary.directories,
					skipped = summary.skipped,
					bytes = summary.bytes,
					"Extraction complete"
				);
				Ok(report)
			}
			(Ok(_), Err(delete_err)) => Err(delete_err),
			(Err(stage_err), Ok(())) => Err(stage_err),
			(Err(stage_err), Err(delete_err)) => {
				warn!(error = %delete_err, "Pod left behind after failed extraction");
				Err(stage_err)
			}
		}
	}
}

/// Every stage that runs while the pod exists.
async fn extract_from(
	workload: &Workload,
	req: &ExtractRequest,
	cancel: &CancellationToken,
) -> Result<UnpackSummary, ExtractError> {
	await_ready(
		workload.client(),
		workload.namespace(),
		workload.name(),
		&req.readiness,
		cancel,
	)
	.await?;

	info!(directory = %req.directory.display(), "Copying files");

	let target = ExecTarget {
		namespace: workload.namespace(),
		pod: workload.name(),
		container: CONTAINER_NAME,
	};
	let directory = req.directory.clone();
	run_streamed(
		workload.client(),
		&target,
		archive_command(MOUNT_PATH),
		cancel,
		move |reader| unpack(reader, &directory),
	)
	.await
}
