// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use monitoring_k8s::SessionOptions;

use crate::extractor::ExtractRequest;
use crate::readiness::{ReadinessPolicy, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_READY_TIMEOUT_SECS};
use crate::workload::{unique_name, WorkloadSpec, DEFAULT_IMAGE, DEFAULT_POD_NAME};

/// Log output format.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
	Json,
	Pretty,
}

/// Extract the Monitoring files from an OpenTelemetry Collector.
#[derive(Parser, Debug)]
#[command(name = "monitoring-extractor", version, about, long_about = None)]
pub struct Args {
	/// The namespace in which to deploy the extraction Pod
	#[arg(long, env = "NAMESPACE")]
	pub namespace: String,

	/// The PVC name to mount and copy files from
	#[arg(long, env = "PVC_NAME")]
	pub pvc_name: String,

	/// The directory in which to export the OpenTelemetry Collector files
	#[arg(long, env = "DIRECTORY")]
	pub directory: PathBuf,

	/// Container image for the extraction Pod (must ship `sh` and `tar`)
	#[arg(long, env = "EXTRACTOR_IMAGE", default_value = DEFAULT_IMAGE)]
	pub image: String,

	/// Name of the extraction Pod
	#[arg(long, env = "EXTRACTOR_POD_NAME", default_value = DEFAULT_POD_NAME)]
	pub pod_name: String,

	/// Append a random suffix to the Pod name so concurrent runs do not collide
	#[arg(long, env = "EXTRACTOR_UNIQUE_NAME")]
	pub unique_name: bool,

	/// Seconds to wait for the Pod to become ready
	#[arg(
		long,
		env = "READY_TIMEOUT_SECS",
		default_value_t = DEFAULT_READY_TIMEOUT_SECS,
		value_parser = clap::value_parser!(u64).range(1..)
	)]
	pub ready_timeout: u64,

	/// Seconds between Pod status polls
	#[arg(
		long,
		env = "POLL_INTERVAL_SECS",
		default_value_t = DEFAULT_POLL_INTERVAL_SECS,
		value_parser = clap::value_parser!(u64).range(1..)
	)]
	pub poll_interval: u64,

	/// Path to a kubeconfig file (defaults to KUBECONFIG, ~/.kube/config, or in-cluster)
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long, env = "KUBE_CONTEXT")]
	pub context: Option<String>,

	/// Log output format
	#[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
	pub log_format: LogFormat,
}

impl Args {
	pub fn session_options(&self) -> SessionOptions {
		SessionOptions {
			kubeconfig: self.kubeconfig.clone(),
			context: self.context.clone(),
		}
	}

	/// Build the run request. With `--unique-name` every call picks a new
	/// suffix, so call this once per run.
	pub fn extract_request(&self) -> ExtractRequest {
		let name = if self.unique_name {
			unique_name(&self.pod_name)
		} else {
			self.pod_name.clone()
		};

		ExtractRequest {
			workload: WorkloadSpec {
				namespace: self.namespace.clone(),
				name,
				claim_name: self.pvc_name.clone(),
				image: self.image.clone(),
			},
			directory: self.directory.clone(),
			readiness: ReadinessPolicy {
				interval: Duration::from_secs(self.poll_interval),
				timeout: Duration::from_secs(self.ready_timeout),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
		let mut argv = vec![
			"monitoring-extractor",
			"--namespace",
			"monitoring",
			"--pvc-name",
			"otel-cold-extract",
			"--directory",
			"./out",
		];
		argv.extend_from_slice(extra);
		Args::try_parse_from(argv)
	}

	#[test]
	fn test_defaults() {
		let args = parse(&[]).unwrap();
		let req = args.extract_request();

		assert_eq!(req.workload.namespace, "monitoring");
		assert_eq!(req.workload.claim_name, "otel-cold-extract");
		assert_eq!(req.workload.name, "extractor");
		assert_eq!(req.workload.image, "library/busybox:1.37.0");
		assert_eq!(req.directory, PathBuf::from("./out"));
		assert_eq!(req.readiness, ReadinessPolicy::default());
		assert_eq!(args.log_format, LogFormat::Json);

		let session = args.session_options();
		assert!(session.kubeconfig.is_none());
		assert!(session.context.is_none());
	}

	#[test]
	fn test_overrides() {
		let args = parse(&[
			"--pod-name",
			"recover",
			"--unique-name",
			"--ready-timeout",
			"30",
			"--poll-interval",
			"1",
			"--kubeconfig",
			"/tmp/kubeconfig",
			"--context",
			"staging",
			"--log-format",
			"pretty",
		])
		.unwrap();
		let req = args.extract_request();

		assert!(req.workload.name.starts_with("recover-"));
		assert_eq!(req.readiness.timeout, Duration::from_secs(30));
		assert_eq!(req.readiness.interval, Duration::from_secs(1));
		assert_eq!(args.log_format, LogFormat::Pretty);
		assert_eq!(
			args.session_options().kubeconfig,
			Some(PathBuf::from("/tmp/kubeconfig"))
		);
		assert_eq!(args.session_options().context.as_deref(), Some("staging"));
	}

	#[test]
	fn test_missing_required_flag() {
		let err = Args::try_parse_from(["monitoring-extractor", "--namespace", "monitoring"]);
		assert!(err.is_err());
	}

	#[test]
	fn test_zero_interval_rejected() {
		assert!(parse(&["--poll-interval", "0"]).is_err());
	}
}
