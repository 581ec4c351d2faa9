// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::{
	api::{Api, AttachParams, AttachedProcess, DeleteParams, PostParams},
	config::{KubeConfigOptions, Kubeconfig},
	Client, Config,
};
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{ExecSession, SessionOptions};

const EXEC_SUCCESS: &str = "Success";

/// Production K8s client implementation using the kube crate.
pub struct KubeClient {
	client: Client,
	config: Config,
}

impl KubeClient {
	/// Open an authenticated session against the cluster.
	///
	/// Config is resolved from `opts` (or inferred when empty), then the API
	/// server version is fetched so that bad credentials fail here rather
	/// than on the first mutating call.
	#[instrument(skip_all, fields(kubeconfig = ?opts.kubeconfig, context = ?opts.context))]
	pub async fn open(opts: &SessionOptions) -> Result<Self, K8sError> {
		let config = resolve_config(opts).await?;
		let client = Client::try_from(config.clone()).map_err(K8sError::auth)?;

		let version = client.apiserver_version().await.map_err(K8sError::auth)?;
		debug!(
			cluster_url = %config.cluster_url,
			server_version = %version.git_version,
			"K8s session established"
		);

		Ok(Self { client, config })
	}

	/// Connection config the session was opened with.
	pub fn config(&self) -> &Config {
		&self.config
	}

	fn pods(&self, namespace: &str) -> Api<Pod> {
		Api::namespaced(self.client.clone(), namespace)
	}
}

async fn resolve_config(opts: &SessionOptions) -> Result<Config, K8sError> {
	let kube_opts = KubeConfigOptions {
		context: opts.context.clone(),
		..Default::default()
	};

	match (&opts.kubeconfig, &opts.context) {
		(Some(path), _) => {
			let kubeconfig = Kubeconfig::read_from(path).map_err(K8sError::auth)?;
			Config::from_custom_kubeconfig(kubeconfig, &kube_opts)
				.await
				.map_err(K8sError::auth)
		}
		(None, Some(_)) => Config::from_kubeconfig(&kube_opts)
			.await
			.map_err(K8sError::auth),
		(None, None) => Config::infer().await.map_err(K8sError::auth),
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let name = pod.metadata.name.clone().unwrap_or_default();
		match self.pods(namespace).create(&PostParams::default(), &pod).await {
			Ok(pod) => Ok(pod),
			Err(kube::Error::Api(err)) if err.code == 409 => Err(K8sError::AlreadyExists { name }),
			Err(e) => Err(e.into()),
		}
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		match self.pods(namespace).get(name).await {
			Ok(pod) => Ok(pod),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::PodNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let dp = DeleteParams {
			grace_period_seconds: Some(grace_period_seconds),
			..Default::default()
		};
		match self.pods(namespace).delete(name, &dp).await {
			Ok(_) => Ok(()),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::PodNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self), fields(pod = %name, namespace = %namespace))]
	async fn exec(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		command: Vec<String>,
	) -> Result<ExecSession, K8sError> {
		let ap = AttachParams {
			container: Some(container.to_string()),
			stdin: false,
			stdout: true,
			stderr: true,
			tty: false,
			..Default::default()
		};

		let mut attached = self
			.pods(namespace)
			.exec(name, command, &ap)
			.await
			.map_err(|e| match e {
				kube::Error::Api(ref err) if err.code == 404 => {
					K8sError::PodNotFound { name: name.into() }
				}
				_ => K8sError::exec(e),
			})?;

		let stdout = attached
			.stdout()
			.ok_or_else(|| K8sError::exec("stdout not available"))?;
		let stderr = attached
			.stderr()
			.ok_or_else(|| K8sError::exec("stderr not available"))?;
		let status = attached
			.take_status()
			.ok_or_else(|| K8sError::exec("exec status not available"))?;

		let mut process = AbortOnDrop(Some(attached));
		let completion = async move {
			let status = status.await;
			if let Some(attached) = process.0.take() {
				attached.join().await.map_err(K8sError::exec)?;
			}
			check_exec_status(status)
		};

		Ok(ExecSession {
			stdout: Box::pin(stdout),
			stderr: Box::pin(stderr),
			completion: Box::pin(completion),
		})
	}
}

/// Aborts the exec message loop if the completion future is dropped early.
struct AbortOnDrop(Option<AttachedProcess>);

impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		if let Some(attached) = &self.0 {
			debug!("Aborting exec channel");
			attached.abort();
		}
	}
}

/// Map the terminal status frame of an exec channel to a result.
fn check_exec_status(status: Option<Status>) -> Result<(), K8sError> {
	let Some(status) = status else {
		return Err(K8sError::exec("channel closed without an exit status"));
	};

	if status.status.as_deref() == Some(EXEC_SUCCESS) {
		return Ok(());
	}

	let message = status
		.message
		.or(status.reason)
		.unwrap_or_else(|| "unknown failure".to_string());
	Err(K8sError::CommandFailed { message })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_check_exec_status_success() {
		let status = Status {
			status: Some("Success".to_string()),
			..Default::default()
		};
		assert!(check_exec_status(Some(status)).is_ok());
	}

	#[test]
	fn test_check_exec_status_nonzero_exit() {
		let status = Status {
			status: Some("Failure".to_string()),
			reason: Some("NonZeroExitCode".to_string()),
			message: Some("command terminated with non-zero exit code: exit status 2".to_string()),
			..Default::default()
		};
		match check_exec_status(Some(status)) {
			Err(K8sError::CommandFailed { message }) => assert!(message.contains("exit status 2")),
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[test]
	fn test_check_exec_status_falls_back_to_reason() {
		let status = Status {
			status: Some("Failure".to_string()),
			reason: Some("InternalError".to_string()),
			..Default::default()
		};
		match check_exec_status(Some(status)) {
			Err(K8sError::CommandFailed { message }) => assert_eq!(message, "InternalError"),
			other => panic!("unexpected result: {other:?}"),
		}
	}

	#[test]
	fn test_check_exec_status_missing() {
		assert!(matches!(
			check_exec_status(None),
			Err(K8sError::ExecError { .. })
		));
	}
}
