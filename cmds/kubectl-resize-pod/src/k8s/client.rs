//! Kubernetes cluster connection management.

use std::{path::PathBuf, time::Duration};

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Discovery name of the in-place resize subresource.
const POD_RESIZE_RESOURCE: &str = "pods/resize";

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
	ContextNotFound(String),

	#[error("no current context is set and --context was not given. Please check your $KUBECONFIG")]
	NoCurrentContext,

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Where to read cluster credentials from.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
	/// Explicit kubeconfig path; `$KUBECONFIG` or `~/.kube/config` otherwise.
	pub kubeconfig: Option<PathBuf>,
	/// Context to use instead of the kubeconfig's current context.
	pub context: Option<String>,
}

/// Represents a connection to a Kubernetes cluster.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	context: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("context", &self.context)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using the kubeconfig selected by `opts`.
	#[instrument(skip_all)]
	pub async fn connect(opts: &ConnectionOptions) -> Result<Self, ConnectionError> {
		let kubeconfig = match &opts.kubeconfig {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, opts.context.as_deref()).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all, fields(context = ?context))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let context = match context {
			Some(name) => {
				if !kubeconfig.contexts.iter().any(|c| c.name == name) {
					return Err(ConnectionError::ContextNotFound(name.to_string()));
				}
				name.to_string()
			}
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConnectionError::NoCurrentContext)?,
		};

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context.clone()),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;
		tracing::debug!(
			context = %context,
			server = %server_version.git_version,
			"connected to cluster"
		);

		Ok(Self {
			client,
			server_version,
			context,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the server version.
	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	/// Get the default namespace from the current context.
	pub fn default_namespace(&self) -> &str {
		self.client.default_namespace()
	}

	/// Name of the kubeconfig context in use.
	pub fn context(&self) -> &str {
		&self.context
	}

	/// Whether the API server exposes the `pods/resize` subresource.
	#[instrument(skip_all)]
	pub async fn supports_pod_resize(&self) -> Result<bool, ConnectionError> {
		let resources = self.client.list_core_api_resources("v1").await?;
		Ok(resources
			.resources
			.iter()
			.any(|r| r.name == POD_RESIZE_RESOURCE))
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let result =
			ClusterConnection::from_kubeconfig(Kubeconfig::default(), Some("nonexistent")).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(context)) if context == "nonexistent"
		);
	}

	#[tokio::test]
	async fn test_connect_without_current_context() {
		let result = ClusterConnection::from_kubeconfig(Kubeconfig::default(), None).await;
		assert_matches!(result, Err(ConnectionError::NoCurrentContext));
	}
}
