//! Fetching the pods targeted by a resize.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::{
	api::{Api, ListParams},
	Client,
};
use thiserror::Error;
use tracing::{instrument, warn};

/// Which pods a resize applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodTarget {
	/// A single pod by name.
	Name(String),

	/// Every pod matching a label selector.
	Selector(String),
}

impl fmt::Display for PodTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PodTarget::Name(name) => write!(f, "pods/{name}"),
			PodTarget::Selector(selector) => write!(f, "pods matching {selector:?}"),
		}
	}
}

#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("fetching pods/{name} in namespace {namespace}")]
	Get {
		namespace: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("listing pods matching {selector:?} in namespace {namespace}")]
	List {
		namespace: String,
		selector: String,
		#[source]
		source: Box<kube::Error>,
	},
}

/// Fetch the target pods once, in the order the API server returns them.
#[instrument(skip(client))]
pub async fn fetch_pods(
	client: &Client,
	namespace: &str,
	target: &PodTarget,
) -> Result<Vec<Pod>, ProviderError> {
	let api: Api<Pod> = Api::namespaced(client.clone(), namespace);

	let pods = match target {
		PodTarget::Name(name) => {
			let pod = api.get(name).await.map_err(|e| ProviderError::Get {
				namespace: namespace.to_string(),
				name: name.clone(),
				source: Box::new(e),
			})?;
			vec![pod]
		}
		PodTarget::Selector(selector) => {
			let params = ListParams::default().labels(selector);
			api.list(&params)
				.await
				.map_err(|e| ProviderError::List {
					namespace: namespace.to_string(),
					selector: selector.clone(),
					source: Box::new(e),
				})?
				.items
		}
	};

	if pods.is_empty() {
		warn!(namespace = %namespace, target = %target, "no pods found");
	}
	Ok(pods)
}
