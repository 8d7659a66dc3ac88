//! Resize transport backed by the kube client.

use k8s_openapi::api::core::v1::Pod;
use kube::{
	api::{Api, Patch, PatchParams},
	Client,
};
use pod_resize::{PatchType, ResizeTransport};
use thiserror::Error;
use tracing::instrument;

const RESIZE_SUBRESOURCE: &str = "resize";

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("decoding patch")]
	Decode(#[source] serde_json::Error),

	#[error(transparent)]
	Api(Box<kube::Error>),
}

/// Sends resize patches to `/api/v1/namespaces/{ns}/pods/{name}/resize`.
pub struct KubeResizeTransport {
	client: Client,
	dry_run: bool,
}

impl KubeResizeTransport {
	/// With `dry_run` set, the API server validates the patch without
	/// persisting it.
	pub fn new(client: Client, dry_run: bool) -> Self {
		Self { client, dry_run }
	}
}

impl ResizeTransport for KubeResizeTransport {
	type Error = TransportError;

	#[instrument(skip(self, patch), fields(dry_run = self.dry_run))]
	async fn patch_resize(
		&self,
		namespace: &str,
		name: &str,
		patch: &[u8],
		patch_type: PatchType,
	) -> Result<(), TransportError> {
		let body: serde_json::Value =
			serde_json::from_slice(patch).map_err(TransportError::Decode)?;
		let patch = match patch_type {
			PatchType::Strategic => Patch::Strategic(body),
			PatchType::Merge => Patch::Merge(body),
		};
		let params = PatchParams {
			dry_run: self.dry_run,
			..Default::default()
		};

		let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
		api.patch_subresource(RESIZE_SUBRESOURCE, name, &params, &patch)
			.await
			.map_err(|e| TransportError::Api(Box::new(e)))?;
		Ok(())
	}
}
