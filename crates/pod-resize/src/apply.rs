//! Submitting resize patches and aggregating per-pod failures.

use std::{error::Error as StdError, fmt, future::Future};

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, instrument, warn};

use crate::{
	patch::{calculate_patch, PodPatch},
	PatchType, ResizeError, ResizeRequest,
};

/// Submits patches to the `resize` subresource of a pod.
pub trait ResizeTransport {
	type Error: StdError + Send + Sync + 'static;

	/// Apply `patch` to the resize subresource of `namespace/name`.
	fn patch_resize(
		&self,
		namespace: &str,
		name: &str,
		patch: &[u8],
		patch_type: PatchType,
	) -> impl Future<Output = Result<(), Self::Error>>;
}

/// A pod that could not be resized.
#[derive(Debug)]
pub struct PodFailure {
	/// Display identity, e.g. `pods/web-0`.
	pub pod: String,
	pub error: ResizeError,
}

impl fmt::Display for PodFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.pod, self.error)?;
		let mut source = self.error.source();
		while let Some(cause) = source {
			write!(f, ": {cause}")?;
			source = cause.source();
		}
		Ok(())
	}
}

/// Every per-pod failure of a batch, in processing order.
#[derive(Debug)]
pub struct AggregateError {
	failures: Vec<PodFailure>,
}

impl AggregateError {
	pub fn failures(&self) -> &[PodFailure] {
		&self.failures
	}
}

impl fmt::Display for AggregateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.failures.as_slice() {
			[single] => write!(f, "{single}"),
			failures => {
				write!(f, "[")?;
				for (i, failure) in failures.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{failure}")?;
				}
				write!(f, "]")
			}
		}
	}
}

impl StdError for AggregateError {}

/// Resize every pod in `pods` according to `request`.
///
/// Pods are processed one at a time: each is diffed and patched before the
/// next one is looked at. A failing pod never stops the batch.
#[instrument(skip_all, fields(pods = pods.len(), selector = %request.container_selector))]
pub async fn run<T: ResizeTransport>(
	pods: &[Pod],
	request: &ResizeRequest,
	transport: &T,
) -> Result<(), AggregateError> {
	let patches = pods.iter().map(|pod| calculate_patch(pod, request));
	apply_patches(patches, request.patch_type, transport).await
}

/// Submit patches in order, collecting failures instead of stopping.
///
/// Nothing is rolled back: pods patched before a failure stay patched.
pub async fn apply_patches<'a, T, I>(
	patches: I,
	patch_type: PatchType,
	transport: &T,
) -> Result<(), AggregateError>
where
	T: ResizeTransport,
	I: IntoIterator<Item = PodPatch<'a>>,
{
	let mut failures = Vec::new();

	for patch in patches {
		let pod = patch.object_name();
		let metadata = &patch.pod.metadata;
		let namespace = metadata.namespace.as_deref().unwrap_or_default();
		let name = metadata.name.as_deref().unwrap_or_default();

		if patch.is_noop() {
			debug!(pod = %pod, "no changes");
			continue;
		}

		let bytes = match patch.outcome {
			Ok(bytes) => bytes,
			Err(error) => {
				warn!(pod = %pod, error = %error, "skipping pod");
				failures.push(PodFailure { pod, error });
				continue;
			}
		};

		match transport
			.patch_resize(namespace, name, &bytes, patch_type)
			.await
		{
			Ok(()) => info!(pod = %pod, namespace = %namespace, "resized"),
			Err(e) => {
				warn!(pod = %pod, error = %e, "resize patch rejected");
				failures.push(PodFailure {
					pod,
					error: ResizeError::Apply(Box::new(e)),
				});
			}
		}
	}

	if failures.is_empty() {
		Ok(())
	} else {
		Err(AggregateError { failures })
	}
}
