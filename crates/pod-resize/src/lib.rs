//! In-place resize engine for running pods.
//!
//! Selects containers by wildcard pattern, upserts requested limits and
//! requests into their resource maps, computes a two-way merge patch per pod
//! and submits it to the pod `resize` subresource.

pub mod apply;
pub mod merge;
pub mod patch;
pub mod quantity;
pub mod requirements;
pub mod select;

use std::fmt;

pub use apply::{apply_patches, run, AggregateError, PodFailure, ResizeTransport};
use k8s_openapi::api::core::v1::ResourceRequirements;
pub use merge::{merge_resources, resize_pod_spec};
pub use patch::{calculate_patch, create_two_way_merge_patch, PodPatch};
pub use quantity::parse_quantity;
pub use requirements::{parse_requirements, RequirementsError};
pub use select::{select_containers, select_string};
use thiserror::Error;

/// Selector value that matches every container.
pub const ALL_CONTAINERS: &str = "*";

/// Patch encoding submitted to the resize subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchType {
	/// Kubernetes strategic merge patch. Container lists are merged by name.
	#[default]
	Strategic,

	/// RFC 7386 JSON merge patch. Lists are replaced wholesale.
	Merge,
}

impl fmt::Display for PatchType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchType::Strategic => write!(f, "strategic"),
			PatchType::Merge => write!(f, "merge"),
		}
	}
}

/// Everything the engine needs to resize a batch of pods.
#[derive(Debug, Clone)]
pub struct ResizeRequest {
	/// Requested limits and requests. A side left as `None` is never touched.
	pub requirements: ResourceRequirements,
	/// Wildcard pattern choosing the containers to resize.
	pub container_selector: String,
	pub patch_type: PatchType,
}

impl Default for ResizeRequest {
	fn default() -> Self {
		Self {
			requirements: ResourceRequirements::default(),
			container_selector: ALL_CONTAINERS.to_string(),
			patch_type: PatchType::default(),
		}
	}
}

/// Failure of a single pod within a batch.
#[derive(Debug, Error)]
pub enum ResizeError {
	#[error("unable to find container named {selector}")]
	NoContainersMatched { selector: String },

	#[error("encoding pod")]
	Encode(#[source] serde_json::Error),

	#[error("failed to patch resources")]
	Apply(#[source] Box<dyn std::error::Error + Send + Sync>),
}
