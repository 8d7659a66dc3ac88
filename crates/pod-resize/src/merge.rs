//! Merging requested resources into container specs.

use std::collections::BTreeMap;

use k8s_openapi::{
	api::core::v1::{Container, PodSpec, ResourceRequirements},
	apimachinery::pkg::api::resource::Quantity,
};
use tracing::trace;

use crate::{select::select_containers, ResizeError, ResizeRequest};

/// Upsert the requested limits and requests into a container's resources.
///
/// Existing keys that are not part of the request are kept. A side that is
/// unset or empty in `requirements` is left untouched.
pub fn merge_resources(container: &mut Container, requirements: &ResourceRequirements) {
	let limits = supplied(requirements.limits.as_ref());
	let requests = supplied(requirements.requests.as_ref());
	if limits.is_none() && requests.is_none() {
		return;
	}

	let resources = container.resources.get_or_insert_with(Default::default);
	if let Some(limits) = limits {
		upsert(&mut resources.limits, limits);
	}
	if let Some(requests) = requests {
		upsert(&mut resources.requests, requests);
	}
	trace!(container = %container.name, "merged resources");
}

fn supplied(list: Option<&BTreeMap<String, Quantity>>) -> Option<&BTreeMap<String, Quantity>> {
	list.filter(|list| !list.is_empty())
}

fn upsert(target: &mut Option<BTreeMap<String, Quantity>>, source: &BTreeMap<String, Quantity>) {
	target
		.get_or_insert_with(BTreeMap::new)
		.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Apply the request to every matching container of a pod spec.
///
/// Regular containers are visited first, init containers after them.
/// Returns the number of containers that were resized, or an error when the
/// selector matched nothing.
pub fn resize_pod_spec(
	spec: &mut PodSpec,
	request: &ResizeRequest,
) -> Result<usize, ResizeError> {
	let selector = request.container_selector.as_str();

	let (mut matched, _) = select_containers(spec.containers.iter_mut(), selector);
	let (init, _) = select_containers(spec.init_containers.iter_mut().flatten(), selector);
	matched.extend(init);

	if matched.is_empty() {
		return Err(ResizeError::NoContainersMatched {
			selector: selector.to_string(),
		});
	}

	let count = matched.len();
	for container in matched {
		merge_resources(container, &request.requirements);
	}
	Ok(count)
}
