//! Per-pod patch calculation.
//!
//! The patch is a field-level diff between the pod as fetched and the pod
//! after the resize transform. It is applied by merging into live state on
//! the API server, so only changed fields are carried.

use k8s_openapi::api::core::v1::Pod;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::{merge::resize_pod_spec, PatchType, ResizeError, ResizeRequest};

/// Merge key of named lists such as `containers` and `initContainers`.
const MERGE_KEY: &str = "name";

/// Strategic merge patch directive key.
const PATCH_DIRECTIVE: &str = "$patch";

/// Patch computed for a single pod.
#[derive(Debug)]
pub struct PodPatch<'a> {
	pub pod: &'a Pod,
	/// Encoded patch bytes, empty when there is nothing to submit.
	pub outcome: Result<Vec<u8>, ResizeError>,
}

impl PodPatch<'_> {
	/// Display identity of the pod, e.g. `pods/web-0`.
	pub fn object_name(&self) -> String {
		object_name(self.pod)
	}

	/// True when the patch carries no change.
	pub fn is_noop(&self) -> bool {
		matches!(&self.outcome, Ok(bytes) if bytes.is_empty() || bytes.as_slice() == b"{}")
	}
}

pub(crate) fn object_name(pod: &Pod) -> String {
	format!("pods/{}", pod.metadata.name.as_deref().unwrap_or_default())
}

/// Run the resize transform on a copy of `pod` and diff the result.
#[instrument(skip_all, fields(pod = %object_name(pod)))]
pub fn calculate_patch<'a>(pod: &'a Pod, request: &ResizeRequest) -> PodPatch<'a> {
	PodPatch {
		pod,
		outcome: patch_bytes(pod, request),
	}
}

fn patch_bytes(pod: &Pod, request: &ResizeRequest) -> Result<Vec<u8>, ResizeError> {
	let mut working = pod.clone();
	let mut spec = working.spec.take().unwrap_or_default();
	let resized = resize_pod_spec(&mut spec, request)?;
	working.spec = Some(spec);
	debug!(containers = resized, "selected containers");

	let original = serde_json::to_value(pod).map_err(ResizeError::Encode)?;
	let modified = serde_json::to_value(&working).map_err(ResizeError::Encode)?;

	let patch = create_two_way_merge_patch(&original, &modified, request.patch_type);
	if patch.as_object().is_some_and(Map::is_empty) {
		return Ok(Vec::new());
	}
	serde_json::to_vec(&patch).map_err(ResizeError::Encode)
}

/// Compute a patch that turns `original` into `modified`.
///
/// Removed object keys are expressed as `null`. With
/// [`PatchType::Strategic`], lists whose elements are all objects carrying a
/// `name` are diffed element by element; every other changed list is
/// replaced as a whole.
pub fn create_two_way_merge_patch(
	original: &Value,
	modified: &Value,
	patch_type: PatchType,
) -> Value {
	match (original, modified) {
		(Value::Object(original), Value::Object(modified)) => {
			Value::Object(diff_objects(original, modified, patch_type))
		}
		_ => modified.clone(),
	}
}

fn diff_objects(
	original: &Map<String, Value>,
	modified: &Map<String, Value>,
	patch_type: PatchType,
) -> Map<String, Value> {
	let mut patch = Map::new();

	for (key, new) in modified {
		let Some(old) = original.get(key) else {
			patch.insert(key.clone(), new.clone());
			continue;
		};
		match (old, new) {
			(Value::Object(old), Value::Object(new)) => {
				let nested = diff_objects(old, new, patch_type);
				if !nested.is_empty() {
					patch.insert(key.clone(), Value::Object(nested));
				}
			}
			(Value::Array(old), Value::Array(new)) if patch_type == PatchType::Strategic => {
				if let Some(list) = diff_named_lists(old, new, patch_type) {
					if !list.is_empty() {
						patch.insert(key.clone(), Value::Array(list));
					}
				} else if old != new {
					patch.insert(key.clone(), Value::Array(new.clone()));
				}
			}
			_ if old != new => {
				patch.insert(key.clone(), new.clone());
			}
			_ => {}
		}
	}

	for key in original.keys() {
		if !modified.contains_key(key) {
			patch.insert(key.clone(), Value::Null);
		}
	}

	patch
}

/// Diff two lists keyed by `name`. Returns `None` when either list is not a
/// list of named objects.
fn diff_named_lists(
	original: &[Value],
	modified: &[Value],
	patch_type: PatchType,
) -> Option<Vec<Value>> {
	let original = original.iter().map(named).collect::<Option<Vec<_>>>()?;
	let modified = modified.iter().map(named).collect::<Option<Vec<_>>>()?;

	let mut patch = Vec::new();
	for (name, new) in &modified {
		match original.iter().find(|(n, _)| n == name) {
			Some((_, old)) => {
				let mut nested = diff_objects(old, new, patch_type);
				if !nested.is_empty() {
					nested.insert(MERGE_KEY.to_string(), Value::String((*name).to_string()));
					patch.push(Value::Object(nested));
				}
			}
			None => patch.push(Value::Object((*new).clone())),
		}
	}
	for (name, _) in &original {
		if !modified.iter().any(|(n, _)| n == name) {
			let mut delete = Map::new();
			delete.insert(MERGE_KEY.to_string(), Value::String((*name).to_string()));
			delete.insert(PATCH_DIRECTIVE.to_string(), Value::String("delete".to_string()));
			patch.push(Value::Object(delete));
		}
	}
	Some(patch)
}

fn named(value: &Value) -> Option<(&str, &Map<String, Value>)> {
	let object = value.as_object()?;
	let name = object.get(MERGE_KEY)?.as_str()?;
	Some((name, object))
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use assert_matches::assert_matches;
	use k8s_openapi::{
		api::core::v1::{Container, PodSpec, ResourceRequirements},
		apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
	};
	use rstest::rstest;
	use serde_json::json;

	use super::*;
	use crate::parse_requirements;

	fn pod(containers: Vec<Container>) -> Pod {
		Pod {
			metadata: ObjectMeta {
				name: Some("foo".to_string()),
				namespace: Some("default".to_string()),
				..ObjectMeta::default()
			},
			spec: Some(PodSpec {
				containers,
				..PodSpec::default()
			}),
			..Pod::default()
		}
	}

	fn container(name: &str, requests: &[(&str, &str)]) -> Container {
		Container {
			name: name.to_string(),
			image: Some("nginx".to_string()),
			resources: (!requests.is_empty()).then(|| ResourceRequirements {
				requests: Some(
					requests
						.iter()
						.map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
						.collect(),
				),
				..ResourceRequirements::default()
			}),
			..Container::default()
		}
	}

	fn cpu_request(selector: &str, cpu: &str) -> ResizeRequest {
		ResizeRequest {
			requirements: ResourceRequirements {
				requests: Some(BTreeMap::from([(
					"cpu".to_string(),
					Quantity(cpu.to_string()),
				)])),
				..ResourceRequirements::default()
			},
			container_selector: selector.to_string(),
			..ResizeRequest::default()
		}
	}

	fn decode(patch: &PodPatch) -> Value {
		let bytes = patch.outcome.as_ref().expect("patch should succeed");
		serde_json::from_slice(bytes).expect("patch should be JSON")
	}

	#[test]
	fn test_patch_only_selected_container() {
		let pod = pod(vec![container("bar", &[]), container("baz", &[])]);

		let patch = calculate_patch(&pod, &cpu_request("bar", "200m"));

		assert_eq!(patch.object_name(), "pods/foo");
		assert_eq!(
			decode(&patch),
			json!({
				"spec": {
					"containers": [{
						"name": "bar",
						"resources": {"requests": {"cpu": "200m"}}
					}]
				}
			})
		);
	}

	#[test]
	fn test_patch_carries_only_changed_keys() {
		let pod = pod(vec![container("app", &[("cpu", "100m"), ("memory", "1Gi")])]);

		let patch = calculate_patch(&pod, &cpu_request("*", "250m"));

		assert_eq!(
			decode(&patch),
			json!({
				"spec": {
					"containers": [{
						"name": "app",
						"resources": {"requests": {"cpu": "250m"}}
					}]
				}
			})
		);
	}

	#[test]
	fn test_unchanged_values_are_noop() {
		let pod = pod(vec![container("app", &[("cpu", "200m")])]);

		let patch = calculate_patch(&pod, &cpu_request("app", "200m"));

		assert!(patch.is_noop());
		assert_matches!(&patch.outcome, Ok(bytes) if bytes.is_empty());
	}

	#[rstest]
	#[case("cpu", "200m", "0.2")]
	#[case("cpu", "1", "1000m")]
	#[case("memory", "1Gi", "1024Mi")]
	fn test_equivalent_quantity_is_noop(
		#[case] resource: &str,
		#[case] current: &str,
		#[case] requested: &str,
	) {
		let pod = pod(vec![container("app", &[(resource, current)])]);
		let request = ResizeRequest {
			requirements: parse_requirements("", &format!("{resource}={requested}")).unwrap(),
			..ResizeRequest::default()
		};

		let patch = calculate_patch(&pod, &request);

		assert!(patch.is_noop(), "{requested} should be the same as {current}");
	}

	#[test]
	fn test_init_container_only() {
		let mut pod = pod(vec![container("app", &[])]);
		pod.spec.as_mut().unwrap().init_containers = Some(vec![container("setup", &[])]);

		let patch = decode(&calculate_patch(&pod, &cpu_request("setup", "200m")));

		assert_eq!(
			patch,
			json!({
				"spec": {
					"initContainers": [{
						"name": "setup",
						"resources": {"requests": {"cpu": "200m"}}
					}]
				}
			})
		);
		assert_eq!(patch.pointer("/spec/containers"), None);
	}

	#[test]
	fn test_no_match_is_error() {
		let pod = pod(vec![container("app", &[])]);

		let patch = calculate_patch(&pod, &cpu_request("db", "200m"));

		assert!(!patch.is_noop());
		assert_matches!(
			patch.outcome,
			Err(ResizeError::NoContainersMatched { selector }) if selector == "db"
		);
	}

	#[test]
	fn test_pod_without_spec_is_error() {
		let pod = Pod::default();

		let patch = calculate_patch(&pod, &cpu_request("*", "200m"));

		assert_matches!(patch.outcome, Err(ResizeError::NoContainersMatched { .. }));
	}

	#[test]
	fn test_merge_patch_replaces_lists() {
		let pod = pod(vec![container("bar", &[]), container("baz", &[])]);
		let request = ResizeRequest {
			patch_type: PatchType::Merge,
			..cpu_request("bar", "200m")
		};

		let patch = decode(&calculate_patch(&pod, &request));

		let containers = patch.pointer("/spec/containers").unwrap().as_array().unwrap();
		assert_eq!(containers.len(), 2);
		assert_eq!(containers[1], json!({"name": "baz", "image": "nginx"}));
	}

	#[test]
	fn test_removed_keys_become_null() {
		let original = json!({"a": 1, "b": {"c": 2, "d": 3}});
		let modified = json!({"a": 1, "b": {"c": 2}});

		let patch = create_two_way_merge_patch(&original, &modified, PatchType::Strategic);

		assert_eq!(patch, json!({"b": {"d": null}}));
	}

	#[test]
	fn test_named_list_added_and_removed() {
		let original = json!({"ports": [
			{"name": "http", "port": 80},
			{"name": "grpc", "port": 9090}
		]});
		let modified = json!({"ports": [
			{"name": "http", "port": 80},
			{"name": "metrics", "port": 9100}
		]});

		let patch = create_two_way_merge_patch(&original, &modified, PatchType::Strategic);

		assert_eq!(
			patch,
			json!({"ports": [
				{"name": "metrics", "port": 9100},
				{"name": "grpc", "$patch": "delete"}
			]})
		);
	}

	#[test]
	fn test_unnamed_list_replaced() {
		let original = json!({"args": ["a", "b"]});
		let modified = json!({"args": ["a", "c"]});

		let patch = create_two_way_merge_patch(&original, &modified, PatchType::Strategic);

		assert_eq!(patch, json!({"args": ["a", "c"]}));
	}
}
