//! Helper functions for mock Kubernetes testing.

use serde_json::{Map, Value};

/// Merge key the API server uses for container lists.
const MERGE_KEY: &str = "name";

/// Apply a strategic merge patch to `base`.
///
/// Objects are merged recursively and `null` removes a key. Lists of named
/// objects are merged element by element on `name`, honouring
/// `"$patch": "delete"`; any other list is replaced.
pub fn strategic_merge(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(base_map), Value::Object(patch_map)) => {
			Value::Object(merge_objects(base_map, patch_map, strategic_merge))
		}
		(Value::Array(base_list), Value::Array(patch_list))
			if is_named_list(&base_list) && is_named_list(&patch_list) =>
		{
			Value::Array(merge_named_lists(base_list, patch_list))
		}
		(_, patch) => patch,
	}
}

/// Apply an RFC 7386 JSON merge patch to `base`.
pub fn json_merge(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(base_map), Value::Object(patch_map)) => {
			Value::Object(merge_objects(base_map, patch_map, json_merge))
		}
		(_, patch) => patch,
	}
}

fn merge_objects(
	mut base: Map<String, Value>,
	patch: Map<String, Value>,
	merge: fn(Value, Value) -> Value,
) -> Map<String, Value> {
	for (key, patch_value) in patch {
		if patch_value.is_null() {
			base.remove(&key);
			continue;
		}
		let base_value = base.remove(&key).unwrap_or(Value::Null);
		base.insert(key, merge(base_value, patch_value));
	}
	base
}

fn merge_named_lists(mut base: Vec<Value>, patch: Vec<Value>) -> Vec<Value> {
	for item in patch {
		let name = element_name(&item).map(str::to_string);
		let existing = base
			.iter()
			.position(|b| element_name(b).map(str::to_string) == name);
		let delete = item.get("$patch").and_then(Value::as_str) == Some("delete");

		match (existing, delete) {
			(Some(idx), true) => {
				base.remove(idx);
			}
			(None, true) => {}
			(Some(idx), false) => {
				let current = std::mem::take(&mut base[idx]);
				base[idx] = strategic_merge(current, item);
			}
			(None, false) => base.push(item),
		}
	}
	base
}

fn element_name(value: &Value) -> Option<&str> {
	value.get(MERGE_KEY)?.as_str()
}

fn is_named_list(list: &[Value]) -> bool {
	list.iter().all(|v| element_name(v).is_some())
}

/// Strip strategic merge patch directives from a JSON value.
///
/// Strategic merge patch uses special keys like `$setElementOrder/xxx`, `$patch`,
/// and `$retainKeys` to control merge behavior. These are instructions for the
/// server, not actual resource content, so they should not appear in the response.
pub fn strip_strategic_merge_directives(value: Value) -> Value {
	match value {
		Value::Object(map) => {
			let cleaned: Map<String, Value> = map
				.into_iter()
				.filter(|(key, _)| !is_strategic_directive(key))
				.map(|(key, val)| (key, strip_strategic_merge_directives(val)))
				.collect();
			Value::Object(cleaned)
		}
		Value::Array(arr) => Value::Array(
			arr.into_iter()
				.map(strip_strategic_merge_directives)
				.collect(),
		),
		other => other,
	}
}

/// Check if a key is a strategic merge patch directive.
///
/// All K8s strategic merge patch directives start with `$`.
fn is_strategic_directive(key: &str) -> bool {
	key.starts_with('$')
}

/// Check whether `labels` satisfies an equality-based label selector such as
/// `app=web,tier!=cache`.
pub fn matches_label_selector(labels: Option<&Map<String, Value>>, selector: &str) -> bool {
	let label = |key: &str| labels.and_then(|l| l.get(key)).and_then(Value::as_str);

	selector
		.split(',')
		.map(str::trim)
		.filter(|term| !term.is_empty())
		.all(|term| {
			if let Some((key, value)) = term.split_once("!=") {
				label(key.trim()) != Some(value.trim())
			} else if let Some((key, value)) =
				term.split_once("==").or_else(|| term.split_once('='))
			{
				label(key.trim()) == Some(value.trim())
			} else {
				label(term).is_some()
			}
		})
}
