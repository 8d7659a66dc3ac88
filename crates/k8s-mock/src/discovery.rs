//! Mock Kubernetes API discovery types.

/// Pre-configured core (`/api/v1`) discovery response.
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
}

impl MockDiscovery {
	/// Discovery for a server that may or may not expose `pods/resize`.
	pub fn with_resize(resize_subresource: bool) -> Self {
		let mut core_resources = vec![
			MockApiResource::namespaced("pods", "Pod"),
			MockApiResource::subresource("pods/status", "Pod", &["get", "patch", "update"]),
			MockApiResource::cluster_scoped("namespaces", "Namespace"),
		];
		if resize_subresource {
			core_resources.push(MockApiResource::subresource(
				"pods/resize",
				"Pod",
				&["get", "patch", "update"],
			));
		}
		Self { core_resources }
	}
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self::with_resize(true)
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
			verbs: default_verbs(),
		}
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: false,
			verbs: default_verbs(),
		}
	}

	/// A namespaced subresource such as `pods/resize`.
	pub fn subresource(name: &str, kind: &str, verbs: &[&str]) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
			verbs: verbs.iter().map(|v| v.to_string()).collect(),
		}
	}
}

fn default_verbs() -> Vec<String> {
	["create", "delete", "get", "list", "patch", "update", "watch"]
		.into_iter()
		.map(String::from)
		.collect()
}
