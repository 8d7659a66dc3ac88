//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections, so tests exercise the same kube client code paths as the CLI.

use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::MockDiscovery,
	helpers::{
		json_merge, matches_label_selector, strategic_merge, strip_strategic_merge_directives,
	},
};

/// Type alias for the shared mutable resources map, keyed by (collection path, name).
pub type SharedResources = Arc<RwLock<HashMap<(String, String), serde_json::Value>>>;

const RESIZE_SUBRESOURCE: &str = "resize";
const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Pods (or other core resources) to serve as raw manifests.
	#[builder(default)]
	resources: Vec<serde_json::Value>,
	/// Pod names whose resize patches are rejected with 422 Unprocessable Entity.
	#[builder(default)]
	reject_resize: Vec<String>,
	/// Whether discovery advertises the `pods/resize` subresource.
	#[builder(default = true)]
	resize_subresource: bool,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

/// A PATCH request received by the mock server.
#[derive(Debug, Clone)]
pub struct ReceivedPatch {
	pub path: String,
	pub content_type: String,
	pub dry_run: bool,
	pub body: serde_json::Value,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::with_resize(self.resize_subresource);

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut resources: HashMap<(String, String), serde_json::Value> = HashMap::new();

		for manifest in self.resources {
			if let Some((api_path, name)) = api_path_for_manifest(&manifest, &discovery) {
				trace!(api_path = %api_path, name = %name, "Registered resource");
				resources.insert((api_path, name), manifest);
			}
		}

		let ns_key = ("/api/v1/namespaces".to_string(), "default".to_string());
		resources.entry(ns_key).or_insert_with(|| {
			serde_json::json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {
					"name": "default"
				}
			})
		});

		let shared_resources = Arc::new(RwLock::new(resources));

		mount_version(&server).await;
		mount_discovery(&server, &discovery).await;
		mount_resources(&server, &shared_resources, self.reject_resize).await;

		RunningHttpMockK8sServer {
			server,
			resources: shared_resources,
		}
	}
}

/// Derive the collection path for a core manifest using discovery data.
fn api_path_for_manifest(
	manifest: &serde_json::Value,
	discovery: &MockDiscovery,
) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.get("metadata")?.get("name")?.as_str()?.to_string();
	let namespace = manifest
		.get("metadata")
		.and_then(|m| m.get("namespace"))
		.and_then(|n| n.as_str());

	let resource = discovery
		.core_resources
		.iter()
		.find(|r| r.kind == kind && !r.name.contains('/'))?;

	let path = if resource.namespaced {
		let ns = namespace.unwrap_or("default");
		format!("/api/{}/namespaces/{}/{}", api_version, ns, resource.name)
	} else {
		format!("/api/{}/{}", api_version, resource.name)
	};

	Some((path, name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Current state of a pod as stored by the server.
	pub fn pod(&self, namespace: &str, name: &str) -> Option<serde_json::Value> {
		let key = (format!("/api/v1/namespaces/{namespace}/pods"), name.to_string());
		self.resources
			.read()
			.expect("resources lock poisoned")
			.get(&key)
			.cloned()
	}

	/// Every PATCH request the server has received, in arrival order.
	pub async fn received_patches(&self) -> Vec<ReceivedPatch> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.filter(|req| req.method.as_str() == "PATCH")
			.map(|req| ReceivedPatch {
				path: req.url.path().to_string(),
				content_type: content_type(&req).to_string(),
				dry_run: req.url.query().unwrap_or("").contains("dryRun"),
				body: serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null),
			})
			.collect()
	}
}

fn content_type(req: &Request) -> &str {
	req.headers
		.get("content-type")
		.and_then(|v| v.to_str().ok())
		.unwrap_or("")
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"major": "1",
			"minor": "33",
			"gitVersion": "v1.33.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2025-04-23T00:00:00Z",
			"goVersion": "go1.24.2",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery) {
	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	let core_resources: Vec<_> = discovery
		.core_resources
		.iter()
		.map(|r| {
			serde_json::json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIResourceList",
			"apiVersion": "v1",
			"groupVersion": "v1",
			"resources": core_resources
		})))
		.mount(server)
		.await;
}

fn status_response(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(serde_json::json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

async fn mount_resources(
	server: &MockServer,
	resources: &SharedResources,
	reject_resize: Vec<String>,
) {
	let patch_resources = Arc::clone(resources);
	let get_resources = Arc::clone(resources);

	// PATCH endpoints - merge request body into the stored object.
	// Patches to the resize subresource land on the parent pod.
	Mock::given(method("PATCH"))
		.and(path_regex(r"^/api/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path();
			let query = req.url.query().unwrap_or("");
			let is_dry_run = query.contains("dryRun");

			let object_path = path_str
				.trim_end_matches('/')
				.strip_suffix(&format!("/{RESIZE_SUBRESOURCE}"))
				.unwrap_or(path_str);
			let (api_path, name) = parse_resource_path(object_path);

			if object_path != path_str && reject_resize.contains(&name) {
				return status_response(
					422,
					"Invalid",
					&format!("Pod \"{name}\" is invalid: spec: Forbidden: pod resize rejected"),
				);
			}

			let Some(existing) = patch_resources
				.read()
				.unwrap()
				.get(&(api_path.clone(), name.clone()))
				.cloned()
			else {
				return status_response(404, "NotFound", &format!("pods \"{name}\" not found"));
			};

			let patch: serde_json::Value =
				serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);

			let merged = if content_type(req) == STRATEGIC_MERGE_PATCH {
				strategic_merge(existing, patch)
			} else {
				json_merge(existing, patch)
			};
			let result = strip_strategic_merge_directives(merged);

			if !is_dry_run {
				let mut resources = patch_resources.write().unwrap();
				resources.insert((api_path, name), result.clone());
			}

			ResponseTemplate::new(200).set_body_json(result)
		})
		.mount(server)
		.await;

	// GET endpoints - handles both single resource and LIST
	Mock::given(method("GET"))
		.and(path_regex(r"^/api/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path();
			let resources = get_resources.read().unwrap();

			let (api_path, name) = parse_resource_path(path_str);

			if !name.is_empty() {
				if let Some(resource) = resources.get(&(api_path.clone(), name.clone())) {
					return ResponseTemplate::new(200).set_body_json(resource.clone());
				}
			}

			let selector = req
				.url
				.query_pairs()
				.find(|(key, _)| key == "labelSelector")
				.map(|(_, value)| value.into_owned());

			// Namespaced list, or cluster-wide list matching any namespace
			let is_listed = |res_api_path: &str| {
				res_api_path == path_str
					|| extract_cluster_wide_path(res_api_path).as_deref() == Some(path_str)
			};
			let mut items: Vec<_> = resources
				.iter()
				.filter(|((res_api_path, _), _)| is_listed(res_api_path.as_str()))
				.filter(|(_, v)| match &selector {
					Some(selector) => matches_label_selector(
						v.pointer("/metadata/labels").and_then(|l| l.as_object()),
						selector,
					),
					None => true,
				})
				.map(|((_, name), v)| (name.clone(), v.clone()))
				.collect();

			if !items.is_empty() {
				items.sort_by(|(a, _), (b, _)| a.cmp(b));
				return ResponseTemplate::new(200).set_body_json(serde_json::json!({
					"kind": "List",
					"apiVersion": "v1",
					"metadata": {"resourceVersion": "1"},
					"items": items.into_iter().map(|(_, v)| v).collect::<Vec<_>>()
				}));
			}

			if !name.is_empty() && !is_collection(path_str) {
				return status_response(404, "NotFound", "not found");
			}

			ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"kind": "List",
				"apiVersion": "v1",
				"metadata": {"resourceVersion": "1"},
				"items": []
			}))
		})
		.mount(server)
		.await;
}

/// Parse a Kubernetes API path into (api_path, resource_name).
///
/// Examples:
/// - `/api/v1/namespaces/default/pods/web-0` -> (`/api/v1/namespaces/default/pods`, `web-0`)
/// - `/api/v1/namespaces/my-ns` -> (`/api/v1/namespaces`, `my-ns`)
fn parse_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	if let Some(last_slash) = path.rfind('/') {
		let api_path = &path[..last_slash];
		let name = &path[last_slash + 1..];
		(api_path.to_string(), name.to_string())
	} else {
		(path.to_string(), String::new())
	}
}

/// True for collection paths such as `/api/v1/namespaces/default/pods` or
/// `/api/v1/pods`, which list rather than fetch a single object.
fn is_collection(path: &str) -> bool {
	let segments: Vec<_> = path.trim_matches('/').split('/').collect();
	match segments.as_slice() {
		["api", _, "namespaces", _, _] | ["api", _, _] => true,
		_ => false,
	}
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/default/pods` -> Some(`/api/v1/pods`)
/// - `/api/v1/namespaces` -> None (already cluster-wide for namespaces)
fn extract_cluster_wide_path(path: &str) -> Option<String> {
	if let Some(ns_idx) = path.find("/namespaces/") {
		let before_ns = &path[..ns_idx];
		let after_ns = &path[ns_idx + "/namespaces/".len()..];

		if let Some(slash_idx) = after_ns.find('/') {
			let resource_type = &after_ns[slash_idx..];
			return Some(format!("{}{}", before_ns, resource_type));
		}
	}
	None
}
