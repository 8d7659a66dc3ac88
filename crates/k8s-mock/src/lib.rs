//! Mock Kubernetes API server for testing.
//!
//! Provides an HTTP server that can be used with kubeconfig-based connections.
//! It serves pods, applies patches sent to the pod `resize` subresource and
//! can be told to reject resizes for specific pods.

pub mod discovery;
mod helpers;
pub mod http;

pub use discovery::{MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, ReceivedPatch, RunningHttpMockK8sServer};
