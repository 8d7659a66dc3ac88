//! Kubernetes access for the resize command.
//!
//! Native API access using kube-rs: connecting through kubeconfig, fetching
//! the target pods and submitting patches to their `resize` subresource.

pub mod client;
pub mod provider;
pub mod transport;
