//! Resize command handler.
//!
//! Validates the command line, connects to the cluster, fetches the target
//! pods and patches their `resize` subresource one pod at a time.

use std::{fmt, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pod_resize::{
	parse_requirements, PatchType, RequirementsError, ResizeRequest, ALL_CONTAINERS,
};
use thiserror::Error;
use tracing::{instrument, Level};

use crate::k8s::{
	client::{ClusterConnection, ConnectionOptions},
	provider::{fetch_pods, PodTarget},
	transport::KubeResizeTransport,
};

const AFTER_HELP: &str = "\
Examples:
  # Set the requested resources of a pod named 'foo' to 1Gi of memory and 200m of CPU
  kubectl resize-pod foo --requests=memory=1Gi,cpu=200m

  # Set the limits of a pod named 'foo' to 2Gi of memory and 500m of CPU
  kubectl resize-pod foo --limits=memory=2Gi,cpu=500m

  # Set the requests of a container named 'bar' in a pod named 'foo'
  kubectl resize-pod foo bar --requests=memory=1Gi,cpu=200m

  # Raise the CPU limit of every sidecar in pods labelled app=web
  kubectl resize-pod -l app=web -c '*-sidecar' --limits=cpu=1";

/// Invalid command line. Nothing has been sent to the cluster.
#[derive(Debug, Error)]
pub enum UsageError {
	#[error("you must specify a pod or a pod selector")]
	MissingTarget,

	#[error("too many arguments: you may only specify a pod name and container name")]
	TooManyArguments,

	#[error("you must specify at least one of --limits or --requests")]
	MissingRequirements,

	#[error("a pod name cannot be provided when a selector is specified")]
	NameWithSelector,

	#[error(transparent)]
	Requirements(#[from] RequirementsError),
}

/// Patch encoding accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PatchTypeArg {
	/// Strategic merge patch; containers are merged by name.
	#[default]
	Strategic,

	/// JSON merge patch (RFC 7386); container lists are sent whole.
	Merge,
}

impl fmt::Display for PatchTypeArg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchTypeArg::Strategic => write!(f, "strategic"),
			PatchTypeArg::Merge => write!(f, "merge"),
		}
	}
}

impl From<PatchTypeArg> for PatchType {
	fn from(arg: PatchTypeArg) -> Self {
		match arg {
			PatchTypeArg::Strategic => PatchType::Strategic,
			PatchTypeArg::Merge => PatchType::Merge,
		}
	}
}

/// Resize the resources of a running pod in place.
#[derive(Debug, Parser)]
#[command(name = "kubectl-resize_pod", bin_name = "kubectl resize-pod")]
#[command(version = env!("RESIZE_POD_VERSION"))]
#[command(after_help = AFTER_HELP)]
pub struct ResizeArgs {
	/// Pod name, optionally followed by a container name
	#[arg(value_name = "POD [CONTAINER]")]
	pub args: Vec<String>,

	/// If present, the namespace scope for this CLI request
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// The name of the kubeconfig context to use
	#[arg(long)]
	pub context: Option<String>,

	/// Path to the kubeconfig file to use for CLI requests
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Selector (label query) to filter on, supports '=', '==', and '!='
	#[arg(short = 'l', long)]
	pub selector: Option<String>,

	/// The names of containers in the selected pods to change - may use wildcards
	#[arg(short = 'c', long, default_value = ALL_CONTAINERS)]
	pub containers: String,

	/// The resource requirement limits for the containers. For example, 'cpu=100m,memory=256Mi'
	#[arg(long, default_value = "")]
	pub limits: String,

	/// The resource requirement requests for the containers. For example, 'cpu=100m,memory=256Mi'
	#[arg(long, default_value = "")]
	pub requests: String,

	/// Patch encoding sent to the resize subresource
	#[arg(long, value_enum, default_value_t)]
	pub patch_type: PatchTypeArg,

	/// Submit patches with server-side dry-run; nothing is persisted
	#[arg(long)]
	pub dry_run: bool,

	/// Log level (error, warn, info, debug, trace). Overrides RUST_LOG
	#[arg(long)]
	pub log_level: Option<Level>,
}

impl ResizeArgs {
	/// Check the command line and turn it into a target and a request.
	pub fn validate(&self) -> Result<(PodTarget, ResizeRequest), UsageError> {
		let selector = self.selector.as_deref().filter(|s| !s.is_empty());

		if self.args.is_empty() && selector.is_none() {
			return Err(UsageError::MissingTarget);
		}
		if self.args.len() > 2 {
			return Err(UsageError::TooManyArguments);
		}
		if self.limits.is_empty() && self.requests.is_empty() {
			return Err(UsageError::MissingRequirements);
		}

		let target = match (self.args.first(), selector) {
			(Some(_), Some(_)) => return Err(UsageError::NameWithSelector),
			(Some(name), None) => PodTarget::Name(name.clone()),
			(None, Some(selector)) => PodTarget::Selector(selector.to_string()),
			(None, None) => return Err(UsageError::MissingTarget),
		};

		// A positional container name overrides --containers
		let container_selector = self.args.get(1).unwrap_or(&self.containers).clone();

		let request = ResizeRequest {
			requirements: parse_requirements(&self.limits, &self.requests)?,
			container_selector,
			patch_type: self.patch_type.into(),
		};
		Ok((target, request))
	}
}

/// Options for resizing pods on an established connection.
#[derive(Debug, Clone)]
pub struct ResizeOpts {
	/// Namespace of the target pods; the context's namespace when unset.
	pub namespace: Option<String>,
	pub target: PodTarget,
	pub request: ResizeRequest,
	pub dry_run: bool,
}

/// Run the resize command.
pub async fn run(args: ResizeArgs) -> Result<()> {
	let (target, request) = args.validate()?;

	let connection = ClusterConnection::connect(&ConnectionOptions {
		kubeconfig: args.kubeconfig.clone(),
		context: args.context.clone(),
	})
	.await
	.context("connecting to cluster")?;

	resize_pods(
		&connection,
		ResizeOpts {
			namespace: args.namespace,
			target,
			request,
			dry_run: args.dry_run,
		},
	)
	.await
}

/// Fetch the target pods and resize them.
///
/// Per-pod failures are returned together as a
/// [`pod_resize::AggregateError`].
#[instrument(skip_all, fields(target = %opts.target, context = %connection.context()))]
pub async fn resize_pods(connection: &ClusterConnection, opts: ResizeOpts) -> Result<()> {
	if !connection
		.supports_pod_resize()
		.await
		.context("discovering core API resources")?
	{
		anyhow::bail!(
			"the API server (version {}) does not expose the pods/resize subresource; \
			 in-place pod resize requires Kubernetes v1.33 or newer",
			connection.server_version().git_version
		);
	}

	let namespace = opts
		.namespace
		.unwrap_or_else(|| connection.default_namespace().to_string());

	let pods = fetch_pods(connection.client(), &namespace, &opts.target).await?;

	let transport = KubeResizeTransport::new(connection.client().clone(), opts.dry_run);
	pod_resize::run(&pods, &opts.request, &transport).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	fn parse(argv: &[&str]) -> ResizeArgs {
		let argv = std::iter::once("kubectl-resize_pod").chain(argv.iter().copied());
		ResizeArgs::try_parse_from(argv).expect("arguments should parse")
	}

	#[test]
	fn test_pod_and_container() {
		let (target, request) = parse(&["foo", "bar", "--requests=cpu=200m"])
			.validate()
			.unwrap();

		assert_eq!(target, PodTarget::Name("foo".to_string()));
		assert_eq!(request.container_selector, "bar");
		assert_eq!(request.requirements.limits, None);
		assert_eq!(request.patch_type, PatchType::Strategic);
	}

	#[test]
	fn test_selector_with_container_flag() {
		let (target, request) = parse(&["-l", "app=web", "-c", "web*", "--limits=memory=1Gi"])
			.validate()
			.unwrap();

		assert_eq!(target, PodTarget::Selector("app=web".to_string()));
		assert_eq!(request.container_selector, "web*");
		assert!(request.requirements.limits.is_some());
	}

	#[test]
	fn test_defaults_to_all_containers() {
		let (_, request) = parse(&["foo", "--requests=cpu=1", "--patch-type=merge"])
			.validate()
			.unwrap();

		assert_eq!(request.container_selector, ALL_CONTAINERS);
		assert_eq!(request.patch_type, PatchType::Merge);
	}

	#[rstest]
	#[case(&["--requests=cpu=1"])]
	#[case(&["--requests=cpu=1", "--selector="])]
	fn test_missing_target(#[case] argv: &[&str]) {
		assert_matches!(parse(argv).validate(), Err(UsageError::MissingTarget));
	}

	#[test]
	fn test_too_many_arguments() {
		assert_matches!(
			parse(&["foo", "bar", "baz", "--requests=cpu=1"]).validate(),
			Err(UsageError::TooManyArguments)
		);
	}

	#[test]
	fn test_missing_requirements() {
		assert_matches!(
			parse(&["foo"]).validate(),
			Err(UsageError::MissingRequirements)
		);
	}

	#[test]
	fn test_name_with_selector() {
		assert_matches!(
			parse(&["foo", "-l", "app=web", "--requests=cpu=1"]).validate(),
			Err(UsageError::NameWithSelector)
		);
	}

	#[test]
	fn test_malformed_requirements() {
		assert_matches!(
			parse(&["foo", "--requests=cpu"]).validate(),
			Err(UsageError::Requirements(RequirementsError::InvalidSyntax(_)))
		);
	}
}
