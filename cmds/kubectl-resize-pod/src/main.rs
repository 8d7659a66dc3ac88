use anyhow::{Context, Result};
use clap::Parser;
use kubectl_resize_pod::{commands::resize::ResizeArgs, telemetry};

fn main() -> Result<()> {
	let args = ResizeArgs::parse();

	// Pods are resized one after another, a single thread is enough
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(async {
		let _telemetry = telemetry::init(args.log_level)?;
		kubectl_resize_pod::commands::resize::run(args).await
	})
}
