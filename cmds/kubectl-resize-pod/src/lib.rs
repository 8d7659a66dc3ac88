pub mod commands;
pub mod k8s;
pub mod telemetry;
