//! SQS consumer that hands queued metrics to the metrics provider.

use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use saas_control_plane::{
    config::ControlPlaneConfig, metrics::ingest, runtime_env::DeploymentEnv, AppContext,
};
use serde_json::Value;
use tracing::{info, warn};

async fn handle_request(ctx: Arc<AppContext>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    if !ingest::is_sqs_event(&event.payload) {
        warn!("ignoring non-SQS invocation");
        return Err(Error::from("expected an SQS event"));
    }
    ingest::process_metrics_queue(&ctx, &event.payload)
        .await
        .map_err(|e| Error::from(format!("{}: {e}", e.category())))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .json()
        .with_current_span(false)
        .init();

    let environment = DeploymentEnv::detect();
    let config = ControlPlaneConfig::from_env(&environment);
    info!(environment = environment.name(), "initialising metrics queue consumer");
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ctx = Arc::new(AppContext::new(&sdk_config, config));

    lambda_runtime::run(service_fn(move |event| {
        let ctx = ctx.clone();
        async move { handle_request(ctx, event).await }
    }))
    .await
}
