//! EventBridge target for the control plane listeners.

use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use saas_control_plane::{
    config::ControlPlaneConfig, listeners::handle_bus_event, runtime_env::DeploymentEnv,
    AppContext,
};
use serde_json::Value;
use tracing::info;

async fn handle_request(ctx: Arc<AppContext>, event: LambdaEvent<Value>) -> Result<(), Error> {
    handle_bus_event(&ctx, event.payload)
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
    info!(environment = environment.name(), "initialising event listener");
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ctx = Arc::new(AppContext::new(&sdk_config, config));

    lambda_runtime::run(service_fn(move |event| {
        let ctx = ctx.clone();
        async move { handle_request(ctx, event).await }
    }))
    .await
}
