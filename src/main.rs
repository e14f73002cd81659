//! API Lambda entrypoint.
//!
//! The binary initialises logging, discovers which environment it is running in,
//! bootstraps the DynamoDB tables when asked to, and then hands execution to
//! `lambda_http`. Each invocation reuses the `AppContext` so the SDK clients and
//! configuration are cached across requests.

use std::sync::Arc;

use lambda_http::{run, service_fn, Error as LambdaError};
use saas_control_plane::{
    bootstrap::ensure_tables, config::ControlPlaneConfig, handle_request,
    runtime_env::DeploymentEnv, AppContext,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .json()
        .with_current_span(false)
        .init();

    let environment = DeploymentEnv::detect();
    let config = ControlPlaneConfig::from_env(&environment);
    info!(
        environment = environment.name(),
        tenants_table = %config.tenants_table,
        parameter_prefix = %config.parameter_prefix,
        resolution = %environment.source(),
        "initialising Lambda runtime"
    );

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    if config.bootstrap_tables {
        let client = aws_sdk_dynamodb::Client::new(&sdk_config);
        ensure_tables(&client, &config)
            .await
            .map_err(|e| LambdaError::from(format!("failed to ensure DynamoDB tables: {e}")))?;
    } else {
        info!(
            environment = environment.name(),
            "skipping DynamoDB table bootstrap"
        );
    }

    let ctx = Arc::new(AppContext::new(&sdk_config, config));

    run(service_fn(move |event| {
        let ctx = ctx.clone();
        async move { handle_request(ctx, event).await }
    }))
    .await
}
