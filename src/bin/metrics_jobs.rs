//! Scheduled access-log jobs: `{"job": "publish_access_logs"}` refreshes the
//! console datasets, `{"job": "add_athena_partition"}` registers today's
//! partition.

use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use saas_control_plane::{
    config::ControlPlaneConfig, metrics::access_logs, runtime_env::DeploymentEnv, AppContext,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Job {
    PublishAccessLogs,
    AddAthenaPartition,
}

#[derive(Debug, Deserialize)]
struct JobRequest {
    job: Job,
}

async fn handle_request(ctx: Arc<AppContext>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let request: JobRequest = serde_json::from_value(event.payload)
        .map_err(|e| Error::from(format!("invalid job payload: {e}")))?;
    info!(job = ?request.job, "running metrics job");
    let result = match request.job {
        Job::PublishAccessLogs => access_logs::publish_access_log_metrics(&ctx).await,
        Job::AddAthenaPartition => access_logs::add_athena_partition(&ctx).await,
    };
    result.map_err(|e| Error::from(format!("{}: {e}", e.category())))?;
    Ok(json!({ "status": "ok" }))
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
    info!(environment = environment.name(), "initialising metrics jobs");
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ctx = Arc::new(AppContext::new(&sdk_config, config));

    lambda_runtime::run(service_fn(move |event| {
        let ctx = ctx.clone();
        async move { handle_request(ctx, event).await }
    }))
    .await
}
