use std::{env, sync::Arc, time::Duration};

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::Client;
use lambda_http::{http::Request, Body};
use saas_control_plane::{
    bootstrap::ensure_tables, config::ControlPlaneConfig, events::EventPublisher, AppContext,
};
use uuid::Uuid;

pub fn body_as_string(body: &Body) -> String {
    match body {
        Body::Text(s) => s.clone(),
        Body::Binary(b) => String::from_utf8_lossy(b).to_string(),
        Body::Empty => String::new(),
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::Text(body.to_string()))
        .expect("request")
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::Empty)
        .expect("request")
}

#[allow(dead_code)]
pub struct TestSetup {
    pub ctx: Arc<AppContext>,
    pub events: EventPublisher,
    pub client: Client,
    pub config: ControlPlaneConfig,
    _guard: TablesGuard,
}

struct TablesGuard {
    client: Client,
    tables: Vec<String>,
}

impl TablesGuard {
    async fn new(client: Client, config: &ControlPlaneConfig) -> anyhow::Result<Self> {
        ensure_tables(&client, config).await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Self {
            client,
            tables: vec![
                config.tenants_table.clone(),
                config.onboarding_table.clone(),
                config.cidr_table.clone(),
                config.options_table.clone(),
            ],
        })
    }
}

impl Drop for TablesGuard {
    fn drop(&mut self) {
        let client = self.client.clone();
        let tables = std::mem::take(&mut self.tables);
        tokio::spawn(async move {
            for table in tables {
                let _ = client.delete_table().table_name(&table).send().await;
            }
        });
    }
}

/// Local DynamoDB backed context with uniquely named tables, or `None` when
/// no DynamoDB endpoint is reachable.
pub async fn setup_environment() -> Option<TestSetup> {
    let endpoint =
        env::var("DYNAMODB_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(Region::new(region.clone()))
        .credentials_provider(Credentials::new("test", "test", None, None, "integration-tests"))
        .load()
        .await;
    let client = Client::new(&sdk_config);

    if client.list_tables().send().await.is_err() {
        eprintln!("skipping integration test: DynamoDB not reachable");
        return None;
    }

    let env_name = format!("IntegrationTest_{}", Uuid::new_v4().simple());
    let config = ControlPlaneConfig {
        environment: env_name.clone(),
        region,
        parameter_prefix: format!("/saas-boost/{env_name}/"),
        tenants_table: format!("Tenants_{env_name}"),
        onboarding_table: format!("Onboarding_{env_name}"),
        cidr_table: format!("CidrBlocks_{env_name}"),
        options_table: format!("Options_{env_name}"),
        ..ControlPlaneConfig::default()
    };

    let guard = TablesGuard::new(client.clone(), &config).await.ok()?;
    let events = EventPublisher::recording();
    let ctx = Arc::new(
        AppContext::new(&sdk_config, config.clone()).with_event_publisher(events.clone()),
    );

    Some(TestSetup {
        ctx,
        events,
        client,
        config,
        _guard: guard,
    })
}
