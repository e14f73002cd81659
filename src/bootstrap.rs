//! Creates the control plane's DynamoDB tables when they are missing.
//! Used for local runs and integration tests only; deployed stacks own
//! their tables.

use aws_sdk_dynamodb::{
    types::{
        AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
        TableStatus,
    },
    Client,
};
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::config::ControlPlaneConfig;

pub async fn ensure_tables(
    client: &Client,
    config: &ControlPlaneConfig,
) -> Result<(), aws_sdk_dynamodb::Error> {
    ensure_table(client, &config.tenants_table, "id", None).await?;
    ensure_table(client, &config.onboarding_table, "id", None).await?;
    ensure_table(client, &config.cidr_table, "cidr_block", None).await?;
    ensure_table(client, &config.options_table, "region", Some("engine")).await?;
    Ok(())
}

fn string_attribute(name: &str) -> AttributeDefinition {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .expect("static attribute definition")
}

fn key(name: &str, key_type: KeyType) -> KeySchemaElement {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .expect("static key schema")
}

/// Create `table` keyed by string `hash_key` (and optional `range_key`).
pub async fn ensure_table(
    client: &Client,
    table: &str,
    hash_key: &str,
    range_key: Option<&str>,
) -> Result<(), aws_sdk_dynamodb::Error> {
    if table_exists(client, table).await? {
        return Ok(());
    }

    let mut request = client
        .create_table()
        .table_name(table)
        .attribute_definitions(string_attribute(hash_key))
        .key_schema(key(hash_key, KeyType::Hash));
    if let Some(range_key) = range_key {
        request = request
            .attribute_definitions(string_attribute(range_key))
            .key_schema(key(range_key, KeyType::Range));
    }
    request
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await?;
    info!(%table, "created DynamoDB table");

    wait_for_active(client, table).await
}

async fn table_exists(client: &Client, table: &str) -> Result<bool, aws_sdk_dynamodb::Error> {
    let mut last_evaluated = None;
    loop {
        let mut req = client.list_tables();
        if let Some(ref start) = last_evaluated {
            req = req.exclusive_start_table_name(start);
        }
        let resp = req.send().await?;
        if resp.table_names().iter().any(|name| name == table) {
            return Ok(true);
        }
        if let Some(next) = resp.last_evaluated_table_name {
            last_evaluated = Some(next);
        } else {
            break;
        }
    }
    Ok(false)
}

async fn wait_for_active(client: &Client, table: &str) -> Result<(), aws_sdk_dynamodb::Error> {
    for _ in 0..20 {
        let resp = client.describe_table().table_name(table).send().await?;
        if resp
            .table
            .and_then(|t| t.table_status)
            .map_or(false, |status| status == TableStatus::Active)
        {
            return Ok(());
        }
        sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}
