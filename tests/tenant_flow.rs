mod common;

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{json, Value};
use serial_test::serial;

use common::{body_as_string, empty_request, json_request, setup_environment};
use saas_control_plane::{handle_request, listeners::handle_bus_event, tenant::Resource};

async fn call(
    ctx: &std::sync::Arc<saas_control_plane::AppContext>,
    request: lambda_http::Request,
) -> Result<(u16, Value)> {
    let response = handle_request(ctx.clone(), request)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let status = response.status().as_u16();
    let body = body_as_string(response.body());
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body)?
    };
    Ok((status, json))
}

#[tokio::test]
#[serial]
async fn tenant_lifecycle_flow() -> Result<()> {
    let Some(setup) = setup_environment().await else {
        return Ok(());
    };
    let ctx = setup.ctx.clone();

    let (status, created) = call(
        &ctx,
        json_request(
            "POST",
            "/tenants",
            json!({ "name": "Acme", "subdomain": "acme", "tier": "default" }),
        ),
    )
    .await?;
    assert_eq!(status, 200);
    let id = created["id"].as_str().expect("tenant id").to_string();
    assert_eq!(created["onboardingStatus"], "unknown");
    assert_eq!(created["active"], true);

    let (status, fetched) = call(&ctx, empty_request("GET", &format!("/tenants/{id}"))).await?;
    assert_eq!(status, 200);
    assert_eq!(fetched["name"], "Acme");
    assert_eq!(fetched["subdomain"], "acme");

    let (status, listed) = call(&ctx, empty_request("GET", "/tenants")).await?;
    assert_eq!(status, 200);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let mut renamed = fetched.clone();
    renamed["name"] = json!("Acme Corp");
    let (status, updated) = call(
        &ctx,
        json_request("PUT", &format!("/tenants/{id}"), renamed),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(updated["name"], "Acme Corp");
    // unknown onboarding status counts as provisioned, so the update is announced
    assert!(setup
        .events
        .recorded()
        .iter()
        .any(|event| event.detail_type == "Tenant Updated"));

    let (status, body) = call(
        &ctx,
        json_request(
            "PUT",
            &format!("/tenants/{id}/onboarding"),
            json!({ "id": id, "onboardingStatus": "deleted" }),
        ),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["onboardingStatus"], "deleted");

    let (status, provisioned) = call(&ctx, empty_request("GET", "/tenants/provisioned")).await?;
    assert_eq!(status, 200);
    assert_eq!(provisioned.as_array().map(Vec::len), Some(0));

    let (status, disabled) = call(
        &ctx,
        empty_request("PATCH", &format!("/tenants/{id}/disable")),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(disabled["active"], false);

    let (status, enabled) = call(
        &ctx,
        empty_request("PATCH", &format!("/tenants/{id}/enable")),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(enabled["active"], true);

    let (status, deleted) = call(
        &ctx,
        json_request("DELETE", &format!("/tenants/{id}"), json!({ "id": id })),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(deleted["active"], false);

    let detail_types: Vec<String> = setup
        .events
        .recorded()
        .into_iter()
        .map(|event| event.detail_type)
        .collect();
    for expected in [
        "Tenant Onboarding Status Changed",
        "Tenant Disabled",
        "Tenant Enabled",
        "Tenant Deleted",
    ] {
        assert!(
            detail_types.iter().any(|dt| dt == expected),
            "missing {expected} in {detail_types:?}"
        );
    }

    Ok(())
}

#[tokio::test]
#[serial]
async fn tenant_requests_are_validated() -> Result<()> {
    let Some(setup) = setup_environment().await else {
        return Ok(());
    };
    let ctx = setup.ctx.clone();

    let (status, body) = call(&ctx, empty_request("GET", "/tenants/not-a-uuid")).await?;
    assert_eq!(status, 400);
    assert!(body["message"].is_string());

    let missing = uuid::Uuid::new_v4();
    let (status, _) = call(&ctx, empty_request("GET", &format!("/tenants/{missing}"))).await?;
    assert_eq!(status, 404);

    let (status, body) = call(
        &ctx,
        json_request(
            "PUT",
            &format!("/tenants/{missing}"),
            json!({ "id": uuid::Uuid::new_v4(), "name": "Mismatch" }),
        ),
    )
    .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Resource id does not match request body id.");

    let (status, _) = call(
        &ctx,
        empty_request("PATCH", &format!("/tenants/{missing}/enable")),
    )
    .await?;
    assert_eq!(status, 404);
    assert!(setup.events.recorded().is_empty());

    Ok(())
}

#[tokio::test]
#[serial]
async fn tenant_resources_are_merged() -> Result<()> {
    let Some(setup) = setup_environment().await else {
        return Ok(());
    };
    let ctx = setup.ctx.clone();

    let (status, created) = call(
        &ctx,
        json_request(
            "POST",
            "/tenants",
            json!({
                "name": "Umbrella",
                "resources": {
                    "VPC": { "name": "vpc-1", "arn": "arn:aws:ec2:vpc/vpc-1", "consoleUrl": "https://vpc" }
                }
            }),
        ),
    )
    .await?;
    assert_eq!(status, 200);
    let id: uuid::Uuid = created["id"].as_str().expect("tenant id").parse()?;
    let dal = ctx.tenants();
    let before = dal.get_tenant(id).await?.expect("stored tenant");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let cluster = Resource {
        name: "tenant-cluster".into(),
        arn: "arn:aws:ecs:cluster/tenant-cluster".into(),
        console_url: "https://ecs".into(),
    };
    let updated = dal
        .update_tenant_resources(id, HashMap::from([("ECS_CLUSTER".to_string(), cluster.clone())]))
        .await?;
    assert_eq!(updated.resources["ECS_CLUSTER"], cluster);
    assert_eq!(updated.resources["VPC"].name, "vpc-1");
    assert!(updated.modified > before.modified);

    handle_bus_event(
        &ctx,
        json!({
            "source": "saas-boost",
            "detail-type": "Tenant Resources Updated",
            "detail": {
                "tenantId": id.to_string(),
                "resources": r#"{"ALB":{"name":"alb-1","arn":"arn:alb","consoleUrl":"https://alb"}}"#
            }
        }),
    )
    .await?;
    let stored = dal.get_tenant(id).await?.expect("stored tenant");
    let mut keys: Vec<_> = stored.resources.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["ALB", "ECS_CLUSTER", "VPC"]);

    let missing = dal
        .update_tenant_resources(uuid::Uuid::new_v4(), HashMap::new())
        .await;
    assert!(missing.is_err());

    Ok(())
}
