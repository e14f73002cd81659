mod common;

use anyhow::Result;
use serde_json::{json, Value};
use serial_test::serial;

use common::{body_as_string, empty_request, json_request, setup_environment};
use saas_control_plane::handle_request;

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
async fn onboarding_request_flow() -> Result<()> {
    let Some(setup) = setup_environment().await else {
        return Ok(());
    };
    let ctx = setup.ctx.clone();

    let (status, created) = call(
        &ctx,
        json_request(
            "POST",
            "/onboarding",
            json!({ "name": "Globex", "subdomain": "globex", "tier": "premium" }),
        ),
    )
    .await?;
    assert_eq!(status, 200);
    let id = created["id"].as_str().expect("onboarding id").to_string();
    assert_eq!(created["status"], "created");
    assert_eq!(created["request"]["tier"], "premium");
    // no resources bucket configured, so no upload url
    assert!(created["zipFile"].is_null());

    let events = setup.events.recorded();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].detail_type, "Onboarding request created");
    assert_eq!(events[0].detail["onboardingId"], id.as_str());

    let (status, fetched) = call(&ctx, empty_request("GET", &format!("/onboarding/{id}"))).await?;
    assert_eq!(status, 200);
    assert_eq!(fetched["request"]["name"], "Globex");

    let (status, listed) = call(&ctx, empty_request("GET", "/onboarding")).await?;
    assert_eq!(status, 200);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, updated) = call(
        &ctx,
        json_request(
            "PUT",
            &format!("/onboarding/{id}/status"),
            json!({ "id": id, "status": "provisioning" }),
        ),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(updated["status"], "provisioning");

    let (status, body) = call(
        &ctx,
        json_request(
            "PUT",
            &format!("/onboarding/{id}/status"),
            json!({ "id": id, "status": "bogus" }),
        ),
    )
    .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Unknown onboarding status bogus");

    Ok(())
}

#[tokio::test]
#[serial]
async fn onboarding_request_validation() -> Result<()> {
    let Some(setup) = setup_environment().await else {
        return Ok(());
    };
    let ctx = setup.ctx.clone();

    let (status, body) = call(
        &ctx,
        json_request("POST", "/onboarding", json!({ "tier": "default" })),
    )
    .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Tenant name is required.");

    let (status, _) = call(
        &ctx,
        json_request(
            "POST",
            "/tenants",
            json!({ "name": "Initech", "subdomain": "initech" }),
        ),
    )
    .await?;
    assert_eq!(status, 200);

    let (status, body) = call(
        &ctx,
        json_request(
            "POST",
            "/onboarding",
            json!({ "name": "Initech Two", "subdomain": "InitTech" }),
        ),
    )
    .await?;
    assert_eq!(status, 200, "different subdomain is accepted: {body}");

    let (status, body) = call(
        &ctx,
        json_request(
            "POST",
            "/onboarding",
            json!({ "name": "Initech Again", "subdomain": "INITECH" }),
        ),
    )
    .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Tenant subdomain INITECH is already in use.");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = call(&ctx, empty_request("GET", &format!("/onboarding/{missing}"))).await?;
    assert_eq!(status, 404);

    Ok(())
}
