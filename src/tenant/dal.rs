use std::collections::HashMap;

use aws_sdk_dynamodb::{
    types::{AttributeValue, ReturnValue},
    Client,
};
use tracing::info;
use uuid::Uuid;

use super::model::{Resource, Tenant};
use crate::{
    dynamo::{format_timestamp, now, scan_all},
    error::AppError,
};

/// Data access for the tenants table.
#[derive(Clone)]
pub struct TenantDal {
    client: Client,
    table: String,
}

impl TenantDal {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn parse_all(items: Vec<crate::dynamo::Item>) -> Result<Vec<Tenant>, AppError> {
        items.iter().map(Tenant::from_item).collect()
    }

    pub async fn get_all_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let items = scan_all(self.client.scan().table_name(&self.table)).await?;
        Self::parse_all(items)
    }

    /// Tenants whose workload is deployed or in a deployment cycle.
    pub async fn get_onboarded_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let request = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression(
                "attribute_exists(onboarding_status) \
                 AND onboarding_status IN (:updating, :updated, :deploying, :deployed)",
            )
            .expression_attribute_values(":updating", AttributeValue::S("updating".into()))
            .expression_attribute_values(":updated", AttributeValue::S("updated".into()))
            .expression_attribute_values(":deploying", AttributeValue::S("deploying".into()))
            .expression_attribute_values(":deployed", AttributeValue::S("deployed".into()));
        let tenants = Self::parse_all(scan_all(request).await?)?;
        info!(count = tenants.len(), "loaded onboarded tenants");
        Ok(tenants)
    }

    /// Tenants with infrastructure running or being created.
    pub async fn get_provisioned_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let request = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression(
                "attribute_exists(onboarding_status) \
                 AND onboarding_status <> :failed \
                 AND onboarding_status <> :deleting \
                 AND onboarding_status <> :deleted",
            )
            .expression_attribute_values(":failed", AttributeValue::S("failed".into()))
            .expression_attribute_values(":deleting", AttributeValue::S("deleting".into()))
            .expression_attribute_values(":deleted", AttributeValue::S("deleted".into()));
        let tenants = Self::parse_all(scan_all(request).await?)?;
        info!(count = tenants.len(), "loaded provisioned tenants");
        Ok(tenants)
    }

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(tenant_id.to_string()))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        output.item.as_ref().map(Tenant::from_item).transpose()
    }

    /// Store a new tenant; the id and timestamps are assigned here.
    pub async fn insert_tenant(&self, mut tenant: Tenant) -> Result<Tenant, AppError> {
        let timestamp = now();
        tenant.id = Some(Uuid::new_v4());
        tenant.created = Some(timestamp);
        tenant.modified = Some(timestamp);
        if tenant
            .onboarding_status
            .as_deref()
            .map_or(true, str::is_empty)
        {
            tenant.onboarding_status = Some("unknown".into());
        }
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(tenant.clone().into_item()?))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        info!(tenant_id = ?tenant.id, "inserted tenant");
        Ok(tenant)
    }

    /// Replace the stored tenant with `tenant`, stamping `modified`.
    pub async fn update_tenant(&self, mut tenant: Tenant) -> Result<Tenant, AppError> {
        tenant.modified = Some(now());
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(tenant.clone().into_item()?))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        Ok(tenant)
    }

    async fn update_attributes(
        &self,
        tenant_id: Uuid,
        update_expression: String,
        names: HashMap<String, String>,
        mut values: HashMap<String, AttributeValue>,
    ) -> Result<Tenant, AppError> {
        values.insert(":modified".into(), AttributeValue::S(format_timestamp(&now())));
        let output = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(tenant_id.to_string()))
            .update_expression(update_expression)
            .set_expression_attribute_names((!names.is_empty()).then_some(names))
            .set_expression_attribute_values(Some(values))
            .condition_expression("attribute_exists(id)")
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    AppError::NotFound(format!("No tenant with id {tenant_id}"))
                } else {
                    AppError::Dynamo(e.to_string())
                }
            })?;
        let attributes = output
            .attributes
            .ok_or_else(|| AppError::Dynamo("update returned no attributes".into()))?;
        Tenant::from_item(&attributes)
    }

    pub async fn update_tenant_onboarding_status(
        &self,
        tenant_id: Uuid,
        status: &str,
    ) -> Result<Tenant, AppError> {
        self.update_attributes(
            tenant_id,
            "SET onboarding_status = :status, modified = :modified".into(),
            HashMap::new(),
            [(":status".to_string(), AttributeValue::S(status.to_string()))]
                .into_iter()
                .collect(),
        )
        .await
    }

    pub async fn update_tenant_hostname(
        &self,
        tenant_id: Uuid,
        hostname: &str,
    ) -> Result<Tenant, AppError> {
        self.update_attributes(
            tenant_id,
            "SET hostname = :hostname, modified = :modified".into(),
            HashMap::new(),
            [(":hostname".to_string(), AttributeValue::S(hostname.to_string()))]
                .into_iter()
                .collect(),
        )
        .await
    }

    /// Set individual entries of the `resources` map, leaving others untouched.
    pub async fn update_tenant_resources(
        &self,
        tenant_id: Uuid,
        resources: HashMap<String, Resource>,
    ) -> Result<Tenant, AppError> {
        let mut expression = String::from("SET modified = :modified");
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (index, (key, resource)) in resources.into_iter().enumerate() {
            expression.push_str(&format!(", resources.#r{index} = :r{index}"));
            names.insert(format!("#r{index}"), key);
            values.insert(format!(":r{index}"), resource.into_attribute());
        }
        self.update_attributes(tenant_id, expression, names, values)
            .await
    }

    async fn set_active(&self, tenant_id: Uuid, active: bool) -> Result<Tenant, AppError> {
        self.update_attributes(
            tenant_id,
            "SET active = :active, modified = :modified".into(),
            HashMap::new(),
            [(":active".to_string(), AttributeValue::Bool(active))]
                .into_iter()
                .collect(),
        )
        .await
    }

    pub async fn enable_tenant(&self, tenant_id: Uuid) -> Result<Tenant, AppError> {
        self.set_active(tenant_id, true).await
    }

    pub async fn disable_tenant(&self, tenant_id: Uuid) -> Result<Tenant, AppError> {
        self.set_active(tenant_id, false).await
    }

    pub async fn delete_tenant(&self, tenant_id: Uuid) -> Result<(), AppError> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(tenant_id.to_string()))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        info!(%tenant_id, "deleted tenant");
        Ok(())
    }
}
