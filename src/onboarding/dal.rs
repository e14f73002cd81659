use aws_sdk_dynamodb::{
    types::{AttributeValue, ReturnValue},
    Client,
};
use rand::seq::SliceRandom;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{Onboarding, OnboardingStatus};
use crate::{
    dynamo::{format_timestamp, get_string, now, scan_all, Item},
    error::AppError,
};

/// Data access for onboarding records and the tenant CIDR block pool.
#[derive(Clone)]
pub struct OnboardingDal {
    client: Client,
    table: String,
    cidr_table: String,
}

impl OnboardingDal {
    pub fn new(client: Client, table: impl Into<String>, cidr_table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            cidr_table: cidr_table.into(),
        }
    }

    pub async fn get_onboardings(&self) -> Result<Vec<Onboarding>, AppError> {
        let items = scan_all(self.client.scan().table_name(&self.table)).await?;
        items.iter().map(Onboarding::from_item).collect()
    }

    pub async fn get_onboarding(&self, id: Uuid) -> Result<Option<Onboarding>, AppError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        output.item.as_ref().map(Onboarding::from_item).transpose()
    }

    /// Look up by tenant id. Short ids (as embedded in resource names) match by prefix.
    pub async fn get_onboarding_by_tenant_id(
        &self,
        tenant_id: &str,
    ) -> Result<Option<Onboarding>, AppError> {
        let filter = if tenant_id.len() < 36 {
            "begins_with(tenant_id, :tenantId)"
        } else {
            "tenant_id = :tenantId"
        };
        let request = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression(filter)
            .expression_attribute_values(":tenantId", AttributeValue::S(tenant_id.to_string()));
        let items = scan_all(request).await?;
        match items.as_slice() {
            [item] => Onboarding::from_item(item).map(Some),
            [] => Ok(None),
            _ => {
                warn!(%tenant_id, matches = items.len(), "tenant id matches more than one onboarding");
                Ok(None)
            }
        }
    }

    /// Store a new onboarding record; ids and timestamps are assigned here.
    pub async fn insert_onboarding(&self, mut onboarding: Onboarding) -> Result<Onboarding, AppError> {
        if onboarding.id.is_some() {
            return Err(AppError::Validation(
                "Can't insert a new onboarding record that already has an id".into(),
            ));
        }
        let timestamp = now();
        onboarding.id = Some(Uuid::new_v4());
        onboarding.created = Some(timestamp);
        onboarding.modified = Some(timestamp);
        onboarding.status = Some(OnboardingStatus::Created);
        self.put(&onboarding).await?;
        info!(onboarding_id = ?onboarding.id, "inserted onboarding");
        Ok(onboarding)
    }

    pub async fn update_onboarding(&self, mut onboarding: Onboarding) -> Result<Onboarding, AppError> {
        onboarding.modified = Some(now());
        self.put(&onboarding).await?;
        Ok(onboarding)
    }

    async fn put(&self, onboarding: &Onboarding) -> Result<(), AppError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(onboarding.clone().into_item()?))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        Ok(())
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: OnboardingStatus,
    ) -> Result<Onboarding, AppError> {
        let output = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("SET #status = :status, modified = :modified")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", AttributeValue::S(status.to_string()))
            .expression_attribute_values(":modified", AttributeValue::S(format_timestamp(&now())))
            .condition_expression("attribute_exists(id)")
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false)
                {
                    AppError::NotFound(format!("No onboarding record for id {id}"))
                } else {
                    AppError::Dynamo(e.to_string())
                }
            })?;
        let attributes = output
            .attributes
            .ok_or_else(|| AppError::Dynamo("update returned no attributes".into()))?;
        Onboarding::from_item(&attributes)
    }

    pub async fn delete_onboarding(&self, id: Uuid) -> Result<(), AppError> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        info!(onboarding_id = %id, "deleted onboarding");
        Ok(())
    }

    pub async fn get_cidr_block(&self, tenant_id: Uuid) -> Result<Option<String>, AppError> {
        let request = self
            .client
            .scan()
            .table_name(&self.cidr_table)
            .filter_expression("tenant_id = :tenantId")
            .expression_attribute_values(":tenantId", AttributeValue::S(tenant_id.to_string()));
        let items = scan_all(request).await?;
        Ok(items.iter().find_map(|item| get_string(item, "cidr_block")))
    }

    /// Every CIDR block not yet claimed by a tenant.
    pub async fn available_cidr_blocks(&self) -> Result<Vec<String>, AppError> {
        let request = self
            .client
            .scan()
            .table_name(&self.cidr_table)
            .filter_expression("attribute_not_exists(tenant_id)");
        let items = scan_all(request).await?;
        Ok(items
            .iter()
            .filter_map(|item| get_string(item, "cidr_block"))
            .collect())
    }

    pub async fn available_cidr_block(&self) -> Result<bool, AppError> {
        Ok(!self.available_cidr_blocks().await?.is_empty())
    }

    /// Claim a random free block for `tenant_id`.
    pub async fn assign_cidr_block(&self, tenant_id: Uuid) -> Result<String, AppError> {
        if let Some(existing) = self.get_cidr_block(tenant_id).await? {
            return Err(AppError::Validation(format!(
                "Tenant {tenant_id} is already assigned CIDR block {existing}"
            )));
        }
        let available = self.available_cidr_blocks().await?;
        let cidr_block = available
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| AppError::Validation("No remaining CIDR blocks".into()))?;
        let output = self
            .client
            .update_item()
            .table_name(&self.cidr_table)
            .key("cidr_block", AttributeValue::S(cidr_block.clone()))
            .update_expression("SET tenant_id = :tenantId")
            .condition_expression("attribute_not_exists(tenant_id)")
            .expression_attribute_values(":tenantId", AttributeValue::S(tenant_id.to_string()))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| AppError::Dynamo(e.to_string()))?;
        let claimed: Item = output.attributes.unwrap_or_default();
        info!(%tenant_id, %cidr_block, "assigned CIDR block");
        Ok(get_string(&claimed, "cidr_block").unwrap_or(cidr_block))
    }
}
