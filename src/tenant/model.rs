use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dynamo::{
        format_timestamp, get_bool, get_list, get_map, get_string, get_timestamp, put_string,
        read_string_map, require_string, string_map, Item,
    },
    error::AppError,
};

/// Onboarding statuses for which a tenant no longer has live infrastructure.
const NOT_PROVISIONED: [&str; 3] = ["failed", "deleting", "deleted"];

/// A tenant of the hosted application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub modified: Option<NaiveDateTime>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub onboarding_status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub billing_plan: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub resources: HashMap<String, Resource>,
    #[serde(default)]
    pub admin_users: Vec<AdminUser>,
}

fn default_active() -> bool {
    true
}

impl Default for Tenant {
    fn default() -> Self {
        Self {
            id: None,
            created: None,
            modified: None,
            active: true,
            tier: None,
            onboarding_status: None,
            name: None,
            subdomain: None,
            hostname: None,
            billing_plan: None,
            attributes: HashMap::new(),
            resources: HashMap::new(),
            admin_users: Vec::new(),
        }
    }
}

/// An AWS resource belonging to the tenant's environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub console_url: String,
}

impl Resource {
    pub fn into_attribute(self) -> AttributeValue {
        AttributeValue::M(
            [
                ("name".to_string(), AttributeValue::S(self.name)),
                ("arn".to_string(), AttributeValue::S(self.arn)),
                ("consoleUrl".to_string(), AttributeValue::S(self.console_url)),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        let map = value.as_m().ok()?;
        Some(Self {
            name: get_string(map, "name").unwrap_or_default(),
            arn: get_string(map, "arn").unwrap_or_default(),
            console_url: get_string(map, "consoleUrl").unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl AdminUser {
    fn into_attribute(self) -> AttributeValue {
        let mut item = Item::new();
        put_string(&mut item, "username", self.username.as_deref());
        put_string(&mut item, "email", self.email.as_deref());
        put_string(&mut item, "phone_number", self.phone_number.as_deref());
        put_string(&mut item, "given_name", self.given_name.as_deref());
        put_string(&mut item, "family_name", self.family_name.as_deref());
        AttributeValue::M(item)
    }

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        let map = value.as_m().ok()?;
        Some(Self {
            username: get_string(map, "username"),
            email: get_string(map, "email"),
            phone_number: get_string(map, "phone_number"),
            given_name: get_string(map, "given_name"),
            family_name: get_string(map, "family_name"),
        })
    }
}

impl Tenant {
    /// Whether the tenant has, or is getting, live infrastructure.
    pub fn is_provisioned(&self) -> bool {
        self.onboarding_status
            .as_deref()
            .map_or(false, |status| !NOT_PROVISIONED.contains(&status))
    }

    /// Convert the tenant into a DynamoDB attribute map.
    pub fn into_item(self) -> Result<Item, AppError> {
        let id = self
            .id
            .ok_or_else(|| AppError::Validation("tenant id is required".into()))?;
        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S(id.to_string()));
        if let Some(created) = &self.created {
            item.insert("created".into(), AttributeValue::S(format_timestamp(created)));
        }
        if let Some(modified) = &self.modified {
            item.insert("modified".into(), AttributeValue::S(format_timestamp(modified)));
        }
        item.insert("active".into(), AttributeValue::Bool(self.active));
        put_string(&mut item, "onboarding_status", self.onboarding_status.as_deref());
        put_string(&mut item, "name", self.name.as_deref());
        put_string(&mut item, "hostname", self.hostname.as_deref());
        put_string(&mut item, "subdomain", self.subdomain.as_deref());
        put_string(&mut item, "tier", self.tier.as_deref());
        put_string(&mut item, "billing_plan", self.billing_plan.as_deref());
        item.insert("attributes".into(), string_map(&self.attributes));
        item.insert(
            "resources".into(),
            AttributeValue::M(
                self.resources
                    .into_iter()
                    .map(|(key, resource)| (key, resource.into_attribute()))
                    .collect(),
            ),
        );
        item.insert(
            "admin_users".into(),
            AttributeValue::L(
                self.admin_users
                    .into_iter()
                    .map(AdminUser::into_attribute)
                    .collect(),
            ),
        );
        Ok(item)
    }

    /// Rehydrate a tenant from a DynamoDB attribute map.
    pub fn from_item(item: &Item) -> Result<Self, AppError> {
        let raw_id = require_string(item, "id")?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|_| AppError::Dynamo(format!("invalid tenant id `{raw_id}`")))?;
        Ok(Self {
            id: Some(id),
            created: get_timestamp(item, "created")?,
            modified: get_timestamp(item, "modified")?,
            active: get_bool(item, "active").unwrap_or(true),
            tier: get_string(item, "tier"),
            onboarding_status: get_string(item, "onboarding_status"),
            name: get_string(item, "name"),
            subdomain: get_string(item, "subdomain"),
            hostname: get_string(item, "hostname"),
            billing_plan: get_string(item, "billing_plan"),
            attributes: get_map(item, "attributes")
                .map(read_string_map)
                .unwrap_or_default(),
            resources: get_map(item, "resources")
                .map(|resources| {
                    resources
                        .iter()
                        .filter_map(|(key, value)| {
                            Resource::from_attribute(value).map(|r| (key.clone(), r))
                        })
                        .collect()
                })
                .unwrap_or_default(),
            admin_users: get_list(item, "admin_users")
                .iter()
                .filter_map(AdminUser::from_attribute)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamo::now;

    fn sample() -> Tenant {
        Tenant {
            id: Some(Uuid::new_v4()),
            created: Some(now()),
            modified: Some(now()),
            name: Some("Acme".into()),
            subdomain: Some("acme".into()),
            tier: Some("default".into()),
            onboarding_status: Some("deployed".into()),
            billing_plan: Some("gold".into()),
            attributes: [("region".to_string(), "eu".to_string())].into_iter().collect(),
            resources: [(
                "ECS_CLUSTER".to_string(),
                Resource {
                    name: "tenant-1234".into(),
                    arn: "arn:aws:ecs:::cluster/tenant-1234".into(),
                    console_url: "https://console".into(),
                },
            )]
            .into_iter()
            .collect(),
            admin_users: vec![AdminUser {
                username: Some("admin".into()),
                email: Some("admin@acme.test".into()),
                given_name: Some("Ada".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn item_round_trip_uses_snake_case_attributes() {
        let tenant = sample();
        let item = tenant.clone().into_item().expect("item");
        assert!(item.contains_key("onboarding_status"));
        assert!(item.contains_key("billing_plan"));
        let admin = item["admin_users"].as_l().expect("list")[0]
            .as_m()
            .expect("map");
        assert!(admin.contains_key("given_name"));
        assert!(!admin.contains_key("phone_number"));

        let restored = Tenant::from_item(&item).expect("tenant");
        assert_eq!(restored, tenant);
    }

    #[test]
    fn provisioned_excludes_failed_and_deleted() {
        let mut tenant = sample();
        assert!(tenant.is_provisioned());
        for status in ["failed", "deleting", "deleted"] {
            tenant.onboarding_status = Some(status.into());
            assert!(!tenant.is_provisioned(), "{status}");
        }
        tenant.onboarding_status = None;
        assert!(!tenant.is_provisioned());
    }

    #[test]
    fn json_defaults_to_active() {
        let tenant: Tenant = serde_json::from_str(r#"{"name":"Acme"}"#).expect("json");
        assert!(tenant.active);
        assert!(tenant.into_item().is_err());
    }
}
