use std::{collections::HashMap, fmt, str::FromStr};

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
    tenant::AdminUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    Created,
    Validating,
    Validated,
    Provisioning,
    Provisioned,
    Updating,
    Updated,
    Deploying,
    Deployed,
    Failed,
    Deleting,
    Deleted,
}

impl OnboardingStatus {
    const ALL: [OnboardingStatus; 12] = [
        OnboardingStatus::Created,
        OnboardingStatus::Validating,
        OnboardingStatus::Validated,
        OnboardingStatus::Provisioning,
        OnboardingStatus::Provisioned,
        OnboardingStatus::Updating,
        OnboardingStatus::Updated,
        OnboardingStatus::Deploying,
        OnboardingStatus::Deployed,
        OnboardingStatus::Failed,
        OnboardingStatus::Deleting,
        OnboardingStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStatus::Created => "created",
            OnboardingStatus::Validating => "validating",
            OnboardingStatus::Validated => "validated",
            OnboardingStatus::Provisioning => "provisioning",
            OnboardingStatus::Provisioned => "provisioned",
            OnboardingStatus::Updating => "updating",
            OnboardingStatus::Updated => "updated",
            OnboardingStatus::Deploying => "deploying",
            OnboardingStatus::Deployed => "deployed",
            OnboardingStatus::Failed => "failed",
            OnboardingStatus::Deleting => "deleting",
            OnboardingStatus::Deleted => "deleted",
        }
    }

    /// Map a CloudFormation stack status onto the onboarding lifecycle.
    pub fn from_stack_status(stack_status: &str) -> Option<Self> {
        let status = match stack_status {
            "REVIEW_IN_PROGRESS" | "CREATE_IN_PROGRESS" => OnboardingStatus::Provisioning,
            "UPDATE_IN_PROGRESS" => OnboardingStatus::Updating,
            "DELETE_IN_PROGRESS" => OnboardingStatus::Deleting,
            "CREATE_COMPLETE" => OnboardingStatus::Provisioned,
            "UPDATE_COMPLETE" => OnboardingStatus::Updated,
            "DELETE_COMPLETE" => OnboardingStatus::Deleted,
            "CREATE_FAILED" | "UPDATE_FAILED" | "DELETE_FAILED" | "UPDATE_ROLLBACK_FAILED"
            | "ROLLBACK_IN_PROGRESS" | "ROLLBACK_COMPLETE" | "ROLLBACK_FAILED" => {
                OnboardingStatus::Failed
            }
            other if other.trim().is_empty() => return None,
            _ => OnboardingStatus::Created,
        };
        Some(status)
    }
}

impl fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("Unknown onboarding status {value}")))
    }
}

/// One CloudFormation stack created for the tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStack {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub base_stack: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub pipeline_status: Option<String>,
}

impl OnboardingStack {
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("CREATE_COMPLETE") | Some("UPDATE_COMPLETE")
        )
    }

    /// Base stacks are deployed once complete; app stacks also need a successful pipeline run.
    pub fn is_deployed(&self) -> bool {
        if self.base_stack {
            self.is_complete()
        } else {
            self.is_complete() && self.pipeline_status.as_deref() == Some("SUCCEEDED")
        }
    }

    fn into_attribute(self) -> AttributeValue {
        let mut item = Item::new();
        put_string(&mut item, "name", self.name.as_deref());
        put_string(&mut item, "arn", self.arn.as_deref());
        item.insert("baseStack".into(), AttributeValue::Bool(self.base_stack));
        put_string(&mut item, "status", self.status.as_deref());
        put_string(&mut item, "pipeline", self.pipeline.as_deref());
        put_string(&mut item, "pipelineStatus", self.pipeline_status.as_deref());
        AttributeValue::M(item)
    }

    fn from_attribute(value: &AttributeValue) -> Option<Self> {
        let map = value.as_m().ok()?;
        Some(Self {
            name: get_string(map, "name"),
            arn: get_string(map, "arn"),
            base_stack: get_bool(map, "baseStack").unwrap_or(false),
            status: get_string(map, "status"),
            pipeline: get_string(map, "pipeline"),
            pipeline_status: get_string(map, "pipelineStatus"),
        })
    }
}

/// What the administrator asked for when onboarding the tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub billing_plan: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub admin_users: Vec<AdminUser>,
}

fn default_tier() -> String {
    "default".to_string()
}

impl Default for OnboardingRequest {
    fn default() -> Self {
        Self {
            name: None,
            tier: default_tier(),
            subdomain: None,
            billing_plan: None,
            attributes: HashMap::new(),
            admin_users: Vec::new(),
        }
    }
}

impl OnboardingRequest {
    fn into_attribute(self) -> AttributeValue {
        let mut item = Item::new();
        put_string(&mut item, "name", self.name.as_deref());
        put_string(&mut item, "tier", Some(self.tier.as_str()));
        put_string(&mut item, "subdomain", self.subdomain.as_deref());
        put_string(&mut item, "billing_plan", self.billing_plan.as_deref());
        if !self.attributes.is_empty() {
            item.insert("attributes".into(), string_map(&self.attributes));
        }
        if !self.admin_users.is_empty() {
            let users = self
                .admin_users
                .into_iter()
                .map(|user| {
                    let mut map = Item::new();
                    put_string(&mut map, "username", user.username.as_deref());
                    put_string(&mut map, "email", user.email.as_deref());
                    put_string(&mut map, "phone_number", user.phone_number.as_deref());
                    put_string(&mut map, "given_name", user.given_name.as_deref());
                    put_string(&mut map, "family_name", user.family_name.as_deref());
                    AttributeValue::M(map)
                })
                .collect();
            item.insert("admin_users".into(), AttributeValue::L(users));
        }
        AttributeValue::M(item)
    }

    fn from_map(map: &Item) -> Self {
        Self {
            name: get_string(map, "name"),
            tier: get_string(map, "tier").unwrap_or_else(default_tier),
            subdomain: get_string(map, "subdomain"),
            billing_plan: get_string(map, "billing_plan"),
            attributes: get_map(map, "attributes")
                .map(read_string_map)
                .unwrap_or_default(),
            admin_users: get_list(map, "admin_users")
                .iter()
                .filter_map(|value| value.as_m().ok())
                .map(|user| AdminUser {
                    username: get_string(user, "username"),
                    email: get_string(user, "email"),
                    phone_number: get_string(user, "phone_number"),
                    given_name: get_string(user, "given_name"),
                    family_name: get_string(user, "family_name"),
                })
                .collect(),
        }
    }
}

/// Provisioning state of one tenant onboarding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created: Option<NaiveDateTime>,
    #[serde(default)]
    pub modified: Option<NaiveDateTime>,
    #[serde(default)]
    pub status: Option<OnboardingStatus>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub request: Option<OnboardingRequest>,
    #[serde(default)]
    pub stacks: Vec<OnboardingStack>,
    #[serde(default)]
    pub zip_file: Option<String>,
    #[serde(default)]
    pub ecs_cluster_locked: bool,
}

impl Onboarding {
    pub fn new(request: OnboardingRequest) -> Self {
        Self {
            request: Some(request),
            ..Default::default()
        }
    }

    pub fn stacks_complete(&self) -> bool {
        !self.stacks.is_empty() && self.stacks.iter().all(OnboardingStack::is_complete)
    }

    pub fn base_stacks_complete(&self) -> bool {
        let mut base = self.stacks.iter().filter(|stack| stack.base_stack).peekable();
        base.peek().is_some() && base.all(OnboardingStack::is_complete)
    }

    pub fn has_app_stacks(&self) -> bool {
        self.stacks.iter().any(|stack| !stack.base_stack)
    }

    pub fn app_stacks_deleted(&self) -> bool {
        self.stacks
            .iter()
            .filter(|stack| !stack.base_stack)
            .all(|stack| stack.status.as_deref() == Some("DELETE_COMPLETE"))
    }

    pub fn add_stack(&mut self, stack: OnboardingStack) {
        self.stacks.push(stack);
    }

    /// Replace the stack with the same name, or append it.
    pub fn update_stack(&mut self, stack: OnboardingStack) {
        match self.stacks.iter_mut().find(|existing| existing.name == stack.name) {
            Some(existing) => *existing = stack,
            None => self.stacks.push(stack),
        }
    }

    pub fn into_item(self) -> Result<Item, AppError> {
        let id = self
            .id
            .ok_or_else(|| AppError::Validation("onboarding id is required".into()))?;
        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S(id.to_string()));
        if let Some(created) = &self.created {
            item.insert("created".into(), AttributeValue::S(format_timestamp(created)));
        }
        if let Some(modified) = &self.modified {
            item.insert("modified".into(), AttributeValue::S(format_timestamp(modified)));
        }
        if let Some(status) = self.status {
            item.insert("status".into(), AttributeValue::S(status.to_string()));
        }
        if let Some(tenant_id) = self.tenant_id {
            item.insert("tenant_id".into(), AttributeValue::S(tenant_id.to_string()));
        }
        put_string(&mut item, "zip_file", self.zip_file.as_deref());
        if let Some(request) = self.request {
            item.insert("request".into(), request.into_attribute());
        }
        if !self.stacks.is_empty() {
            item.insert(
                "stacks".into(),
                AttributeValue::L(
                    self.stacks
                        .into_iter()
                        .map(OnboardingStack::into_attribute)
                        .collect(),
                ),
            );
        }
        item.insert(
            "ecs_cluster_locked".into(),
            AttributeValue::Bool(self.ecs_cluster_locked),
        );
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, AppError> {
        let raw_id = require_string(item, "id")?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|_| AppError::Dynamo(format!("invalid onboarding id `{raw_id}`")))?;
        let tenant_id = get_string(item, "tenant_id")
            .map(|raw| {
                Uuid::parse_str(&raw)
                    .map_err(|_| AppError::Dynamo(format!("invalid tenant id `{raw}`")))
            })
            .transpose()?;
        Ok(Self {
            id: Some(id),
            created: get_timestamp(item, "created")?,
            modified: get_timestamp(item, "modified")?,
            status: get_string(item, "status")
                .map(|raw| raw.parse())
                .transpose()
                .map_err(|e: AppError| AppError::Dynamo(e.to_string()))?,
            tenant_id,
            request: get_map(item, "request").map(OnboardingRequest::from_map),
            stacks: get_list(item, "stacks")
                .iter()
                .filter_map(OnboardingStack::from_attribute)
                .collect(),
            zip_file: get_string(item, "zip_file"),
            ecs_cluster_locked: get_bool(item, "ecs_cluster_locked").unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamo::now;

    fn stack(name: &str, base: bool, status: &str, pipeline_status: Option<&str>) -> OnboardingStack {
        OnboardingStack {
            name: Some(name.into()),
            base_stack: base,
            status: Some(status.into()),
            pipeline_status: pipeline_status.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn stack_statuses_map_to_onboarding_statuses() {
        use OnboardingStatus::*;
        let cases = [
            ("REVIEW_IN_PROGRESS", Some(Provisioning)),
            ("CREATE_IN_PROGRESS", Some(Provisioning)),
            ("UPDATE_IN_PROGRESS", Some(Updating)),
            ("DELETE_IN_PROGRESS", Some(Deleting)),
            ("CREATE_COMPLETE", Some(Provisioned)),
            ("UPDATE_COMPLETE", Some(Updated)),
            ("DELETE_COMPLETE", Some(Deleted)),
            ("UPDATE_ROLLBACK_FAILED", Some(Failed)),
            ("ROLLBACK_COMPLETE", Some(Failed)),
            ("IMPORT_IN_PROGRESS", Some(Created)),
            ("", None),
        ];
        for (stack_status, expected) in cases {
            assert_eq!(
                OnboardingStatus::from_stack_status(stack_status),
                expected,
                "{stack_status}"
            );
        }
    }

    #[test]
    fn statuses_parse_and_display() {
        assert_eq!("deployed".parse::<OnboardingStatus>().unwrap(), OnboardingStatus::Deployed);
        assert!("DEPLOYED".parse::<OnboardingStatus>().is_err());
        assert_eq!(OnboardingStatus::Provisioning.to_string(), "provisioning");
    }

    #[test]
    fn stack_deployment_rules() {
        assert!(stack("base", true, "UPDATE_COMPLETE", None).is_deployed());
        assert!(!stack("app", false, "CREATE_COMPLETE", None).is_deployed());
        assert!(stack("app", false, "CREATE_COMPLETE", Some("SUCCEEDED")).is_deployed());
        assert!(!stack("app", false, "CREATE_IN_PROGRESS", Some("SUCCEEDED")).is_deployed());
    }

    #[test]
    fn onboarding_stack_flags() {
        let mut onboarding = Onboarding::default();
        assert!(!onboarding.stacks_complete());
        assert!(!onboarding.base_stacks_complete());
        assert!(onboarding.app_stacks_deleted());

        onboarding.add_stack(stack("base", true, "CREATE_COMPLETE", None));
        assert!(onboarding.base_stacks_complete());
        assert!(!onboarding.has_app_stacks());

        onboarding.add_stack(stack("web", false, "CREATE_IN_PROGRESS", None));
        assert!(onboarding.has_app_stacks());
        assert!(!onboarding.stacks_complete());
        assert!(!onboarding.app_stacks_deleted());

        onboarding.update_stack(stack("web", false, "DELETE_COMPLETE", None));
        assert_eq!(onboarding.stacks.len(), 2);
        assert!(onboarding.app_stacks_deleted());
    }

    #[test]
    fn item_round_trip() {
        let mut onboarding = Onboarding::new(OnboardingRequest {
            name: Some("Acme".into()),
            subdomain: Some("acme".into()),
            attributes: [("k".to_string(), "v".to_string())].into_iter().collect(),
            admin_users: vec![AdminUser {
                username: Some("admin".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        onboarding.id = Some(Uuid::new_v4());
        onboarding.tenant_id = Some(Uuid::new_v4());
        onboarding.status = Some(OnboardingStatus::Provisioning);
        onboarding.created = Some(now());
        onboarding.add_stack(stack("base", true, "CREATE_IN_PROGRESS", None));

        let item = onboarding.clone().into_item().expect("item");
        assert_eq!(item["status"].as_s().unwrap(), "provisioning");
        assert!(item.contains_key("tenant_id"));
        let restored = Onboarding::from_item(&item).expect("onboarding");
        assert_eq!(restored, onboarding);
    }

    #[test]
    fn request_tier_defaults() {
        let request: OnboardingRequest = serde_json::from_str(r#"{"name":"Acme"}"#).unwrap();
        assert_eq!(request.tier, "default");
    }
}
