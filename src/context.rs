//! Application-scoped context shared across request and event handlers.

use aws_config::SdkConfig;

use crate::{
    appconfig::AppConfigStore, config::ControlPlaneConfig, events::EventPublisher,
    onboarding::OnboardingDal, settings::ParameterStore, tenant::TenantDal,
};

/// Holds the shared AWS clients and resolved configuration.
#[derive(Clone)]
pub struct AppContext {
    dynamo: aws_sdk_dynamodb::Client,
    ssm: aws_sdk_ssm::Client,
    s3: aws_sdk_s3::Client,
    sqs: aws_sdk_sqs::Client,
    cloudwatch: aws_sdk_cloudwatch::Client,
    athena: aws_sdk_athena::Client,
    autoscaling: aws_sdk_applicationautoscaling::Client,
    events: EventPublisher,
    config: ControlPlaneConfig,
}

impl AppContext {
    /// Build every client from one shared SDK configuration.
    pub fn new(sdk_config: &SdkConfig, config: ControlPlaneConfig) -> Self {
        let events = EventPublisher::new(
            aws_sdk_eventbridge::Client::new(sdk_config),
            config.event_bus.clone(),
        );
        Self {
            dynamo: aws_sdk_dynamodb::Client::new(sdk_config),
            ssm: aws_sdk_ssm::Client::new(sdk_config),
            s3: aws_sdk_s3::Client::new(sdk_config),
            sqs: aws_sdk_sqs::Client::new(sdk_config),
            cloudwatch: aws_sdk_cloudwatch::Client::new(sdk_config),
            athena: aws_sdk_athena::Client::new(sdk_config),
            autoscaling: aws_sdk_applicationautoscaling::Client::new(sdk_config),
            events,
            config,
        }
    }

    /// Replace the event publisher (tests record events instead of sending them).
    pub fn with_event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// Borrow the underlying DynamoDB client.
    pub fn dynamo(&self) -> &aws_sdk_dynamodb::Client {
        &self.dynamo
    }

    pub fn s3(&self) -> &aws_sdk_s3::Client {
        &self.s3
    }

    pub fn sqs(&self) -> &aws_sdk_sqs::Client {
        &self.sqs
    }

    pub fn cloudwatch(&self) -> &aws_sdk_cloudwatch::Client {
        &self.cloudwatch
    }

    pub fn athena(&self) -> &aws_sdk_athena::Client {
        &self.athena
    }

    pub fn autoscaling(&self) -> &aws_sdk_applicationautoscaling::Client {
        &self.autoscaling
    }

    /// Parameter Store facade rooted at this environment's prefix.
    pub fn parameter_store(&self) -> ParameterStore {
        ParameterStore::new(self.ssm.clone(), self.config.parameter_prefix.clone())
    }

    /// App config persisted under the `app/` settings.
    pub fn app_config_store(&self) -> AppConfigStore {
        AppConfigStore::new(self.parameter_store())
    }

    pub fn tenants(&self) -> TenantDal {
        TenantDal::new(self.dynamo.clone(), self.config.tenants_table.clone())
    }

    pub fn onboarding(&self) -> OnboardingDal {
        OnboardingDal::new(
            self.dynamo.clone(),
            self.config.onboarding_table.clone(),
            self.config.cidr_table.clone(),
        )
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    /// Tenant table name.
    pub fn tenants_table(&self) -> &str {
        &self.config.tenants_table
    }

    /// Onboarding table name.
    pub fn onboarding_table(&self) -> &str {
        &self.config.onboarding_table
    }

    pub fn cidr_table(&self) -> &str {
        &self.config.cidr_table
    }

    pub fn options_table(&self) -> &str {
        &self.config.options_table
    }
}
