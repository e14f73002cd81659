//! Application topology: model, persistence in the parameter store, change
//! detection, console options, and the update flows built on top of them.

pub mod helper;
mod listener;
mod model;
mod options;
pub mod service;
mod store;

pub use listener::{handle_app_config_event, merge_resource_changes};
pub use model::{
    AppConfig, BillingProvider, Compute, ComputeTier, Database, DatabaseTierConfig, EcsCompute,
    EfsFilesystem, EfsLifecycle, Filesystem, FsxFilesystem, OperatingSystem, RdsEngine,
    S3Storage, ServiceConfig,
};
pub use options::{db_options, os_options, RdsEngineOptions};
pub use store::{
    app_config_from_settings, app_config_to_settings, service_config_to_settings, AppConfigStore,
    ENCRYPTED_PLACEHOLDER,
};
