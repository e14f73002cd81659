pub mod runtime_env;

pub mod appconfig;
pub mod bootstrap;
pub mod config;
mod context;
pub mod dynamo;
mod error;
pub mod events;
mod handlers;
pub mod keycloak;
pub mod listeners;
pub mod metrics;
pub mod onboarding;
pub mod settings;
pub mod tenant;

pub use context::AppContext;
pub use error::{lambda_error, AppError};
pub use handlers::handle_request;
