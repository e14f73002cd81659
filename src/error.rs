use lambda_http::Error as LambdaError;
use thiserror::Error;
use tracing::error;

/// Internal application errors surfaced during request and event handling.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("dynamodb error: {0}")]
    Dynamo(String),
    #[error("parameter store error: {0}")]
    Ssm(String),
    #[error("eventbridge error: {0}")]
    EventBridge(String),
    #[error("s3 error: {0}")]
    S3(String),
    #[error("cloudwatch error: {0}")]
    CloudWatch(String),
    #[error("athena error: {0}")]
    Athena(String),
    #[error("application auto scaling error: {0}")]
    AutoScaling(String),
    #[error("sqs error: {0}")]
    Sqs(String),
    #[error("keycloak error: {0}")]
    Keycloak(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Short classification string used for logging.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Dynamo(_) => "dynamodb",
            AppError::Ssm(_) => "ssm",
            AppError::EventBridge(_) => "eventbridge",
            AppError::S3(_) => "s3",
            AppError::CloudWatch(_) => "cloudwatch",
            AppError::Athena(_) => "athena",
            AppError::AutoScaling(_) => "autoscaling",
            AppError::Sqs(_) => "sqs",
            AppError::Keycloak(_) => "keycloak",
            AppError::Config(_) => "config",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Serialization(_) => "serialization",
        }
    }

    /// Whether the error was caused by the caller rather than a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::NotFound(_))
    }
}

/// Convert an internal application error into the Lambda runtime error type.
pub fn lambda_error(err: AppError) -> LambdaError {
    let category = err.category();
    let message = err.to_string();
    error!(category = %category, error = ?err, message = %message, "unhandled application error forwarded to Lambda runtime");
    LambdaError::from(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(AppError::Validation("bad".into()).is_client_error());
        assert!(AppError::NotFound("gone".into()).is_client_error());
        assert!(!AppError::Dynamo("boom".into()).is_client_error());
        assert_eq!(AppError::Ssm("x".into()).category(), "ssm");
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = AppError::Validation("Tenant name is required.".into());
        assert_eq!(err.to_string(), "Tenant name is required.");
    }
}
