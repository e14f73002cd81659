use std::{borrow::Cow, env, fmt};

const ENVIRONMENT_NAME_ENV: &str = "ENVIRONMENT_NAME";
const SAAS_BOOST_ENV: &str = "SAAS_BOOST_ENV";
const DEFAULT_REMOTE_ENVIRONMENT: &str = "Prod";
const DEFAULT_LOCAL_ENVIRONMENT: &str = "Local";

/// Set by `sam local`, `cargo lambda watch` and LocalStack.
const LOCAL_TOOLING_VARS: [&str; 3] = ["AWS_SAM_LOCAL", "CARGO_LAMBDA_HTTP_PORT", "LOCALSTACK_HOSTNAME"];

/// Present inside a deployed Lambda function.
const AWS_RUNTIME_VARS: [&str; 4] = [
    "AWS_EXECUTION_ENV",
    "AWS_REGION",
    "AWS_LAMBDA_FUNCTION_NAME",
    "LAMBDA_TASK_ROOT",
];

/// How the environment name was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    ExplicitVar,
    LocalTooling,
    AwsRuntime,
    DefaultLocal,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionSource::ExplicitVar => "explicit ENVIRONMENT_NAME",
            ResolutionSource::LocalTooling => "local tooling auto-detect",
            ResolutionSource::AwsRuntime => "AWS runtime auto-detect",
            ResolutionSource::DefaultLocal => "fallback to Local",
        };
        f.write_str(label)
    }
}

/// The SaaS Boost environment this process serves (Prod, Staging, Local, ...).
///
/// Resolution order:
///  1. Explicit `ENVIRONMENT_NAME` (stack parameter, CI or CLI)
///  2. Local tooling hints
///  3. AWS Lambda runtime hints
///  4. `Local`
///
/// The name seeds the default DynamoDB table names and, unless
/// `SAAS_BOOST_ENV` says otherwise, the Parameter Store hierarchy.
pub struct DeploymentEnv {
    name: Cow<'static, str>,
    source: ResolutionSource,
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
}

fn any_set(keys: &[&str]) -> bool {
    keys.iter().any(|key| env::var_os(key).is_some())
}

impl DeploymentEnv {
    pub fn detect() -> Self {
        if let Some(name) = non_blank_var(ENVIRONMENT_NAME_ENV) {
            return Self {
                name: Cow::Owned(name),
                source: ResolutionSource::ExplicitVar,
            };
        }
        let (name, source) = if any_set(&LOCAL_TOOLING_VARS) {
            (DEFAULT_LOCAL_ENVIRONMENT, ResolutionSource::LocalTooling)
        } else if any_set(&AWS_RUNTIME_VARS) {
            (DEFAULT_REMOTE_ENVIRONMENT, ResolutionSource::AwsRuntime)
        } else {
            (DEFAULT_LOCAL_ENVIRONMENT, ResolutionSource::DefaultLocal)
        };
        Self {
            name: Cow::Borrowed(name),
            source,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn source(&self) -> ResolutionSource {
        self.source
    }

    pub fn is_local(&self) -> bool {
        self.name().eq_ignore_ascii_case(DEFAULT_LOCAL_ENVIRONMENT)
    }

    fn table(&self, kind: &str) -> String {
        format!("{kind}_{}", self.name())
    }

    pub fn tenants_table(&self) -> String {
        self.table("Tenants")
    }

    pub fn onboarding_table(&self) -> String {
        self.table("Onboarding")
    }

    pub fn cidr_table(&self) -> String {
        self.table("CidrBlocks")
    }

    pub fn options_table(&self) -> String {
        self.table("Options")
    }

    /// Environment segment of the Parameter Store hierarchy.
    pub fn saas_boost_env(&self) -> String {
        non_blank_var(SAAS_BOOST_ENV).unwrap_or_else(|| self.name().to_owned())
    }

    /// Root of every setting owned by this environment, e.g. `/saas-boost/Prod/`.
    pub fn parameter_prefix(&self) -> String {
        format!("/saas-boost/{}/", self.saas_boost_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env_vars() {
        std::env::remove_var(ENVIRONMENT_NAME_ENV);
        std::env::remove_var(SAAS_BOOST_ENV);
        for key in LOCAL_TOOLING_VARS.iter().chain(AWS_RUNTIME_VARS.iter()) {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn explicit_override_wins() {
        clear_env_vars();
        std::env::set_var("ENVIRONMENT_NAME", "Staging");
        std::env::set_var("AWS_SAM_LOCAL", "1");
        let env = DeploymentEnv::detect();
        assert_eq!(env.name(), "Staging");
        assert_eq!(env.tenants_table(), "Tenants_Staging");
        assert_eq!(env.parameter_prefix(), "/saas-boost/Staging/");
        assert_eq!(env.source(), ResolutionSource::ExplicitVar);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn local_tooling_is_local() {
        clear_env_vars();
        std::env::set_var("CARGO_LAMBDA_HTTP_PORT", "9000");
        std::env::set_var("AWS_REGION", "eu-west-1");
        let env = DeploymentEnv::detect();
        assert!(env.is_local());
        assert_eq!(env.onboarding_table(), "Onboarding_Local");
        assert_eq!(env.source(), ResolutionSource::LocalTooling);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn lambda_runtime_means_prod() {
        clear_env_vars();
        std::env::set_var("AWS_EXECUTION_ENV", "AWS_Lambda_rust");
        let env = DeploymentEnv::detect();
        assert_eq!(env.name(), DEFAULT_REMOTE_ENVIRONMENT);
        assert_eq!(env.cidr_table(), "CidrBlocks_Prod");
        assert_eq!(env.source(), ResolutionSource::AwsRuntime);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn nothing_set_falls_back_to_local() {
        clear_env_vars();
        let env = DeploymentEnv::detect();
        assert_eq!(env.source(), ResolutionSource::DefaultLocal);
        assert_eq!(env.source().to_string(), "fallback to Local");
    }

    #[test]
    #[serial]
    fn saas_boost_env_overrides_parameter_prefix() {
        clear_env_vars();
        std::env::set_var("ENVIRONMENT_NAME", "Staging");
        std::env::set_var("SAAS_BOOST_ENV", "dev");
        let env = DeploymentEnv::detect();
        assert_eq!(env.parameter_prefix(), "/saas-boost/dev/");
        assert_eq!(env.options_table(), "Options_Staging");
        clear_env_vars();
    }
}
