use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Topology of the hosted application: shared settings plus its services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub hosted_zone: Option<String>,
    #[serde(default)]
    pub ssl_certificate: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingProvider>,
}

impl AppConfig {
    pub fn is_empty(&self) -> bool {
        is_blank(&self.name)
            && is_blank(&self.domain_name)
            && is_blank(&self.hosted_zone)
            && is_blank(&self.ssl_certificate)
            && self.services.is_empty()
            && self
                .billing
                .as_ref()
                .map_or(true, |billing| billing.api_key.trim().is_empty())
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingProvider {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(rename = "public", default)]
    pub public: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Storage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<Filesystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<Compute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Storage {
    #[serde(default)]
    pub bucket_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub engine: Option<RdsEngine>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_param: Option<String>,
    #[serde(default)]
    pub bootstrap_filename: Option<String>,
    /// Presigned upload URL handed back to the caller; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_url: Option<String>,
    #[serde(default)]
    pub tiers: BTreeMap<String, DatabaseTierConfig>,
}

impl Database {
    pub fn port(&self) -> Option<u16> {
        self.engine.map(|engine| engine.port())
    }
}

/// Compares the stored definition only; `password_param` and `bootstrap_url`
/// are derived per request.
impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        let same_database = match (self.database.as_deref(), other.database.as_deref()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        };
        same_database
            && self.engine == other.engine
            && self.version == other.version
            && self.family == other.family
            && self.username == other.username
            && self.password == other.password
            && self.bootstrap_filename == other.bootstrap_filename
            && self.tiers == other.tiers
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTierConfig {
    #[serde(default)]
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RdsEngine {
    #[serde(rename = "aurora-postgresql")]
    AuroraPostgresql,
    #[serde(rename = "aurora-mysql")]
    AuroraMysql,
    #[serde(rename = "mysql")]
    Mysql,
    #[serde(rename = "mariadb")]
    Mariadb,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "sqlserver-ex")]
    SqlServerEx,
    #[serde(rename = "sqlserver-web")]
    SqlServerWeb,
    #[serde(rename = "sqlserver-se")]
    SqlServerSe,
    #[serde(rename = "sqlserver-ee")]
    SqlServerEe,
    #[serde(rename = "oracle-ee")]
    OracleEe,
}

impl RdsEngine {
    pub fn engine_name(&self) -> &'static str {
        match self {
            RdsEngine::AuroraPostgresql => "aurora-postgresql",
            RdsEngine::AuroraMysql => "aurora-mysql",
            RdsEngine::Mysql => "mysql",
            RdsEngine::Mariadb => "mariadb",
            RdsEngine::Postgres => "postgres",
            RdsEngine::SqlServerEx => "sqlserver-ex",
            RdsEngine::SqlServerWeb => "sqlserver-web",
            RdsEngine::SqlServerSe => "sqlserver-se",
            RdsEngine::SqlServerEe => "sqlserver-ee",
            RdsEngine::OracleEe => "oracle-ee",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            RdsEngine::AuroraPostgresql | RdsEngine::Postgres => 5432,
            RdsEngine::AuroraMysql | RdsEngine::Mysql | RdsEngine::Mariadb => 3306,
            RdsEngine::SqlServerEx
            | RdsEngine::SqlServerWeb
            | RdsEngine::SqlServerSe
            | RdsEngine::SqlServerEe => 1433,
            RdsEngine::OracleEe => 1521,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Filesystem {
    #[serde(rename = "EFS")]
    Efs(EfsFilesystem),
    #[serde(rename = "FSX_WINDOWS")]
    FsxWindows(FsxFilesystem),
    #[serde(rename = "FSX_ONTAP")]
    FsxOntap(FsxFilesystem),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfsFilesystem {
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub encrypt_at_rest: bool,
    #[serde(default)]
    pub lifecycle: EfsLifecycle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EfsLifecycle {
    #[default]
    Never,
    #[serde(rename = "AFTER_7_DAYS")]
    After7Days,
    #[serde(rename = "AFTER_14_DAYS")]
    After14Days,
    #[serde(rename = "AFTER_30_DAYS")]
    After30Days,
    #[serde(rename = "AFTER_60_DAYS")]
    After60Days,
    #[serde(rename = "AFTER_90_DAYS")]
    After90Days,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsxFilesystem {
    #[serde(default)]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub windows_mount_drive: Option<String>,
    #[serde(default)]
    pub storage_gb: Option<u32>,
    #[serde(default)]
    pub throughput_mbs: Option<u32>,
    #[serde(default)]
    pub backup_retention_days: Option<u32>,
    #[serde(default)]
    pub daily_backup_time: Option<String>,
    #[serde(default)]
    pub weekly_maintenance_time: Option<String>,
    #[serde(default)]
    pub volume_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Compute {
    #[serde(rename = "ECS")]
    Ecs(EcsCompute),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsCompute {
    #[serde(default)]
    pub container_port: Option<u16>,
    #[serde(default)]
    pub container_repo: Option<String>,
    #[serde(default)]
    pub container_tag: Option<String>,
    #[serde(default)]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub operating_system: Option<OperatingSystem>,
    #[serde(default)]
    pub ecs_launch_type: Option<String>,
    #[serde(default)]
    pub ecs_exec_enabled: bool,
    #[serde(default)]
    pub tiers: BTreeMap<String, ComputeTier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeTier {
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default)]
    pub compute_size: Option<String>,
    #[serde(default)]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(rename = "ec2min", default)]
    pub ec2_min: Option<u32>,
    #[serde(rename = "ec2max", default)]
    pub ec2_max: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    #[serde(rename = "LINUX")]
    Linux,
    #[serde(rename = "WIN_2016_FULL")]
    Win2016Full,
    #[serde(rename = "WIN_2019_FULL")]
    Win2019Full,
    #[serde(rename = "WIN_2019_CORE")]
    Win2019Core,
    #[serde(rename = "WIN_2022_FULL")]
    Win2022Full,
    #[serde(rename = "WIN_2022_CORE")]
    Win2022Core,
    #[serde(rename = "WIN_20H2_CORE")]
    Win20H2Core,
}

impl OperatingSystem {
    pub const ALL: [OperatingSystem; 7] = [
        OperatingSystem::Linux,
        OperatingSystem::Win2016Full,
        OperatingSystem::Win2019Full,
        OperatingSystem::Win2019Core,
        OperatingSystem::Win2022Full,
        OperatingSystem::Win2022Core,
        OperatingSystem::Win20H2Core,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "LINUX",
            OperatingSystem::Win2016Full => "WIN_2016_FULL",
            OperatingSystem::Win2019Full => "WIN_2019_FULL",
            OperatingSystem::Win2019Core => "WIN_2019_CORE",
            OperatingSystem::Win2022Full => "WIN_2022_FULL",
            OperatingSystem::Win2022Core => "WIN_2022_CORE",
            OperatingSystem::Win20H2Core => "WIN_20H2_CORE",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Amazon Linux 2",
            OperatingSystem::Win2016Full => "Windows Server 2016 Full",
            OperatingSystem::Win2019Full => "Windows Server 2019 Full",
            OperatingSystem::Win2019Core => "Windows Server 2019 Core",
            OperatingSystem::Win2022Full => "Windows Server 2022 Full",
            OperatingSystem::Win2022Core => "Windows Server 2022 Core",
            OperatingSystem::Win20H2Core => "Windows Server 20H2 Core",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_detection() {
        assert!(AppConfig::default().is_empty());
        let blank = AppConfig {
            name: Some("  ".into()),
            billing: Some(BillingProvider::default()),
            ..Default::default()
        };
        assert!(blank.is_empty());
        let named = AppConfig {
            name: Some("demo".into()),
            ..Default::default()
        };
        assert!(!named.is_empty());
    }

    #[test]
    fn service_json_uses_tagged_unions() {
        let raw = json!({
            "public": true,
            "name": "web",
            "path": "/*",
            "compute": {
                "type": "ECS",
                "containerPort": 8080,
                "operatingSystem": "WIN_2019_CORE",
                "tiers": { "default": { "min": 1, "max": 2, "ec2min": 1 } }
            },
            "filesystem": { "type": "EFS", "mountPoint": "/mnt", "lifecycle": "AFTER_30_DAYS" },
            "database": { "engine": "aurora-mysql", "tiers": { "default": { "instance": "T3.MICRO" } } }
        });
        let service: ServiceConfig = serde_json::from_value(raw).expect("service");
        assert!(service.public);
        let Some(Compute::Ecs(compute)) = &service.compute else {
            panic!("expected ECS compute");
        };
        assert_eq!(compute.container_port, Some(8080));
        assert_eq!(compute.operating_system, Some(OperatingSystem::Win2019Core));
        assert_eq!(compute.tiers["default"].ec2_min, Some(1));
        assert!(matches!(
            service.filesystem,
            Some(Filesystem::Efs(EfsFilesystem {
                lifecycle: EfsLifecycle::After30Days,
                ..
            }))
        ));
        assert_eq!(service.database.as_ref().and_then(Database::port), Some(3306));

        let back = serde_json::to_value(&service).expect("json");
        assert_eq!(back["compute"]["type"], "ECS");
        assert_eq!(back["filesystem"]["type"], "EFS");
        assert_eq!(back["public"], true);
    }

    #[test]
    fn engine_ports() {
        assert_eq!(RdsEngine::SqlServerWeb.port(), 1433);
        assert_eq!(RdsEngine::OracleEe.port(), 1521);
        assert_eq!(RdsEngine::Postgres.engine_name(), "postgres");
    }
}
