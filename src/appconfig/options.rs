//! Choices offered to the admin console: operating systems and the RDS
//! engine/version/instance matrix collected per region.

use std::{cmp::Ordering, collections::BTreeMap};

use aws_sdk_dynamodb::{types::AttributeValue, Client};
use serde::{ser::SerializeMap, Serialize, Serializer};

use super::model::OperatingSystem;
use crate::{
    dynamo::{get_list, get_map, get_string, Item},
    error::AppError,
};

pub fn os_options() -> BTreeMap<&'static str, &'static str> {
    OperatingSystem::ALL
        .iter()
        .map(|os| (os.key(), os.description()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdsEngineOptions {
    pub engine: String,
    pub region: String,
    pub options: RdsEngineDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdsEngineDetails {
    pub name: String,
    pub description: String,
    pub versions: Vec<RdsVersionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdsVersionOption {
    pub description: String,
    pub family: String,
    pub version: String,
    pub instances: RdsInstances,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdsInstanceOption {
    #[serde(rename = "class")]
    pub instance_class: String,
    pub description: String,
}

/// Instance options keyed by instance name (`T3_MICRO`), kept in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RdsInstances(pub Vec<(String, RdsInstanceOption)>);

impl Serialize for RdsInstances {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, option) in &self.0 {
            map.serialize_entry(key, option)?;
        }
        map.end()
    }
}

const INSTANCE_TYPES: [char; 3] = ['T', 'M', 'R'];
const INSTANCE_SIZES: [&str; 9] = [
    "MICRO", "SMALL", "MEDIUM", "LARGE", "XL", "2XL", "4XL", "12XL", "24XL",
];

fn rank<T: PartialEq>(values: &[T], value: &T) -> usize {
    values.iter().position(|v| v == value).unwrap_or(values.len())
}

/// Order instance keys by family (T, M, R), then generation, then size.
pub fn compare_instances(a: &str, b: &str) -> Ordering {
    let family = |key: &str| rank(&INSTANCE_TYPES, &key.chars().next().unwrap_or(' '));
    let generation = |key: &str| key.chars().nth(1).unwrap_or('0');
    let size = |key: &str| rank(&INSTANCE_SIZES, &key.get(3..).unwrap_or(""));
    family(a)
        .cmp(&family(b))
        .then_with(|| generation(a).cmp(&generation(b)))
        .then_with(|| size(a).cmp(&size(b)))
}

/// Engine options recorded for `region` in the options table.
pub async fn db_options(
    client: &Client,
    table: &str,
    region: &str,
) -> Result<Vec<RdsEngineOptions>, AppError> {
    let resp = client
        .query()
        .table_name(table)
        .key_condition_expression("#region = :region")
        .expression_attribute_names("#region", "region")
        .expression_attribute_values(":region", AttributeValue::S(region.to_string()))
        .send()
        .await
        .map_err(|e| AppError::Dynamo(e.to_string()))?;
    Ok(resp.items().iter().map(engine_options_from_item).collect())
}

pub fn engine_options_from_item(item: &Item) -> RdsEngineOptions {
    let empty = Item::new();
    let options = get_map(item, "options").unwrap_or(&empty);
    let versions = get_list(options, "versions")
        .iter()
        .filter_map(|v| v.as_m().ok())
        .map(|version| {
            let mut instances: Vec<(String, RdsInstanceOption)> = get_map(version, "instances")
                .map(|instances| {
                    instances
                        .iter()
                        .filter_map(|(key, value)| {
                            let details = value.as_m().ok()?;
                            Some((
                                key.clone(),
                                RdsInstanceOption {
                                    instance_class: get_string(details, "class").unwrap_or_default(),
                                    description: get_string(details, "description")
                                        .unwrap_or_default(),
                                },
                            ))
                        })
                        .collect()
                })
                .unwrap_or_default();
            instances.sort_by(|(a, _), (b, _)| compare_instances(a, b));
            RdsVersionOption {
                description: get_string(version, "description").unwrap_or_default(),
                family: get_string(version, "family").unwrap_or_default(),
                version: get_string(version, "version").unwrap_or_default(),
                instances: RdsInstances(instances),
            }
        })
        .collect();
    RdsEngineOptions {
        engine: get_string(item, "engine").unwrap_or_default(),
        region: get_string(item, "region").unwrap_or_default(),
        options: RdsEngineDetails {
            name: get_string(options, "name").unwrap_or_default(),
            description: get_string(options, "description").unwrap_or_default(),
            versions,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    #[test]
    fn instances_sort_by_family_generation_and_size() {
        let mut keys = vec![
            "R5_XL", "M5_LARGE", "T3_SMALL", "T2_MICRO", "M4_2XL", "T3_MICRO", "M5_24XL", "M5_4XL",
        ];
        keys.sort_by(|a, b| compare_instances(a, b));
        assert_eq!(
            keys,
            vec!["T2_MICRO", "T3_MICRO", "T3_SMALL", "M4_2XL", "M5_LARGE", "M5_4XL", "M5_24XL", "R5_XL"]
        );
    }

    #[test]
    fn os_options_describe_every_variant() {
        let options = os_options();
        assert_eq!(options.len(), 7);
        assert_eq!(options["LINUX"], "Amazon Linux 2");
    }

    #[test]
    fn items_map_to_sorted_options() {
        let instance = |class: &str| {
            AttributeValue::M(
                [
                    ("class".to_string(), s(class)),
                    ("description".to_string(), s("desc")),
                ]
                .into_iter()
                .collect(),
            )
        };
        let version = AttributeValue::M(
            [
                ("version".to_string(), s("14.6")),
                ("family".to_string(), s("postgres14")),
                ("description".to_string(), s("PostgreSQL 14.6")),
                (
                    "instances".to_string(),
                    AttributeValue::M(
                        [
                            ("M5_LARGE".to_string(), instance("db.m5.large")),
                            ("T3_MICRO".to_string(), instance("db.t3.micro")),
                        ]
                        .into_iter()
                        .collect(),
                    ),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let item: Item = [
            ("region".to_string(), s("us-east-1")),
            ("engine".to_string(), s("POSTGRES")),
            (
                "options".to_string(),
                AttributeValue::M(
                    [
                        ("name".to_string(), s("postgres")),
                        ("description".to_string(), s("PostgreSQL")),
                        ("versions".to_string(), AttributeValue::L(vec![version])),
                    ]
                    .into_iter()
                    .collect(),
                ),
            ),
        ]
        .into_iter()
        .collect();

        let options = engine_options_from_item(&item);
        assert_eq!(options.engine, "POSTGRES");
        let instances = &options.options.versions[0].instances.0;
        assert_eq!(instances[0].0, "T3_MICRO");
        assert_eq!(instances[1].1.instance_class, "db.m5.large");

        let json = serde_json::to_string(&options).expect("json");
        assert!(json.find("T3_MICRO").unwrap() < json.find("M5_LARGE").unwrap());
    }
}
