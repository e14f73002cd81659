//! Comparisons between a stored app config and an incoming update.

use std::collections::BTreeSet;

use super::model::{is_blank, AppConfig};

fn differs_ignore_case(existing: &Option<String>, updated: &Option<String>) -> bool {
    match (existing.as_deref(), updated.as_deref()) {
        (None, None) => false,
        (Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

pub fn is_domain_changed(existing: &AppConfig, updated: &AppConfig) -> bool {
    differs_ignore_case(&existing.domain_name, &updated.domain_name)
}

pub fn is_hosted_zone_changed(existing: &AppConfig, updated: &AppConfig) -> bool {
    differs_ignore_case(&existing.hosted_zone, &updated.hosted_zone)
}

pub fn is_ssl_arn_changed(existing: &AppConfig, updated: &AppConfig) -> bool {
    differs_ignore_case(&existing.ssl_certificate, &updated.ssl_certificate)
}

fn billing_key(config: &AppConfig) -> Option<String> {
    config
        .billing
        .as_ref()
        .map(|billing| billing.api_key.clone())
        .filter(|key| !key.trim().is_empty())
}

pub fn is_billing_changed(existing: &AppConfig, updated: &AppConfig) -> bool {
    billing_key(existing) != billing_key(updated)
}

pub fn is_billing_first_time(existing: &AppConfig, updated: &AppConfig) -> bool {
    billing_key(existing).is_none() && billing_key(updated).is_some()
}

pub fn is_billing_removed(existing: &AppConfig, updated: &AppConfig) -> bool {
    billing_key(existing).is_some() && billing_key(updated).is_none()
}

pub fn is_services_changed(existing: &AppConfig, updated: &AppConfig) -> bool {
    existing.services != updated.services
}

/// Services present in `existing` but missing from `updated`.
pub fn removed_services(existing: &AppConfig, updated: &AppConfig) -> BTreeSet<String> {
    existing
        .services
        .keys()
        .filter(|name| !updated.services.contains_key(*name))
        .cloned()
        .collect()
}

pub fn is_name_blank(config: &AppConfig) -> bool {
    is_blank(&config.name)
}
