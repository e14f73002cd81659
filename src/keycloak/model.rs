//! Admin API representations. Only the fields the control plane reads or
//! writes are typed; everything else round-trips through `extra`.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub realm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Realm {
    pub fn named(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_flow_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicit_flow_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_access_grants_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_accounts_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_client_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Client {
    fn openid(name: &str, client_id: &str, description: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            name: Some(name.to_string()),
            description: Some(description.to_string()),
            enabled: Some(true),
            protocol: Some("openid-connect".to_string()),
            direct_access_grants_enabled: Some(false),
            implicit_flow_enabled: Some(false),
            ..Self::default()
        }
    }

    /// Service-account client for machine-to-machine calls.
    pub fn confidential(name: &str, client_id: &str, description: &str, scopes: Vec<String>) -> Self {
        Self {
            standard_flow_enabled: Some(false),
            service_accounts_enabled: Some(true),
            public_client: Some(false),
            attributes: BTreeMap::from([("use.refresh.tokens".to_string(), "false".to_string())]),
            default_client_scopes: scopes,
            ..Self::openid(name, client_id, description)
        }
    }

    /// Browser client using the authorization code flow with PKCE.
    pub fn public(name: &str, client_id: &str, description: &str, redirect: &str) -> Self {
        Self {
            standard_flow_enabled: Some(true),
            service_accounts_enabled: Some(false),
            public_client: Some(true),
            attributes: BTreeMap::from([(
                "pkce.code.challenge.method".to_string(),
                "S256".to_string(),
            )]),
            redirect_uris: vec![redirect.to_string()],
            ..Self::openid(name, client_id, description)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientScope {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            protocol: Some("openid-connect".to_string()),
            attributes: BTreeMap::from([
                ("include.in.token.scope".to_string(), "true".to_string()),
                ("display.on.consent.screen".to_string(), "false".to_string()),
            ]),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMapper {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_mapper: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_role: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Role {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Group {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub value: String,
    pub temporary: bool,
}

impl Credential {
    pub fn temporary_password(value: impl Into<String>) -> Self {
        Self {
            credential_type: "password".to_string(),
            value: value.into(),
            temporary: true,
        }
    }

    /// Twelve random alphanumeric characters, to be changed at first sign-in.
    pub fn random_temporary_password() -> Self {
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Self::temporary_password(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Credential>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Enabled, verified user that must replace `password` at first sign-in.
    pub fn new(username: &str, email: &str, password: Credential) -> Self {
        Self {
            username: username.to_string(),
            email: Some(email.to_string()),
            email_verified: Some(true),
            enabled: Some(true),
            created_timestamp: Some(Utc::now().timestamp_millis()),
            credentials: vec![password],
            required_actions: vec!["UPDATE_PASSWORD".to_string()],
            ..Self::default()
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "c-1",
            "clientId": "admin-web",
            "enabled": true,
            "rootUrl": "https://admin.example.com",
        });
        let client: Client = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(client.client_id, "admin-web");
        assert_eq!(serde_json::to_value(&client).unwrap(), raw);
    }

    #[test]
    fn new_users_must_reset_their_password() {
        let user = User::new("alice", "alice@example.com", Credential::random_temporary_password());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["requiredActions"], json!(["UPDATE_PASSWORD"]));
        assert_eq!(json["credentials"][0]["type"], "password");
        assert_eq!(json["credentials"][0]["temporary"], true);
        assert_eq!(user.credentials[0].value.len(), 12);
    }

    #[test]
    fn public_clients_use_pkce() {
        let client = Client::public("Admin", "admin-web", "console", "https://admin.example.com/*");
        assert_eq!(client.public_client, Some(true));
        assert_eq!(client.attributes["pkce.code.challenge.method"], "S256");
        let client = Client::confidential("Api", "api", "backend", vec!["openid".into()]);
        assert_eq!(client.service_accounts_enabled, Some(true));
        assert_eq!(client.default_client_scopes, ["openid"]);
    }
}
