//! Blocking client for the Keycloak admin REST API.

use std::{sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder, Response},
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

use super::model::{Client, ClientScope, Group, ProtocolMapper, Realm, Role, TokenGrant, User};
use crate::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_PATH: [&str; 5] = ["realms", "master", "protocol", "openid-connect", "token"];

enum Credentials {
    Password {
        grant: TokenGrant,
        expires_at: DateTime<Utc>,
    },
    Bearer(String),
}

pub struct KeycloakAdminClient {
    http: HttpClient,
    host: Url,
    credentials: Mutex<Option<Credentials>>,
}

impl KeycloakAdminClient {
    fn build(host: &str, credentials: Option<Credentials>) -> Result<Self, AppError> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Keycloak(e.to_string()))?;
        let host = Url::parse(host.trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("invalid keycloak host {host}: {e}")))?;
        Ok(Self {
            http,
            host,
            credentials: Mutex::new(credentials),
        })
    }

    /// Sign in to the master realm through the `admin-cli` password grant.
    pub fn with_password(host: &str, username: &str, password: &str) -> Result<Self, AppError> {
        let client = Self::build(host, None)?;
        let grant = client.token_request(&[
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", username),
            ("password", password),
        ])?;
        client.store_grant(grant)?;
        Ok(client)
    }

    /// Act with a token obtained elsewhere, e.g. from the admin console session.
    pub fn with_bearer_token(host: &str, token: &str) -> Result<Self, AppError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        let credentials = (!token.is_empty()).then(|| Credentials::Bearer(token.to_string()));
        Self::build(host, credentials)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("keycloak host {} can't be a base", self.host)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn admin_url(&self, realm: &Realm, segments: &[&str]) -> Result<Url, AppError> {
        let mut path = vec!["admin", "realms", realm.realm.as_str()];
        path.extend_from_slice(segments);
        self.url(&path)
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AppError> {
        let url = self.url(&TOKEN_PATH)?;
        debug!(%url, "invoking keycloak token endpoint");
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .map_err(|e| AppError::Keycloak(e.to_string()))?;
        let response = expect_status(response, StatusCode::OK, "admin password grant")?;
        response
            .json()
            .map_err(|e| AppError::Keycloak(e.to_string()))
    }

    fn store_grant(&self, grant: TokenGrant) -> Result<(), AppError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(grant.expires_in);
        *self.lock()? = Some(Credentials::Password { grant, expires_at });
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Credentials>>, AppError> {
        self.credentials
            .lock()
            .map_err(|_| AppError::Keycloak("credential lock poisoned".into()))
    }

    /// Current access token, refreshed when it expires within a second.
    fn bearer_token(&self) -> Result<String, AppError> {
        let refresh_token = match &*self.lock()? {
            Some(Credentials::Password { grant, expires_at }) => {
                if Utc::now() + chrono::Duration::seconds(1) < *expires_at {
                    return Ok(grant.access_token.clone());
                }
                grant.refresh_token.clone().ok_or_else(|| {
                    AppError::Keycloak("password grant has no refresh token".into())
                })?
            }
            Some(Credentials::Bearer(token)) => return Ok(token.clone()),
            None => return Err(AppError::Keycloak("No bearer token set".into())),
        };
        let grant = self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", "admin-cli"),
            ("refresh_token", &refresh_token),
        ])?;
        let token = grant.access_token.clone();
        self.store_grant(grant)?;
        Ok(token)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, AppError> {
        debug!(%method, %url, "invoking keycloak admin endpoint");
        Ok(self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer_token()?))
            .header(CONTENT_TYPE, "application/json"))
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&impl Serialize>,
        expected: StatusCode,
        action: &str,
    ) -> Result<Response, AppError> {
        let mut request = self.request(method, url)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .map_err(|e| AppError::Keycloak(e.to_string()))?;
        expect_status(response, expected, action)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, action: &str) -> Result<T, AppError> {
        self.send(Method::GET, url, None::<&()>, StatusCode::OK, action)?
            .json()
            .map_err(|e| AppError::Keycloak(format!("invalid response from {action}: {e}")))
    }

    pub fn get_realm(&self, realm: &Realm) -> Result<Realm, AppError> {
        self.get_json(self.admin_url(realm, &[])?, "get realm")
    }

    pub fn create_realm(&self, realm: &Realm) -> Result<Realm, AppError> {
        let url = self.url(&["admin", "realms"])?;
        self.send(Method::POST, url, Some(realm), StatusCode::CREATED, "create realm")?;
        info!(realm = %realm.realm, "created realm");
        self.get_realm(realm)
    }

    pub fn get_clients(&self, realm: &Realm) -> Result<Vec<Client>, AppError> {
        self.get_json(self.admin_url(realm, &["clients"])?, "list clients")
    }

    pub fn get_client(&self, realm: &Realm, client_id: &str) -> Result<Client, AppError> {
        let mut url = self.admin_url(realm, &["clients"])?;
        url.query_pairs_mut()
            .append_pair("search", "true")
            .append_pair("clientId", client_id);
        let clients: Vec<Client> = self.get_json(url, "list clients")?;
        exactly_one(clients, || format!("Can't find client {client_id}"))
    }

    pub fn create_client(&self, realm: &Realm, client: &Client) -> Result<Client, AppError> {
        let url = self.admin_url(realm, &["clients"])?;
        self.send(Method::POST, url, Some(client), StatusCode::CREATED, "create client")?;
        debug!(client_id = %client.client_id, "created client");
        self.get_client(realm, &client.client_id)
    }

    pub fn update_client(&self, realm: &Realm, client: &Client) -> Result<Client, AppError> {
        let id = require_id(&client.id, "client")?;
        let url = self.admin_url(realm, &["clients", id])?;
        self.send(Method::PUT, url, Some(client), StatusCode::NO_CONTENT, "update client")?;
        self.get_client(realm, &client.client_id)
    }

    pub fn get_client_scopes(&self, realm: &Realm) -> Result<Vec<ClientScope>, AppError> {
        self.get_json(self.admin_url(realm, &["client-scopes"])?, "list client scopes")
    }

    pub fn get_client_scope(&self, realm: &Realm, name: &str) -> Result<ClientScope, AppError> {
        self.get_client_scopes(realm)?
            .into_iter()
            .find(|scope| scope.name == name)
            .ok_or_else(|| AppError::Keycloak(format!("Can't find client scope {name}")))
    }

    pub fn create_client_scope(&self, realm: &Realm, scope: &ClientScope) -> Result<ClientScope, AppError> {
        let url = self.admin_url(realm, &["client-scopes"])?;
        self.send(Method::POST, url, Some(scope), StatusCode::CREATED, "create client scope")?;
        info!(scope = %scope.name, "created client scope");
        self.get_client_scope(realm, &scope.name)
    }

    pub fn get_client_scope_protocol_mappers(
        &self,
        realm: &Realm,
        scope: &ClientScope,
    ) -> Result<Vec<ProtocolMapper>, AppError> {
        let id = require_id(&scope.id, "client scope")?;
        let url = self.admin_url(realm, &["client-scopes", id, "protocol-mappers", "models"])?;
        self.get_json(url, "list protocol mappers")
    }

    pub fn get_client_scope_protocol_mapper(
        &self,
        realm: &Realm,
        scope: &ClientScope,
        name: &str,
    ) -> Result<ProtocolMapper, AppError> {
        self.get_client_scope_protocol_mappers(realm, scope)?
            .into_iter()
            .find(|mapper| mapper.name == name)
            .ok_or_else(|| AppError::Keycloak(format!("Can't find protocol mapper {name}")))
    }

    /// Attach a protocol mapper to a client and return the updated client.
    pub fn add_client_protocol_mapper(
        &self,
        realm: &Realm,
        client: &Client,
        mapper: &ProtocolMapper,
    ) -> Result<Client, AppError> {
        let id = require_id(&client.id, "client")?;
        let url = self.admin_url(realm, &["clients", id, "protocol-mappers", "add-models"])?;
        self.send(
            Method::POST,
            url,
            Some(&[mapper]),
            StatusCode::NO_CONTENT,
            "add protocol mapper",
        )?;
        self.get_client(realm, &client.client_id)
    }

    pub fn get_role(&self, realm: &Realm, name: &str) -> Result<Role, AppError> {
        self.get_json(self.admin_url(realm, &["roles", name])?, "get role")
    }

    pub fn create_role(&self, realm: &Realm, role: &Role) -> Result<Role, AppError> {
        let url = self.admin_url(realm, &["roles"])?;
        self.send(Method::POST, url, Some(role), StatusCode::CREATED, "create role")?;
        self.get_role(realm, &role.name)
    }

    pub fn get_client_roles(&self, realm: &Realm, client: &Client) -> Result<Vec<Role>, AppError> {
        let id = require_id(&client.id, "client")?;
        self.get_json(self.admin_url(realm, &["clients", id, "roles"])?, "list client roles")
    }

    pub fn get_client_role(&self, realm: &Realm, client: &Client, name: &str) -> Result<Role, AppError> {
        self.get_client_roles(realm, client)?
            .into_iter()
            .find(|role| role.name == name)
            .ok_or_else(|| {
                AppError::Keycloak(format!(
                    "Can't find client role {name} for client {}",
                    client.client_id
                ))
            })
    }

    pub fn get_groups(&self, realm: &Realm) -> Result<Vec<Group>, AppError> {
        self.get_json(self.admin_url(realm, &["groups"])?, "list groups")
    }

    pub fn get_group(&self, realm: &Realm, name: &str) -> Result<Group, AppError> {
        self.get_groups(realm)?
            .into_iter()
            .find(|group| group.name == name)
            .ok_or_else(|| AppError::Keycloak(format!("Can't find group {name}")))
    }

    pub fn create_group(&self, realm: &Realm, group: &Group) -> Result<Group, AppError> {
        let url = self.admin_url(realm, &["groups"])?;
        self.send(Method::POST, url, Some(group), StatusCode::CREATED, "create group")?;
        self.get_group(realm, &group.name)
    }

    /// Grant a realm role to every member of `group`.
    pub fn create_group_role_mapping(&self, realm: &Realm, group: &Group, role: &Role) -> Result<(), AppError> {
        let id = require_id(&group.id, "group")?;
        let url = self.admin_url(realm, &["groups", id, "role-mappings", "realm"])?;
        let mut role = role.clone();
        role.container_id = realm.id.clone();
        self.send(
            Method::POST,
            url,
            Some(&[role]),
            StatusCode::NO_CONTENT,
            "create group role mapping",
        )?;
        Ok(())
    }

    pub fn create_group_client_role_mapping(
        &self,
        realm: &Realm,
        group: &Group,
        client: &Client,
        role: &Role,
    ) -> Result<(), AppError> {
        let group_id = require_id(&group.id, "group")?;
        let client_id = require_id(&client.id, "client")?;
        let url = self.admin_url(
            realm,
            &["groups", group_id, "role-mappings", "clients", client_id],
        )?;
        self.send(
            Method::POST,
            url,
            Some(&[role]),
            StatusCode::NO_CONTENT,
            "create group client role mapping",
        )?;
        Ok(())
    }

    pub fn get_users(&self, realm: &Realm) -> Result<Vec<User>, AppError> {
        self.get_json(self.admin_url(realm, &["users"])?, "list users")
    }

    /// Exact username match.
    pub fn get_user(&self, realm: &Realm, username: &str) -> Result<User, AppError> {
        let mut url = self.admin_url(realm, &["users"])?;
        url.query_pairs_mut()
            .append_pair("exact", "true")
            .append_pair("username", username);
        let users: Vec<User> = self.get_json(url, "list users")?;
        exactly_one(users, || format!("Can't find user {username}"))
    }

    pub fn create_user(&self, realm: &Realm, user: &User) -> Result<User, AppError> {
        let url = self.admin_url(realm, &["users"])?;
        self.send(Method::POST, url, Some(user), StatusCode::CREATED, "create user")?;
        info!(username = %user.username, "created user");
        self.get_user(realm, &user.username)
    }

    pub fn update_user(&self, realm: &Realm, user: &User) -> Result<User, AppError> {
        let id = require_id(&user.id, "user")?;
        let url = self.admin_url(realm, &["users", id])?;
        self.send(Method::PUT, url, Some(user), StatusCode::NO_CONTENT, "update user")?;
        self.get_user(realm, &user.username)
    }

    pub fn delete_user(&self, realm: &Realm, user: &User) -> Result<(), AppError> {
        let id = require_id(&user.id, "user")?;
        let url = self.admin_url(realm, &["users", id])?;
        self.send(Method::DELETE, url, None::<&()>, StatusCode::NO_CONTENT, "delete user")?;
        Ok(())
    }

    pub fn add_user_to_group(&self, realm: &Realm, user: &User, group: &Group) -> Result<(), AppError> {
        let user_id = require_id(&user.id, "user")?;
        let group_id = require_id(&group.id, "group")?;
        let url = self.admin_url(realm, &["users", user_id, "groups", group_id])?;
        self.send(Method::PUT, url, None::<&()>, StatusCode::NO_CONTENT, "add user to group")?;
        Ok(())
    }
}

fn expect_status(response: Response, expected: StatusCode, action: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    error!(http_status = status.as_u16(), %body, "keycloak {action} failed");
    Err(AppError::Keycloak(format!(
        "{action} expected HTTP {} but got {}",
        expected.as_u16(),
        status.as_u16()
    )))
}

fn exactly_one<T>(mut items: Vec<T>, missing: impl FnOnce() -> String) -> Result<T, AppError> {
    match items.len() {
        1 => Ok(items.remove(0)),
        _ => Err(AppError::Keycloak(missing())),
    }
}

fn require_id<'a>(id: &'a Option<String>, kind: &str) -> Result<&'a str, AppError> {
    id.as_deref()
        .ok_or_else(|| AppError::Keycloak(format!("{kind} has no id")))
}
