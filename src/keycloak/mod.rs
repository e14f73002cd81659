//! Keycloak admin API helper used for identity provisioning.
//!
//! The client is blocking; async callers go through
//! `tokio::task::spawn_blocking`.

mod client;
mod model;

pub use client::KeycloakAdminClient;
pub use model::{Client, ClientScope, Credential, Group, ProtocolMapper, Realm, Role, User};
