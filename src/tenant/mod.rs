//! Tenant records and their lifecycle.

mod dal;
mod listener;
mod model;

pub use dal::TenantDal;
pub use listener::handle_tenant_event;
pub use model::{AdminUser, Resource, Tenant};
