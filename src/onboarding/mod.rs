//! Tenant onboarding records, their stacks, and the CIDR block pool.

mod dal;
mod listener;
mod model;

pub use dal::OnboardingDal;
pub use listener::handle_onboarding_event;
pub use model::{Onboarding, OnboardingRequest, OnboardingStack, OnboardingStatus};
