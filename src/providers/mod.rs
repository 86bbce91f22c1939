pub mod base;
pub mod listeners;
pub mod plain_provider;
pub mod rest_provider;

// Re-export the primary provider items so code outside can do
// "use crate::providers::{AuthProvider, create_auth_provider};"
pub use base::{create_auth_provider, AuthChange, AuthEvent, AuthProvider, ProviderConfig};
pub use listeners::{AuthListener, AuthListeners, Subscription};
