use serde::Serialize;

use super::profile::{Profile, SellerProfile};
use super::user::User;

/// The locally cached view of who is signed in, as consumed by pages.
///
/// The derived flags are only ever computed by [`AuthState::build`] (and the
/// two constants), so `is_authenticated == user.is_some()` and the role flags
/// always agree with `profile.role`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub profile: Option<Profile>,
    pub seller_profile: Option<SellerProfile>,
    pub loading: bool,
    pub is_authenticated: bool,
    pub is_seller: bool,
    pub is_admin: bool,
}

impl AuthState {
    /// The fixed signed-out state.
    pub fn anonymous() -> Self {
        AuthState {
            user: None,
            profile: None,
            seller_profile: None,
            loading: false,
            is_authenticated: false,
            is_seller: false,
            is_admin: false,
        }
    }

    /// State before the mount probe has resolved.
    pub fn initial() -> Self {
        AuthState {
            loading: true,
            ..Self::anonymous()
        }
    }

    /// Rebuild the whole state from a user and a freshly fetched profile pair.
    pub fn build(
        user: Option<User>,
        profile: Option<Profile>,
        seller_profile: Option<SellerProfile>,
    ) -> Self {
        let role = profile.as_ref().map(|p| p.role);
        AuthState {
            is_authenticated: user.is_some(),
            is_seller: role.map_or(false, |r| r.is_seller()),
            is_admin: role.map_or(false, |r| r.is_admin()),
            user,
            profile,
            seller_profile,
            loading: false,
        }
    }

    /// Same user, new profile pair.
    pub fn with_profile(&self, profile: Profile, seller_profile: Option<SellerProfile>) -> Self {
        Self::build(self.user.clone(), Some(profile), seller_profile)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}
