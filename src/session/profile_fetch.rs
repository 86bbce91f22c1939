use tracing::warn;

use crate::models::{Profile, SellerProfile};
use crate::profiles::ProfileStore;

/// Fetch the profile pair for `user_id`, never failing.
///
/// A missing or unreachable `profiles` row yields `(None, None)`; the seller
/// row is only looked up for sellers and admins, and its failure keeps the
/// profile.
pub async fn fetch_profile(
    store: &dyn ProfileStore,
    user_id: &str,
) -> (Option<Profile>, Option<SellerProfile>) {
    let profile = match store.get_profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            warn!(
                event_name = "session.profile.missing",
                event_domain = "session",
                user_id,
                "no profile row for user"
            );
            return (None, None);
        }
        Err(e) => {
            warn!(
                event_name = "session.profile.error",
                event_domain = "session",
                user_id,
                store = store.get_name(),
                "profile fetch failed: {}",
                e
            );
            return (None, None);
        }
    };

    if !profile.role.is_seller() {
        return (Some(profile), None);
    }

    let seller_profile = match store.get_seller_profile(user_id).await {
        Ok(seller_profile) => seller_profile,
        Err(e) => {
            warn!(
                event_name = "session.seller_profile.error",
                event_domain = "session",
                user_id,
                "seller profile fetch failed: {}",
                e
            );
            None
        }
    };
    (Some(profile), seller_profile)
}
