pub mod auth_state;
pub mod profile;
pub mod session;
pub mod user;

pub use auth_state::AuthState;
pub use profile::{Profile, Role, SellerProfile};
pub use session::Session;
pub use user::User;
