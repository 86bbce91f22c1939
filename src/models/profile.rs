use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Marketplace role stored on the `profiles` row.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Buyer,
    Seller,
    Admin,
}

impl Role {
    /// Sellers and admins both get the seller surface (and a seller profile lookup).
    pub fn is_seller(self) -> bool {
        matches!(self, Role::Seller | Role::Admin)
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

/// A row of the `profiles` table, keyed by the auth user id.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address_city: Option<String>,
    #[serde(default)]
    pub address_state: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Profile {
    /// Minimal profile row, mostly useful for seeding and tests.
    pub fn new(id: impl Into<String>, full_name: impl Into<String>, role: Role) -> Self {
        Profile {
            id: id.into(),
            full_name: full_name.into(),
            avatar_url: None,
            phone: None,
            address_city: None,
            address_state: None,
            role,
            created_at: None,
            updated_at: None,
        }
    }
}

/// A row of the `seller_profiles` table. Only present for sellers and admins.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct SellerProfile {
    pub id: String,
    pub store_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub total_sales: i64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub rating_count: i64,
    #[serde(default)]
    pub commission_rate: f64,
    #[serde(default)]
    pub payout_email: Option<String>,
}

impl SellerProfile {
    pub fn new(id: impl Into<String>, store_name: impl Into<String>) -> Self {
        SellerProfile {
            id: id.into(),
            store_name: store_name.into(),
            description: None,
            verified: false,
            total_sales: 0,
            rating: 0.0,
            rating_count: 0,
            commission_rate: 0.0,
            payout_email: None,
        }
    }
}
