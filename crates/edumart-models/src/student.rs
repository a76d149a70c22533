//! Student account documents.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Account kind. Wishlist operations are only valid for `Student`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Student,
    InstitutionAdmin,
    Admin,
}

/// Requested wishlist mutation. Both directions are set operations:
/// adding a present id or removing an absent one is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WishlistAction {
    Add,
    Remove,
}

/// A student account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Document ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Account email
    pub email: String,

    /// Account kind
    pub role: AccountRole,

    /// Wishlisted course IDs. Set semantics: adding a present ID is a no-op.
    #[serde(default)]
    pub wishlist: BTreeSet<String>,
}

impl Student {
    pub fn is_student(&self) -> bool {
        self.role == AccountRole::Student
    }
}
