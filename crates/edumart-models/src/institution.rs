//! Institution documents.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An institution on the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    /// Document ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Owning institution-admin account, when one has claimed this
    /// institution. Unclaimed institutions have no admin fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
}
