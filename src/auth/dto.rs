use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response of the is-authenticated query.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginFlag {
    #[serde(rename = "loginFlg")]
    pub login_flg: bool,
}

/// Request body for token refresh. Falls back to the refresh cookie when absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

/// Request body for token verification.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

/// Identity of the caller, as resolved from the access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct MyId {
    pub id: Uuid,
}
