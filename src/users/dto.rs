use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::User;
use super::validation::UserFields;

// Unknown keys (is_staff, id, ...) are dropped by deserialization, so a client
// can only ever touch the fields listed here.

/// Request body for signup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for login. A submitted username is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for profile updates; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl From<SignupRequest> for UserFields {
    fn from(req: SignupRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
        }
    }
}

impl From<LoginRequest> for UserFields {
    fn from(req: LoginRequest) -> Self {
        Self {
            username: None,
            email: req.email,
            password: req.password,
        }
    }
}

impl From<UpdateRequest> for UserFields {
    fn from(req: UpdateRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            password: req.password,
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privileged_keys_are_dropped() {
        let req: SignupRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "email": "a@example.com",
            "password": "pw",
            "is_staff": true,
            "is_superuser": true,
        }))
        .expect("extra keys are ignored");
        let fields = UserFields::from(req);
        assert_eq!(fields.username.as_deref(), Some("alice"));
    }

    #[test]
    fn login_never_carries_a_username() {
        let req: LoginRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "email": "a@example.com",
        }))
        .expect("parse");
        let fields = UserFields::from(req);
        assert!(fields.username.is_none());
        assert!(fields.password.is_none());
    }

    #[test]
    fn public_user_has_no_password() {
        let json = serde_json::to_value(PublicUser {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "a@example.com".into(),
        })
        .unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
