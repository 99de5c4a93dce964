use anyhow::anyhow;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dto::{LoginRequest, SignupRequest, UpdateRequest};
use super::repo::UserStore;
use super::repo_types::{NewUser, User, UserChanges};
use super::validation::{normalize_email, validate, RequiredFields, Uniqueness, ValidatedFields};
use crate::auth::jwt::TokenPair;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::error::ApiError;
use crate::state::AppState;

enum Credentials {
    UnknownEmail,
    WrongPassword(User),
    Valid(User),
}

async fn check_credentials(store: &dyn UserStore, email: &str, password: String) -> Result<Credentials, ApiError> {
    let Some(user) = store.find_by_email(email).await? else {
        return Ok(Credentials::UnknownEmail);
    };
    if verify_password_blocking(password, user.password_hash.clone()).await? {
        Ok(Credentials::Valid(user))
    } else {
        Ok(Credentials::WrongPassword(user))
    }
}

/// Username, email and password of a payload validated with
/// [`RequiredFields::signup`].
fn signup_values(fields: ValidatedFields) -> Result<(String, String, String), ApiError> {
    match (fields.username, fields.email, fields.password) {
        (Some(username), Some(email), Some(password)) => Ok((username, email, password)),
        _ => Err(anyhow!("validated signup payload is missing a required field").into()),
    }
}

fn login_values(fields: ValidatedFields) -> Result<(String, String), ApiError> {
    match (fields.email, fields.password) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(anyhow!("validated login payload is missing a required field").into()),
    }
}

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<(User, TokenPair), ApiError> {
    let fields = validate(
        state.store.as_ref(),
        &req.into(),
        &RequiredFields::signup(),
        Uniqueness::Create,
    )
    .await?;
    let (username, email, password) = signup_values(fields)?;
    let hash = hash_password_blocking(password).await?;
    let user = state
        .store
        .create(NewUser::regular(username, email, hash))
        .await?;
    let pair = state.keys.issue_pair(user.id)?;
    info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok((user, pair))
}

/// Login is only open to anonymous callers; `current` is the caller's
/// verified identity, if any.
pub async fn login(
    state: &AppState,
    current: Option<Uuid>,
    req: LoginRequest,
) -> Result<(User, TokenPair), ApiError> {
    if let Some(user_id) = current {
        warn!(user_id = %user_id, "login attempted while authenticated");
        return Err(ApiError::PermissionDenied("You are already logged in.".into()));
    }
    let fields = validate(
        state.store.as_ref(),
        &req.into(),
        &RequiredFields::login(),
        Uniqueness::Skip,
    )
    .await?;
    let (email, password) = login_values(fields)?;
    let user = match check_credentials(state.store.as_ref(), &email, password).await? {
        Credentials::UnknownEmail => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::NotFound("email incorrect.".into()));
        }
        Credentials::WrongPassword(user) => {
            warn!(user_id = %user.id, "login invalid password");
            return Err(ApiError::AuthenticationFailed("password incorrect.".into()));
        }
        Credentials::Valid(user) => user,
    };
    let pair = state.keys.issue_pair(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, pair))
}

pub async fn update(
    state: &AppState,
    caller: Uuid,
    target: Uuid,
    req: UpdateRequest,
) -> Result<User, ApiError> {
    if caller != target {
        warn!(caller = %caller, target = %target, "update of another user refused");
        return Err(ApiError::PermissionDenied(
            "You do not have permission to perform this action.".into(),
        ));
    }
    // A token can outlive its account.
    if state.store.find_by_id(target).await?.is_none() {
        return Err(ApiError::NotFound("User not found.".into()));
    }
    let fields = validate(
        state.store.as_ref(),
        &req.into(),
        &RequiredFields::update(),
        Uniqueness::Update { exclude: target },
    )
    .await?;
    let password_hash = match fields.password {
        Some(password) => Some(hash_password_blocking(password).await?),
        None => None,
    };
    let changes = UserChanges {
        username: fields.username,
        email: fields.email,
        password_hash,
        ..Default::default()
    };
    if changes.is_empty() {
        debug!(user_id = %target, "update carries no field changes");
    }
    let user = state.store.update(target, changes).await?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

/// Email/password exchange for a bare token pair. Unlike login, any failure
/// reads the same and inactive accounts are refused.
pub async fn obtain_token_pair(state: &AppState, req: LoginRequest) -> Result<TokenPair, ApiError> {
    let fields = validate(
        state.store.as_ref(),
        &req.into(),
        &RequiredFields::login(),
        Uniqueness::Skip,
    )
    .await?;
    let (email, password) = login_values(fields)?;
    match check_credentials(state.store.as_ref(), &email, password).await? {
        Credentials::Valid(user) if user.is_active => Ok(state.keys.issue_pair(user.id)?),
        _ => {
            warn!(email = %email, "token obtain refused");
            Err(ApiError::AuthenticationFailed(
                "No active account found with the given credentials".into(),
            ))
        }
    }
}

/// Administrative bootstrap: same field rules as signup, all flags raised.
pub async fn create_superuser(
    store: &dyn UserStore,
    username: String,
    email: String,
    password: String,
) -> Result<User, ApiError> {
    let input = SignupRequest {
        username: Some(username),
        email: Some(email),
        password: Some(password),
    };
    let fields = validate(store, &input.into(), &RequiredFields::signup(), Uniqueness::Create).await?;
    let (username, email, password) = signup_values(fields)?;
    let hash = hash_password_blocking(password).await?;
    let user = store
        .create(NewUser::superuser(username, email, hash))
        .await?;
    info!(user_id = %user.id, "superuser created");
    Ok(user)
}

/// Grants staff and superuser to an existing account.
pub async fn promote(store: &dyn UserStore, email: &str) -> Result<User, ApiError> {
    let email = normalize_email(email);
    let Some(user) = store.find_by_email(&email).await? else {
        return Err(ApiError::NotFound("email incorrect.".into()));
    };
    let changes = UserChanges {
        is_staff: Some(true),
        is_superuser: Some(true),
        ..Default::default()
    };
    let user = store.update(user.id, changes).await?;
    info!(user_id = %user.id, "user promoted to superuser");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::InMemoryUserStore;
    use crate::users::validation::{ErrorCode, FieldName};
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn signup_req(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn state_with_store() -> (AppState, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        let state = AppState::from_parts(store.clone(), crate::config::AppConfig::for_tests())
            .expect("state");
        (state, store)
    }

    #[tokio::test]
    async fn signup_hashes_password_and_issues_tokens() {
        let (state, store) = state_with_store();
        let (user, pair) = signup(&state, signup_req("alice", "a@Example.com", "pw"))
            .await
            .expect("signup");
        assert_eq!(user.email, "a@example.com");
        assert_ne!(user.password_hash, "pw");
        assert_eq!(state.keys.verify_access(&pair.access_token).unwrap().sub, user.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn signup_duplicate_is_conflict_and_leaves_store_alone() {
        let (state, store) = state_with_store();
        signup(&state, signup_req("alice", "a@example.com", "pw"))
            .await
            .expect("signup");
        let err = signup(&state, signup_req("alice", "other@example.com", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.codes(FieldName::Username), vec![ErrorCode::Unique]);
        assert!(!errors.contains(FieldName::Email));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn login_outcomes() {
        let (state, _) = state_with_store();
        let (alice, _) = signup(&state, signup_req("alice", "a@example.com", "pw"))
            .await
            .expect("signup");

        let err = login(&state, None, login_req("nobody@example.com", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = login(&state, None, login_req("a@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = login(&state, Some(alice.id), login_req("a@example.com", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let (user, _) = login(&state, None, login_req("a@EXAMPLE.COM", "pw"))
            .await
            .expect("login");
        assert_eq!(user.id, alice.id);
    }

    #[tokio::test]
    async fn update_rehashes_password() {
        let (state, _) = state_with_store();
        let (alice, _) = signup(&state, signup_req("alice", "a@example.com", "pw"))
            .await
            .expect("signup");
        let req = UpdateRequest {
            password: Some("new-pw".into()),
            ..Default::default()
        };
        let updated = update(&state, alice.id, alice.id, req).await.expect("update");
        assert_ne!(updated.password_hash, alice.password_hash);
        assert!(login(&state, None, login_req("a@example.com", "new-pw")).await.is_ok());
        assert!(updated.updated_at >= alice.updated_at);
    }

    #[tokio::test]
    async fn update_of_someone_else_is_forbidden() {
        let (state, store) = state_with_store();
        let (alice, _) = signup(&state, signup_req("alice", "a@example.com", "pw"))
            .await
            .expect("signup");
        let (bob, _) = signup(&state, signup_req("bob", "b@example.com", "pw"))
            .await
            .expect("signup");
        let req = UpdateRequest {
            username: Some("mallory".into()),
            ..Default::default()
        };
        let err = update(&state, alice.id, bob.id, req).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let bob_now = store.find_by_id(bob.id).await.unwrap().unwrap();
        assert_eq!(bob_now.username, "bob");
    }

    #[tokio::test]
    async fn update_of_missing_account_is_not_found() {
        let (state, _) = state_with_store();
        let ghost = Uuid::new_v4();
        let req = UpdateRequest {
            password: Some("new-pw".into()),
            ..Default::default()
        };
        let err = update(&state, ghost, ghost, req).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_update_keeps_profile() {
        let (state, _) = state_with_store();
        let (alice, _) = signup(&state, signup_req("alice", "a@example.com", "pw"))
            .await
            .expect("signup");
        let updated = update(&state, alice.id, alice.id, UpdateRequest::default())
            .await
            .expect("empty update");
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.password_hash, alice.password_hash);
    }

    #[tokio::test]
    async fn obtain_pair_refuses_inactive_accounts() {
        let (state, store) = state_with_store();
        let hash = crate::auth::password::hash_password("pw").unwrap();
        let mut inactive = NewUser::regular("idle".into(), "idle@example.com".into(), hash);
        inactive.is_active = false;
        store.create(inactive).await.unwrap();

        let err = obtain_token_pair(&state, login_req("idle@example.com", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn superuser_bootstrap_and_promotion() {
        let store = InMemoryUserStore::new();
        let root = create_superuser(&store, "root".into(), "root@example.com".into(), "pw".into())
            .await
            .expect("create superuser");
        assert!(root.is_staff && root.is_superuser && root.is_active);

        let err = create_superuser(&store, "x".repeat(16), "x@example.com".into(), "pw".into())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let hash = crate::auth::password::hash_password("pw").unwrap();
        store
            .create(NewUser::regular("carol".into(), "c@example.com".into(), hash))
            .await
            .unwrap();
        let carol = promote(&store, "c@EXAMPLE.com").await.expect("promote");
        assert!(carol.is_staff && carol.is_superuser);

        let err = promote(&store, "ghost@example.com").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
