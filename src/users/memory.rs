use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, User, UserChanges};
use super::validation::FieldName;

/// Process-local store with the same uniqueness guarantees as the Postgres one.
/// Used by tests and by `AppState::fake`.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

fn check_unique(
    users: &[User],
    username: Option<&str>,
    email: Option<&str>,
    excluding: Option<Uuid>,
) -> Result<(), StoreError> {
    for other in users.iter().filter(|u| Some(u.id) != excluding) {
        if username == Some(other.username.as_str()) {
            return Err(StoreError::Duplicate(FieldName::Username));
        }
        if email == Some(other.email.as_str()) {
            return Err(StoreError::Duplicate(FieldName::Email));
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        check_unique(
            &users,
            Some(new_user.username.as_str()),
            Some(new_user.email.as_str()),
            None,
        )?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_active: new_user.is_active,
            is_staff: new_user.is_staff,
            is_superuser: new_user.is_superuser,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        excluding: Option<Uuid>,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| Some(u.id) != excluding)
            .filter(|u| username == Some(u.username.as_str()) || email == Some(u.email.as_str()))
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        check_unique(
            &users,
            changes.username.as_deref(),
            changes.email.as_deref(),
            Some(id),
        )?;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(is_staff) = changes.is_staff {
            user.is_staff = is_staff;
        }
        if let Some(is_superuser) = changes.is_superuser {
            user.is_superuser = is_superuser;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser::regular(username.into(), email.into(), "$argon2id$stub".into())
    }

    #[tokio::test]
    async fn create_assigns_id_and_default_flags() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("alice", "a@example.com")).await.expect("create");
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryUserStore::new();
        store.create(new_user("alice", "a@example.com")).await.expect("create");

        let err = store.create(new_user("alice", "b@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(FieldName::Username)));
        let err = store.create(new_user("bob", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(FieldName::Email)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let store = InMemoryUserStore::new();
        store.create(new_user("alice", "a@example.com")).await.expect("create");
        store.create(new_user("Alice", "b@example.com")).await.expect("different case");
    }

    #[tokio::test]
    async fn update_may_keep_own_values_but_not_take_others() {
        let store = InMemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@example.com")).await.expect("create");
        store.create(new_user("bob", "b@example.com")).await.expect("create");

        let same = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        let updated = store.update(alice.id, same).await.expect("self values allowed");
        assert!(updated.updated_at >= alice.updated_at);
        assert_eq!(updated.created_at, alice.created_at);

        let taken = UserChanges {
            email: Some("b@example.com".into()),
            ..Default::default()
        };
        let err = store.update(alice.id, taken).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(FieldName::Email)));
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let store = InMemoryUserStore::new();
        let err = store
            .update(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn lookup_by_username_or_email_skips_excluded() {
        let store = InMemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@example.com")).await.expect("create");

        let hits = store
            .find_by_username_or_email(Some("alice"), None, None)
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);

        let hits = store
            .find_by_username_or_email(Some("alice"), Some("a@example.com"), Some(alice.id))
            .await
            .expect("query");
        assert!(hits.is_empty());
    }
}
