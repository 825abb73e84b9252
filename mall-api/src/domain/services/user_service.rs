use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::user::User;
use crate::error::AppError;
use crate::repository::UserRepository;
use crate::utils::pagination::Paginated;

/// 资料更新：密码和角色走各自的专用通道，这里永远不碰
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    pub async fn list(&self, page: u64, limit: u64) -> Result<Paginated<User>, AppError> {
        self.users.list(page, limit).await
    }

    pub async fn update_profile(&self, id: Uuid, patch: UserPatch) -> Result<User, AppError> {
        let mut user = self.get(id).await?;

        if let Some(first_name) = patch.first_name {
            if first_name.trim().is_empty() {
                return Err(AppError::Validation("first_name cannot be empty".to_string()));
            }
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            if last_name.trim().is_empty() {
                return Err(AppError::Validation("last_name cannot be empty".to_string()));
            }
            user.last_name = last_name;
        }
        if let Some(email) = patch.email {
            let email = email.trim().to_lowercase();
            if email != user.email
                && self.users.find_by_email(&email).await?.is_some()
            {
                return Err(AppError::Conflict("email is already registered".to_string()));
            }
            user.email = email;
        }
        if let Some(age) = patch.age {
            if !(0..=120).contains(&age) {
                return Err(AppError::Validation("age must be between 0 and 120".to_string()));
            }
            user.age = age;
        }

        user.updated_at = Utc::now();
        self.users.update(&user).await?;
        Ok(user)
    }

    /// 用户还没有购物车时绑定新建的那个，已有时保持不变
    pub async fn bind_cart_if_absent(&self, user_id: Uuid, cart_id: Uuid) -> Result<bool, AppError> {
        let user = self.get(user_id).await?;
        if user.cart.is_some() {
            return Ok(false);
        }
        self.users.set_cart(user_id, Some(cart_id)).await?;
        Ok(true)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.users.delete(id).await? {
            return Err(AppError::NotFound(format!("user {id} not found")));
        }
        tracing::info!(user = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> (UserService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (UserService::new(store.clone()), store)
    }

    async fn seed_user(store: &MemoryStore, email: &str) -> User {
        let user = User::new("Ana", "Silva", email, 30, "hash");
        UserRepository::insert(store, &user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn profile_update_keeps_password_and_role() {
        let (service, store) = service();
        let user = seed_user(&store, "ana@example.com").await;

        let updated = service
            .update_profile(
                user.id,
                UserPatch {
                    first_name: Some("Anna".to_string()),
                    age: Some(31),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Anna");
        assert_eq!(updated.age, 31);
        assert_eq!(updated.password_hash, "hash");
        assert_eq!(updated.role, user.role);
    }

    #[tokio::test]
    async fn email_change_is_normalized_and_unique() {
        let (service, store) = service();
        seed_user(&store, "taken@example.com").await;
        let user = seed_user(&store, "ana@example.com").await;

        let err = service
            .update_profile(
                user.id,
                UserPatch {
                    email: Some("Taken@Example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = service
            .update_profile(
                user.id,
                UserPatch {
                    email: Some("  New@Example.com ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "new@example.com");
    }

    #[tokio::test]
    async fn cart_binding_only_happens_once() {
        let (service, store) = service();
        let user = seed_user(&store, "ana@example.com").await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(service.bind_cart_if_absent(user.id, first).await.unwrap());
        assert!(!service.bind_cart_if_absent(user.id, second).await.unwrap());
        assert_eq!(service.get(user.id).await.unwrap().cart, Some(first));
    }

    #[tokio::test]
    async fn out_of_range_age_is_rejected() {
        let (service, store) = service();
        let user = seed_user(&store, "ana@example.com").await;
        let err = service
            .update_profile(
                user.id,
                UserPatch {
                    age: Some(121),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
