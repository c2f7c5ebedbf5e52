use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{apply_text, utc_now, NewUser, User, UserProfileUpdate, UserRole};
use crate::error::{AppError, Result};
use crate::storage::Storage;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex should not panic")
});

/// Inspector accounts. Identification only; there are no credentials.
pub struct UserUseCase {
    storage: Arc<dyn Storage>,
}

impl UserUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Creates a user. The very first user may be created without an acting
    /// user and always becomes an admin; after that only admins add users.
    pub async fn create(&self, acting: Option<&User>, input: NewUser) -> Result<User> {
        let bootstrap = self.storage.count_users().await? == 0;
        let role = if bootstrap {
            UserRole::Admin
        } else {
            match acting {
                Some(user) if user.is_admin() => input.role.unwrap_or(UserRole::Inspector),
                Some(_) => return Err(AppError::Forbidden("only admins may create users".into())),
                None => return Err(AppError::Unauthorized),
            }
        };

        let email = input.email.trim().to_lowercase();
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(AppError::invalid("email", "must be a valid e-mail address"));
        }
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("name", "must not be blank"));
        }
        if self.storage.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "a user with e-mail {email} already exists"
            )));
        }

        let now = utc_now();
        let mut user = User {
            id: Uuid::new_v4(),
            email,
            name,
            role,
            lbp_number: None,
            qualifications: None,
            company: None,
            phone: None,
            created_at: now,
            updated_at: now,
        };
        apply_text(&mut user.lbp_number, input.lbp_number.map(|n| n.to_uppercase()));
        apply_text(&mut user.qualifications, input.qualifications);
        apply_text(&mut user.company, input.company);
        apply_text(&mut user.phone, input.phone);

        self.storage.create_user(&user).await?;
        if bootstrap {
            info!("Bootstrapped first admin {}", user.email);
        } else {
            info!("Created {} {}", user.role, user.email);
        }
        Ok(user)
    }

    /// Resolves the acting user from a raw id.
    pub async fn identify(&self, id: Uuid) -> Result<User> {
        self.storage
            .get_user(id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    pub async fn update_profile(&self, acting: &User, update: UserProfileUpdate) -> Result<User> {
        let mut user = self.identify(acting.id).await?;
        update.apply(&mut user);
        user.updated_at = utc_now();
        self.storage.update_user(&user).await?;
        Ok(user)
    }

    pub async fn list(&self, acting: &User) -> Result<Vec<User>> {
        if !acting.is_admin() {
            return Err(AppError::Forbidden("only admins may list users".into()));
        }
        self.storage.list_users().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::Fixture;

    fn new_user(email: &str, role: Option<UserRole>) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Pat Inspector".to_string(),
            role,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_user_becomes_admin_without_acting_user() {
        let fx = Fixture::new();
        let users = UserUseCase::new(fx.storage.clone());
        let admin = users
            .create(None, new_user("  Admin@Example.co.nz ", Some(UserRole::Inspector)))
            .await
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.email, "admin@example.co.nz");

        let err = users.create(None, new_user("second@example.co.nz", None)).await;
        assert!(matches!(err, Err(AppError::Unauthorized)));

        let inspector = users
            .create(Some(&admin), new_user("second@example.co.nz", None))
            .await
            .unwrap();
        assert_eq!(inspector.role, UserRole::Inspector);

        let err = users
            .create(Some(&inspector), new_user("third@example.co.nz", None))
            .await;
        assert!(matches!(err, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn rejects_bad_and_duplicate_emails() {
        let fx = Fixture::new();
        let users = UserUseCase::new(fx.storage.clone());
        let admin = users
            .create(None, new_user("admin@example.co.nz", None))
            .await
            .unwrap();

        let err = users.create(Some(&admin), new_user("not-an-email", None)).await;
        assert!(matches!(err, Err(AppError::Validation { .. })));

        let err = users
            .create(Some(&admin), new_user("ADMIN@example.co.nz", None))
            .await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn profile_updates_keep_role_and_email() {
        let fx = Fixture::new();
        let users = UserUseCase::new(fx.storage.clone());
        let inspector = fx.user(UserRole::Inspector).await;

        let updated = users
            .update_profile(
                &inspector,
                UserProfileUpdate {
                    lbp_number: Some("bp123456".to_string()),
                    company: Some("Top Roofs".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.lbp_number.as_deref(), Some("BP123456"));
        assert_eq!(updated.role, UserRole::Inspector);
        assert_eq!(updated.email, inspector.email);

        assert!(matches!(users.list(&inspector).await, Err(AppError::Forbidden(_))));
    }
}
