//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{ChangePassword, NewUser, Role, SignupRequest, UpdateProfile, User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create a member account
    pub async fn signup(&self, request: SignupRequest) -> AppResult<User> {
        request.validate()?;

        let user = NewUser {
            email: request.email.trim().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            role: Role::Member,
            password_hash: self.hash_password(&request.password)?,
        };

        let created = self.repository.users.create(&user).await?;
        tracing::info!(user_id = created.id, "Account created for {}", created.email);
        Ok(created)
    }

    /// Authenticate by email and password and return a JWT token
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_email(email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            tracing::debug!("Rejected login for {}", user.email);
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository
            .users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    /// Update own profile; absent fields are left unchanged
    pub async fn update_profile(&self, user_id: i32, profile: UpdateProfile) -> AppResult<User> {
        profile.validate()?;

        let mut user = self.get_by_id(user_id).await?;
        if let Some(email) = profile.email {
            user.email = email.trim().to_string();
        }
        if let Some(first_name) = profile.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = profile.last_name {
            user.last_name = last_name.trim().to_string();
        }

        self.repository.users.update(&user).await
    }

    /// Change own password, after checking the current one
    pub async fn change_password(&self, user_id: i32, request: ChangePassword) -> AppResult<()> {
        request.validate()?;

        let user = self.get_by_id(user_id).await?;
        if !self.verify_password(&user, &request.current_password)? {
            return Err(AppError::BadRequest("Current password is incorrect".to_string()));
        }

        let hash = self.hash_password(&request.new_password)?;
        self.repository.users.update_password(user_id, &hash).await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Change the role of an account (admin only)
    pub async fn set_role(&self, user_id: i32, role: Role) -> AppResult<User> {
        let mut user = self.get_by_id(user_id).await?;
        user.role = role;
        let updated = self.repository.users.update(&user).await?;
        tracing::info!(user_id, "Role changed to {}", role);
        Ok(updated)
    }

    /// Delete an account; refused while it still has items on loan
    pub async fn delete_user(&self, user_id: i32) -> AppResult<()> {
        self.repository.users.delete(user_id).await?;
        tracing::info!(user_id, "Account deleted");
        Ok(())
    }

    pub async fn count(&self) -> AppResult<i64> {
        self.repository.users.count().await
    }

    /// Create the configured administrator account if it does not exist yet
    pub async fn ensure_admin(&self, email: &str, password: &str) -> AppResult<User> {
        if let Some(existing) = self.repository.users.get_by_email(email).await? {
            if existing.role == Role::Admin {
                return Ok(existing);
            }
            return self.set_role(existing.id, Role::Admin).await;
        }

        let admin = NewUser {
            email: email.to_string(),
            first_name: "Library".to_string(),
            last_name: "Administrator".to_string(),
            role: Role::Admin,
            password_hash: self.hash_password(password)?,
        };
        let created = self.repository.users.create(&admin).await?;
        tracing::info!(user_id = created.id, "Administrator account {} created", email);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> UsersService {
        UsersService::new(Repository::in_memory(), AuthConfig::default())
    }

    fn signup(email: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let service = service();
        let user = service.signup(signup("grace@example.org")).await.unwrap();
        assert_eq!(user.role, Role::Member);
        assert_ne!(user.password_hash, "correct horse");

        let (token, logged_in) = service.authenticate("GRACE@example.org", "correct horse").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        let claims = UserClaims::from_token(&token, &AuthConfig::default().jwt_secret).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Member);

        let wrong = service.authenticate("grace@example.org", "incorrect").await;
        assert!(matches!(wrong, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_signup_rejects_bad_input_and_duplicates() {
        let service = service();

        let mut short = signup("ada@example.org");
        short.password = "short".to_string();
        assert!(matches!(service.signup(short).await, Err(AppError::Validation(_))));

        assert!(matches!(
            service.signup(signup("not-an-email")).await,
            Err(AppError::Validation(_))
        ));

        service.signup(signup("ada@example.org")).await.unwrap();
        assert!(matches!(
            service.signup(signup("Ada@Example.org")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let service = service();
        let user = service.signup(signup("linus@example.org")).await.unwrap();

        let wrong = ChangePassword {
            current_password: "nope".to_string(),
            new_password: "new password".to_string(),
        };
        assert!(matches!(
            service.change_password(user.id, wrong).await,
            Err(AppError::BadRequest(_))
        ));

        let right = ChangePassword {
            current_password: "correct horse".to_string(),
            new_password: "new password".to_string(),
        };
        service.change_password(user.id, right).await.unwrap();
        assert!(service.authenticate("linus@example.org", "new password").await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let service = service();
        let first = service.ensure_admin("admin@example.org", "administrator").await.unwrap();
        let second = service.ensure_admin("admin@example.org", "administrator").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Admin);
        assert_eq!(service.count().await.unwrap(), 1);
    }
}
