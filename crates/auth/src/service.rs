//! Registration, login and token validation.

use std::sync::Arc;

use forum_shared::{LoginRequest, RegisterRequest, TokenService};

use crate::error::AuthError;
use crate::password;
use crate::store::{NewUser, UserRepository};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an account and return its id together with a fresh token.
    pub async fn register(&self, req: RegisterRequest) -> Result<(i64, String), AuthError> {
        req.validate().map_err(AuthError::Validation)?;

        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(format!("hashing error: {e}")))?;

        let user_id = self
            .users
            .create(NewUser {
                username: req.username.clone(),
                password_hash,
                email: req.email,
            })
            .await?;

        let token = self.tokens.issue(user_id, &req.username)?;
        tracing::info!(user_id, username = %req.username, "User registered");
        Ok((user_id, token))
    }

    /// Exchange credentials for a token. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn login(&self, req: LoginRequest) -> Result<String, AuthError> {
        let user = self.users.get_by_username(&req.username).await?;

        // Unknown users still pay for a full verification.
        let password = req.password;
        let stored = user
            .as_ref()
            .map_or_else(|| password::DUMMY_HASH.to_string(), |u| u.password_hash.clone());
        let matches = tokio::task::spawn_blocking(move || password::verify_password(&password, &stored))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let Some(user) = user else {
            tracing::warn!(username = %req.username, "Login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        if !matches {
            tracing::warn!(user_id = user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(user.id, &user.username)?;
        tracing::info!(user_id = user.id, "Login successful");
        Ok(token)
    }

    /// Verify a token and confirm its subject still exists.
    pub async fn validate(&self, token: &str) -> Result<i64, AuthError> {
        let identity = self.tokens.verify(token)?;
        if self.users.get_by_id(identity.user_id).await?.is_none() {
            return Err(AuthError::Unauthorized("unknown user".to_string()));
        }
        Ok(identity.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::store::SqliteUserRepository;
    use std::time::Duration;

    fn service() -> AuthService {
        let users = Arc::new(SqliteUserRepository::new(init_database(":memory:").unwrap()));
        let tokens = TokenService::new("secret", Duration::from_secs(600), forum_shared::DEFAULT_ISSUER).unwrap();
        AuthService::new(users, tokens)
    }

    fn register_req(name: &str) -> RegisterRequest {
        RegisterRequest {
            username: name.to_string(),
            password: "password123".to_string(),
            email: format!("{name}@example.com"),
        }
    }

    #[tokio::test]
    async fn register_issues_token_for_new_user() {
        let auth = service();
        let (id, token) = auth.register(register_req("alice")).await.unwrap();
        let identity = auth.tokens().verify(&token).unwrap();
        assert_eq!(identity.user_id, id);
        assert_eq!(identity.username, "alice");
        assert_eq!(auth.validate(&token).await.unwrap(), id);
    }

    #[tokio::test]
    async fn register_rejects_invalid_input_and_duplicates() {
        let auth = service();
        let mut bad = register_req("alice");
        bad.password = "short".into();
        assert!(matches!(auth.register(bad).await, Err(AuthError::Validation(_))));

        auth.register(register_req("alice")).await.unwrap();
        assert!(matches!(
            auth.register(register_req("alice")).await,
            Err(AuthError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let auth = service();
        auth.register(register_req("bob")).await.unwrap();

        let token = auth
            .login(LoginRequest { username: "bob".into(), password: "password123".into() })
            .await
            .unwrap();
        assert_eq!(auth.tokens().verify(&token).unwrap().username, "bob");

        let wrong = auth
            .login(LoginRequest { username: "bob".into(), password: "nope-nope".into() })
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

        let unknown = auth
            .login(LoginRequest { username: "carol".into(), password: "password123".into() })
            .await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn unknown_user_login_costs_a_password_verification() {
        let auth = service();
        auth.register(register_req("bob")).await.unwrap();

        let started = std::time::Instant::now();
        let wrong = auth
            .login(LoginRequest { username: "bob".into(), password: "nope-nope".into() })
            .await;
        let wrong_elapsed = started.elapsed();

        let started = std::time::Instant::now();
        let unknown = auth
            .login(LoginRequest { username: "nobody".into(), password: "nope-nope".into() })
            .await;
        let unknown_elapsed = started.elapsed();

        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(
            unknown_elapsed * 4 >= wrong_elapsed,
            "unknown user took {unknown_elapsed:?}, wrong password took {wrong_elapsed:?}"
        );
    }

    #[tokio::test]
    async fn validate_rejects_tokens_for_unknown_users() {
        let auth = service();
        let orphan = auth.tokens().issue(77, "ghost").unwrap();
        assert!(matches!(auth.validate(&orphan).await, Err(AuthError::Unauthorized(_))));
        assert!(matches!(auth.validate("garbage").await, Err(AuthError::Unauthorized(_))));
    }
}
