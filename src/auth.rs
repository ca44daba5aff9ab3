//! Password hashing and bearer tokens.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::queries::users;
use crate::db::{Role, User};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to hash password: {0}")]
    Hashing(String),
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user id")]
    BadSubject,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// False for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = match PasswordHash::new(password_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {e}");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::BadSubject)
    }
}

/// Issues and verifies HS256 tokens for a single shared secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, lifetime: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            lifetime,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Bootstrap {
    Created(i64),
    AlreadyExists(i64),
}

/// Creates the first super-admin unless an account with that email exists.
pub async fn ensure_superadmin(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<Bootstrap> {
    if let Some(existing) = users::find_credentials_by_email(pool, email).await? {
        return Ok(Bootstrap::AlreadyExists(existing.user.id));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        anyhow::bail!("Password must be at least {MIN_PASSWORD_LEN} characters long");
    }
    let hash = hash_password(password)?;
    let id = users::create_user(pool, username, email, &hash, Role::SuperAdmin).await?;
    Ok(Bootstrap::Created(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::establish_in_memory;

    fn issuer(lifetime: Duration) -> TokenIssuer {
        TokenIssuer::new(&SecretString::from("test-secret".to_owned()), lifetime)
    }

    fn user(role: Role) -> User {
        User {
            id: 42,
            username: "doc".to_owned(),
            email: "doc@example.com".to_owned(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("s3cret!").unwrap();
        assert_ne!(hash, "s3cret!");
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("s3cret?", &hash));
        assert!(!verify_password("s3cret!", "not a phc string"));
    }

    #[test]
    fn token_carries_user_and_role() {
        let issuer = issuer(Duration::hours(24));
        let token = issuer.issue(&user(Role::SuperAdmin)).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, Role::SuperAdmin);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn expired_token_is_rejected() {
        // well past the default 60s leeway
        let issuer = issuer(Duration::minutes(-5));
        let token = issuer.issue(&user(Role::Admin)).unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = issuer(Duration::hours(1)).issue(&user(Role::Admin)).unwrap();
        let other = TokenIssuer::new(&SecretString::from("other".to_owned()), Duration::hours(1));
        assert!(other.verify(&token).is_err());
    }

    #[tokio::test]
    async fn superadmin_bootstrap_is_idempotent() {
        let pool = establish_in_memory().await.unwrap();
        let first = ensure_superadmin(&pool, "root", "root@example.com", "superadmin123")
            .await
            .unwrap();
        let Bootstrap::Created(id) = first else {
            panic!("expected a new account, got {first:?}");
        };
        let again = ensure_superadmin(&pool, "root", "root@example.com", "superadmin123")
            .await
            .unwrap();
        assert_eq!(again, Bootstrap::AlreadyExists(id));
        assert_eq!(users::get_user(&pool, id).await.unwrap().role, Role::SuperAdmin);
    }
}
