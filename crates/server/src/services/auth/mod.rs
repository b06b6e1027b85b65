//! Authentication service.
//!
//! Verifies credentials and creates identities. Passwords are stored as
//! Argon2id PHC strings.

mod error;

pub use error::AuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use stockroom_core::{Email, EmailError, Role, StoreId, ValidationErrors};

use crate::db::{IdentityRepository, RepositoryError, StoreRepository};
use crate::models::{Identity, NewIdentity};

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Hash verified when the email is unknown, so both failure paths cost the same.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("stockroom-timing-equalizer").ok());

/// Self-service sign-up input.
///
/// There is deliberately no role field: self-registered identities are
/// always [`Role::Employee`].
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub store_id: Option<StoreId>,
}

/// Input for the operator flow, which may pick any role.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub store_id: StoreId,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Role,
}

/// Authentication service.
pub struct AuthService<'a> {
    identities: &'a dyn IdentityRepository,
    stores: &'a dyn StoreRepository,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        identities: &'a dyn IdentityRepository,
        stores: &'a dyn StoreRepository,
    ) -> Self {
        Self { identities, stores }
    }

    /// Verify an email/password pair.
    ///
    /// The email is matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email and for a
    /// wrong password alike.
    #[tracing::instrument(skip_all)]
    pub async fn verify(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let Ok(email) = Email::parse(email) else {
            burn_verification(password);
            return Err(AuthError::InvalidCredentials);
        };

        let Some((identity, password_hash)) = self.identities.find_credentials(&email).await?
        else {
            burn_verification(password);
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &password_hash)?;
        Ok(identity)
    }

    /// Register an identity through self-service sign-up.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Invalid` listing every violated field.
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, registration: Registration) -> Result<Identity, AuthError> {
        let mut errors = ValidationErrors::new();
        if registration.password != registration.password_confirmation {
            errors.add("password_confirmation", "doesn't match Password");
        }

        let store_id = match registration.store_id {
            Some(id) => Some(id),
            None => {
                errors.add("store", "must exist");
                None
            }
        };

        let account = store_id.map(|store_id| NewAccount {
            store_id,
            email: registration.email.clone(),
            password: registration.password.clone(),
            name: registration.name.clone(),
            role: Role::Employee,
        });

        match account {
            Some(account) => self.create_identity_with(account, errors).await,
            None => {
                // Still report email and password problems alongside the store.
                let (_, _, more) = self
                    .check_account(&registration.email, &registration.password, None)
                    .await?;
                errors.merge(more);
                Err(AuthError::Invalid(errors))
            }
        }
    }

    /// Create an identity with an explicit role (operator flow).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Invalid` listing every violated field.
    #[tracing::instrument(skip_all, fields(role = %account.role))]
    pub async fn create_identity(&self, account: NewAccount) -> Result<Identity, AuthError> {
        self.create_identity_with(account, ValidationErrors::new())
            .await
    }

    async fn create_identity_with(
        &self,
        account: NewAccount,
        mut errors: ValidationErrors,
    ) -> Result<Identity, AuthError> {
        let (email, store_ok, more) = self
            .check_account(&account.email, &account.password, Some(account.store_id))
            .await?;
        errors.merge(more);

        let email = match (email, store_ok) {
            (Some(email), true) if errors.is_empty() => email,
            _ => return Err(AuthError::Invalid(errors)),
        };

        let name = account
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());

        let identity = self
            .identities
            .create(NewIdentity {
                store_id: account.store_id,
                email,
                name,
                role: account.role,
                password_hash: hash_password(&account.password)?,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => email_taken(),
                RepositoryError::Invalid(errors) => AuthError::Invalid(errors),
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %identity.id, store_id = %identity.store_id, "identity created");
        Ok(identity)
    }

    /// Field checks shared by both creation paths.
    async fn check_account(
        &self,
        email: &str,
        password: &str,
        store_id: Option<StoreId>,
    ) -> Result<(Option<Email>, bool, ValidationErrors), AuthError> {
        let mut errors = ValidationErrors::new();

        let email = match Email::parse(email) {
            Ok(email) => {
                if self.identities.find_credentials(&email).await?.is_some() {
                    errors.add("email", "has already been taken");
                }
                Some(email)
            }
            Err(EmailError::Empty) => {
                errors.add("email", "can't be blank");
                None
            }
            Err(e) => {
                errors.add("email", e.to_string());
                None
            }
        };

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("is too short (minimum is {MIN_PASSWORD_LENGTH} characters)"),
            );
        }

        let store_ok = match store_id {
            Some(id) => {
                let exists = self.stores.find(id).await?.is_some();
                if !exists {
                    errors.add("store", "must exist");
                }
                exists
            }
            None => false,
        };

        Ok((email, store_ok, errors))
    }
}

fn email_taken() -> AuthError {
    AuthError::Invalid(ValidationErrors::single("email", "has already been taken"))
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

fn burn_verification(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}
