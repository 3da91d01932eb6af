//! Client authentication providers.
//!
//! Server-to-server streams authenticate with dialback; client streams go
//! through an [`AuthProvider`]. The only provider shipped here is
//! [`AnonymousProvider`], which has no accounts and optionally hands out
//! SASL ANONYMOUS logins with random usernames.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by authentication providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The provider does not store passwords.
    #[error("password operations are not supported by the {0} provider")]
    PasswordsUnsupported(&'static str),

    /// The provider cannot create or delete accounts.
    #[error("account management is not supported by the {0} provider")]
    AccountsUnsupported(&'static str),

    /// A provider with this name is already registered.
    #[error("authentication provider '{0}' is already registered")]
    DuplicateProvider(String),
}

/// Result of one SASL exchange step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslOutcome {
    /// Authentication finished; the stream is bound to `username`.
    Success { username: String },
    /// Authentication was refused.
    Failure,
}

/// A server-side SASL mechanism instance for one negotiation.
pub trait SaslMechanism: Send {
    /// The mechanism name advertised in stream features.
    fn name(&self) -> &'static str;

    /// Processes the client's response (or initial response).
    fn step(&mut self, response: &[u8]) -> SaslOutcome;
}

/// Account storage and SASL for one virtual host.
pub trait AuthProvider: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    fn test_password(&self, username: &str, password: &str) -> Result<bool, AuthError>;
    fn get_password(&self, username: &str) -> Result<String, AuthError>;
    fn set_password(&self, username: &str, password: &str) -> Result<(), AuthError>;
    fn user_exists(&self, username: &str) -> bool;
    fn create_user(&self, username: &str, password: &str) -> Result<(), AuthError>;
    fn delete_user(&self, username: &str) -> Result<(), AuthError>;

    /// A fresh SASL mechanism, or `None` when the provider offers no login.
    fn sasl_mechanism(&self) -> Option<Box<dyn SaslMechanism>>;
}

/// Provider without accounts. Logins are anonymous, when allowed at all.
#[derive(Debug, Clone, Default)]
pub struct AnonymousProvider {
    allow_anonymous: bool,
}

impl AnonymousProvider {
    pub const NAME: &'static str = "anonymous";

    pub fn new(allow_anonymous: bool) -> Self {
        Self { allow_anonymous }
    }
}

impl AuthProvider for AnonymousProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn test_password(&self, _username: &str, _password: &str) -> Result<bool, AuthError> {
        Err(AuthError::PasswordsUnsupported(Self::NAME))
    }

    fn get_password(&self, _username: &str) -> Result<String, AuthError> {
        Err(AuthError::PasswordsUnsupported(Self::NAME))
    }

    fn set_password(&self, _username: &str, _password: &str) -> Result<(), AuthError> {
        Err(AuthError::PasswordsUnsupported(Self::NAME))
    }

    fn user_exists(&self, _username: &str) -> bool {
        false
    }

    fn create_user(&self, _username: &str, _password: &str) -> Result<(), AuthError> {
        Err(AuthError::AccountsUnsupported(Self::NAME))
    }

    fn delete_user(&self, _username: &str) -> Result<(), AuthError> {
        Err(AuthError::AccountsUnsupported(Self::NAME))
    }

    fn sasl_mechanism(&self) -> Option<Box<dyn SaslMechanism>> {
        if !self.allow_anonymous {
            return None;
        }
        Some(Box::new(AnonymousMechanism))
    }
}

/// SASL ANONYMOUS: succeeds with a random username.
///
/// The optional trace token must be UTF-8 of at most 255 characters.
#[derive(Debug)]
struct AnonymousMechanism;

impl SaslMechanism for AnonymousMechanism {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn step(&mut self, response: &[u8]) -> SaslOutcome {
        match std::str::from_utf8(response) {
            Ok(trace) if trace.chars().count() <= 255 => {}
            _ => return SaslOutcome::Failure,
        }
        let username = Uuid::new_v4().to_string();
        tracing::debug!(%username, "anonymous login");
        SaslOutcome::Success { username }
    }
}

/// Authentication providers by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn AuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `provider` under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateProvider`] if the name is taken; the
    /// existing provider is kept.
    pub fn register(&mut self, provider: Arc<dyn AuthProvider>) -> Result<(), AuthError> {
        let name = provider.name();
        if self.providers.contains_key(name) {
            return Err(AuthError::DuplicateProvider(name.to_string()));
        }
        tracing::debug!(provider = name, "registered authentication provider");
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
