use tracing::{info, warn};

use crate::error::AuthError;
use crate::model::User;
use crate::storage::{Storage, StorageKey};

/// Registered users and the "current user" pointer.
///
/// Credentials are compared in plaintext; this is a personal tracker, not an
/// access-control boundary.
pub struct AuthService<'a> {
    storage: &'a Storage,
}

impl<'a> AuthService<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Usernames are stored and matched with surrounding whitespace trimmed
    pub fn register(&self, user: User) -> Result<(), AuthError> {
        let user = User::new(user.username.trim(), user.password);
        if user.username.is_empty() || user.password.is_empty() {
            return Err(AuthError::MissingField);
        }

        let mut users = self.users();
        if users.iter().any(|u| u.username == user.username) {
            warn!(username = %user.username, "registration rejected: username taken");
            return Err(AuthError::UsernameTaken);
        }

        info!(username = %user.username, "registered user");
        users.push(user);
        self.storage.write_json(&StorageKey::Users, &users)?;
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        let user = self
            .users()
            .into_iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;

        self.storage.write_json(&StorageKey::CurrentUser, &user)?;
        info!(username = %user.username, "logged in");
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        if let Some(user) = self.current_user() {
            info!(username = %user.username, "logged out");
        }
        self.storage.remove(&StorageKey::CurrentUser)?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.storage.read_json(&StorageKey::CurrentUser)
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn users(&self) -> Vec<User> {
        self.storage.read_list(&StorageKey::Users)
    }
}
