//! Authentication collaborator surface.

use std::sync::RwLock;

/// Read-only view of the current session.
///
/// Token storage and refresh live elsewhere; the sync layer only asks
/// whether a session exists and which bearer token to present.
pub trait AuthProvider: Send + Sync {
    /// Returns the current access token, if signed in.
    fn access_token(&self) -> Option<String>;

    /// Returns true while a session is present.
    fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }
}

/// A settable in-memory session, for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct StaticAuth {
    token: RwLock<Option<String>>,
}

impl StaticAuth {
    /// Creates a signed-in session.
    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Creates a signed-out session.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replaces the token (sign-in or refresh).
    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
        }
    }

    /// Clears the token (sign-out).
    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }
}

impl AuthProvider for StaticAuth {
    fn access_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }
}
