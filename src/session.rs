//! Identity provider consulted before authenticated fetches and claims.

use std::sync::{PoisonError, RwLock};

pub trait SessionProvider: Send + Sync {
  fn auth_token(&self) -> Option<String>;

  fn username(&self) -> Option<String>;

  /// No token means not authenticated, whatever else is known.
  fn is_authenticated(&self) -> bool {
    self.auth_token().is_some()
  }

  /// Username and token together, if both are known.
  fn credentials(&self) -> Option<(String, String)> {
    Some((self.username()?, self.auth_token()?))
  }
}

#[derive(Debug, Default, Clone)]
struct Identity {
  username: Option<String>,
  token: Option<String>,
}

/// Session held in memory, switched explicitly via [`login`](Self::login)
/// and [`logout`](Self::logout).
#[derive(Debug, Default)]
pub struct StaticSession {
  identity: RwLock<Identity>,
}

impl StaticSession {
  pub fn new(username: Option<String>, token: Option<String>) -> Self {
    Self {
      identity: RwLock::new(Identity {
        username,
        token: token.filter(|t| !t.trim().is_empty()),
      }),
    }
  }

  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn login(&self, username: impl Into<String>, token: impl Into<String>) {
    let mut identity = self.identity.write().unwrap_or_else(PoisonError::into_inner);
    identity.username = Some(username.into());
    identity.token = Some(token.into());
  }

  pub fn logout(&self) {
    *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Identity::default();
  }

  fn read(&self) -> Identity {
    self
      .identity
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

impl SessionProvider for StaticSession {
  fn auth_token(&self) -> Option<String> {
    self.read().token
  }

  fn username(&self) -> Option<String> {
    self.read().username
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_login_logout() {
    let session = StaticSession::anonymous();
    assert!(!session.is_authenticated());
    assert_eq!(session.credentials(), None);

    session.login("alice", "t0k3n");
    assert!(session.is_authenticated());
    assert_eq!(
      session.credentials(),
      Some(("alice".to_string(), "t0k3n".to_string()))
    );

    session.logout();
    assert!(!session.is_authenticated());
    assert_eq!(session.username(), None);
  }

  #[test]
  fn test_blank_token_is_unauthenticated() {
    let session = StaticSession::new(Some("alice".into()), Some("  ".into()));
    assert!(!session.is_authenticated());
    assert_eq!(session.username().as_deref(), Some("alice"));
  }
}
