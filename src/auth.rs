//! Caller identity attached to requests by the auth middleware.

use subtle::ConstantTimeEq;

use crate::config::AuthApiSecret;

/// Identity of the caller. `id` is `None` for anonymous requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub id: Option<String>,
}

impl Auth {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }

    /// Anonymous context, inserted when authentication is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }
}

/// Find the id of the API secret matching `token`.
///
/// Every configured secret is compared in constant time, and the scan does not stop
/// at the first match.
pub fn match_api_secret_id<'a>(token: &str, secrets: &'a [AuthApiSecret]) -> Option<&'a str> {
    let mut matched = None;
    for entry in secrets {
        if bool::from(entry.secret.as_bytes().ct_eq(token.as_bytes())) && matched.is_none() {
            matched = Some(entry.id.as_str());
        }
    }
    matched
}
