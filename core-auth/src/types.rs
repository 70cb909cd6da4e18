use bridge_traits::{AccountId, ProviderKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::surface::SurfaceHandle;

/// One in-flight authorization handshake.
///
/// Owns the surface until the handshake settles.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub provider: ProviderKind,
    pub surface: SurfaceHandle,
    /// Origin result messages must come from; `None` accepts any origin
    pub allowed_origin: Option<String>,
    /// Required `source` field of result messages
    pub source_tag: String,
    pub timeout: Duration,
}

/// Outcome reported by the authorization surface.
///
/// # Examples
///
/// ```
/// use core_auth::AuthorizationResult;
///
/// let result: AuthorizationResult = serde_json::from_str(
///     r#"{"ok": true, "accountId": 42, "identifier": "ada@example.com"}"#,
/// ).unwrap();
/// assert!(result.ok);
/// assert_eq!(result.account_id.map(|id| id.value()), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
    pub ok: bool,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Wire shape of a result message posted by the redirect page.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HandshakeMessage {
    pub source: String,
    #[serde(flatten)]
    pub result: AuthorizationResult,
}

/// Handshake lifecycle.
///
/// `Opening` and `AwaitingAuth` are the setup steps in `HandshakeChannel`
/// and only appear in its logs; the session tracks the state from
/// `AwaitingMessage` on.
///
/// ```text
/// Opening -> AwaitingAuth -> AwaitingMessage -> Resolved
///    |            |                 |
///    +------------+-----------------+---------> Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    /// Surface is being opened
    Opening,
    /// Asking the account service for the authorization URL
    AwaitingAuth,
    /// Waiting for the result message, closure or timeout
    AwaitingMessage,
    /// A qualifying result message arrived
    Resolved,
    /// Timed out, closed by the user, cancelled, or failed to start
    Rejected,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Resolved | HandshakeState::Rejected)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Opening => write!(f, "Opening"),
            HandshakeState::AwaitingAuth => write!(f, "Awaiting authorization URL"),
            HandshakeState::AwaitingMessage => write!(f, "Awaiting result"),
            HandshakeState::Resolved => write!(f, "Resolved"),
            HandshakeState::Rejected => write!(f, "Rejected"),
        }
    }
}

/// A resolved handshake.
///
/// The caller owns the surface from here on; it closes when dropped.
#[derive(Debug)]
pub struct Authorized {
    pub provider: ProviderKind,
    pub result: AuthorizationResult,
    pub surface: SurfaceHandle,
}

impl Authorized {
    /// The bound account, or why there is none.
    pub fn account(&self) -> Result<(AccountId, Option<String>)> {
        if !self.result.ok {
            return Err(AuthError::Denied {
                provider: self.provider.to_string(),
                message: self
                    .result
                    .error
                    .clone()
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }

        let account_id = self.result.account_id.ok_or(AuthError::MissingAccount)?;
        Ok((account_id, self.result.identifier.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_message_parsing() {
        let message: HandshakeMessage = serde_json::from_value(serde_json::json!({
            "source": "sender-inbox-oauth",
            "ok": true,
            "accountId": 9,
            "identifier": "ada@example.com",
            "provider": "gmail",
        }))
        .unwrap();

        assert_eq!(message.source, "sender-inbox-oauth");
        assert_eq!(message.result.account_id, Some(AccountId(9)));
        assert_eq!(message.result.provider.as_deref(), Some("gmail"));
    }

    #[test]
    fn test_handshake_message_requires_ok() {
        let parsed = serde_json::from_value::<HandshakeMessage>(serde_json::json!({
            "source": "sender-inbox-oauth",
            "accountId": 9,
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(HandshakeState::Resolved.is_terminal());
        assert!(HandshakeState::Rejected.is_terminal());
        assert!(!HandshakeState::AwaitingMessage.is_terminal());
        assert!(!HandshakeState::Opening.is_terminal());
    }
}
