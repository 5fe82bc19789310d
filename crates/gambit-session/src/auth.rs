//! Token verification.
//!
//! gambit does not issue identities. An [`AuthVerifier`] talks to
//! whatever does, and [`authenticate`] applies the admission policy on top
//! of it: a bad token rejects the connection, while an unreachable auth
//! service admits the player as a guest so games can still be played.

use gambit_protocol::Identity;
use tracing::{info, warn};

use crate::ids::guest_identity;
use crate::{AuthError, SessionError};

/// Turns a client token into an identity.
///
/// `Send + Sync + 'static` because one verifier is shared by every
/// connection task for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use gambit_protocol::Identity;
/// use gambit_session::{AuthError, AuthVerifier};
///
/// struct Fixed;
///
/// impl AuthVerifier for Fixed {
///     async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
///         match token {
///             "secret" => Ok(Identity::new("u1", "Alice")),
///             _ => Err(AuthError::InvalidToken),
///         }
///     }
/// }
/// ```
pub trait AuthVerifier: Send + Sync + 'static {
    /// Verifies `token`.
    ///
    /// Return [`AuthError::InvalidToken`] for a bad credential and
    /// [`AuthError::ServiceUnavailable`] for infrastructure trouble; the
    /// two are handled very differently.
    fn verify(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}

/// Result of a successful [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub identity: Identity,
    /// The identity is a synthetic guest because the auth service was
    /// unavailable.
    pub degraded: bool,
}

/// Verifies `token` and applies the admission policy.
///
/// # Errors
/// Returns [`SessionError::AuthFailed`] for an invalid token.
pub async fn authenticate<A: AuthVerifier>(
    verifier: &A,
    token: &str,
) -> Result<Authenticated, SessionError> {
    match verifier.verify(token).await {
        Ok(identity) => {
            info!(identity = %identity, "authenticated");
            Ok(Authenticated {
                identity,
                degraded: false,
            })
        }
        Err(AuthError::InvalidToken) => {
            info!("authentication rejected: invalid token");
            Err(SessionError::AuthFailed("invalid token".into()))
        }
        Err(AuthError::ServiceUnavailable(reason)) => {
            let identity = guest_identity();
            warn!(
                degraded = true,
                identity = %identity,
                reason = %reason,
                "auth service unavailable, admitting as guest"
            );
            Ok(Authenticated {
                identity,
                degraded: true,
            })
        }
    }
}

/// Development verifier: the token is the identity.
///
/// `"alice"` becomes id `alice` named `alice`; `"alice:Alice Liddell"`
/// sets the display name explicitly. Empty tokens are rejected.
/// Never use this in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevVerifier;

impl AuthVerifier for DevVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        let (id, name) = token.split_once(':').unwrap_or((token, token));
        if id.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let name = if name.is_empty() { id } else { name };
        Ok(Identity::new(id, name))
    }
}
