//! Authenticated-identity collaborator trait.

use async_trait::async_trait;

use crate::result::AppResult;

/// Provides the identity of the acting user to the tree services.
///
/// The HTTP layer (out of scope here) implements this against its session
/// machinery; tests use [`StaticIdentity`].
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// The currently authenticated user, if any.
    async fn current_user_id(&self) -> Option<i64>;

    /// A privileged fallback account used when no user can be resolved.
    ///
    /// Callers cache the returned id, so implementations may hit the
    /// database on every call.
    async fn fallback_user_id(&self) -> AppResult<Option<i64>>;
}

/// Fixed identity provider for tests and CLI-style callers.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    /// The id returned as the current user.
    pub current: Option<i64>,
    /// The id returned as the privileged fallback.
    pub fallback: Option<i64>,
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Option<i64> {
        self.current
    }

    async fn fallback_user_id(&self) -> AppResult<Option<i64>> {
        Ok(self.fallback)
    }
}
