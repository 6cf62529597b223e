//! Acting-user resolution with a cached privileged fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;

use legajo_core::identity::IdentityProvider;

/// How long a resolved fallback id stays cached.
const FALLBACK_CACHE_TTL: Duration = Duration::from_secs(300);

/// Resolves the user id to attribute mutations to.
///
/// Resolution order: the explicit id passed by the caller (zero is a
/// valid id, not a sentinel), then the provider's current session user,
/// then a privileged fallback account. The fallback lookup may hit the
/// database, so its result is cached for a short TTL.
#[derive(Debug, Clone)]
pub struct ActingUserResolver {
    provider: Arc<dyn IdentityProvider>,
    cached_fallback: Arc<RwLock<Option<(Option<i64>, Instant)>>>,
}

impl ActingUserResolver {
    /// Build a resolver over the given identity provider.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            cached_fallback: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolve the acting user for one operation.
    pub async fn resolve(&self, explicit: Option<i64>) -> Option<i64> {
        if explicit.is_some() {
            return explicit;
        }
        if let Some(current) = self.provider.current_user_id().await {
            return Some(current);
        }
        self.fallback().await
    }

    async fn fallback(&self) -> Option<i64> {
        {
            let cached = self.cached_fallback.read().await;
            if let Some((id, fetched_at)) = *cached {
                if fetched_at.elapsed() < FALLBACK_CACHE_TTL {
                    return id;
                }
            }
        }

        let id = match self.provider.fallback_user_id().await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "Failed to resolve fallback user");
                None
            }
        };
        *self.cached_fallback.write().await = Some((id, Instant::now()));
        id
    }
}
