//! Auth and rate-limit gate, checked in front of every protocol operation.

use crate::error::ApiError;
use crate::store::entities::TokenInfo;
use crate::store::Store;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rolling admission window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);
/// Total cost budget per token inside the window.
pub const RATE_BUDGET: u32 = 100;
/// Request header that forces a deterministic 429 for flagged tokens.
pub const FORCE_RATE_LIMIT_HEADER: &str = "x-mock-force-429";

/// Operation kinds and their quota weights. Search scans the full item set,
/// hence the premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCost {
    Read,
    Write,
    Search,
}

impl OperationCost {
    pub fn weight(self) -> u32 {
        match self {
            OperationCost::Read => 1,
            OperationCost::Write => 2,
            OperationCost::Search => 5,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: String,
    pub force_rate_limit: bool,
}

impl From<TokenInfo> for Principal {
    fn from(info: TokenInfo) -> Self {
        Principal {
            account_id: info.account_id,
            force_rate_limit: info.force_rate_limit,
        }
    }
}

/// Cost-weighted sliding-window limiter. Entries older than the window are
/// pruned lazily before each admission check.
pub struct RateLimiter {
    window: Duration,
    budget: u32,
    windows: Mutex<HashMap<String, Vec<(Instant, u32)>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, budget: u32) -> Self {
        RateLimiter {
            window,
            budget,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject a call of the given cost for this token.
    pub fn admit(&self, token: &str, cost: u32) -> Result<(), ApiError> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let entries = windows.entry(token.to_string()).or_default();
        entries.retain(|(at, _)| now.duration_since(*at) < self.window);

        let spent: u32 = entries.iter().map(|(_, c)| c).sum();
        if spent + cost > self.budget {
            let oldest = entries.iter().map(|(at, _)| *at).min().unwrap_or(now);
            let until_free = self.window.saturating_sub(now.duration_since(oldest));
            let retry_after_secs = until_free.as_secs().max(1);
            debug!(token, spent, cost, "rate limit rejection");
            return Err(ApiError::RateLimited {
                retry_after_secs,
                remaining: self.budget.saturating_sub(spent),
                reset_epoch_secs: Utc::now().timestamp() + retry_after_secs as i64,
            });
        }

        entries.push((now, cost));
        Ok(())
    }

    /// The rejection produced by the forced-failure header: nothing is
    /// consumed or checked, the answer is always 429.
    pub fn forced_rejection(&self) -> ApiError {
        ApiError::RateLimited {
            retry_after_secs: self.window.as_secs(),
            remaining: 0,
            reset_epoch_secs: Utc::now().timestamp() + self.window.as_secs() as i64,
        }
    }
}

/// Validates bearer tokens against the store and applies the limiter.
pub struct Gate {
    store: Arc<Store>,
    limiter: RateLimiter,
}

impl Gate {
    pub fn new(store: Arc<Store>) -> Self {
        Gate {
            store,
            limiter: RateLimiter::new(RATE_WINDOW, RATE_BUDGET),
        }
    }

    /// Full admission: authentication, forced-failure override, then the
    /// cost check.
    pub fn check(
        &self,
        authorization: Option<&str>,
        force_rate_limit: bool,
        cost: OperationCost,
    ) -> Result<Principal, ApiError> {
        let (token, principal) = self.authenticate(authorization)?;

        if force_rate_limit && principal.force_rate_limit {
            return Err(self.limiter.forced_rejection());
        }

        self.limiter.admit(&token, cost.weight())?;
        Ok(principal)
    }

    /// Authentication without rate limiting, for operator endpoints.
    pub fn authenticate_only(&self, authorization: Option<&str>) -> Result<Principal, ApiError> {
        self.authenticate(authorization).map(|(_, p)| p)
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<(String, Principal), ApiError> {
        let header = authorization
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized("Authorization header must use the Bearer scheme".into())
            })?
            .trim();

        let info = self
            .store
            .lookup_token(token)
            .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;
        Ok((token.to_string(), info.into()))
    }
}
