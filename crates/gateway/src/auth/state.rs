//! OAuth `state` generation and the pending-state binding.
//!
//! A state is bound twice: the browser gets it in an `HttpOnly` cookie and the
//! server remembers it until the callback arrives or the TTL lapses. The
//! callback must present the same value in both places, and only once.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};

use super::AuthError;

/// Entropy per state before encoding.
pub const STATE_BYTES: usize = 16;

/// Cookie carrying the state issued to this browser.
pub const STATE_COOKIE: &str = "oauth_state";

/// Generate an unguessable, URL-safe state token from the OS CSPRNG.
pub fn generate_state() -> Result<String, AuthError> {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(AuthError::RandomSource)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Minimum spacing between sweeps of expired states.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// States issued by `/auth/login` that have not been redeemed yet.
///
/// Holds at most `capacity` entries. Expired entries are swept at most once
/// per [`PRUNE_INTERVAL`]; when the map is still full afterwards new logins
/// are refused until states are redeemed or expire.
#[derive(Debug)]
pub struct PendingStates {
    issued: DashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
    last_pruned: Mutex<Option<Instant>>,
}

impl PendingStates {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            issued: DashMap::new(),
            ttl,
            capacity,
            last_pruned: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Generate a fresh state and remember it.
    pub fn issue(&self) -> Result<String, AuthError> {
        self.issue_at(Instant::now())
    }

    /// Like [`issue`](Self::issue), with `now` as the clock reading.
    pub fn issue_at(&self, now: Instant) -> Result<String, AuthError> {
        self.prune_if_due(now);

        if self.issued.len() >= self.capacity {
            return Err(AuthError::LoginCapacityExceeded);
        }

        let state = generate_state()?;
        self.issued.insert(state.clone(), now);
        Ok(state)
    }

    /// Redeem a state. Succeeds at most once per issued state, and only
    /// within the TTL.
    pub fn consume(&self, state: &str) -> Result<(), AuthError> {
        self.consume_at(state, Instant::now())
    }

    pub fn consume_at(&self, state: &str, now: Instant) -> Result<(), AuthError> {
        match self.issued.remove(state) {
            Some((_, issued_at)) if now.saturating_duration_since(issued_at) < self.ttl => Ok(()),
            _ => Err(AuthError::StateMismatch),
        }
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Drop expired states unless another sweep ran within the interval.
    /// Concurrent callers skip the sweep instead of waiting for it.
    fn prune_if_due(&self, now: Instant) {
        let Ok(mut last_pruned) = self.last_pruned.try_lock() else {
            return;
        };
        if let Some(last) = *last_pruned {
            if now.saturating_duration_since(last) < PRUNE_INTERVAL {
                return;
            }
        }
        *last_pruned = Some(now);

        let before = self.issued.len();
        self.issued
            .retain(|_, issued_at| now.saturating_duration_since(*issued_at) < self.ttl);
        let pruned = before.saturating_sub(self.issued.len());
        if pruned > 0 {
            tracing::debug!("Pruned {} expired OAuth states", pruned);
        }
    }
}

/// Check the callback's `state` against the browser cookie and the server-side
/// record. The server-side entry is consumed even when the cookie disagrees so
/// a leaked state cannot be replayed.
pub fn validate_callback_state(
    pending: &PendingStates,
    headers: &HeaderMap,
    presented: &str,
) -> Result<(), AuthError> {
    let bound = state_from_cookie(headers);
    let redeemed = pending.consume(presented);

    match bound {
        Some(cookie_state) if cookie_state == presented => redeemed,
        _ => Err(AuthError::StateMismatch),
    }
}

fn state_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| cookie::Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == STATE_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// Build the `Set-Cookie` value that binds a state to the browser.
pub fn build_state_cookie(state: &str, ttl: Duration, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/auth; HttpOnly; SameSite=Lax; Max-Age={}{}",
        STATE_COOKIE,
        state,
        ttl.as_secs(),
        secure
    )
}

/// Build the `Set-Cookie` value that removes the state cookie.
pub fn clear_state_cookie(secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}=; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=0{}",
        STATE_COOKIE, secure
    )
}
