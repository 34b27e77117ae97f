// In-memory per-trainer rate limiter for write endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{http::StatusCode, response::IntoResponse, Json};

/// Rate-limited actions and their budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Votes cast per minute.
    Votes,
    /// Pokémon registered per hour.
    PokemonSubmissions,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::Votes => 30,
            RateLimitType::PokemonSubmissions => 20,
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::Votes => Duration::from_secs(60),
            RateLimitType::PokemonSubmissions => Duration::from_secs(3600),
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::Votes => write!(f, "votes per minute"),
            RateLimitType::PokemonSubmissions => write!(f, "Pokémon submissions per hour"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rate limit exceeded: max {} {}", self.max, self.limit_type)
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Key for the rate limit map: (trainer_id, limit_type).
type LimitKey = (String, RateLimitType);

/// Thread-safe sliding-window rate limiter.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for the trainer if it fits the budget.
    /// Always passes in local mode.
    pub fn check_limit(
        &self,
        trainer_id: &str,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        if crate::config::is_local_mode() {
            return Ok(());
        }
        self.check_at(trainer_id, limit_type, Instant::now())
    }

    fn check_at(
        &self,
        trainer_id: &str,
        limit_type: RateLimitType,
        now: Instant,
    ) -> Result<(), RateLimitError> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = limit_type.window();
        let max = limit_type.max_count();

        let entries = map
            .entry((trainer_id.to_string(), limit_type))
            .or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            tracing::debug!(trainer_id, %limit_type, "Rate limit hit");
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Give back the most recent event, for actions that were admitted but
    /// then rejected.
    pub fn refund(&self, trainer_id: &str, limit_type: RateLimitType) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = map.get_mut(&(trainer_id.to_string(), limit_type)) {
            entries.pop();
        }
    }

    /// Events currently counted against the trainer.
    pub fn current_count(&self, trainer_id: &str, limit_type: RateLimitType) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = limit_type.window();
        let now = Instant::now();

        match map.get_mut(&(trainer_id.to_string(), limit_type)) {
            Some(entries) => {
                entries.retain(|t| now.duration_since(*t) < window);
                entries.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_within_limit_then_denies() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..20 {
            assert!(limiter
                .check_at("ash", RateLimitType::PokemonSubmissions, now)
                .is_ok());
        }
        let err = limiter
            .check_at("ash", RateLimitType::PokemonSubmissions, now)
            .unwrap_err();
        assert_eq!(err.max, 20);
        assert_eq!(err.limit_type, RateLimitType::PokemonSubmissions);
    }

    #[test]
    fn test_separate_trainers_and_types() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..30 {
            limiter.check_at("ash", RateLimitType::Votes, now).unwrap();
        }
        assert!(limiter.check_at("ash", RateLimitType::Votes, now).is_err());
        assert!(limiter.check_at("misty", RateLimitType::Votes, now).is_ok());
        assert!(limiter
            .check_at("ash", RateLimitType::PokemonSubmissions, now)
            .is_ok());
    }

    #[test]
    fn test_window_expires() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..30 {
            limiter.check_at("ash", RateLimitType::Votes, start).unwrap();
        }
        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("ash", RateLimitType::Votes, later).is_ok());
    }

    #[test]
    fn test_current_count() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.current_count("ash", RateLimitType::Votes), 0);
        limiter
            .check_at("ash", RateLimitType::Votes, Instant::now())
            .unwrap();
        assert_eq!(limiter.current_count("ash", RateLimitType::Votes), 1);
    }

    #[test]
    fn test_refund_returns_budget() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..30 {
            limiter.check_at("ash", RateLimitType::Votes, now).unwrap();
        }
        limiter.refund("ash", RateLimitType::Votes);
        assert_eq!(limiter.current_count("ash", RateLimitType::Votes), 29);
        assert!(limiter.check_at("ash", RateLimitType::Votes, now).is_ok());

        // Nothing recorded, nothing to give back.
        limiter.refund("misty", RateLimitType::Votes);
        assert_eq!(limiter.current_count("misty", RateLimitType::Votes), 0);
    }

    #[test]
    fn test_rate_limit_error_display() {
        let err = RateLimitError {
            limit_type: RateLimitType::Votes,
            max: 30,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: max 30 votes per minute"
        );
    }
}
