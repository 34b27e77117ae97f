// Prometheus metrics definitions for the PokéDream backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Round the current tournament is in (0 when none is running).
    pub static ref TOURNAMENT_CURRENT_ROUND: IntGauge = IntGauge::new(
        "pokedream_tournament_current_round",
        "Round of the current tournament",
    )
    .unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Votes accepted into the ledger.
    pub static ref VOTES_CAST_TOTAL: IntCounter =
        IntCounter::new("pokedream_votes_cast_total", "Votes accepted").unwrap();

    /// Votes rejected because the trainer already voted on the matchup.
    pub static ref DUPLICATE_VOTES_TOTAL: IntCounter = IntCounter::new(
        "pokedream_duplicate_votes_total",
        "Duplicate votes rejected",
    )
    .unwrap();

    pub static ref TOURNAMENTS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "pokedream_tournaments_created_total",
        "Tournaments created",
    )
    .unwrap();

    pub static ref ROUNDS_ADVANCED_TOTAL: IntCounter = IntCounter::new(
        "pokedream_rounds_advanced_total",
        "Tournament rounds resolved",
    )
    .unwrap();

    /// Hall of Fame inductions, by category.
    pub static ref INDUCTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pokedream_inductions_total", "Hall of Fame inductions"),
        &["induction_type"],
    )
    .unwrap();

    /// Pokémon registered in the Pokédex, by tier.
    pub static ref POKEMON_REGISTERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pokedream_pokemon_registered_total", "Pokémon registered"),
        &["tier"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("pokedream_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "pokedream_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Safe to call more than
/// once; repeat registrations are ignored.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TOURNAMENT_CURRENT_ROUND.clone()),
        Box::new(VOTES_CAST_TOTAL.clone()),
        Box::new(DUPLICATE_VOTES_TOTAL.clone()),
        Box::new(TOURNAMENTS_CREATED_TOTAL.clone()),
        Box::new(ROUNDS_ADVANCED_TOTAL.clone()),
        Box::new(INDUCTIONS_TOTAL.clone()),
        Box::new(POKEMON_REGISTERED_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("Metric already registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace numeric and id-like path
/// segments with `:id` to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .iter()
        .enumerate()
        .map(|(i, &segment)| {
            let parent = if i > 0 { segments[i - 1] } else { "" };
            let is_id = segment.parse::<i64>().is_ok()
                || (matches!(parent, "trainers" | "history")
                    && segment != "me"
                    && !segment.is_empty())
                || (parent == "tournaments"
                    && !matches!(segment, "current" | "history" | "vote" | ""));
            if is_id {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/pokedex"), "/api/pokedex");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(
            normalize_path("/api/tournaments/current/matchups"),
            "/api/tournaments/current/matchups"
        );
    }

    #[test]
    fn test_normalize_path_with_ids() {
        assert_eq!(normalize_path("/api/pokedex/42"), "/api/pokedex/:id");
        assert_eq!(normalize_path("/api/hall-of-fame/7"), "/api/hall-of-fame/:id");
        assert_eq!(
            normalize_path("/api/tournaments/s1w2/advance"),
            "/api/tournaments/:id/advance"
        );
        assert_eq!(
            normalize_path("/api/trainers/ab12cd34/stats"),
            "/api/trainers/:id/stats"
        );
    }

    #[test]
    fn test_normalize_path_preserves_named_segments() {
        assert_eq!(
            normalize_path("/api/trainers/me/active-time"),
            "/api/trainers/me/active-time"
        );
        assert_eq!(
            normalize_path("/api/tournaments/history"),
            "/api/tournaments/history"
        );
    }

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        register_metrics();
        VOTES_CAST_TOTAL.inc();
        let output = gather_metrics();
        assert!(output.contains("pokedream_votes_cast_total"));
    }

    #[test]
    fn test_metric_increments() {
        TOURNAMENT_CURRENT_ROUND.set(2);
        assert_eq!(TOURNAMENT_CURRENT_ROUND.get(), 2);

        let before = DUPLICATE_VOTES_TOTAL.get();
        DUPLICATE_VOTES_TOTAL.inc();
        assert!(DUPLICATE_VOTES_TOTAL.get() > before);

        INDUCTIONS_TOTAL.with_label_values(&["champion"]).inc();
        POKEMON_REGISTERED_TOTAL
            .with_label_values(&["legendary"])
            .inc();
        API_REQUEST_DURATION_SECONDS
            .with_label_values(&["/api/pokedex"])
            .observe(0.05);
        API_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/pokedex", "200"])
            .inc();
    }
}
