// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use crate::hall_of_fame::{
    FanFavoriteThresholds, DEFAULT_FAN_FAVORITE_MIN_TOURNAMENTS, DEFAULT_FAN_FAVORITE_MIN_VOTES,
};

/// Which persistence backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Whole-file JSON documents under `data_dir`.
    Json,
    /// SQLite via `database_url`.
    Sqlite,
}

impl StorageKind {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "sqlite" | "sql" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    pub storage: StorageKind,
    /// Directory holding the JSON collections.
    pub data_dir: PathBuf,
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Generated artwork served under `/outputs`.
    pub outputs_dir: PathBuf,
    /// Season new tournaments are created in.
    pub season: u32,
    /// Shared secret for administrative endpoints. Admin routes are closed
    /// when unset, unless local mode is on.
    pub admin_token: Option<String>,
    /// Whether to run in local mode (no admin check, no rate limiting).
    pub local_mode: bool,
    pub fan_favorite: FanFavoriteThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8000,
            storage: StorageKind::Json,
            data_dir: PathBuf::from("data"),
            database_url: "sqlite:pokedream.db?mode=rwc".to_string(),
            outputs_dir: PathBuf::from("outputs"),
            season: 1,
            admin_token: None,
            local_mode: false,
            fan_favorite: FanFavoriteThresholds::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 8000)
    /// - `STORAGE` - `json` or `sqlite` (default: `json`)
    /// - `DATA_DIR` - JSON collection directory (default: `data`)
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:pokedream.db?mode=rwc`)
    /// - `OUTPUTS_DIR` - artwork directory (default: `outputs`)
    /// - `POKEDREAM_SEASON` - current season (default: 1)
    /// - `ADMIN_TOKEN` - secret for admin endpoints
    /// - `POKEDREAM_LOCAL_MODE` - Set to `true` to enable local mode
    /// - `FAN_FAVORITE_MIN_VOTES` / `FAN_FAVORITE_MIN_TOURNAMENTS` - induction thresholds
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `POKEDREAM_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    /// - `--storage <KIND>` - Override the storage backend
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from CLI args and an environment lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| Self::env_parsed(&env, "PORT"))
            .unwrap_or(defaults.port);

        let storage = Self::parse_cli_value(args, "--storage")
            .or_else(|| env("STORAGE"))
            .and_then(|v| StorageKind::from_str_name(&v))
            .unwrap_or(defaults.storage);

        let data_dir = env("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);
        let database_url = env("DATABASE_URL").unwrap_or(defaults.database_url);
        let outputs_dir = env("OUTPUTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.outputs_dir);
        let season = Self::env_parsed(&env, "POKEDREAM_SEASON").unwrap_or(defaults.season);
        let admin_token = env("ADMIN_TOKEN").filter(|t| !t.trim().is_empty());

        let local_mode = args.iter().any(|a| a == "--local")
            || env("POKEDREAM_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        let fan_favorite = FanFavoriteThresholds {
            min_votes: Self::env_parsed(&env, "FAN_FAVORITE_MIN_VOTES")
                .unwrap_or(DEFAULT_FAN_FAVORITE_MIN_VOTES),
            min_tournaments: Self::env_parsed(&env, "FAN_FAVORITE_MIN_TOURNAMENTS")
                .unwrap_or(DEFAULT_FAN_FAVORITE_MIN_TOURNAMENTS),
        };

        Config {
            port,
            storage,
            data_dir,
            database_url,
            outputs_dir,
            season,
            admin_token,
            local_mode,
            fan_favorite,
        }
    }

    fn env_parsed<T: std::str::FromStr>(
        env: &dyn Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        env(key).and_then(|v| v.trim().parse().ok())
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the admin guard and rate limiter.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = load(&["pokedream-backend"], &[]);
        assert_eq!(c.port, 8000);
        assert_eq!(c.storage, StorageKind::Json);
        assert_eq!(c.data_dir, PathBuf::from("data"));
        assert_eq!(c.season, 1);
        assert!(c.admin_token.is_none());
        assert!(!c.local_mode);
        assert_eq!(c.fan_favorite, FanFavoriteThresholds::default());
    }

    #[test]
    fn test_cli_overrides_env() {
        let c = load(
            &["bin", "--port", "9100", "--local", "--storage", "sqlite"],
            &[("PORT", "7000"), ("STORAGE", "json")],
        );
        assert_eq!(c.port, 9100);
        assert_eq!(c.storage, StorageKind::Sqlite);
        assert!(c.local_mode);
    }

    #[test]
    fn test_env_values() {
        let c = load(
            &["bin"],
            &[
                ("PORT", "7000"),
                ("POKEDREAM_SEASON", "3"),
                ("ADMIN_TOKEN", "s3cret"),
                ("FAN_FAVORITE_MIN_VOTES", "10"),
                ("FAN_FAVORITE_MIN_TOURNAMENTS", "1"),
                ("POKEDREAM_LOCAL_MODE", "1"),
                ("DATA_DIR", "/tmp/pd"),
            ],
        );
        assert_eq!(c.port, 7000);
        assert_eq!(c.season, 3);
        assert_eq!(c.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(c.fan_favorite.min_votes, 10);
        assert_eq!(c.fan_favorite.min_tournaments, 1);
        assert!(c.local_mode);
        assert_eq!(c.data_dir, PathBuf::from("/tmp/pd"));
    }

    #[test]
    fn test_blank_admin_token_is_unset() {
        let c = load(&["bin"], &[("ADMIN_TOKEN", "  ")]);
        assert!(c.admin_token.is_none());
    }
}
