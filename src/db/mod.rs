// Database access layer (SQLite via sqlx).

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{AppError, Result};
use crate::models::{
    name_key, ChallengeCompletion, DexNumber, InductionDetails, Inductee, NewPokemon, Pokemon,
    Stats, Tier, Tournament, Trainer, Vote,
};
use crate::store::{Store, TrainerDelta};

#[derive(Debug, Clone, sqlx::FromRow)]
struct PokemonRow {
    dex_number: i64,
    name: String,
    types: String,
    stats: String,
    tier: String,
    trainer_id: String,
    trainer_name: String,
    is_shiny: bool,
    culture: Option<String>,
    category: Option<String>,
    pokedex_entry: Option<String>,
    image_url: Option<String>,
    added_at: DateTime<Utc>,
}

impl TryFrom<PokemonRow> for Pokemon {
    type Error = AppError;

    fn try_from(row: PokemonRow) -> Result<Self> {
        let stats: Stats = serde_json::from_str(&row.stats)?;
        Ok(Pokemon {
            dex_number: row.dex_number,
            id: Pokemon::public_id(row.dex_number),
            name: row.name,
            types: serde_json::from_str(&row.types)?,
            stats,
            tier: Tier::from_str_name(&row.tier).unwrap_or_default(),
            trainer_id: row.trainer_id,
            trainer_name: row.trainer_name,
            is_shiny: row.is_shiny,
            culture: row.culture,
            category: row.category,
            pokedex_entry: row.pokedex_entry,
            image_url: row.image_url,
            added_at: row.added_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TrainerRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    active_time_seconds: i64,
    pokemon_created: i64,
    shinies_found: i64,
}

impl From<TrainerRow> for Trainer {
    fn from(row: TrainerRow) -> Self {
        Trainer {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            last_seen: row.last_seen,
            active_time_seconds: row.active_time_seconds,
            pokemon_created: row.pokemon_created,
            shinies_found: row.shinies_found,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct VoteRow {
    matchup_id: String,
    trainer_id: String,
    pokemon_id: i64,
    timestamp: DateTime<Utc>,
}

impl From<VoteRow> for Vote {
    fn from(row: VoteRow) -> Self {
        Vote {
            matchup_id: row.matchup_id,
            trainer_id: row.trainer_id,
            pokemon_id: row.pokemon_id,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct InducteeRow {
    pokemon_id: i64,
    details: String,
    induction_date: DateTime<Utc>,
    creator_quote: Option<String>,
}

impl TryFrom<InducteeRow> for Inductee {
    type Error = AppError;

    fn try_from(row: InducteeRow) -> Result<Self> {
        let details: InductionDetails = serde_json::from_str(&row.details)?;
        Ok(Inductee {
            pokemon_id: row.pokemon_id,
            details,
            induction_date: row.induction_date,
            creator_quote: row.creator_quote,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CompletionRow {
    trainer_id: String,
    challenge_id: String,
    pokemon_id: String,
    completed_at: DateTime<Utc>,
}

impl From<CompletionRow> for ChallengeCompletion {
    fn from(row: CompletionRow) -> Self {
        ChallengeCompletion {
            trainer_id: row.trainer_id,
            challenge_id: row.challenge_id,
            pokemon_id: row.pokemon_id,
            completed_at: row.completed_at,
        }
    }
}

const POKEMON_COLUMNS: &str = "dex_number, name, types, stats, tier, trainer_id, trainer_name, \
     is_shiny, culture, category, pokedex_entry, image_url, added_at";

const TRAINER_COLUMNS: &str =
    "id, name, created_at, last_seen, active_time_seconds, pokemon_created, shinies_found";

/// Map a unique-constraint violation to a conflict with the given message.
fn conflict_on_unique(e: sqlx::Error, msg: impl FnOnce() -> String) -> AppError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(msg())
        }
        _ => AppError::Database(e),
    }
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// A private in-memory database. A single connection that is never
    /// recycled keeps the data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pokemon (
                dex_number INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                types TEXT NOT NULL,
                stats TEXT NOT NULL,
                tier TEXT NOT NULL DEFAULT 'fully_evolved',
                trainer_id TEXT NOT NULL,
                trainer_name TEXT NOT NULL DEFAULT '',
                is_shiny INTEGER NOT NULL DEFAULT 0,
                culture TEXT,
                category TEXT,
                pokedex_entry TEXT,
                image_url TEXT,
                added_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pokemon_trainer ON pokemon(trainer_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trainers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                active_time_seconds INTEGER NOT NULL DEFAULT 0,
                pokemon_created INTEGER NOT NULL DEFAULT 0,
                shinies_found INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tournaments (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                season INTEGER NOT NULL,
                week INTEGER NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                matchup_id TEXT NOT NULL,
                trainer_id TEXT NOT NULL,
                pokemon_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                UNIQUE(matchup_id, trainer_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_trainer ON votes(trainer_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_pokemon ON votes(pokemon_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hall_of_fame (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pokemon_id INTEGER NOT NULL UNIQUE,
                induction_type TEXT NOT NULL,
                details TEXT NOT NULL,
                induction_date TEXT NOT NULL,
                creator_quote TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS challenge_completions (
                trainer_id TEXT NOT NULL,
                challenge_id TEXT NOT NULL,
                pokemon_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (trainer_id, challenge_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl Store for Database {
    // ── Pokédex ──────────────────────────────────────────────────────

    async fn add_pokemon(&self, new: NewPokemon, added_at: DateTime<Utc>) -> Result<Pokemon> {
        let types = serde_json::to_string(&new.types)?;
        let stats = serde_json::to_string(&new.stats)?;
        let dex_number: i64 = sqlx::query_scalar(
            "INSERT INTO pokemon (name, name_key, types, stats, tier, trainer_id, trainer_name, \
             is_shiny, culture, category, pokedex_entry, image_url, added_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING dex_number",
        )
        .bind(&new.name)
        .bind(name_key(&new.name))
        .bind(types)
        .bind(stats)
        .bind(new.tier.as_str())
        .bind(&new.trainer_id)
        .bind(&new.trainer_name)
        .bind(new.is_shiny)
        .bind(&new.culture)
        .bind(&new.category)
        .bind(&new.pokedex_entry)
        .bind(&new.image_url)
        .bind(added_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || format!("A Pokémon named {} already exists", new.name))
        })?;
        Ok(new.into_pokemon(dex_number, added_at))
    }

    async fn list_pokemon(&self) -> Result<Vec<Pokemon>> {
        let rows = sqlx::query_as::<_, PokemonRow>(&format!(
            "SELECT {POKEMON_COLUMNS} FROM pokemon ORDER BY dex_number"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Pokemon::try_from).collect()
    }

    async fn get_pokemon(&self, dex_number: DexNumber) -> Result<Option<Pokemon>> {
        let row = sqlx::query_as::<_, PokemonRow>(&format!(
            "SELECT {POKEMON_COLUMNS} FROM pokemon WHERE dex_number = ?"
        ))
        .bind(dex_number)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Pokemon::try_from).transpose()
    }

    async fn pokemon_by_trainer(&self, trainer_id: &str) -> Result<Vec<Pokemon>> {
        let rows = sqlx::query_as::<_, PokemonRow>(&format!(
            "SELECT {POKEMON_COLUMNS} FROM pokemon WHERE trainer_id = ? ORDER BY dex_number"
        ))
        .bind(trainer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Pokemon::try_from).collect()
    }

    // ── Trainers ─────────────────────────────────────────────────────

    async fn insert_trainer(&self, trainer: &Trainer) -> Result<()> {
        sqlx::query(
            "INSERT INTO trainers (id, name, name_key, created_at, last_seen, \
             active_time_seconds, pokemon_created, shinies_found) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trainer.id)
        .bind(&trainer.name)
        .bind(name_key(&trainer.name))
        .bind(trainer.created_at)
        .bind(trainer.last_seen)
        .bind(trainer.active_time_seconds)
        .bind(trainer.pokemon_created)
        .bind(trainer.shinies_found)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("Trainer name {} or id {} is taken", trainer.name, trainer.id)
            })
        })?;
        Ok(())
    }

    async fn get_trainer(&self, id: &str) -> Result<Option<Trainer>> {
        let row = sqlx::query_as::<_, TrainerRow>(&format!(
            "SELECT {TRAINER_COLUMNS} FROM trainers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Trainer::from))
    }

    async fn get_trainer_by_name(&self, name: &str) -> Result<Option<Trainer>> {
        let row = sqlx::query_as::<_, TrainerRow>(&format!(
            "SELECT {TRAINER_COLUMNS} FROM trainers WHERE name_key = ?"
        ))
        .bind(name_key(name))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Trainer::from))
    }

    async fn list_trainers(&self) -> Result<Vec<Trainer>> {
        let rows = sqlx::query_as::<_, TrainerRow>(&format!(
            "SELECT {TRAINER_COLUMNS} FROM trainers ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Trainer::from).collect())
    }

    async fn record_trainer_activity(
        &self,
        id: &str,
        delta: TrainerDelta,
    ) -> Result<Option<Trainer>> {
        let result = sqlx::query(
            "UPDATE trainers SET active_time_seconds = active_time_seconds + ?, \
             pokemon_created = pokemon_created + ?, shinies_found = shinies_found + ?, \
             last_seen = ? WHERE id = ?",
        )
        .bind(delta.active_time_seconds)
        .bind(delta.pokemon_created)
        .bind(delta.shinies_found)
        .bind(delta.seen_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_trainer(id).await
    }

    // ── Tournaments ──────────────────────────────────────────────────

    async fn list_tournaments(&self) -> Result<Vec<Tournament>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT data FROM tournaments ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(AppError::from))
            .collect()
    }

    async fn get_tournament(&self, id: &str) -> Result<Option<Tournament>> {
        let row: Option<String> = sqlx::query_scalar("SELECT data FROM tournaments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|data| serde_json::from_str(&data)).transpose()?)
    }

    async fn save_tournament(&self, tournament: &Tournament) -> Result<()> {
        let data = serde_json::to_string(tournament)?;
        let status = match tournament.status {
            crate::models::TournamentStatus::Active => "active",
            crate::models::TournamentStatus::Complete => "complete",
        };
        sqlx::query(
            "INSERT INTO tournaments (id, season, week, status, data) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
        )
        .bind(&tournament.id)
        .bind(tournament.season)
        .bind(tournament.week)
        .bind(status)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Vote ledger ──────────────────────────────────────────────────

    async fn append_vote(&self, vote: &Vote) -> Result<()> {
        sqlx::query(
            "INSERT INTO votes (matchup_id, trainer_id, pokemon_id, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(&vote.matchup_id)
        .bind(&vote.trainer_id)
        .bind(vote.pokemon_id)
        .bind(vote.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || "You already voted on this matchup".to_string()))?;
        Ok(())
    }

    async fn votes_for_matchup(&self, matchup_id: &str) -> Result<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT matchup_id, trainer_id, pokemon_id, timestamp FROM votes WHERE matchup_id = ? ORDER BY id",
        )
        .bind(matchup_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Vote::from).collect())
    }

    async fn votes_by_trainer(&self, trainer_id: &str) -> Result<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT matchup_id, trainer_id, pokemon_id, timestamp FROM votes WHERE trainer_id = ? ORDER BY id",
        )
        .bind(trainer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Vote::from).collect())
    }

    async fn votes_for_pokemon(&self, dex_number: DexNumber) -> Result<Vec<Vote>> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT matchup_id, trainer_id, pokemon_id, timestamp FROM votes WHERE pokemon_id = ? ORDER BY id",
        )
        .bind(dex_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Vote::from).collect())
    }

    // ── Hall of Fame ─────────────────────────────────────────────────

    async fn insert_inductee(&self, inductee: &Inductee) -> Result<()> {
        let details = serde_json::to_string(&inductee.details)?;
        sqlx::query(
            "INSERT INTO hall_of_fame (pokemon_id, induction_type, details, induction_date, creator_quote) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(inductee.pokemon_id)
        .bind(inductee.induction_type().as_str())
        .bind(details)
        .bind(inductee.induction_date)
        .bind(&inductee.creator_quote)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || "Pokémon already in Hall of Fame".to_string()))?;
        Ok(())
    }

    async fn get_inductee(&self, pokemon_id: DexNumber) -> Result<Option<Inductee>> {
        let row = sqlx::query_as::<_, InducteeRow>(
            "SELECT pokemon_id, details, induction_date, creator_quote FROM hall_of_fame WHERE pokemon_id = ?",
        )
        .bind(pokemon_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Inductee::try_from).transpose()
    }

    async fn list_inductees(&self) -> Result<Vec<Inductee>> {
        let rows = sqlx::query_as::<_, InducteeRow>(
            "SELECT pokemon_id, details, induction_date, creator_quote FROM hall_of_fame ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Inductee::try_from).collect()
    }

    // ── Daily challenges ─────────────────────────────────────────────

    async fn insert_completion(&self, completion: &ChallengeCompletion) -> Result<()> {
        sqlx::query(
            "INSERT INTO challenge_completions (trainer_id, challenge_id, pokemon_id, completed_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&completion.trainer_id)
        .bind(&completion.challenge_id)
        .bind(&completion.pokemon_id)
        .bind(completion.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || "Challenge already completed today".to_string()))?;
        Ok(())
    }

    async fn completions_for_trainer(&self, trainer_id: &str) -> Result<Vec<ChallengeCompletion>> {
        let rows = sqlx::query_as::<_, CompletionRow>(
            "SELECT trainer_id, challenge_id, pokemon_id, completed_at FROM challenge_completions \
             WHERE trainer_id = ? ORDER BY completed_at",
        )
        .bind(trainer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChallengeCompletion::from).collect())
    }
}
