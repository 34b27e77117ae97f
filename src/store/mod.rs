// Storage interface for every persisted collection.
//
// Two backends implement it: `json::JsonStore` (whole-file JSON documents,
// also usable purely in memory) and `crate::db::Database` (SQLite via sqlx).

pub mod json;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ChallengeCompletion, DexNumber, Inductee, NewPokemon, Pokemon, Tournament, Trainer, Vote,
};

/// Additive change applied to a trainer's counters.
#[derive(Debug, Clone, Copy)]
pub struct TrainerDelta {
    pub active_time_seconds: i64,
    pub pokemon_created: i64,
    pub shinies_found: i64,
    pub seen_at: DateTime<Utc>,
}

impl TrainerDelta {
    pub fn touch(seen_at: DateTime<Utc>) -> Self {
        Self {
            active_time_seconds: 0,
            pokemon_created: 0,
            shinies_found: 0,
            seen_at,
        }
    }

    pub fn apply(&self, trainer: &mut Trainer) {
        trainer.active_time_seconds += self.active_time_seconds;
        trainer.pokemon_created += self.pokemon_created;
        trainer.shinies_found += self.shinies_found;
        trainer.last_seen = self.seen_at;
    }
}

/// Repository over the Pokédex, trainers, tournaments, the vote ledger,
/// the Hall of Fame and daily challenge completions.
///
/// Insert operations that guard a uniqueness rule return
/// [`AppError::Conflict`](crate::error::AppError::Conflict) when the rule
/// would be broken, so callers racing past a pre-check still cannot create
/// duplicates.
pub trait Store: Send + Sync + 'static {
    // ── Pokédex ──────────────────────────────────────────────────────

    /// Assign the next dex number and store the Pokémon. Names are unique
    /// ignoring case.
    fn add_pokemon(
        &self,
        new: NewPokemon,
        added_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Pokemon>> + Send;

    /// Every Pokémon in dex order.
    fn list_pokemon(&self) -> impl Future<Output = Result<Vec<Pokemon>>> + Send;

    fn get_pokemon(
        &self,
        dex_number: DexNumber,
    ) -> impl Future<Output = Result<Option<Pokemon>>> + Send;

    fn pokemon_by_trainer(
        &self,
        trainer_id: &str,
    ) -> impl Future<Output = Result<Vec<Pokemon>>> + Send;

    // ── Trainers ─────────────────────────────────────────────────────

    /// Insert a new profile. Names are unique ignoring case.
    fn insert_trainer(&self, trainer: &Trainer) -> impl Future<Output = Result<()>> + Send;

    fn get_trainer(&self, id: &str) -> impl Future<Output = Result<Option<Trainer>>> + Send;

    fn get_trainer_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Trainer>>> + Send;

    fn list_trainers(&self) -> impl Future<Output = Result<Vec<Trainer>>> + Send;

    /// Apply `delta` to the trainer's counters. `None` if the trainer does not exist.
    fn record_trainer_activity(
        &self,
        id: &str,
        delta: TrainerDelta,
    ) -> impl Future<Output = Result<Option<Trainer>>> + Send;

    // ── Tournaments ──────────────────────────────────────────────────

    /// All tournaments in creation order.
    fn list_tournaments(&self) -> impl Future<Output = Result<Vec<Tournament>>> + Send;

    fn get_tournament(&self, id: &str)
        -> impl Future<Output = Result<Option<Tournament>>> + Send;

    /// Insert or replace by tournament id.
    fn save_tournament(&self, tournament: &Tournament) -> impl Future<Output = Result<()>> + Send;

    // ── Vote ledger ──────────────────────────────────────────────────

    /// Append a vote. At most one vote per (matchup, trainer).
    fn append_vote(&self, vote: &Vote) -> impl Future<Output = Result<()>> + Send;

    fn votes_for_matchup(
        &self,
        matchup_id: &str,
    ) -> impl Future<Output = Result<Vec<Vote>>> + Send;

    fn votes_by_trainer(&self, trainer_id: &str)
        -> impl Future<Output = Result<Vec<Vote>>> + Send;

    fn votes_for_pokemon(
        &self,
        dex_number: DexNumber,
    ) -> impl Future<Output = Result<Vec<Vote>>> + Send;

    // ── Hall of Fame ─────────────────────────────────────────────────

    /// Store an inductee. At most one record per Pokémon.
    fn insert_inductee(&self, inductee: &Inductee) -> impl Future<Output = Result<()>> + Send;

    fn get_inductee(
        &self,
        pokemon_id: DexNumber,
    ) -> impl Future<Output = Result<Option<Inductee>>> + Send;

    /// All inductees in induction order.
    fn list_inductees(&self) -> impl Future<Output = Result<Vec<Inductee>>> + Send;

    // ── Daily challenges ─────────────────────────────────────────────

    /// Record a completion. At most one per (trainer, challenge).
    fn insert_completion(
        &self,
        completion: &ChallengeCompletion,
    ) -> impl Future<Output = Result<()>> + Send;

    fn completions_for_trainer(
        &self,
        trainer_id: &str,
    ) -> impl Future<Output = Result<Vec<ChallengeCompletion>>> + Send;
}
