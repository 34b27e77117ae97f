// Trainer profiles: registration by name, activity heartbeat, stats and the
// leaderboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{PokemonType, Trainer};
use crate::name_filter;
use crate::store::{Store, TrainerDelta};
use crate::voting::{TrainerVoteStats, VoteLedger};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
/// Longest heartbeat interval accepted in one update.
pub const MAX_HEARTBEAT_SECONDS: i64 = 3600;
/// Fresh ids tried before registration gives up.
const ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct TrainerStats {
    pub trainer: Trainer,
    pub pokemon_count: usize,
    pub shinies: usize,
    pub type_counts: BTreeMap<PokemonType, usize>,
    pub types_discovered: usize,
    pub voting: TrainerVoteStats,
}

pub struct Trainers<S> {
    store: Arc<S>,
}

impl<S: Store> Trainers<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a trainer by name. An existing name (ignoring case) returns
    /// the existing profile with `false`.
    pub async fn register(&self, name: &str, now: DateTime<Utc>) -> Result<(Trainer, bool)> {
        let name = name_filter::check_name(name)?;
        let name = name_filter::sanitize_name(name);

        if let Some(existing) = self.store.get_trainer_by_name(&name).await? {
            return Ok((existing, false));
        }

        for _ in 0..ID_ATTEMPTS {
            let trainer = Trainer::new(&name, now);
            match self.store.insert_trainer(&trainer).await {
                Ok(()) => {
                    tracing::info!(trainer_id = %trainer.id, name = %trainer.name, "Trainer registered");
                    return Ok((trainer, true));
                }
                // Either the name was taken concurrently or the id collided.
                Err(AppError::Conflict(_)) => {
                    if let Some(existing) = self.store.get_trainer_by_name(&name).await? {
                        return Ok((existing, false));
                    }
                    tracing::warn!(trainer_id = %trainer.id, "Trainer id collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Conflict(format!(
            "Could not allocate an id for trainer {name}"
        )))
    }

    pub async fn get(&self, id: &str) -> Result<Trainer> {
        self.store
            .get_trainer(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Trainer {id}")))
    }

    /// Add active seconds and refresh `last_seen`.
    pub async fn heartbeat(&self, id: &str, seconds: i64, now: DateTime<Utc>) -> Result<Trainer> {
        if !(0..=MAX_HEARTBEAT_SECONDS).contains(&seconds) {
            return Err(AppError::InvalidInput(format!(
                "Active time must be between 0 and {MAX_HEARTBEAT_SECONDS} seconds"
            )));
        }
        let delta = TrainerDelta {
            active_time_seconds: seconds,
            ..TrainerDelta::touch(now)
        };
        self.store
            .record_trainer_activity(id, delta)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Trainer {id}")))
    }

    pub async fn stats(&self, id: &str) -> Result<TrainerStats> {
        let trainer = self.get(id).await?;
        let pokemon = self.store.pokemon_by_trainer(id).await?;

        let mut type_counts = BTreeMap::new();
        for t in pokemon.iter().flat_map(|p| p.types.iter()) {
            *type_counts.entry(*t).or_insert(0) += 1;
        }
        let voting = VoteLedger::new(&*self.store).trainer_stats(id).await?;

        Ok(TrainerStats {
            trainer,
            pokemon_count: pokemon.len(),
            shinies: pokemon.iter().filter(|p| p.is_shiny).count(),
            types_discovered: type_counts.len(),
            type_counts,
            voting,
        })
    }

    /// Trainers ordered by Pokémon created, then shinies found.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Trainer>> {
        let mut trainers = self.store.list_trainers().await?;
        trainers.sort_by(|a, b| {
            b.pokemon_created
                .cmp(&a.pokemon_created)
                .then(b.shinies_found.cmp(&a.shinies_found))
                .then(a.created_at.cmp(&b.created_at))
        });
        trainers.truncate(limit);
        Ok(trainers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::json::JsonStore;

    fn trainers() -> Trainers<JsonStore> {
        Trainers::new(Arc::new(JsonStore::in_memory()))
    }

    #[tokio::test]
    async fn test_register_is_idempotent_by_name() {
        let t = trainers();
        let (first, created) = t.register("  Gary   Oak ", Utc::now()).await.unwrap();
        assert!(created);
        assert_eq!(first.name, "Gary Oak");
        assert_eq!(first.id.len(), 8);

        let (again, created) = t.register("gary oak", Utc::now()).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_names() {
        let t = trainers();
        assert!(matches!(
            t.register("x", Utc::now()).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            t.register("<b>", Utc::now()).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_accumulates() {
        let t = trainers();
        let (trainer, _) = t.register("Brock", Utc::now()).await.unwrap();
        t.heartbeat(&trainer.id, 30, Utc::now()).await.unwrap();
        let updated = t.heartbeat(&trainer.id, 45, Utc::now()).await.unwrap();
        assert_eq!(updated.active_time_seconds, 75);

        assert!(matches!(
            t.heartbeat(&trainer.id, -5, Utc::now()).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            t.heartbeat("missing", 5, Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_and_leaderboard() {
        let store = Arc::new(JsonStore::in_memory());
        let t = Trainers::new(store.clone());
        let (a, _) = t.register("Misty", Utc::now()).await.unwrap();
        let (b, _) = t.register("Brock", Utc::now()).await.unwrap();

        let delta = TrainerDelta {
            pokemon_created: 2,
            ..TrainerDelta::touch(Utc::now())
        };
        store.record_trainer_activity(&b.id, delta).await.unwrap();

        let board = t.leaderboard(DEFAULT_LEADERBOARD_LIMIT).await.unwrap();
        assert_eq!(board[0].id, b.id);
        assert_eq!(board[1].id, a.id);
        assert_eq!(t.leaderboard(1).await.unwrap().len(), 1);

        let stats = t.stats(&a.id).await.unwrap();
        assert_eq!(stats.pokemon_count, 0);
        assert_eq!(stats.types_discovered, 0);
        assert_eq!(stats.voting.total_votes, 0);
    }
}
