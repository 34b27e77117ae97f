// Vote ledger: one immutable vote per (matchup, trainer), with tallies and
// per-Pokémon / per-trainer aggregates derived on demand.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{tournament_of_matchup, DexNumber, Vote};
use crate::store::Store;

/// A trainer's voting history summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrainerVoteStats {
    pub total_votes: u32,
    pub tournaments_participated: u32,
}

/// Borrowed view over the store's vote collection.
pub struct VoteLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> VoteLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Append a vote. Rejects a second vote by the same trainer on the same
    /// matchup, whichever Pokémon it names.
    pub async fn cast_vote(
        &self,
        matchup_id: &str,
        trainer_id: &str,
        pokemon_id: DexNumber,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        if self.has_voted(matchup_id, trainer_id).await? {
            metrics::DUPLICATE_VOTES_TOTAL.inc();
            return Err(duplicate_vote());
        }

        let vote = Vote {
            matchup_id: matchup_id.to_string(),
            trainer_id: trainer_id.to_string(),
            pokemon_id,
            timestamp: now,
        };
        match self.store.append_vote(&vote).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                metrics::DUPLICATE_VOTES_TOTAL.inc();
                return Err(duplicate_vote());
            }
            Err(e) => return Err(e),
        }

        metrics::VOTES_CAST_TOTAL.inc();
        tracing::debug!(matchup_id, trainer_id, pokemon_id, "Vote recorded");
        Ok(vote)
    }

    pub async fn has_voted(&self, matchup_id: &str, trainer_id: &str) -> Result<bool> {
        Ok(self
            .store
            .votes_for_matchup(matchup_id)
            .await?
            .iter()
            .any(|v| v.trainer_id == trainer_id))
    }

    /// Votes per Pokémon on one matchup.
    pub async fn tally(&self, matchup_id: &str) -> Result<HashMap<DexNumber, u32>> {
        let mut counts = HashMap::new();
        for vote in self.store.votes_for_matchup(matchup_id).await? {
            *counts.entry(vote.pokemon_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Votes for `a` and `b` on one matchup.
    pub async fn tally_pair(&self, matchup_id: &str, a: DexNumber, b: DexNumber) -> Result<(u32, u32)> {
        let counts = self.tally(matchup_id).await?;
        let get = |id| counts.get(&id).copied().unwrap_or(0);
        Ok((get(a), get(b)))
    }

    /// Votes received across every tournament.
    pub async fn pokemon_total_votes(&self, pokemon_id: DexNumber) -> Result<u32> {
        Ok(self.store.votes_for_pokemon(pokemon_id).await?.len() as u32)
    }

    /// Votes received within one tournament.
    pub async fn pokemon_tournament_votes(
        &self,
        pokemon_id: DexNumber,
        tournament_id: &str,
    ) -> Result<u32> {
        Ok(self
            .store
            .votes_for_pokemon(pokemon_id)
            .await?
            .iter()
            .filter(|v| tournament_of_matchup(&v.matchup_id) == tournament_id)
            .count() as u32)
    }

    pub async fn trainer_stats(&self, trainer_id: &str) -> Result<TrainerVoteStats> {
        let votes = self.store.votes_by_trainer(trainer_id).await?;
        let tournaments: HashSet<&str> = votes
            .iter()
            .map(|v| tournament_of_matchup(&v.matchup_id))
            .collect();
        Ok(TrainerVoteStats {
            total_votes: votes.len() as u32,
            tournaments_participated: tournaments.len() as u32,
        })
    }

    pub async fn trainer_votes_in_tournament(
        &self,
        trainer_id: &str,
        tournament_id: &str,
    ) -> Result<Vec<Vote>> {
        Ok(self
            .store
            .votes_by_trainer(trainer_id)
            .await?
            .into_iter()
            .filter(|v| tournament_of_matchup(&v.matchup_id) == tournament_id)
            .collect())
    }
}

fn duplicate_vote() -> AppError {
    AppError::Conflict("You already voted on this matchup".to_string())
}
