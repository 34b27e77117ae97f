// Tournament lifecycle: creation from the Pokédex, voting rules on top of the
// ledger, and manual round advancement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::bracket::{self, RoundOutcome};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{DexNumber, Matchup, MatchupStatus, Tournament, Vote};
use crate::store::Store;
use crate::voting::VoteLedger;

/// Default number of tournaments returned by [`TournamentService::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// The open round of the current tournament, with live tallies.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRound {
    pub tournament_id: String,
    pub round: u8,
    pub matchups: Vec<Matchup>,
}

pub struct TournamentService<S> {
    store: Arc<S>,
    season: u32,
    rng: Mutex<StdRng>,
    /// Serializes create/advance/vote so check-then-write sequences do not
    /// interleave within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl<S: Store> TournamentService<S> {
    pub fn new(store: Arc<S>, season: u32) -> Self {
        Self::with_rng(store, season, StdRng::from_entropy())
    }

    pub fn with_rng(store: Arc<S>, season: u32, rng: StdRng) -> Self {
        Self {
            store,
            season,
            rng: Mutex::new(rng),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn season(&self) -> u32 {
        self.season
    }

    fn ledger(&self) -> VoteLedger<'_, S> {
        VoteLedger::new(&*self.store)
    }

    /// The tournament whose 14-day window contains `now`, if any.
    pub async fn current(&self, now: DateTime<Utc>) -> Result<Option<Tournament>> {
        Ok(self
            .store
            .list_tournaments()
            .await?
            .into_iter()
            .find(|t| t.is_current(now)))
    }

    async fn require_current(&self, now: DateTime<Utc>) -> Result<Tournament> {
        self.current(now)
            .await?
            .ok_or_else(|| AppError::not_found("Active tournament"))
    }

    /// Build and store a new tournament from the catalog. Refused while
    /// another tournament is current.
    pub async fn create(&self, now: DateTime<Utc>) -> Result<Tournament> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.current(now).await? {
            return Err(AppError::Conflict(format!(
                "Tournament {} is still running",
                existing.id
            )));
        }

        let catalog = self.store.list_pokemon().await?;
        let entrants = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            bracket::select_entrants(&catalog, now, &mut *rng)?
        };

        let week = self
            .store
            .list_tournaments()
            .await?
            .iter()
            .filter(|t| t.season == self.season)
            .count() as u32
            + 1;

        let tournament = bracket::new_tournament(self.season, week, entrants, now);
        self.store.save_tournament(&tournament).await?;

        metrics::TOURNAMENTS_CREATED_TOTAL.inc();
        metrics::TOURNAMENT_CURRENT_ROUND.set(1);
        tracing::info!(
            tournament_id = %tournament.id,
            participants = tournament.participants.len(),
            "Tournament created"
        );
        Ok(tournament)
    }

    /// Active matchups of the current round, with vote counts read from the
    /// ledger.
    pub async fn active_matchups(&self, now: DateTime<Utc>) -> Result<ActiveRound> {
        let tournament = self.require_current(now).await?;
        let ledger = self.ledger();

        let mut matchups = Vec::new();
        for matchup in tournament.round(tournament.current_round).unwrap_or_default() {
            if matchup.status != MatchupStatus::Active {
                continue;
            }
            let mut m = matchup.clone();
            if let (Some(a), Some(b)) = (m.pokemon_a_id, m.pokemon_b_id) {
                let (votes_a, votes_b) = ledger.tally_pair(&m.matchup_id, a, b).await?;
                m.votes_a = votes_a;
                m.votes_b = votes_b;
            }
            matchups.push(m);
        }

        Ok(ActiveRound {
            tournament_id: tournament.id,
            round: tournament.current_round,
            matchups,
        })
    }

    /// Cast a vote on a matchup of the current round.
    pub async fn cast_vote(
        &self,
        trainer_id: &str,
        matchup_id: &str,
        pokemon_id: DexNumber,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        let _guard = self.write_lock.lock().await;

        let tournament = self.require_current(now).await?;
        let matchup = tournament
            .find_matchup(matchup_id)
            .filter(|m| m.round == tournament.current_round)
            .ok_or_else(|| AppError::not_found(format!("Matchup {matchup_id}")))?;

        if matchup.status != MatchupStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Matchup {matchup_id} is not open for voting"
            )));
        }
        if !matchup.is_participant(pokemon_id) {
            return Err(AppError::InvalidInput(format!(
                "Pokémon #{pokemon_id} is not in matchup {matchup_id}"
            )));
        }
        if let Some(pokemon) = self.store.get_pokemon(pokemon_id).await? {
            if pokemon.trainer_id == trainer_id {
                return Err(AppError::Forbidden(
                    "You cannot vote for your own Pokémon".to_string(),
                ));
            }
        }

        self.ledger()
            .cast_vote(matchup_id, trainer_id, pokemon_id, now)
            .await
    }

    /// Resolve the current round of `tournament_id` from the ledger's tallies.
    pub async fn advance(&self, tournament_id: &str) -> Result<(Tournament, RoundOutcome)> {
        let _guard = self.write_lock.lock().await;

        let mut tournament = self.get(tournament_id).await?;

        let ledger = self.ledger();
        let mut tallies = HashMap::new();
        for matchup in tournament.round(tournament.current_round).unwrap_or_default() {
            if let (Some(a), Some(b)) = (matchup.pokemon_a_id, matchup.pokemon_b_id) {
                let counts = ledger.tally_pair(&matchup.matchup_id, a, b).await?;
                tallies.insert(matchup.matchup_id.clone(), counts);
            }
        }

        let outcome = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            bracket::resolve_round(&mut tournament, &tallies, &mut *rng)?
        };
        self.store.save_tournament(&tournament).await?;

        metrics::ROUNDS_ADVANCED_TOTAL.inc();
        metrics::TOURNAMENT_CURRENT_ROUND.set(i64::from(tournament.current_round));
        match outcome {
            RoundOutcome::Advanced { round } => {
                tracing::info!(tournament_id, round, "Tournament advanced");
            }
            RoundOutcome::Champion { pokemon_id } => {
                tracing::info!(tournament_id, pokemon_id, "Tournament champion crowned");
            }
        }
        Ok((tournament, outcome))
    }

    pub async fn get(&self, tournament_id: &str) -> Result<Tournament> {
        self.store
            .get_tournament(tournament_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Tournament {tournament_id}")))
    }

    /// Most recent first by start date.
    pub async fn history(&self, limit: usize) -> Result<Vec<Tournament>> {
        let mut tournaments = self.store.list_tournaments().await?;
        tournaments.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        tournaments.truncate(limit);
        Ok(tournaments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPokemon, PokemonType, Stats, Tier, TournamentStatus};
    use crate::store::json::JsonStore;
    use chrono::Duration;

    async fn seeded_store(count: usize) -> Arc<JsonStore> {
        let store = Arc::new(JsonStore::in_memory());
        for i in 0..count {
            store
                .add_pokemon(
                    NewPokemon {
                        name: format!("Dreamon{i}"),
                        types: vec![PokemonType::ALL[i % PokemonType::ALL.len()]],
                        stats: Stats {
                            hp: 70,
                            attack: 70,
                            defense: 70,
                            sp_attack: 70,
                            sp_defense: 70,
                            speed: 70,
                        },
                        tier: Tier::MidGame,
                        trainer_id: "owner".to_string(),
                        trainer_name: "Oak".to_string(),
                        is_shiny: false,
                        culture: None,
                        category: None,
                        pokedex_entry: None,
                        image_url: None,
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        store
    }

    fn service(store: Arc<JsonStore>) -> TournamentService<JsonStore> {
        TournamentService::with_rng(store, 1, StdRng::seed_from_u64(42))
    }

    #[tokio::test]
    async fn test_create_tournament() {
        let svc = service(seeded_store(16).await);
        let now = Utc::now();
        let t = svc.create(now).await.unwrap();
        assert_eq!(t.id, "s1w1");
        assert_eq!(t.participants.len(), 16);
        assert_eq!(t.current_round, 1);
        assert_eq!(t.status, TournamentStatus::Active);

        let current = svc.current(now).await.unwrap().unwrap();
        assert_eq!(current.id, "s1w1");

        let err = svc.create(now).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_with_too_few_stores_nothing() {
        let store = seeded_store(10).await;
        let svc = service(store.clone());
        let err = svc.create(Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientData(_)));
        assert!(store.list_tournaments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_week_counts_tournaments_in_season() {
        let svc = service(seeded_store(16).await);
        let now = Utc::now();
        svc.create(now - Duration::days(30)).await.unwrap();
        let second = svc.create(now).await.unwrap();
        assert_eq!(second.id, "s1w2");

        let history = svc.history(DEFAULT_HISTORY_LIMIT).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["s1w2", "s1w1"]);
        assert_eq!(svc.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vote_rules() {
        let svc = service(seeded_store(16).await);
        let now = Utc::now();
        let t = svc.create(now).await.unwrap();
        let m = &t.bracket[0][0];
        let a = m.pokemon_a_id.unwrap();
        let b = m.pokemon_b_id.unwrap();

        // Round 2 is not the current round.
        let err = svc.cast_vote("fan", "s1w1_r2_m0", a, now).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = svc.cast_vote("fan", "s1w1_r9_m0", a, now).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let outsider = t.bracket[0][1].pokemon_a_id.unwrap();
        let err = svc
            .cast_vote("fan", &m.matchup_id, outsider, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = svc.cast_vote("owner", &m.matchup_id, a, now).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        svc.cast_vote("fan", &m.matchup_id, a, now).await.unwrap();
        let err = svc.cast_vote("fan", &m.matchup_id, b, now).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let round = svc.active_matchups(now).await.unwrap();
        assert_eq!(round.round, 1);
        assert_eq!(round.matchups.len(), 8);
        let live = round
            .matchups
            .iter()
            .find(|x| x.matchup_id == m.matchup_id)
            .unwrap();
        assert_eq!((live.votes_a, live.votes_b), (1, 0));
    }

    #[tokio::test]
    async fn test_no_current_tournament() {
        let svc = service(seeded_store(16).await);
        let now = Utc::now();
        assert!(svc.current(now).await.unwrap().is_none());
        assert!(matches!(
            svc.active_matchups(now).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.cast_vote("fan", "s1w1_r1_m0", 1, now).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_advance_uses_ledger_tallies() {
        let svc = service(seeded_store(16).await);
        let now = Utc::now();
        let t = svc.create(now).await.unwrap();
        let m = t.bracket[0][0].clone();
        let a = m.pokemon_a_id.unwrap();
        let b = m.pokemon_b_id.unwrap();

        for fan in ["f1", "f2", "f3"] {
            svc.cast_vote(fan, &m.matchup_id, a, now).await.unwrap();
        }
        svc.cast_vote("f4", &m.matchup_id, b, now).await.unwrap();

        let (advanced, outcome) = svc.advance("s1w1").await.unwrap();
        assert_eq!(outcome, RoundOutcome::Advanced { round: 2 });
        let resolved = &advanced.bracket[0][0];
        assert_eq!(resolved.winner_id, Some(a));
        assert_eq!((resolved.votes_a, resolved.votes_b), (3, 1));
        assert_eq!(advanced.bracket[1][0].pokemon_a_id, Some(a));

        let stored = svc.get("s1w1").await.unwrap();
        assert_eq!(stored.current_round, 2);
    }

    #[tokio::test]
    async fn test_advance_to_champion() {
        let svc = service(seeded_store(16).await);
        let t = svc.create(Utc::now()).await.unwrap();

        for _ in 0..3 {
            svc.advance(&t.id).await.unwrap();
        }
        let (done, outcome) = svc.advance(&t.id).await.unwrap();
        let RoundOutcome::Champion { pokemon_id } = outcome else {
            panic!("expected champion, got {outcome:?}");
        };
        assert_eq!(done.champion_id, Some(pokemon_id));
        assert_eq!(done.status, TournamentStatus::Complete);
        assert_eq!(done.current_round, 4);

        assert!(matches!(
            svc.advance(&t.id).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            svc.advance("s9w9").await,
            Err(AppError::NotFound(_))
        ));
    }
}
