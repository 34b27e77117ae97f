// Hall of Fame: champion, fan favorite and professor's choice inductions.
// At most one record per Pokémon; repeat inductions return the first record.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{cap_quote, DexNumber, InductionDetails, InductionType, Inductee, Pokemon};
use crate::store::Store;
use crate::voting::VoteLedger;

pub const DEFAULT_FAN_FAVORITE_MIN_VOTES: u32 = 50;
pub const DEFAULT_FAN_FAVORITE_MIN_TOURNAMENTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanFavoriteThresholds {
    pub min_votes: u32,
    pub min_tournaments: u32,
}

impl Default for FanFavoriteThresholds {
    fn default() -> Self {
        Self {
            min_votes: DEFAULT_FAN_FAVORITE_MIN_VOTES,
            min_tournaments: DEFAULT_FAN_FAVORITE_MIN_TOURNAMENTS,
        }
    }
}

/// Result of an induction request. `created` is false when the Pokémon was
/// already in the Hall of Fame and the existing record was returned.
#[derive(Debug, Clone, Serialize)]
pub struct Induction {
    pub inductee: Inductee,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HallOfFameStats {
    pub total_inductees: usize,
    pub champions: usize,
    pub fan_favorites: usize,
    pub professors_choices: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FanFavoriteCandidate {
    pub pokemon_id: DexNumber,
    pub total_votes: u32,
    pub tournaments_participated: u32,
    pub pokemon: Pokemon,
}

/// Votes and appearances accumulated over every tournament.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Participation {
    total_votes: u32,
    tournaments: u32,
}

pub struct HallOfFame<S> {
    store: Arc<S>,
    thresholds: FanFavoriteThresholds,
    write_lock: tokio::sync::Mutex<()>,
}

impl<S: Store> HallOfFame<S> {
    pub fn new(store: Arc<S>, thresholds: FanFavoriteThresholds) -> Self {
        Self {
            store,
            thresholds,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn thresholds(&self) -> FanFavoriteThresholds {
        self.thresholds
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn is_inducted(&self, pokemon_id: DexNumber) -> Result<bool> {
        Ok(self.store.get_inductee(pokemon_id).await?.is_some())
    }

    pub async fn get_inductee(&self, pokemon_id: DexNumber) -> Result<Inductee> {
        self.store
            .get_inductee(pokemon_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Hall of Fame entry for #{pokemon_id}")))
    }

    pub async fn list(&self, filter: Option<InductionType>) -> Result<Vec<Inductee>> {
        let all = self.store.list_inductees().await?;
        Ok(match filter {
            Some(kind) => all
                .into_iter()
                .filter(|i| i.induction_type() == kind)
                .collect(),
            None => all,
        })
    }

    pub async fn stats(&self) -> Result<HallOfFameStats> {
        let all = self.store.list_inductees().await?;
        let count = |kind| all.iter().filter(|i| i.induction_type() == kind).count();
        Ok(HallOfFameStats {
            total_inductees: all.len(),
            champions: count(InductionType::Champion),
            fan_favorites: count(InductionType::FanFavorite),
            professors_choices: count(InductionType::ProfessorsChoice),
        })
    }

    /// Non-inducted, never-champion Pokémon meeting both thresholds, most
    /// votes first.
    pub async fn fan_favorite_candidates(
        &self,
        min_votes: u32,
        min_tournaments: u32,
    ) -> Result<Vec<FanFavoriteCandidate>> {
        let (participation, champions) = self.participation().await?;

        let mut candidates = Vec::new();
        for (pokemon_id, p) in participation {
            if champions.contains(&pokemon_id)
                || p.total_votes < min_votes
                || p.tournaments < min_tournaments
                || self.is_inducted(pokemon_id).await?
            {
                continue;
            }
            if let Some(pokemon) = self.store.get_pokemon(pokemon_id).await? {
                candidates.push(FanFavoriteCandidate {
                    pokemon_id,
                    total_votes: p.total_votes,
                    tournaments_participated: p.tournaments,
                    pokemon,
                });
            }
        }

        candidates.sort_by(|a, b| b.total_votes.cmp(&a.total_votes));
        Ok(candidates)
    }

    // ── Inductions ───────────────────────────────────────────────────

    /// Induct the champion of a completed tournament.
    pub async fn induct_champion(
        &self,
        tournament_id: &str,
        creator_quote: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Induction> {
        let _guard = self.write_lock.lock().await;

        let tournament = self
            .store
            .get_tournament(tournament_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Tournament {tournament_id}")))?;
        let champion = tournament.champion_id.ok_or_else(|| {
            AppError::InvalidState(format!("Tournament {tournament_id} has no champion yet"))
        })?;

        if let Some(existing) = self.store.get_inductee(champion).await? {
            return Ok(Induction {
                inductee: existing,
                created: false,
            });
        }

        let total_votes = VoteLedger::new(&*self.store)
            .pokemon_tournament_votes(champion, tournament_id)
            .await?;
        let details = InductionDetails::Champion {
            tournament_id: tournament_id.to_string(),
            total_votes,
        };
        self.insert(champion, details, creator_quote, now).await
    }

    /// Induct a popular Pokémon that never won a tournament.
    pub async fn induct_fan_favorite(
        &self,
        pokemon_id: DexNumber,
        creator_quote: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Induction> {
        let _guard = self.write_lock.lock().await;

        self.require_pokemon(pokemon_id).await?;
        if let Some(existing) = self.store.get_inductee(pokemon_id).await? {
            return Ok(Induction {
                inductee: existing,
                created: false,
            });
        }

        let (participation, champions) = self.participation().await?;
        if champions.contains(&pokemon_id) {
            return Err(AppError::InvalidState(
                "Tournament champions cannot be inducted as Fan Favorites".to_string(),
            ));
        }

        let p = participation.get(&pokemon_id).copied().unwrap_or_default();
        let FanFavoriteThresholds {
            min_votes,
            min_tournaments,
        } = self.thresholds;
        if p.total_votes < min_votes || p.tournaments < min_tournaments {
            return Err(AppError::InvalidState(format!(
                "Fan Favorites need {min_votes} votes across {min_tournaments} tournaments \
                 (has {} votes across {})",
                p.total_votes, p.tournaments
            )));
        }

        let details = InductionDetails::FanFavorite {
            total_votes: p.total_votes,
            tournaments_participated: p.tournaments,
        };
        self.insert(pokemon_id, details, creator_quote, now).await
    }

    pub async fn induct_professors_choice(
        &self,
        pokemon_id: DexNumber,
        reason: &str,
        creator_quote: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Induction> {
        let _guard = self.write_lock.lock().await;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput(
                "A reason is required for Professor's Choice".to_string(),
            ));
        }
        self.require_pokemon(pokemon_id).await?;
        if let Some(existing) = self.store.get_inductee(pokemon_id).await? {
            return Ok(Induction {
                inductee: existing,
                created: false,
            });
        }

        let details = InductionDetails::ProfessorsChoice {
            reason: reason.to_string(),
        };
        self.insert(pokemon_id, details, creator_quote, now).await
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn require_pokemon(&self, pokemon_id: DexNumber) -> Result<Pokemon> {
        self.store
            .get_pokemon(pokemon_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Pokémon #{pokemon_id}")))
    }

    async fn insert(
        &self,
        pokemon_id: DexNumber,
        details: InductionDetails,
        creator_quote: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Induction> {
        let inductee = Inductee {
            pokemon_id,
            details,
            induction_date: now,
            creator_quote: cap_quote(creator_quote),
        };

        match self.store.insert_inductee(&inductee).await {
            Ok(()) => {}
            // Another process got there first.
            Err(AppError::Conflict(_)) => {
                let existing = self.get_inductee(pokemon_id).await?;
                return Ok(Induction {
                    inductee: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e),
        }

        let kind = inductee.induction_type();
        metrics::INDUCTIONS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        tracing::info!(pokemon_id, induction_type = kind.as_str(), "Hall of Fame induction");
        Ok(Induction {
            inductee,
            created: true,
        })
    }

    /// Per-Pokémon votes and appearances over every tournament, plus the set
    /// of past champions.
    async fn participation(
        &self,
    ) -> Result<(BTreeMap<DexNumber, Participation>, HashSet<DexNumber>)> {
        let tournaments = self.store.list_tournaments().await?;
        let champions: HashSet<DexNumber> =
            tournaments.iter().filter_map(|t| t.champion_id).collect();

        let ledger = VoteLedger::new(&*self.store);
        let mut participation: BTreeMap<DexNumber, Participation> = BTreeMap::new();
        for tournament in &tournaments {
            for &pokemon_id in &tournament.participants {
                let votes = ledger
                    .pokemon_tournament_votes(pokemon_id, &tournament.id)
                    .await?;
                let entry = participation.entry(pokemon_id).or_default();
                entry.tournaments += 1;
                entry.total_votes += votes;
            }
        }

        Ok((participation, champions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket;
    use crate::models::{NewPokemon, PokemonType, Stats, Tier, Vote, MAX_QUOTE_CHARS};
    use crate::store::json::JsonStore;
    use chrono::Duration;

    async fn store_with_pokemon(count: usize) -> Arc<JsonStore> {
        let store = Arc::new(JsonStore::in_memory());
        for i in 0..count {
            store
                .add_pokemon(
                    NewPokemon {
                        name: format!("Famed{i}"),
                        types: vec![PokemonType::Psychic],
                        stats: Stats {
                            hp: 90,
                            attack: 90,
                            defense: 90,
                            sp_attack: 90,
                            sp_defense: 90,
                            speed: 90,
                        },
                        tier: Tier::FullyEvolved,
                        trainer_id: "creator".to_string(),
                        trainer_name: "Elm".to_string(),
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

    /// A finished tournament over dex 1..=16 won by `champion`.
    async fn finished_tournament(store: &JsonStore, week: u32, champion: DexNumber) -> String {
        let mut t = bracket::new_tournament(1, week, (1..=16).collect(), Utc::now());
        t.champion_id = Some(champion);
        t.status = crate::models::TournamentStatus::Complete;
        store.save_tournament(&t).await.unwrap();
        t.id
    }

    async fn add_votes(store: &JsonStore, tournament_id: &str, pokemon_id: DexNumber, n: usize) {
        for i in 0..n {
            store
                .append_vote(&Vote {
                    matchup_id: format!("{tournament_id}_r1_m{pokemon_id}"),
                    trainer_id: format!("fan{i}"),
                    pokemon_id,
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    fn hof(store: Arc<JsonStore>) -> HallOfFame<JsonStore> {
        HallOfFame::new(
            store,
            FanFavoriteThresholds {
                min_votes: 5,
                min_tournaments: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_induct_champion_idempotent() {
        let store = store_with_pokemon(16).await;
        let tid = finished_tournament(&store, 1, 3).await;
        add_votes(&store, &tid, 3, 4).await;
        let hof = hof(store);

        let first = hof
            .induct_champion(&tid, Some("What a run!".into()), Utc::now())
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.inductee.pokemon_id, 3);
        assert_eq!(
            first.inductee.details,
            InductionDetails::Champion {
                tournament_id: tid.clone(),
                total_votes: 4
            }
        );

        let second = hof
            .induct_champion(&tid, None, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.inductee, first.inductee);
        assert_eq!(hof.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_induct_champion_requires_champion() {
        let store = store_with_pokemon(16).await;
        let t = bracket::new_tournament(1, 1, (1..=16).collect(), Utc::now());
        store.save_tournament(&t).await.unwrap();
        let hof = hof(store);

        assert!(matches!(
            hof.induct_champion("s1w1", None, Utc::now()).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            hof.induct_champion("s1w9", None, Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fan_favorite_thresholds_and_champion_rule() {
        let store = store_with_pokemon(16).await;
        let w1 = finished_tournament(&store, 1, 1).await;
        let w2 = finished_tournament(&store, 2, 2).await;
        add_votes(&store, &w1, 7, 3).await;
        add_votes(&store, &w2, 7, 3).await;
        add_votes(&store, &w1, 8, 2).await;
        add_votes(&store, &w1, 1, 9).await;
        let hof = hof(store);

        let candidates = hof.fan_favorite_candidates(5, 2).await.unwrap();
        let ids: Vec<DexNumber> = candidates.iter().map(|c| c.pokemon_id).collect();
        assert_eq!(ids, vec![7]);
        assert_eq!(candidates[0].total_votes, 6);
        assert_eq!(candidates[0].tournaments_participated, 2);

        let inducted = hof.induct_fan_favorite(7, None, Utc::now()).await.unwrap();
        assert!(inducted.created);
        assert!(hof.fan_favorite_candidates(5, 2).await.unwrap().is_empty());

        // Below the vote threshold.
        assert!(matches!(
            hof.induct_fan_favorite(8, None, Utc::now()).await,
            Err(AppError::InvalidState(_))
        ));
        // Past champion.
        assert!(matches!(
            hof.induct_fan_favorite(1, None, Utc::now()).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            hof.induct_fan_favorite(999, None, Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reinduction_under_other_category_returns_original() {
        let store = store_with_pokemon(3).await;
        let hof = hof(store);

        let first = hof
            .induct_professors_choice(2, "Striking silhouette", None, Utc::now())
            .await
            .unwrap();
        assert!(first.created);

        let again = hof.induct_fan_favorite(2, None, Utc::now()).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.inductee.induction_type(), InductionType::ProfessorsChoice);
    }

    #[tokio::test]
    async fn test_quote_truncated_and_stats() {
        let store = store_with_pokemon(3).await;
        let hof = hof(store);

        let long = "x".repeat(MAX_QUOTE_CHARS + 50);
        let inducted = hof
            .induct_professors_choice(1, "Lore", Some(long), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            inducted.inductee.creator_quote.unwrap().chars().count(),
            MAX_QUOTE_CHARS
        );

        assert!(matches!(
            hof.induct_professors_choice(2, "   ", None, Utc::now()).await,
            Err(AppError::InvalidInput(_))
        ));

        let stats = hof.stats().await.unwrap();
        assert_eq!(stats.total_inductees, 1);
        assert_eq!(stats.professors_choices, 1);
        assert_eq!(stats.champions, 0);
        assert!(hof.is_inducted(1).await.unwrap());
        assert!(matches!(hof.get_inductee(2).await, Err(AppError::NotFound(_))));
        assert_eq!(
            hof.list(Some(InductionType::Champion)).await.unwrap().len(),
            0
        );
    }
}
