// Whole-file JSON backend.
//
// Each collection lives in its own document under the data directory and is
// held fully in memory. Every mutation rewrites the whole file while the
// collection's lock is held. The lock serializes writers inside this process
// only; a second process writing the same files will lose updates, and a
// crash in the middle of a write can leave a truncated file behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{Store, TrainerDelta};
use crate::error::{AppError, Result};
use crate::models::{
    name_key, ChallengeCompletion, DexNumber, Inductee, NewPokemon, Pokemon, Tournament, Trainer,
    Vote,
};

const POKEDEX_FILE: &str = "pokedex.json";
const TRAINERS_FILE: &str = "trainers.json";
const TOURNAMENTS_FILE: &str = "tournaments.json";
const VOTES_FILE: &str = "votes.json";
const HALL_OF_FAME_FILE: &str = "hall_of_fame.json";
const CHALLENGES_FILE: &str = "daily_challenges.json";

// ── Document layouts ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PokedexDoc {
    region: String,
    pokemon: Vec<Pokemon>,
    next_dex_number: DexNumber,
    created_at: DateTime<Utc>,
}

impl Default for PokedexDoc {
    fn default() -> Self {
        Self {
            region: crate::REGION.to_string(),
            pokemon: Vec::new(),
            next_dex_number: 1,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainersDoc {
    trainers: BTreeMap<String, Trainer>,
    created_at: DateTime<Utc>,
}

impl Default for TrainersDoc {
    fn default() -> Self {
        Self {
            trainers: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TournamentsDoc {
    tournaments: Vec<Tournament>,
    created_at: DateTime<Utc>,
}

impl Default for TournamentsDoc {
    fn default() -> Self {
        Self {
            tournaments: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VotesDoc {
    votes: Vec<Vote>,
    created_at: DateTime<Utc>,
}

impl Default for VotesDoc {
    fn default() -> Self {
        Self {
            votes: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionEntry {
    pokemon_id: String,
    completed_at: DateTime<Utc>,
}

/// `completions[trainer_id][challenge_id]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChallengesDoc {
    completions: BTreeMap<String, BTreeMap<String, CompletionEntry>>,
}

// ── Collection ────────────────────────────────────────────────────────

/// One JSON document held in memory and mirrored to disk.
struct Collection<T> {
    path: Option<PathBuf>,
    data: Mutex<T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(T::default()),
        }
    }

    /// Load the document, creating it with default contents if missing.
    async fn open(path: PathBuf) -> Result<Self> {
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let fresh = T::default();
                write_document(&path, &fresh).await?;
                fresh
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    async fn read<R>(&self, f: impl FnOnce(&T) -> R + Send) -> R {
        let data = self.data.lock().await;
        f(&data)
    }

    /// Apply a mutation to a copy, rewrite the whole file, then publish the
    /// copy. The in-memory document is untouched if either step fails.
    async fn write<R: Send>(&self, f: impl FnOnce(&mut T) -> Result<R> + Send) -> Result<R> {
        let mut data = self.data.lock().await;
        let mut draft = data.clone();
        let out = f(&mut draft)?;
        if let Some(path) = &self.path {
            write_document(path, &draft).await?;
        }
        *data = draft;
        Ok(out)
    }
}

async fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(doc)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

// ── Store ─────────────────────────────────────────────────────────────

pub struct JsonStore {
    pokedex: Collection<PokedexDoc>,
    trainers: Collection<TrainersDoc>,
    tournaments: Collection<TournamentsDoc>,
    votes: Collection<VotesDoc>,
    hall_of_fame: Collection<Vec<Inductee>>,
    challenges: Collection<ChallengesDoc>,
}

impl JsonStore {
    /// Open (or create) the JSON documents under `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            pokedex: Collection::open(dir.join(POKEDEX_FILE)).await?,
            trainers: Collection::open(dir.join(TRAINERS_FILE)).await?,
            tournaments: Collection::open(dir.join(TOURNAMENTS_FILE)).await?,
            votes: Collection::open(dir.join(VOTES_FILE)).await?,
            hall_of_fame: Collection::open(dir.join(HALL_OF_FAME_FILE)).await?,
            challenges: Collection::open(dir.join(CHALLENGES_FILE)).await?,
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            pokedex: Collection::in_memory(),
            trainers: Collection::in_memory(),
            tournaments: Collection::in_memory(),
            votes: Collection::in_memory(),
            hall_of_fame: Collection::in_memory(),
            challenges: Collection::in_memory(),
        }
    }
}

impl Store for JsonStore {
    async fn add_pokemon(&self, new: NewPokemon, added_at: DateTime<Utc>) -> Result<Pokemon> {
        self.pokedex
            .write(move |doc| {
                let key = name_key(&new.name);
                if doc.pokemon.iter().any(|p| name_key(&p.name) == key) {
                    return Err(AppError::Conflict(format!(
                        "A Pokémon named {} already exists",
                        new.name
                    )));
                }
                let pokemon = new.into_pokemon(doc.next_dex_number, added_at);
                doc.next_dex_number += 1;
                doc.pokemon.push(pokemon.clone());
                Ok(pokemon)
            })
            .await
    }

    async fn list_pokemon(&self) -> Result<Vec<Pokemon>> {
        Ok(self.pokedex.read(|doc| doc.pokemon.clone()).await)
    }

    async fn get_pokemon(&self, dex_number: DexNumber) -> Result<Option<Pokemon>> {
        Ok(self
            .pokedex
            .read(|doc| {
                doc.pokemon
                    .iter()
                    .find(|p| p.dex_number == dex_number)
                    .cloned()
            })
            .await)
    }

    async fn pokemon_by_trainer(&self, trainer_id: &str) -> Result<Vec<Pokemon>> {
        Ok(self
            .pokedex
            .read(|doc| {
                doc.pokemon
                    .iter()
                    .filter(|p| p.trainer_id == trainer_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn insert_trainer(&self, trainer: &Trainer) -> Result<()> {
        self.trainers
            .write(|doc| {
                if doc.trainers.contains_key(&trainer.id) {
                    return Err(AppError::Conflict(format!(
                        "Trainer id {} is taken",
                        trainer.id
                    )));
                }
                let key = name_key(&trainer.name);
                if doc.trainers.values().any(|t| name_key(&t.name) == key) {
                    return Err(AppError::Conflict(format!(
                        "Trainer name {} is taken",
                        trainer.name
                    )));
                }
                doc.trainers.insert(trainer.id.clone(), trainer.clone());
                Ok(())
            })
            .await
    }

    async fn get_trainer(&self, id: &str) -> Result<Option<Trainer>> {
        Ok(self.trainers.read(|doc| doc.trainers.get(id).cloned()).await)
    }

    async fn get_trainer_by_name(&self, name: &str) -> Result<Option<Trainer>> {
        Ok(self
            .trainers
            .read(|doc| {
                let key = name_key(name);
                doc.trainers
                    .values()
                    .find(|t| name_key(&t.name) == key)
                    .cloned()
            })
            .await)
    }

    async fn list_trainers(&self) -> Result<Vec<Trainer>> {
        Ok(self
            .trainers
            .read(|doc| doc.trainers.values().cloned().collect())
            .await)
    }

    async fn record_trainer_activity(
        &self,
        id: &str,
        delta: TrainerDelta,
    ) -> Result<Option<Trainer>> {
        self.trainers
            .write(|doc| {
                Ok(doc.trainers.get_mut(id).map(|t| {
                    delta.apply(t);
                    t.clone()
                }))
            })
            .await
    }

    async fn list_tournaments(&self) -> Result<Vec<Tournament>> {
        Ok(self.tournaments.read(|doc| doc.tournaments.clone()).await)
    }

    async fn get_tournament(&self, id: &str) -> Result<Option<Tournament>> {
        Ok(self
            .tournaments
            .read(|doc| doc.tournaments.iter().find(|t| t.id == id).cloned())
            .await)
    }

    async fn save_tournament(&self, tournament: &Tournament) -> Result<()> {
        self.tournaments
            .write(|doc| {
                match doc.tournaments.iter_mut().find(|t| t.id == tournament.id) {
                    Some(existing) => *existing = tournament.clone(),
                    None => doc.tournaments.push(tournament.clone()),
                }
                Ok(())
            })
            .await
    }

    async fn append_vote(&self, vote: &Vote) -> Result<()> {
        self.votes
            .write(|doc| {
                if doc
                    .votes
                    .iter()
                    .any(|v| v.matchup_id == vote.matchup_id && v.trainer_id == vote.trainer_id)
                {
                    return Err(AppError::Conflict(
                        "You already voted on this matchup".to_string(),
                    ));
                }
                doc.votes.push(vote.clone());
                Ok(())
            })
            .await
    }

    async fn votes_for_matchup(&self, matchup_id: &str) -> Result<Vec<Vote>> {
        Ok(self
            .votes
            .read(|doc| {
                doc.votes
                    .iter()
                    .filter(|v| v.matchup_id == matchup_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn votes_by_trainer(&self, trainer_id: &str) -> Result<Vec<Vote>> {
        Ok(self
            .votes
            .read(|doc| {
                doc.votes
                    .iter()
                    .filter(|v| v.trainer_id == trainer_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn votes_for_pokemon(&self, dex_number: DexNumber) -> Result<Vec<Vote>> {
        Ok(self
            .votes
            .read(|doc| {
                doc.votes
                    .iter()
                    .filter(|v| v.pokemon_id == dex_number)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn insert_inductee(&self, inductee: &Inductee) -> Result<()> {
        self.hall_of_fame
            .write(|list| {
                if list.iter().any(|i| i.pokemon_id == inductee.pokemon_id) {
                    return Err(AppError::Conflict(
                        "Pokémon already in Hall of Fame".to_string(),
                    ));
                }
                list.push(inductee.clone());
                Ok(())
            })
            .await
    }

    async fn get_inductee(&self, pokemon_id: DexNumber) -> Result<Option<Inductee>> {
        Ok(self
            .hall_of_fame
            .read(|list| list.iter().find(|i| i.pokemon_id == pokemon_id).cloned())
            .await)
    }

    async fn list_inductees(&self) -> Result<Vec<Inductee>> {
        Ok(self.hall_of_fame.read(|list| list.clone()).await)
    }

    async fn insert_completion(&self, completion: &ChallengeCompletion) -> Result<()> {
        self.challenges
            .write(|doc| {
                let done = doc
                    .completions
                    .entry(completion.trainer_id.clone())
                    .or_default();
                if done.contains_key(&completion.challenge_id) {
                    return Err(AppError::Conflict(
                        "Challenge already completed today".to_string(),
                    ));
                }
                done.insert(
                    completion.challenge_id.clone(),
                    CompletionEntry {
                        pokemon_id: completion.pokemon_id.clone(),
                        completed_at: completion.completed_at,
                    },
                );
                Ok(())
            })
            .await
    }

    async fn completions_for_trainer(&self, trainer_id: &str) -> Result<Vec<ChallengeCompletion>> {
        Ok(self
            .challenges
            .read(|doc| {
                doc.completions
                    .get(trainer_id)
                    .map(|done| {
                        done.iter()
                            .map(|(challenge_id, entry)| ChallengeCompletion {
                                trainer_id: trainer_id.to_string(),
                                challenge_id: challenge_id.clone(),
                                pokemon_id: entry.pokemon_id.clone(),
                                completed_at: entry.completed_at,
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PokemonType, Stats, Tier};

    fn new_pokemon(name: &str, trainer_id: &str) -> NewPokemon {
        NewPokemon {
            name: name.to_string(),
            types: vec![PokemonType::Fire],
            stats: Stats {
                hp: 80,
                attack: 80,
                defense: 80,
                sp_attack: 80,
                sp_defense: 80,
                speed: 80,
            },
            tier: Tier::FullyEvolved,
            trainer_id: trainer_id.to_string(),
            trainer_name: "Ash".to_string(),
            is_shiny: false,
            culture: None,
            category: None,
            pokedex_entry: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_dex_numbers_are_sequential() {
        let store = JsonStore::in_memory();
        let a = store.add_pokemon(new_pokemon("Emberfox", "t1"), Utc::now()).await.unwrap();
        let b = store.add_pokemon(new_pokemon("Tidecub", "t1"), Utc::now()).await.unwrap();
        assert_eq!(a.dex_number, 1);
        assert_eq!(a.id, "pkmn_0001");
        assert_eq!(b.dex_number, 2);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_ignoring_case() {
        let store = JsonStore::in_memory();
        store.add_pokemon(new_pokemon("Emberfox", "t1"), Utc::now()).await.unwrap();
        let err = store
            .add_pokemon(new_pokemon("EMBERFOX", "t2"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.list_pokemon().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_ignoring_unicode_case() {
        let store = JsonStore::in_memory();
        store.add_pokemon(new_pokemon("Élan", "t1"), Utc::now()).await.unwrap();
        assert!(matches!(
            store.add_pokemon(new_pokemon("élan", "t2"), Utc::now()).await,
            Err(AppError::Conflict(_))
        ));
        // A different letter is a different name.
        store.add_pokemon(new_pokemon("Elan", "t2"), Utc::now()).await.unwrap();

        store.insert_trainer(&Trainer::new("Ödön", Utc::now())).await.unwrap();
        assert!(matches!(
            store.insert_trainer(&Trainer::new("ödön", Utc::now())).await,
            Err(AppError::Conflict(_))
        ));
        assert!(store.get_trainer_by_name("ÖDÖN").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_trainer_id_collision_rejected() {
        let store = JsonStore::in_memory();
        let first = Trainer::new("Misty", Utc::now());
        store.insert_trainer(&first).await.unwrap();
        let clash = Trainer {
            name: "Brock".to_string(),
            ..first.clone()
        };
        assert!(matches!(
            store.insert_trainer(&clash).await,
            Err(AppError::Conflict(_))
        ));
        let kept = store.get_trainer(&first.id).await.unwrap().unwrap();
        assert_eq!(kept.name, "Misty");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_collection_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = JsonStore::open(&data_dir).await.unwrap();
        store.add_pokemon(new_pokemon("Emberfox", "t1"), Utc::now()).await.unwrap();

        std::fs::remove_dir_all(&data_dir).unwrap();
        assert!(store
            .add_pokemon(new_pokemon("Tidecub", "t1"), Utc::now())
            .await
            .is_err());
        assert_eq!(store.list_pokemon().await.unwrap().len(), 1);

        let vote = Vote {
            matchup_id: "s1w1_r1_m0".into(),
            trainer_id: "t1".into(),
            pokemon_id: 1,
            timestamp: Utc::now(),
        };
        assert!(store.append_vote(&vote).await.is_err());
        assert!(store.votes_for_matchup("s1w1_r1_m0").await.unwrap().is_empty());

        // Once the directory is back, the same requests go through.
        std::fs::create_dir_all(&data_dir).unwrap();
        let retried = store
            .add_pokemon(new_pokemon("Tidecub", "t1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(retried.dex_number, 2);
        store.append_vote(&vote).await.unwrap();
        assert_eq!(store.votes_for_matchup("s1w1_r1_m0").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected() {
        let store = JsonStore::in_memory();
        let vote = Vote {
            matchup_id: "s1w1_r1_m0".into(),
            trainer_id: "t1".into(),
            pokemon_id: 1,
            timestamp: Utc::now(),
        };
        store.append_vote(&vote).await.unwrap();
        let again = Vote {
            pokemon_id: 2,
            ..vote.clone()
        };
        assert!(matches!(
            store.append_vote(&again).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.votes_for_matchup("s1w1_r1_m0").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonStore::open(dir.path()).await.unwrap();
            store.add_pokemon(new_pokemon("Emberfox", "t1"), Utc::now()).await.unwrap();
            let trainer = Trainer::new("Misty", Utc::now());
            store.insert_trainer(&trainer).await.unwrap();
        }
        assert!(dir.path().join(POKEDEX_FILE).exists());
        assert!(dir.path().join(VOTES_FILE).exists());

        let store = JsonStore::open(dir.path()).await.unwrap();
        let all = store.list_pokemon().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Emberfox");
        assert!(store.get_trainer_by_name("misty").await.unwrap().is_some());

        // The dex counter is persisted too.
        let next = store.add_pokemon(new_pokemon("Tidecub", "t1"), Utc::now()).await.unwrap();
        assert_eq!(next.dex_number, 2);
    }

    #[tokio::test]
    async fn test_trainer_activity_is_additive() {
        let store = JsonStore::in_memory();
        let trainer = Trainer::new("Brock", Utc::now());
        store.insert_trainer(&trainer).await.unwrap();

        let mut delta = TrainerDelta::touch(Utc::now());
        delta.active_time_seconds = 300;
        store.record_trainer_activity(&trainer.id, delta).await.unwrap();
        let updated = store
            .record_trainer_activity(&trainer.id, delta)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.active_time_seconds, 600);

        assert!(store
            .record_trainer_activity("missing", delta)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_completion_ledger() {
        let store = JsonStore::in_memory();
        let c = ChallengeCompletion {
            trainer_id: "t1".into(),
            challenge_id: "daily_2026-01-01".into(),
            pokemon_id: "pkmn_0001".into(),
            completed_at: Utc::now(),
        };
        store.insert_completion(&c).await.unwrap();
        assert!(matches!(
            store.insert_completion(&c).await,
            Err(AppError::Conflict(_))
        ));
        let done = store.completions_for_trainer("t1").await.unwrap();
        assert_eq!(done, vec![c]);
        assert!(store.completions_for_trainer("t2").await.unwrap().is_empty());
    }
}
