// Pokédex registration and catalog queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::daily_challenge::{self, ChallengeLedger};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{DexNumber, NewPokemon, Pokemon, PokemonType, Stats};
use crate::store::{Store, TrainerDelta};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_POKEMON_NAME_CHARS: usize = 40;

/// Outcome of registering a Pokémon.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub pokemon: Pokemon,
    pub challenge_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub pokemon: Vec<Pokemon>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PokedexStats {
    pub region: &'static str,
    pub total_pokemon: usize,
    pub shinies: usize,
    pub type_counts: BTreeMap<PokemonType, usize>,
}

/// Reject records the generators should never produce.
pub fn validate_new_pokemon(new: &NewPokemon) -> Result<()> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Pokémon name is required".into()));
    }
    if name.chars().count() > MAX_POKEMON_NAME_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Pokémon name must be {MAX_POKEMON_NAME_CHARS} characters or less"
        )));
    }
    match new.types.as_slice() {
        [_] => {}
        [a, b] if a != b => {}
        [_, _] => {
            return Err(AppError::InvalidInput(
                "A Pokémon's two types must differ".into(),
            ))
        }
        _ => {
            return Err(AppError::InvalidInput(
                "A Pokémon must have one or two types".into(),
            ))
        }
    }
    if !new.stats.in_range() {
        return Err(AppError::InvalidInput(format!(
            "Stats must be between {} and {}",
            Stats::MIN,
            Stats::MAX
        )));
    }
    Ok(())
}

pub struct Pokedex<S> {
    store: Arc<S>,
}

impl<S: Store> Pokedex<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a generated Pokémon for its trainer. When `challenge_id` is
    /// today's challenge and the Pokémon meets it, the challenge is marked
    /// complete for the trainer.
    pub async fn register(
        &self,
        mut new: NewPokemon,
        challenge_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        validate_new_pokemon(&new)?;
        new.name = new.name.trim().to_string();

        let trainer = self
            .store
            .get_trainer(&new.trainer_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Trainer {}", new.trainer_id)))?;
        new.trainer_name = trainer.name.clone();

        let pokemon = self.store.add_pokemon(new, now).await?;

        let delta = TrainerDelta {
            pokemon_created: 1,
            shinies_found: i64::from(pokemon.is_shiny),
            ..TrainerDelta::touch(now)
        };
        self.store.record_trainer_activity(&trainer.id, delta).await?;

        metrics::POKEMON_REGISTERED_TOTAL
            .with_label_values(&[pokemon.tier.as_str()])
            .inc();
        tracing::info!(
            dex_number = pokemon.dex_number,
            name = %pokemon.name,
            trainer_id = %trainer.id,
            "Pokémon registered"
        );

        let challenge_completed = match challenge_id {
            Some(id) => self.complete_challenge(&trainer.id, id, &pokemon, now).await?,
            None => false,
        };

        Ok(Registration {
            pokemon,
            challenge_completed,
        })
    }

    async fn complete_challenge(
        &self,
        trainer_id: &str,
        challenge_id: &str,
        pokemon: &Pokemon,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let today = daily_challenge::today(now);
        if today.id != challenge_id || !today.is_satisfied_by(&pokemon.types) {
            return Ok(false);
        }
        match ChallengeLedger::new(&*self.store)
            .mark_completed(trainer_id, challenge_id, &pokemon.id, now)
            .await
        {
            Ok(_) => Ok(true),
            Err(AppError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, dex_number: DexNumber) -> Result<Pokemon> {
        self.store
            .get_pokemon(dex_number)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Pokémon #{dex_number}")))
    }

    /// Dex-ordered page, optionally restricted to one type.
    pub async fn list(
        &self,
        type_filter: Option<PokemonType>,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        let all: Vec<Pokemon> = self
            .store
            .list_pokemon()
            .await?
            .into_iter()
            .filter(|p| type_filter.map_or(true, |t| p.has_type(t)))
            .collect();
        let total = all.len();
        let pokemon = all.into_iter().skip(offset).take(limit).collect();
        Ok(Page {
            pokemon,
            total,
            limit,
            offset,
        })
    }

    pub async fn by_trainer(&self, trainer_id: &str) -> Result<Vec<Pokemon>> {
        self.store.pokemon_by_trainer(trainer_id).await
    }

    /// Case-insensitive name substring search.
    pub async fn search(&self, query: &str) -> Result<Vec<Pokemon>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_pokemon()
            .await?
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Pokemon>> {
        let mut all = self.store.list_pokemon().await?;
        all.sort_by(|a, b| {
            b.added_at
                .cmp(&a.added_at)
                .then(b.dex_number.cmp(&a.dex_number))
        });
        all.truncate(limit);
        Ok(all)
    }

    pub async fn shinies(&self) -> Result<Vec<Pokemon>> {
        Ok(self
            .store
            .list_pokemon()
            .await?
            .into_iter()
            .filter(|p| p.is_shiny)
            .collect())
    }

    pub async fn stats(&self) -> Result<PokedexStats> {
        let all = self.store.list_pokemon().await?;
        let mut type_counts = BTreeMap::new();
        for t in all.iter().flat_map(|p| p.types.iter()) {
            *type_counts.entry(*t).or_insert(0) += 1;
        }
        Ok(PokedexStats {
            region: crate::REGION,
            total_pokemon: all.len(),
            shinies: all.iter().filter(|p| p.is_shiny).count(),
            type_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tier, Trainer};
    use crate::store::json::JsonStore;
    use chrono::Duration;

    fn submission(name: &str, trainer_id: &str, types: Vec<PokemonType>, shiny: bool) -> NewPokemon {
        NewPokemon {
            name: name.to_string(),
            types,
            stats: Stats {
                hp: 60,
                attack: 85,
                defense: 70,
                sp_attack: 95,
                sp_defense: 70,
                speed: 100,
            },
            tier: Tier::FullyEvolved,
            trainer_id: trainer_id.to_string(),
            trainer_name: String::new(),
            is_shiny: shiny,
            culture: None,
            category: None,
            pokedex_entry: None,
            image_url: None,
        }
    }

    async fn setup() -> (Arc<JsonStore>, Pokedex<JsonStore>, Trainer) {
        let store = Arc::new(JsonStore::in_memory());
        let trainer = Trainer::new("Brock", Utc::now());
        store.insert_trainer(&trainer).await.unwrap();
        (store.clone(), Pokedex::new(store), trainer)
    }

    #[test]
    fn test_validation() {
        let ok = submission("Pebblit", "t", vec![PokemonType::Rock], false);
        assert!(validate_new_pokemon(&ok).is_ok());

        let mut bad = ok.clone();
        bad.types = vec![PokemonType::Rock, PokemonType::Rock];
        assert!(matches!(validate_new_pokemon(&bad), Err(AppError::InvalidInput(_))));

        bad.types = vec![];
        assert!(validate_new_pokemon(&bad).is_err());

        bad.types = vec![PokemonType::Rock, PokemonType::Ice, PokemonType::Fire];
        assert!(validate_new_pokemon(&bad).is_err());

        let mut weak = ok.clone();
        weak.stats.hp = 0;
        assert!(validate_new_pokemon(&weak).is_err());

        let mut blank = ok;
        blank.name = "  ".into();
        assert!(validate_new_pokemon(&blank).is_err());
    }

    #[tokio::test]
    async fn test_register_updates_trainer() {
        let (store, dex, trainer) = setup().await;
        let reg = dex
            .register(
                submission("Pebblit", &trainer.id, vec![PokemonType::Rock], true),
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(reg.pokemon.dex_number, 1);
        assert_eq!(reg.pokemon.trainer_name, "Brock");
        assert!(!reg.challenge_completed);

        let updated = store.get_trainer(&trainer.id).await.unwrap().unwrap();
        assert_eq!(updated.pokemon_created, 1);
        assert_eq!(updated.shinies_found, 1);

        let err = dex
            .register(
                submission("PEBBLIT", &trainer.id, vec![PokemonType::Rock], false),
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = dex
            .register(
                submission("Ghostling", "nobody", vec![PokemonType::Ghost], false),
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_completes_matching_challenge() {
        let (store, dex, trainer) = setup().await;
        let now = Utc::now();
        let challenge = daily_challenge::today(now);
        let mut types = challenge.types.clone();
        if types.is_empty() {
            types.push(PokemonType::Normal);
        }

        let reg = dex
            .register(
                submission("Dailymon", &trainer.id, types, false),
                Some(&challenge.id),
                now,
            )
            .await
            .unwrap();
        assert!(reg.challenge_completed);
        assert!(ChallengeLedger::new(&*store)
            .has_completed(&trainer.id, &challenge.id)
            .await
            .unwrap());

        // A stale challenge id is ignored.
        let reg = dex
            .register(
                submission("Latemon", &trainer.id, vec![PokemonType::Bug], false),
                Some("daily_2000-01-01"),
                now,
            )
            .await
            .unwrap();
        assert!(!reg.challenge_completed);
    }

    #[tokio::test]
    async fn test_queries() {
        let (_store, dex, trainer) = setup().await;
        let now = Utc::now();
        dex.register(
            submission("Emberpup", &trainer.id, vec![PokemonType::Fire], false),
            None,
            now - Duration::hours(2),
        )
        .await
        .unwrap();
        dex.register(
            submission("Tidefin", &trainer.id, vec![PokemonType::Water], true),
            None,
            now - Duration::hours(1),
        )
        .await
        .unwrap();
        dex.register(
            submission("Steamander", &trainer.id, vec![PokemonType::Fire, PokemonType::Water], false),
            None,
            now,
        )
        .await
        .unwrap();

        let fire = dex.list(Some(PokemonType::Fire), 10, 0).await.unwrap();
        assert_eq!(fire.total, 2);

        let page = dex.list(None, 2, 1).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<&str> = page.pokemon.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Tidefin", "Steamander"]);

        assert_eq!(dex.search("FIN").await.unwrap().len(), 1);
        assert!(dex.search("  ").await.unwrap().is_empty());
        assert_eq!(dex.recent(1).await.unwrap()[0].name, "Steamander");
        assert_eq!(dex.shinies().await.unwrap().len(), 1);
        assert_eq!(dex.by_trainer(&trainer.id).await.unwrap().len(), 3);
        assert!(matches!(dex.get(99).await, Err(AppError::NotFound(_))));

        let stats = dex.stats().await.unwrap();
        assert_eq!(stats.region, "Oneira");
        assert_eq!(stats.total_pokemon, 3);
        assert_eq!(stats.shinies, 1);
        assert_eq!(stats.type_counts[&PokemonType::Fire], 2);
        assert_eq!(stats.type_counts[&PokemonType::Water], 2);
    }
}
