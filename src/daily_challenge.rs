// Daily challenges derived from the UTC calendar date, plus the completion
// ledger keyed by (trainer, challenge id).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{ChallengeCompletion, PokemonType};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Type1,
    Type2,
    Culture,
    Theme,
}

struct Template {
    text: &'static str,
    slots: &'static [Slot],
}

const TEMPLATES: &[Template] = &[
    Template {
        text: "Create a {type1}/{type2} type Pokémon",
        slots: &[Slot::Type1, Slot::Type2],
    },
    Template {
        text: "Create a {type1} type Pokémon inspired by {culture} culture",
        slots: &[Slot::Type1, Slot::Culture],
    },
    Template {
        text: "Create a pure {type1} type Pokémon",
        slots: &[Slot::Type1],
    },
    Template {
        text: "Create a Pokémon based on {theme}",
        slots: &[Slot::Theme],
    },
    Template {
        text: "Create a {type1} type Pokémon based on {theme}",
        slots: &[Slot::Type1, Slot::Theme],
    },
    Template {
        text: "Create a Pokémon inspired by {culture} mythology",
        slots: &[Slot::Culture],
    },
    Template {
        text: "Create a {type1}/{type2} Pokémon from {culture} folklore",
        slots: &[Slot::Type1, Slot::Type2, Slot::Culture],
    },
];

const CULTURES: &[&str] = &[
    "Japanese",
    "Mexican",
    "Egyptian",
    "Greek",
    "Norse",
    "Chinese",
    "Indian",
    "Celtic",
    "African",
    "Native American",
    "Hawaiian",
    "Brazilian",
    "Korean",
    "Vietnamese",
    "Thai",
    "Indonesian",
    "Peruvian",
    "Aztec",
    "Mayan",
    "Polynesian",
];

const THEMES: &[&str] = &[
    "a kitchen appliance",
    "a musical instrument",
    "a weather phenomenon",
    "a gemstone or crystal",
    "a deep sea creature",
    "a desert animal",
    "a mythical beast",
    "a piece of furniture",
    "a sports equipment",
    "a cosmic object",
    "a garden plant",
    "a winter holiday",
    "a tropical fruit",
    "a construction vehicle",
    "a nocturnal animal",
    "an ancient artifact",
    "a natural disaster",
    "a carnival attraction",
    "a breakfast food",
    "an office supply",
    "a vintage toy",
    "a haunted object",
    "a robot companion",
    "a forest spirit",
];

// Offsets applied after filling each slot.
const TYPE1_STEP: u64 = 7;
const TYPE2_STEP: u64 = 11;
const CULTURE_STEP: u64 = 13;
const THEME_STEP: u64 = 17;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyChallenge {
    pub id: String,
    pub challenge: String,
    pub date: NaiveDate,
    pub types: Vec<PokemonType>,
    pub culture: Option<String>,
    pub theme: Option<String>,
    pub seconds_until_reset: i64,
}

impl DailyChallenge {
    /// A Pokémon satisfies the challenge when it has every required type.
    /// Culture and theme cannot be checked and are taken on trust.
    pub fn is_satisfied_by(&self, types: &[PokemonType]) -> bool {
        self.types.iter().all(|t| types.contains(t))
    }
}

pub fn challenge_id(date: NaiveDate) -> String {
    format!("daily_{date}")
}

/// First 8 hex digits of SHA-256 over the ISO date.
pub fn seed_for(date: NaiveDate) -> u32 {
    let digest = Sha256::digest(date.to_string().as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn pick<T: Copy>(items: &[T], seed: u32, offset: u64) -> T {
    items[((u64::from(seed) + offset) % items.len() as u64) as usize]
}

/// Seconds from `now` until the next UTC midnight.
pub fn seconds_until_reset(now: DateTime<Utc>) -> i64 {
    let tomorrow = now.date_naive() + Duration::days(1);
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (midnight - now).num_seconds()
}

/// The challenge for the UTC date of `now`.
pub fn today(now: DateTime<Utc>) -> DailyChallenge {
    let mut challenge = for_date(now.date_naive());
    challenge.seconds_until_reset = seconds_until_reset(now);
    challenge
}

/// The challenge for a calendar date; stable for a given date.
pub fn for_date(date: NaiveDate) -> DailyChallenge {
    let seed = seed_for(date);
    let template = &TEMPLATES[seed as usize % TEMPLATES.len()];

    let mut offset = 0u64;
    let mut type1 = None;
    let mut type2 = None;
    let mut culture = None;
    let mut theme = None;

    for slot in template.slots {
        match slot {
            Slot::Type1 => {
                type1 = Some(pick(&PokemonType::ALL, seed, offset));
                offset += TYPE1_STEP;
            }
            Slot::Type2 => {
                let mut t = pick(&PokemonType::ALL, seed, offset);
                while Some(t) == type1 {
                    offset += 1;
                    t = pick(&PokemonType::ALL, seed, offset);
                }
                type2 = Some(t);
                offset += TYPE2_STEP;
            }
            Slot::Culture => {
                culture = Some(pick(CULTURES, seed, offset));
                offset += CULTURE_STEP;
            }
            Slot::Theme => {
                theme = Some(pick(THEMES, seed, offset));
                offset += THEME_STEP;
            }
        }
    }

    let mut text = template.text.to_string();
    if let Some(t) = type1 {
        text = text.replace("{type1}", t.as_str());
    }
    if let Some(t) = type2 {
        text = text.replace("{type2}", t.as_str());
    }
    if let Some(c) = culture {
        text = text.replace("{culture}", c);
    }
    if let Some(th) = theme {
        text = text.replace("{theme}", th);
    }

    DailyChallenge {
        id: challenge_id(date),
        challenge: text,
        date,
        types: type1.into_iter().chain(type2).collect(),
        culture: culture.map(str::to_string),
        theme: theme.map(str::to_string),
        seconds_until_reset: 0,
    }
}

/// Completion ledger over the store.
pub struct ChallengeLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> ChallengeLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn mark_completed(
        &self,
        trainer_id: &str,
        challenge_id: &str,
        pokemon_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ChallengeCompletion> {
        let completion = ChallengeCompletion {
            trainer_id: trainer_id.to_string(),
            challenge_id: challenge_id.to_string(),
            pokemon_id: pokemon_id.to_string(),
            completed_at: now,
        };
        self.store
            .insert_completion(&completion)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => {
                    AppError::Conflict(format!("Challenge {challenge_id} already completed"))
                }
                other => other,
            })?;
        tracing::info!(trainer_id, challenge_id, pokemon_id, "Daily challenge completed");
        Ok(completion)
    }

    pub async fn has_completed(&self, trainer_id: &str, challenge_id: &str) -> Result<bool> {
        Ok(self
            .store
            .completions_for_trainer(trainer_id)
            .await?
            .iter()
            .any(|c| c.challenge_id == challenge_id))
    }

    pub async fn history(&self, trainer_id: &str) -> Result<Vec<ChallengeCompletion>> {
        self.store.completions_for_trainer(trainer_id).await
    }

    pub async fn completion_count(&self, trainer_id: &str) -> Result<usize> {
        Ok(self.history(trainer_id).await?.len())
    }
}
