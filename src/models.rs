// Domain records shared by the stores, the tournament engine and the HTTP API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pokédex number. Assigned monotonically starting at 1.
pub type DexNumber = i64;

/// Length of a tournament, and of the window in which it counts as current.
pub const TOURNAMENT_DAYS: i64 = 14;
/// Number of bracket rounds (16 → 8 → 4 → 2 → 1).
pub const ROUND_COUNT: u8 = 4;
/// Entrants in a bracket.
pub const BRACKET_SIZE: usize = 16;
/// Longest creator quote kept on a Hall of Fame record.
pub const MAX_QUOTE_CHARS: usize = 280;

// ── Pokémon ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PokemonType {
    Fire,
    Water,
    Grass,
    Electric,
    Ice,
    Fighting,
    Poison,
    Ground,
    Flying,
    Psychic,
    Bug,
    Rock,
    Ghost,
    Dragon,
    Dark,
    Steel,
    Fairy,
    Normal,
}

impl PokemonType {
    pub const ALL: [PokemonType; 18] = [
        PokemonType::Fire,
        PokemonType::Water,
        PokemonType::Grass,
        PokemonType::Electric,
        PokemonType::Ice,
        PokemonType::Fighting,
        PokemonType::Poison,
        PokemonType::Ground,
        PokemonType::Flying,
        PokemonType::Psychic,
        PokemonType::Bug,
        PokemonType::Rock,
        PokemonType::Ghost,
        PokemonType::Dragon,
        PokemonType::Dark,
        PokemonType::Steel,
        PokemonType::Fairy,
        PokemonType::Normal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PokemonType::Fire => "Fire",
            PokemonType::Water => "Water",
            PokemonType::Grass => "Grass",
            PokemonType::Electric => "Electric",
            PokemonType::Ice => "Ice",
            PokemonType::Fighting => "Fighting",
            PokemonType::Poison => "Poison",
            PokemonType::Ground => "Ground",
            PokemonType::Flying => "Flying",
            PokemonType::Psychic => "Psychic",
            PokemonType::Bug => "Bug",
            PokemonType::Rock => "Rock",
            PokemonType::Ghost => "Ghost",
            PokemonType::Dragon => "Dragon",
            PokemonType::Dark => "Dark",
            PokemonType::Steel => "Steel",
            PokemonType::Fairy => "Fairy",
            PokemonType::Normal => "Normal",
        }
    }

    /// Parse a type name, ignoring case ("fire", "Fire", "FIRE").
    pub fn from_str_name(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for PokemonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power band a Pokémon was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    EarlyGame,
    MidGame,
    #[default]
    FullyEvolved,
    PseudoLegendary,
    Legendary,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::EarlyGame => "early_game",
            Tier::MidGame => "mid_game",
            Tier::FullyEvolved => "fully_evolved",
            Tier::PseudoLegendary => "pseudo_legendary",
            Tier::Legendary => "legendary",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "early_game" => Some(Tier::EarlyGame),
            "mid_game" => Some(Tier::MidGame),
            "fully_evolved" => Some(Tier::FullyEvolved),
            "pseudo_legendary" => Some(Tier::PseudoLegendary),
            "legendary" => Some(Tier::Legendary),
            _ => None,
        }
    }

    /// Inclusive base-stat-total range the generator targets for this tier.
    pub fn bst_range(self) -> (i32, i32) {
        match self {
            Tier::EarlyGame => (250, 350),
            Tier::MidGame => (400, 500),
            Tier::FullyEvolved => (500, 550),
            Tier::PseudoLegendary => (600, 600),
            Tier::Legendary => (580, 680),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub sp_attack: i32,
    pub sp_defense: i32,
    pub speed: i32,
}

impl Stats {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 255;

    pub fn values(&self) -> [i32; 6] {
        [
            self.hp,
            self.attack,
            self.defense,
            self.sp_attack,
            self.sp_defense,
            self.speed,
        ]
    }

    /// Base stat total.
    pub fn total(&self) -> i32 {
        self.values().iter().sum()
    }

    pub fn in_range(&self) -> bool {
        self.values()
            .iter()
            .all(|v| (Self::MIN..=Self::MAX).contains(v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pokemon {
    pub dex_number: DexNumber,
    pub id: String,
    pub name: String,
    pub types: Vec<PokemonType>,
    pub stats: Stats,
    #[serde(default)]
    pub tier: Tier,
    pub trainer_id: String,
    #[serde(default)]
    pub trainer_name: String,
    #[serde(default)]
    pub is_shiny: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pokedex_entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl Pokemon {
    /// Public identifier derived from the dex number, e.g. `pkmn_0042`.
    pub fn public_id(dex_number: DexNumber) -> String {
        format!("pkmn_{dex_number:04}")
    }

    pub fn has_type(&self, t: PokemonType) -> bool {
        self.types.contains(&t)
    }
}

/// A generated Pokémon as submitted for registration, before a dex number
/// is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPokemon {
    pub name: String,
    pub types: Vec<PokemonType>,
    pub stats: Stats,
    #[serde(default)]
    pub tier: Tier,
    pub trainer_id: String,
    #[serde(default)]
    pub trainer_name: String,
    #[serde(default)]
    pub is_shiny: bool,
    #[serde(default)]
    pub culture: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pokedex_entry: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewPokemon {
    pub fn into_pokemon(self, dex_number: DexNumber, added_at: DateTime<Utc>) -> Pokemon {
        Pokemon {
            dex_number,
            id: Pokemon::public_id(dex_number),
            name: self.name,
            types: self.types,
            stats: self.stats,
            tier: self.tier,
            trainer_id: self.trainer_id,
            trainer_name: self.trainer_name,
            is_shiny: self.is_shiny,
            culture: self.culture,
            category: self.category,
            pokedex_entry: self.pokedex_entry,
            image_url: self.image_url,
            added_at,
        }
    }
}

/// Key under which Pokémon and trainer names must be unique. Folds case
/// across the whole of Unicode, not just ASCII.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

// ── Trainers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trainer {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub active_time_seconds: i64,
    #[serde(default)]
    pub pokemon_created: i64,
    #[serde(default)]
    pub shinies_found: i64,
}

impl Trainer {
    /// New profile with a short random id (first 8 hex chars of a v4 UUID).
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            name: name.to_string(),
            created_at: now,
            last_seen: now,
            active_time_seconds: 0,
            pokemon_created: 0,
            shinies_found: 0,
        }
    }
}

// ── Tournaments ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Active,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchupStatus {
    Pending,
    Active,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub matchup_id: String,
    pub round: u8,
    pub pokemon_a_id: Option<DexNumber>,
    pub pokemon_b_id: Option<DexNumber>,
    pub votes_a: u32,
    pub votes_b: u32,
    pub winner_id: Option<DexNumber>,
    pub status: MatchupStatus,
}

impl Matchup {
    pub fn make_id(tournament_id: &str, round: u8, index: usize) -> String {
        format!("{tournament_id}_r{round}_m{index}")
    }

    /// A future-round slot waiting on the previous round's winners.
    pub fn pending(tournament_id: &str, round: u8, index: usize) -> Self {
        Self {
            matchup_id: Self::make_id(tournament_id, round, index),
            round,
            pokemon_a_id: None,
            pokemon_b_id: None,
            votes_a: 0,
            votes_b: 0,
            winner_id: None,
            status: MatchupStatus::Pending,
        }
    }

    pub fn is_participant(&self, dex_number: DexNumber) -> bool {
        self.pokemon_a_id == Some(dex_number) || self.pokemon_b_id == Some(dex_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub season: u32,
    pub week: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: TournamentStatus,
    pub current_round: u8,
    /// `bracket[0]` is round 1.
    pub bracket: Vec<Vec<Matchup>>,
    pub participants: Vec<DexNumber>,
    pub champion_id: Option<DexNumber>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    pub fn make_id(season: u32, week: u32) -> String {
        format!("s{season}w{week}")
    }

    /// Whether `now` falls inside `[start, start + 14 days)`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now < self.start_date + Duration::days(TOURNAMENT_DAYS)
    }

    pub fn round(&self, round: u8) -> Option<&[Matchup]> {
        let idx = usize::from(round).checked_sub(1)?;
        self.bracket.get(idx).map(Vec::as_slice)
    }

    pub fn round_mut(&mut self, round: u8) -> Option<&mut Vec<Matchup>> {
        let idx = usize::from(round).checked_sub(1)?;
        self.bracket.get_mut(idx)
    }

    /// Look a matchup up anywhere in the bracket.
    pub fn find_matchup(&self, matchup_id: &str) -> Option<&Matchup> {
        self.bracket.iter().flatten().find(|m| m.matchup_id == matchup_id)
    }

    pub fn matchup_count(&self) -> usize {
        self.bracket.iter().map(Vec::len).sum()
    }
}

/// Tournament id a matchup belongs to (`s1w2_r1_m0` → `s1w2`).
pub fn tournament_of_matchup(matchup_id: &str) -> &str {
    matchup_id.split('_').next().unwrap_or(matchup_id)
}

// ── Votes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub matchup_id: String,
    pub trainer_id: String,
    pub pokemon_id: DexNumber,
    pub timestamp: DateTime<Utc>,
}

// ── Hall of Fame ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InductionType {
    Champion,
    FanFavorite,
    ProfessorsChoice,
}

impl InductionType {
    pub fn as_str(self) -> &'static str {
        match self {
            InductionType::Champion => "champion",
            InductionType::FanFavorite => "fan_favorite",
            InductionType::ProfessorsChoice => "professors_choice",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "champion" => Some(InductionType::Champion),
            "fan_favorite" => Some(InductionType::FanFavorite),
            "professors_choice" => Some(InductionType::ProfessorsChoice),
            _ => None,
        }
    }
}

/// Category-specific metadata, tagged by `induction_type` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "induction_type", rename_all = "snake_case")]
pub enum InductionDetails {
    Champion {
        tournament_id: String,
        total_votes: u32,
    },
    FanFavorite {
        total_votes: u32,
        tournaments_participated: u32,
    },
    ProfessorsChoice {
        reason: String,
    },
}

impl InductionDetails {
    pub fn induction_type(&self) -> InductionType {
        match self {
            InductionDetails::Champion { .. } => InductionType::Champion,
            InductionDetails::FanFavorite { .. } => InductionType::FanFavorite,
            InductionDetails::ProfessorsChoice { .. } => InductionType::ProfessorsChoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inductee {
    pub pokemon_id: DexNumber,
    #[serde(flatten)]
    pub details: InductionDetails,
    pub induction_date: DateTime<Utc>,
    pub creator_quote: Option<String>,
}

impl Inductee {
    pub fn induction_type(&self) -> InductionType {
        self.details.induction_type()
    }
}

/// Cap a creator quote at [`MAX_QUOTE_CHARS`] characters.
pub fn cap_quote(quote: Option<String>) -> Option<String> {
    quote.map(|q| {
        if q.chars().count() > MAX_QUOTE_CHARS {
            q.chars().take(MAX_QUOTE_CHARS).collect()
        } else {
            q
        }
    })
}

// ── Daily challenges ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeCompletion {
    pub trainer_id: String,
    pub challenge_id: String,
    pub pokemon_id: String,
    pub completed_at: DateTime<Utc>,
}
