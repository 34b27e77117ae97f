// Keyword inference of types and culture from a free-text concept.

use serde::Serialize;

use crate::models::PokemonType;

pub const DEFAULT_CULTURE: &str = "original";

const TYPE_KEYWORDS: &[(PokemonType, &[&str])] = &[
    (
        PokemonType::Fire,
        &["fire", "flame", "hot", "burn", "lava", "volcanic", "spicy", "heat"],
    ),
    (
        PokemonType::Water,
        &["water", "ocean", "sea", "rain", "aqua", "soup", "broth", "liquid", "pho"],
    ),
    (
        PokemonType::Grass,
        &["grass", "plant", "leaf", "flower", "tree", "forest", "herb", "vegetable"],
    ),
    (
        PokemonType::Electric,
        &["electric", "lightning", "thunder", "shock", "volt"],
    ),
    (
        PokemonType::Ice,
        &["ice", "snow", "frost", "frozen", "cold", "winter"],
    ),
    (
        PokemonType::Fighting,
        &["fighting", "martial", "warrior", "combat", "punch", "kick"],
    ),
    (
        PokemonType::Psychic,
        &["psychic", "mind", "mental", "telekinetic", "mystic"],
    ),
    (
        PokemonType::Ghost,
        &["ghost", "spirit", "phantom", "haunted", "spectral"],
    ),
    (PokemonType::Dragon, &["dragon", "drake", "serpent", "draconic"]),
    (
        PokemonType::Dark,
        &["dark", "shadow", "night", "evil", "sinister"],
    ),
    (
        PokemonType::Steel,
        &["steel", "metal", "iron", "mechanical", "robot"],
    ),
    (
        PokemonType::Fairy,
        &["fairy", "magical", "pixie", "cute", "enchanted"],
    ),
    (PokemonType::Poison, &["poison", "toxic", "venom", "acid"]),
    (PokemonType::Ground, &["ground", "earth", "sand", "mud", "dirt"]),
    (PokemonType::Flying, &["flying", "bird", "wing", "sky", "air"]),
    (PokemonType::Bug, &["bug", "insect", "beetle", "spider", "moth"]),
    (PokemonType::Rock, &["rock", "stone", "boulder", "mineral"]),
    (PokemonType::Normal, &["normal", "common"]),
];

const CULTURE_KEYWORDS: &[(&str, &[&str])] = &[
    ("vietnam", &["vietnam", "pho", "bun bo", "banh mi", "ao dai"]),
    ("japan", &["japan", "samurai", "ninja", "sakura", "oni", "yokai"]),
    ("mexico", &["mexico", "aztec", "mayan", "dia de los muertos"]),
    ("india", &["india", "hindu", "curry", "elephant", "ganesh"]),
    ("china", &["china", "chinese", "dragon", "panda", "jade"]),
    ("korea", &["korea", "korean", "kimchi", "hanbok"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inference {
    pub types: Vec<PokemonType>,
    pub culture: &'static str,
}

/// Up to two types whose keywords occur in the description, in table
/// order. Falls back to Normal.
pub fn infer_types(description: &str) -> Vec<PokemonType> {
    let lower = description.to_lowercase();
    let mut types: Vec<PokemonType> = TYPE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(t, _)| *t)
        .take(2)
        .collect();
    if types.is_empty() {
        types.push(PokemonType::Normal);
    }
    types
}

/// First culture whose keywords occur in the description.
pub fn infer_culture(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    CULTURE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(culture, _)| *culture)
        .unwrap_or(DEFAULT_CULTURE)
}

pub fn infer(description: &str) -> Inference {
    Inference {
        types: infer_types(description),
        culture: infer_culture(description),
    }
}
