// PokéDream backend: Pokédex, trainers, daily challenges, bracket tournaments
// with a vote ledger, and the Hall of Fame.

pub mod api;
pub mod auth;
pub mod bracket;
pub mod config;
pub mod daily_challenge;
pub mod db;
pub mod error;
pub mod hall_of_fame;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod name_filter;
pub mod pokedex;
pub mod rate_limit;
pub mod store;
pub mod tournament;
pub mod trainers;
pub mod voting;

/// Region every Pokémon in the Pokédex belongs to.
pub const REGION: &str = "Oneira";
