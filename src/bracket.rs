// Bracket engine: entrant selection, seeding and round resolution for
// 16-entrant single-elimination tournaments. Nothing here touches storage;
// the caller supplies the catalog, the clock, vote tallies and the RNG.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::{
    DexNumber, Matchup, MatchupStatus, Pokemon, PokemonType, Tournament, TournamentStatus,
    BRACKET_SIZE, ROUND_COUNT, TOURNAMENT_DAYS,
};

/// Recency window tried first when picking entrants.
pub const ELIGIBILITY_DAYS: i64 = 14;
/// Wider window tried when the first one is too thin.
pub const WIDENED_ELIGIBILITY_DAYS: i64 = 30;
/// Size of the most-recent fallback pool when both windows are too thin.
pub const FALLBACK_POOL_SIZE: usize = 32;
/// Entrants allowed per type tag before the diversity cap rejects a candidate.
pub const MAX_PER_TYPE: usize = 2;

/// Outcome of resolving the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Winners moved on; `round` is the new current round.
    Advanced { round: u8 },
    /// The final was resolved.
    Champion { pokemon_id: DexNumber },
}

/// Candidates for a new bracket: the last 14 days, then the last 30, then
/// the 32 most recent regardless of age.
pub fn eligible_pool(catalog: &[Pokemon], now: DateTime<Utc>) -> Vec<&Pokemon> {
    for days in [ELIGIBILITY_DAYS, WIDENED_ELIGIBILITY_DAYS] {
        let cutoff = now - Duration::days(days);
        let pool: Vec<&Pokemon> = catalog.iter().filter(|p| p.added_at >= cutoff).collect();
        if pool.len() >= BRACKET_SIZE {
            return pool;
        }
    }

    let mut recent: Vec<&Pokemon> = catalog.iter().collect();
    recent.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    recent.truncate(FALLBACK_POOL_SIZE);
    recent
}

/// Pick 16 entrants in seeding order.
///
/// The pool is shuffled, then filled greedily under the per-type cap; any
/// shortfall is padded from the rest of the shuffled pool without the cap.
/// The final selection is shuffled again for seeding.
pub fn select_entrants<R: Rng + ?Sized>(
    catalog: &[Pokemon],
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<DexNumber>> {
    let mut pool = eligible_pool(catalog, now);
    if pool.len() < BRACKET_SIZE {
        return Err(AppError::InsufficientData(format!(
            "Need at least {BRACKET_SIZE} Pokémon for a tournament, found {}",
            pool.len()
        )));
    }
    pool.shuffle(rng);

    let mut type_counts: HashMap<PokemonType, usize> = HashMap::new();
    let mut taken = vec![false; pool.len()];
    let mut selected: Vec<DexNumber> = Vec::with_capacity(BRACKET_SIZE);

    for (i, pokemon) in pool.iter().enumerate() {
        if selected.len() >= BRACKET_SIZE {
            break;
        }
        let within_cap = pokemon
            .types
            .iter()
            .all(|t| type_counts.get(t).copied().unwrap_or(0) < MAX_PER_TYPE);
        if within_cap {
            for t in &pokemon.types {
                *type_counts.entry(*t).or_insert(0) += 1;
            }
            taken[i] = true;
            selected.push(pokemon.dex_number);
        }
    }

    // Pad in shuffled order, cap no longer enforced.
    for (i, pokemon) in pool.iter().enumerate() {
        if selected.len() >= BRACKET_SIZE {
            break;
        }
        if !taken[i] {
            selected.push(pokemon.dex_number);
        }
    }

    selected.shuffle(rng);
    Ok(selected)
}

/// Pair entrants sequentially: (0 vs 1), (2 vs 3), etc. A trailing odd
/// entrant is left out.
pub fn pair_sequential(entrants: &[DexNumber]) -> Vec<(DexNumber, DexNumber)> {
    entrants
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

/// Matchups for every round. Round 1 pairs consecutive entrants and is
/// active; later rounds are pending slots (4, 2, 1).
pub fn build_bracket(tournament_id: &str, entrants: &[DexNumber]) -> Vec<Vec<Matchup>> {
    let mut bracket = Vec::with_capacity(usize::from(ROUND_COUNT));

    let first_round = pair_sequential(entrants)
        .into_iter()
        .enumerate()
        .map(|(i, (a, b))| Matchup {
            pokemon_a_id: Some(a),
            pokemon_b_id: Some(b),
            status: MatchupStatus::Active,
            ..Matchup::pending(tournament_id, 1, i)
        })
        .collect();
    bracket.push(first_round);

    for round in 2..=ROUND_COUNT {
        let slots = BRACKET_SIZE >> round;
        bracket.push(
            (0..slots)
                .map(|i| Matchup::pending(tournament_id, round, i))
                .collect(),
        );
    }

    bracket
}

/// A fresh tournament running from `now` for 14 days.
pub fn new_tournament(
    season: u32,
    week: u32,
    entrants: Vec<DexNumber>,
    now: DateTime<Utc>,
) -> Tournament {
    let id = Tournament::make_id(season, week);
    let bracket = build_bracket(&id, &entrants);
    Tournament {
        id,
        season,
        week,
        start_date: now,
        end_date: now + Duration::days(TOURNAMENT_DAYS),
        status: TournamentStatus::Active,
        current_round: 1,
        bracket,
        participants: entrants,
        champion_id: None,
        created_at: now,
    }
}

/// Strictly more votes wins; an exact tie is a coin flip.
pub fn decide_winner<R: Rng + ?Sized>(
    a: DexNumber,
    b: DexNumber,
    votes_a: u32,
    votes_b: u32,
    rng: &mut R,
) -> DexNumber {
    if votes_a > votes_b {
        a
    } else if votes_b > votes_a {
        b
    } else if rng.gen_bool(0.5) {
        a
    } else {
        b
    }
}

/// Resolve the current round using `tallies` (matchup id → votes for A and B;
/// missing entries count as 0–0) and move the winners on.
pub fn resolve_round<R: Rng + ?Sized>(
    tournament: &mut Tournament,
    tallies: &HashMap<String, (u32, u32)>,
    rng: &mut R,
) -> Result<RoundOutcome> {
    if tournament.status == TournamentStatus::Complete {
        return Err(AppError::InvalidState(format!(
            "Tournament {} has no further rounds",
            tournament.id
        )));
    }

    let round = tournament.current_round;
    let matchups = tournament
        .round_mut(round)
        .ok_or_else(|| AppError::InvalidState(format!("Round {round} does not exist")))?;

    let mut winners = Vec::with_capacity(matchups.len());
    for matchup in matchups.iter_mut() {
        let (Some(a), Some(b)) = (matchup.pokemon_a_id, matchup.pokemon_b_id) else {
            return Err(AppError::InvalidState(format!(
                "Matchup {} is missing a participant",
                matchup.matchup_id
            )));
        };
        let (votes_a, votes_b) = tallies.get(&matchup.matchup_id).copied().unwrap_or((0, 0));
        let winner = decide_winner(a, b, votes_a, votes_b, rng);
        matchup.votes_a = votes_a;
        matchup.votes_b = votes_b;
        matchup.winner_id = Some(winner);
        matchup.status = MatchupStatus::Complete;
        winners.push(winner);
    }

    if round >= ROUND_COUNT {
        let champion = winners[0];
        tournament.champion_id = Some(champion);
        tournament.status = TournamentStatus::Complete;
        return Ok(RoundOutcome::Champion {
            pokemon_id: champion,
        });
    }

    let next_round = round + 1;
    let next = tournament
        .round_mut(next_round)
        .ok_or_else(|| AppError::InvalidState(format!("Round {next_round} does not exist")))?;
    for (slot, (a, b)) in next.iter_mut().zip(pair_sequential(&winners)) {
        slot.pokemon_a_id = Some(a);
        slot.pokemon_b_id = Some(b);
        slot.status = MatchupStatus::Active;
    }
    tournament.current_round = next_round;

    Ok(RoundOutcome::Advanced { round: next_round })
}
