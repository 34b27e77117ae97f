// HTTP API routes (Pokédex, trainers, daily challenges, tournaments, Hall of Fame).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::auth::{self, Admin, AdminSecret, AuthTrainer, OptionalAuthTrainer};
use crate::bracket::RoundOutcome;
use crate::config::Config;
use crate::daily_challenge::{self, ChallengeLedger};
use crate::error::{AppError, Result};
use crate::hall_of_fame::{HallOfFame, Induction};
use crate::inference;
use crate::metrics;
use crate::models::{DexNumber, InductionType, NewPokemon, PokemonType, Stats, Tier};
use crate::name_filter;
use crate::pokedex::{Pokedex, DEFAULT_PAGE_SIZE, DEFAULT_RECENT_LIMIT};
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::store::Store;
use crate::tournament::{TournamentService, DEFAULT_HISTORY_LIMIT};
use crate::trainers::{Trainers, DEFAULT_LEADERBOARD_LIMIT};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ValidateNameRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct InferRequest {
    pub description: String,
}

#[derive(Deserialize)]
pub struct RegisterTrainerRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ActiveTimeRequest {
    pub seconds: i64,
}

/// A generated Pokémon submitted by the signed-in trainer.
#[derive(Deserialize)]
pub struct RegisterPokemonRequest {
    pub name: String,
    pub types: Vec<PokemonType>,
    pub stats: Stats,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub is_shiny: bool,
    pub culture: Option<String>,
    pub category: Option<String>,
    pub pokedex_entry: Option<String>,
    pub image_url: Option<String>,
    /// Daily challenge the Pokémon was created for.
    pub challenge_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CompleteChallengeRequest {
    pub pokemon_id: DexNumber,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub matchup_id: String,
    pub pokemon_id: DexNumber,
}

#[derive(Deserialize)]
pub struct InductChampionRequest {
    pub tournament_id: String,
    pub creator_quote: Option<String>,
}

#[derive(Deserialize)]
pub struct InductFanFavoriteRequest {
    pub pokemon_id: DexNumber,
    pub creator_quote: Option<String>,
}

#[derive(Deserialize)]
pub struct InductProfessorsChoiceRequest {
    pub pokemon_id: DexNumber,
    #[serde(default)]
    pub reason: String,
    pub creator_quote: Option<String>,
}

#[derive(Deserialize)]
pub struct PokedexParams {
    #[serde(rename = "type")]
    pub pokemon_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct HallOfFameParams {
    #[serde(rename = "type")]
    pub induction_type: Option<String>,
}

#[derive(Deserialize)]
pub struct CandidateParams {
    pub min_votes: Option<u32>,
    pub min_tournaments: Option<u32>,
}

// ── Shared application state ─────────────────────────────────────────

pub struct AppState<S> {
    pub store: Arc<S>,
    pub tournaments: Arc<TournamentService<S>>,
    pub hall_of_fame: Arc<HallOfFame<S>>,
    pub pokedex: Arc<Pokedex<S>>,
    pub trainers: Arc<Trainers<S>>,
    pub rate_limiter: RateLimiter,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tournaments: self.tournaments.clone(),
            hall_of_fame: self.hall_of_fame.clone(),
            pokedex: self.pokedex.clone(),
            trainers: self.trainers.clone(),
            rate_limiter: self.rate_limiter.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self::with_tournaments(
            store.clone(),
            TournamentService::new(store, config.season),
            config,
        )
    }

    /// State around a prepared tournament service (e.g. one with a seeded RNG).
    pub fn with_tournaments(
        store: Arc<S>,
        tournaments: TournamentService<S>,
        config: &Config,
    ) -> Self {
        Self {
            tournaments: Arc::new(tournaments),
            hall_of_fame: Arc::new(HallOfFame::new(store.clone(), config.fan_favorite)),
            pokedex: Arc::new(Pokedex::new(store.clone())),
            trainers: Arc::new(Trainers::new(store.clone())),
            rate_limiter: RateLimiter::new(),
            store,
        }
    }
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router<S: Store>(state: AppState<S>, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Utilities
        .route("/api/validate-name", post(validate_name))
        .route("/api/infer", post(infer_concept))
        // Trainers
        .route("/api/trainers", post(register_trainer::<S>))
        .route("/api/trainers/me/active-time", post(record_active_time::<S>))
        .route("/api/trainers/{id}", get(get_trainer::<S>))
        .route("/api/trainers/{id}/stats", get(get_trainer_stats::<S>))
        .route("/api/leaderboard", get(leaderboard::<S>))
        // Pokédex
        .route(
            "/api/pokedex",
            get(list_pokemon::<S>).post(register_pokemon::<S>),
        )
        .route("/api/pokedex/stats", get(pokedex_stats::<S>))
        .route("/api/pokedex/recent", get(recent_pokemon::<S>))
        .route("/api/pokedex/search", get(search_pokemon::<S>))
        .route("/api/pokedex/shinies", get(shiny_pokemon::<S>))
        .route("/api/pokedex/{dex_number}", get(get_pokemon::<S>))
        // Daily challenge
        .route("/api/daily-challenge", get(get_daily_challenge::<S>))
        .route(
            "/api/daily-challenge/complete",
            post(complete_daily_challenge::<S>),
        )
        .route(
            "/api/daily-challenge/history/{trainer_id}",
            get(challenge_history::<S>),
        )
        // Tournaments
        .route("/api/tournaments", post(create_tournament::<S>))
        .route("/api/tournaments/current", get(current_tournament::<S>))
        .route(
            "/api/tournaments/current/matchups",
            get(active_matchups::<S>),
        )
        .route("/api/tournaments/vote", post(cast_vote::<S>))
        .route("/api/tournaments/history", get(tournament_history::<S>))
        .route("/api/tournaments/{id}", get(get_tournament::<S>))
        .route(
            "/api/tournaments/{id}/advance",
            post(advance_tournament::<S>),
        )
        // Hall of Fame
        .route("/api/hall-of-fame", get(list_hall_of_fame::<S>))
        .route("/api/hall-of-fame/stats", get(hall_of_fame_stats::<S>))
        .route(
            "/api/hall-of-fame/fan-favorite-candidates",
            get(fan_favorite_candidates::<S>),
        )
        .route(
            "/api/hall-of-fame/induct-champion",
            post(induct_champion::<S>),
        )
        .route(
            "/api/hall-of-fame/induct-fan-favorite",
            post(induct_fan_favorite::<S>),
        )
        .route(
            "/api/hall-of-fame/induct-professors-choice",
            post(induct_professors_choice::<S>),
        )
        .route("/api/hall-of-fame/{pokemon_id}", get(get_inductee::<S>))
        .with_state(state)
        // Generated artwork
        .nest_service("/outputs", ServeDir::new(&config.outputs_dir))
        .layer(middleware::from_fn(track_metrics))
        .layer(Extension(AdminSecret(config.admin_token.clone())))
        .layer(CorsLayer::permissive())
}

/// Count and time every request by method, normalized path and status.
async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
        .inc();
    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "pokedream-backend", "region": crate::REGION }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Utility handlers ──────────────────────────────────────────────────

async fn validate_name(Json(req): Json<ValidateNameRequest>) -> impl IntoResponse {
    match name_filter::check_name(&req.name) {
        Ok(name) => Json(json!({
            "valid": true,
            "sanitized": name_filter::sanitize_name(name),
        })),
        Err(e) => Json(json!({ "valid": false, "reason": e.to_string() })),
    }
}

async fn infer_concept(Json(req): Json<InferRequest>) -> impl IntoResponse {
    Json(inference::infer(&req.description))
}

// ── Trainer handlers ──────────────────────────────────────────────────

async fn register_trainer<S: Store>(
    State(state): State<AppState<S>>,
    Json(req): Json<RegisterTrainerRequest>,
) -> Result<Response> {
    let (trainer, created) = state.trainers.register(&req.name, Utc::now()).await?;
    let token = match auth::create_token(&trainer.id, &trainer.name) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create token",
            ));
        }
    };
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({ "trainer": trainer, "token": token, "created": created })),
    )
        .into_response())
}

async fn get_trainer<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let trainer = state.trainers.get(&id).await?;
    Ok(Json(json!({ "trainer": trainer })))
}

async fn get_trainer_stats<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.trainers.stats(&id).await?))
}

async fn record_active_time<S: Store>(
    State(state): State<AppState<S>>,
    AuthTrainer(claims): AuthTrainer,
    Json(req): Json<ActiveTimeRequest>,
) -> Result<impl IntoResponse> {
    let trainer = state
        .trainers
        .heartbeat(&claims.sub, req.seconds, Utc::now())
        .await?;
    Ok(Json(json!({ "trainer": trainer })))
}

async fn leaderboard<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let trainers = state.trainers.leaderboard(limit).await?;
    Ok(Json(json!({ "trainers": trainers })))
}

// ── Pokédex handlers ──────────────────────────────────────────────────

async fn register_pokemon<S: Store>(
    State(state): State<AppState<S>>,
    AuthTrainer(claims): AuthTrainer,
    Json(req): Json<RegisterPokemonRequest>,
) -> Result<Response> {
    if let Err(e) = state
        .rate_limiter
        .check_limit(&claims.sub, RateLimitType::PokemonSubmissions)
    {
        return Ok(e.into_response());
    }

    let new = NewPokemon {
        name: req.name,
        types: req.types,
        stats: req.stats,
        tier: req.tier,
        trainer_id: claims.sub,
        trainer_name: claims.name,
        is_shiny: req.is_shiny,
        culture: req.culture,
        category: req.category,
        pokedex_entry: req.pokedex_entry,
        image_url: req.image_url,
    };
    let registration = state
        .pokedex
        .register(new, req.challenge_id.as_deref(), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(registration)).into_response())
}

async fn list_pokemon<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<PokedexParams>,
) -> Result<impl IntoResponse> {
    let type_filter = match params.pokemon_type.as_deref() {
        Some(name) => Some(PokemonType::from_str_name(name).ok_or_else(|| {
            AppError::InvalidInput(format!("Unknown type '{name}'"))
        })?),
        None => None,
    };
    let page = state
        .pokedex
        .list(
            type_filter,
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

async fn pokedex_stats<S: Store>(State(state): State<AppState<S>>) -> Result<impl IntoResponse> {
    Ok(Json(state.pokedex.stats().await?))
}

async fn recent_pokemon<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(json!({ "pokemon": state.pokedex.recent(limit).await? })))
}

async fn search_pokemon<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse> {
    Ok(Json(json!({ "pokemon": state.pokedex.search(&params.q).await? })))
}

async fn shiny_pokemon<S: Store>(State(state): State<AppState<S>>) -> Result<impl IntoResponse> {
    Ok(Json(json!({ "pokemon": state.pokedex.shinies().await? })))
}

async fn get_pokemon<S: Store>(
    State(state): State<AppState<S>>,
    Path(dex_number): Path<DexNumber>,
) -> Result<impl IntoResponse> {
    Ok(Json(json!({ "pokemon": state.pokedex.get(dex_number).await? })))
}

// ── Daily challenge handlers ──────────────────────────────────────────

async fn get_daily_challenge<S: Store>(
    State(state): State<AppState<S>>,
    OptionalAuthTrainer(claims): OptionalAuthTrainer,
) -> Result<impl IntoResponse> {
    let challenge = daily_challenge::today(Utc::now());
    let completed = match claims {
        Some(c) => {
            ChallengeLedger::new(&*state.store)
                .has_completed(&c.sub, &challenge.id)
                .await?
        }
        None => false,
    };

    let mut body = json!(challenge);
    body["completed"] = json!(completed);
    Ok(Json(body))
}

async fn complete_daily_challenge<S: Store>(
    State(state): State<AppState<S>>,
    AuthTrainer(claims): AuthTrainer,
    Json(req): Json<CompleteChallengeRequest>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let challenge = daily_challenge::today(now);
    let pokemon = state.pokedex.get(req.pokemon_id).await?;

    if pokemon.trainer_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the creator can complete a challenge with this Pokémon".to_string(),
        ));
    }
    if !challenge.is_satisfied_by(&pokemon.types) {
        return Err(AppError::InvalidInput(format!(
            "{} does not meet today's challenge",
            pokemon.name
        )));
    }

    ChallengeLedger::new(&*state.store)
        .mark_completed(&claims.sub, &challenge.id, &pokemon.id, now)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Challenge completed!",
        "challenge_id": challenge.id,
    })))
}

async fn challenge_history<S: Store>(
    State(state): State<AppState<S>>,
    Path(trainer_id): Path<String>,
) -> Result<impl IntoResponse> {
    let completions = ChallengeLedger::new(&*state.store)
        .history(&trainer_id)
        .await?;
    let total_completed = completions.len();
    Ok(Json(json!({
        "completions": completions,
        "total_completed": total_completed,
    })))
}

// ── Tournament handlers ───────────────────────────────────────────────

async fn current_tournament<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse> {
    let tournament = state.tournaments.current(Utc::now()).await?;
    Ok(Json(json!({ "tournament": tournament })))
}

async fn create_tournament<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
) -> Result<impl IntoResponse> {
    let tournament = state.tournaments.create(Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "tournament": tournament }))))
}

async fn active_matchups<S: Store>(State(state): State<AppState<S>>) -> Result<impl IntoResponse> {
    Ok(Json(state.tournaments.active_matchups(Utc::now()).await?))
}

async fn cast_vote<S: Store>(
    State(state): State<AppState<S>>,
    AuthTrainer(claims): AuthTrainer,
    Json(req): Json<VoteRequest>,
) -> Result<Response> {
    if let Err(e) = state
        .rate_limiter
        .check_limit(&claims.sub, RateLimitType::Votes)
    {
        return Ok(e.into_response());
    }
    // Rejected votes do not count against the budget.
    let vote = match state
        .tournaments
        .cast_vote(&claims.sub, &req.matchup_id, req.pokemon_id, Utc::now())
        .await
    {
        Ok(vote) => vote,
        Err(e) => {
            state.rate_limiter.refund(&claims.sub, RateLimitType::Votes);
            return Err(e);
        }
    };
    Ok(Json(json!({ "success": true, "vote": vote })).into_response())
}

async fn advance_tournament<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let (tournament, outcome) = state.tournaments.advance(&id).await?;
    let body = match outcome {
        RoundOutcome::Advanced { round } => json!({
            "status": "advanced",
            "round": round,
            "tournament": tournament,
        }),
        RoundOutcome::Champion { pokemon_id } => json!({
            "status": "complete",
            "champion_id": pokemon_id,
            "tournament": tournament,
        }),
    };
    Ok(Json(body))
}

async fn get_tournament<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(json!({ "tournament": state.tournaments.get(&id).await? })))
}

async fn tournament_history<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(json!({ "tournaments": state.tournaments.history(limit).await? })))
}

// ── Hall of Fame handlers ─────────────────────────────────────────────

async fn list_hall_of_fame<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<HallOfFameParams>,
) -> Result<impl IntoResponse> {
    let filter = match params.induction_type.as_deref() {
        Some(name) => Some(InductionType::from_str_name(name).ok_or_else(|| {
            AppError::InvalidInput(format!("Unknown induction type '{name}'"))
        })?),
        None => None,
    };
    Ok(Json(json!({ "inductees": state.hall_of_fame.list(filter).await? })))
}

async fn hall_of_fame_stats<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.hall_of_fame.stats().await?))
}

async fn fan_favorite_candidates<S: Store>(
    State(state): State<AppState<S>>,
    Query(params): Query<CandidateParams>,
) -> Result<impl IntoResponse> {
    let defaults = state.hall_of_fame.thresholds();
    let candidates = state
        .hall_of_fame
        .fan_favorite_candidates(
            params.min_votes.unwrap_or(defaults.min_votes),
            params.min_tournaments.unwrap_or(defaults.min_tournaments),
        )
        .await?;
    Ok(Json(json!({ "candidates": candidates })))
}

async fn get_inductee<S: Store>(
    State(state): State<AppState<S>>,
    Path(pokemon_id): Path<DexNumber>,
) -> Result<impl IntoResponse> {
    Ok(Json(json!({
        "inductee": state.hall_of_fame.get_inductee(pokemon_id).await?,
    })))
}

fn induction_response(induction: Induction) -> impl IntoResponse {
    let status = if induction.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(induction))
}

async fn induct_champion<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Json(req): Json<InductChampionRequest>,
) -> Result<impl IntoResponse> {
    let induction = state
        .hall_of_fame
        .induct_champion(&req.tournament_id, req.creator_quote, Utc::now())
        .await?;
    Ok(induction_response(induction))
}

async fn induct_fan_favorite<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Json(req): Json<InductFanFavoriteRequest>,
) -> Result<impl IntoResponse> {
    let induction = state
        .hall_of_fame
        .induct_fan_favorite(req.pokemon_id, req.creator_quote, Utc::now())
        .await?;
    Ok(induction_response(induction))
}

async fn induct_professors_choice<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Json(req): Json<InductProfessorsChoiceRequest>,
) -> Result<impl IntoResponse> {
    let induction = state
        .hall_of_fame
        .induct_professors_choice(req.pokemon_id, &req.reason, req.creator_quote, Utc::now())
        .await?;
    Ok(induction_response(induction))
}
