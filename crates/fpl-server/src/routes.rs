// HTTP routes: health, raw FPL views and the manager tools built on fpl-core.

use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};
use warp::{Filter, Rejection, Reply};

use fpl_core::analysis::{epdelta_rows, rank_captain_candidates, recommend_captain, template_vs_differential};
use fpl_core::domain::{Fixture, PicksPayload, PlayerId, Snapshot};
use fpl_core::fixtures::{fixtures_for_gameweek, link_fixtures_for_manager, FixtureContext, LinkedPick};
use fpl_core::names::{describe_fixture, describe_player, expand_action, NamesIndex};
use fpl_core::planner::{plan_gameweek, PlanInput};
use fpl_core::scoring::{round2, CaptainMode};
use fpl_core::transfers::{filter_suggestions, suggest_transfers, TransferBudget, TransferSuggestion};

use crate::config::PlannerConfig;
use crate::error::{handle_rejection, ApiError};
use crate::response::{
    AnalysisResponse, BootstrapSlim, CaptainCandidateExpanded, EpDeltaExpanded, FixturesResponse, HealthResponse,
    ManagerPicksResponse, PickExpanded, PickNote, PlannerData, PlannerMeta, PlannerResponse, PlannerSlot,
    SummaryResponse, TransferExpanded, TransferRow, PLANNER_SCHEMA_VERSION,
};
use crate::upstream::{FplSource, UpstreamError};

const CAPTAIN_CANDIDATES: usize = 3;
const ANALYSIS_TRANSFER_REASON: &str = "Higher projected EPΔ";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub source: Arc<dyn FplSource>,
    pub planner: PlannerConfig,
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ExpandQuery {
    #[serde(default)]
    pub expand: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisQuery {
    #[serde(default)]
    pub expand: bool,
    pub mode: Option<CaptainMode>,
    #[serde(default)]
    pub allow_hit: bool,
    pub bank_override: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PicksStrategy {
    /// Squad of the last live gameweek, searching back on 404.
    #[default]
    Latest,
    /// Squad of the target gameweek only.
    Exact,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlannerQuery {
    #[serde(default)]
    pub expand: bool,
    pub mode: Option<CaptainMode>,
    pub include_transfers: Option<bool>,
    #[serde(default)]
    pub allow_hit: bool,
    pub bank_override: Option<i64>,
    #[serde(default)]
    pub picks_strategy: PicksStrategy,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn valid_tid(tid: i64) -> Result<u32, ApiError> {
    u32::try_from(tid)
        .ok()
        .filter(|&t| t > 0)
        .ok_or_else(|| ApiError::Validation("tid must be > 0".to_string()))
}

fn valid_gw(gw: i64) -> Result<u32, ApiError> {
    u32::try_from(gw)
        .ok()
        .filter(|&g| g >= 1)
        .ok_or_else(|| ApiError::Validation("gw must be >= 1".to_string()))
}

// ---------------------------------------------------------------------------
// Upstream helpers
// ---------------------------------------------------------------------------

/// Bootstrap, picks and fixtures for one manager and gameweek, fetched
/// concurrently.
async fn load_manager_gameweek(
    ctx: &AppContext,
    tid: u32,
    gw: u32,
) -> Result<(Snapshot, PicksPayload, Vec<Fixture>), ApiError> {
    let (payload, picks, fixtures) = tokio::try_join!(
        ctx.source.bootstrap(),
        ctx.source.manager_picks(tid, gw),
        ctx.source.fixtures()
    )?;
    Ok((Snapshot::from_bootstrap(&payload), picks, fixtures))
}

/// Walk back from the last live gameweek until a squad is found. Only a
/// missing squad moves the search on; any other upstream failure ends it.
pub async fn find_latest_picks(
    source: &dyn FplSource,
    tid: u32,
    last_live: Option<u32>,
) -> Result<(PicksPayload, u32), ApiError> {
    let Some(mut gw) = last_live else {
        return Err(ApiError::Upstream(
            "Cannot determine last live GW from bootstrap".to_string(),
        ));
    };
    while gw >= 1 {
        match source.manager_picks(tid, gw).await {
            Ok(picks) => return Ok((picks, gw)),
            Err(UpstreamError::NotFound) => {
                debug!(tid, gw, "no picks for gameweek, trying the previous one");
                gw -= 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::NotFound(
        "Could not load any baseline picks for this team".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Expansion helpers
// ---------------------------------------------------------------------------

fn expand_picks(snapshot: &Snapshot, linked: &[LinkedPick<'_>]) -> Vec<PickExpanded> {
    linked
        .iter()
        .map(|row| PickExpanded {
            player: describe_player(snapshot, row.element()),
            is_captain: row.pick.is_captain,
            is_vice_captain: row.pick.is_vice_captain,
            fixture: row.fixture.map(|f| describe_fixture(snapshot, &f)),
        })
        .collect()
}

fn expand_transfers(snapshot: &Snapshot, rows: &[TransferRow]) -> Vec<TransferExpanded> {
    rows.iter()
        .map(|r| TransferExpanded {
            out: describe_player(snapshot, r.out_element),
            incoming: describe_player(snapshot, r.in_element),
            reason: r.reason.clone(),
            epdelta_gain: r.epdelta_gain,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn get_bootstrap_data(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let payload = ctx.source.bootstrap().await.map_err(ApiError::from)?;
    let snapshot = Snapshot::from_bootstrap(&payload);
    Ok(warp::reply::json(&BootstrapSlim::build(&payload, &snapshot)))
}

pub async fn get_fixtures(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let fixtures = ctx.source.fixtures().await.map_err(ApiError::from)?;
    Ok(warp::reply::json(&FixturesResponse { fixtures }))
}

pub async fn get_fixtures_by_gw(gw: i64, ctx: AppContext) -> Result<impl Reply, Rejection> {
    let gw = valid_gw(gw)?;
    let fixtures = ctx.source.fixtures().await.map_err(ApiError::from)?;
    Ok(warp::reply::json(&FixturesResponse {
        fixtures: fixtures_for_gameweek(&fixtures, gw),
    }))
}

pub async fn get_manager_picks(
    tid: i64,
    gw: i64,
    query: ExpandQuery,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let tid = valid_tid(tid)?;
    let gw = valid_gw(gw)?;

    if !query.expand {
        let picks = ctx.source.manager_picks(tid, gw).await.map_err(ApiError::from)?;
        return Ok(warp::reply::json(&ManagerPicksResponse {
            picks: picks.picks,
            picks_expanded: None,
        }));
    }

    let (snapshot, picks, fixtures) = load_manager_gameweek(&ctx, tid, gw).await?;
    let linked = link_fixtures_for_manager(gw, &picks.picks, &fixtures, &snapshot);
    let picks_expanded = expand_picks(&snapshot, &linked);
    Ok(warp::reply::json(&ManagerPicksResponse {
        picks: picks.picks.clone(),
        picks_expanded: Some(picks_expanded),
    }))
}

pub async fn get_manager_gameweek_summary(
    tid: i64,
    gw: i64,
    query: ExpandQuery,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let tid = valid_tid(tid)?;
    let gw = valid_gw(gw)?;
    info!(tid, gw, "manager gameweek summary");

    let (snapshot, picks, fixtures) = load_manager_gameweek(&ctx, tid, gw).await?;
    let ownership = snapshot.ownership_index();
    let linked = link_fixtures_for_manager(gw, &picks.picks, &fixtures, &snapshot);

    let captain_candidates = rank_captain_candidates(&linked, &ownership, CaptainMode::Safe, CAPTAIN_CANDIDATES);
    let (picks_expanded, captain_candidates_expanded) = if query.expand {
        let candidates = captain_candidates
            .iter()
            .map(|c| CaptainCandidateExpanded {
                player: describe_player(&snapshot, c.element),
                score: c.score,
            })
            .collect();
        (Some(expand_picks(&snapshot, &linked)), Some(candidates))
    } else {
        (None, None)
    };

    Ok(warp::reply::json(&SummaryResponse {
        gw,
        picks: picks.picks.iter().map(PickNote::from).collect(),
        template_vs_differential: template_vs_differential(&picks.picks, &ownership, ctx.planner.template_threshold),
        captain_candidates,
        picks_expanded,
        captain_candidates_expanded,
    }))
}

pub async fn get_manager_gameweek_analysis(
    tid: i64,
    gw: i64,
    query: AnalysisQuery,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let tid = valid_tid(tid)?;
    let gw = valid_gw(gw)?;
    let mode = query.mode.unwrap_or(CaptainMode::Aggressive);
    info!(tid, gw, %mode, allow_hit = query.allow_hit, "manager gameweek analysis");

    let (snapshot, picks, fixtures) = load_manager_gameweek(&ctx, tid, gw).await?;
    let ownership = snapshot.ownership_index();
    let linked = link_fixtures_for_manager(gw, &picks.picks, &fixtures, &snapshot);

    let safe = recommend_captain(&linked, &ownership, CaptainMode::Safe);
    let aggressive = recommend_captain(&linked, &ownership, CaptainMode::Aggressive);
    let epdeltas = epdelta_rows(&linked);

    let budget = TransferBudget {
        bank: query.bank_override.unwrap_or_else(|| picks.bank()),
        allowance: if query.allow_hit { ctx.planner.hit_allowance } else { 0 },
    };
    let transfer_suggestions: Vec<TransferRow> = suggest_transfers(&linked, &snapshot, budget)
        .iter()
        .map(|s| TransferRow::from_suggestion(s, ANALYSIS_TRANSFER_REASON, s.gain()))
        .collect();

    let mut resp = AnalysisResponse {
        gw,
        recommended_captain_safe: safe,
        recommended_captain_aggressive: aggressive,
        epdeltas,
        transfer_suggestions,
        epdeltas_expanded: None,
        recommended_captain_safe_expanded: None,
        recommended_captain_aggressive_expanded: None,
        transfer_suggestions_expanded: None,
    };

    if query.expand {
        resp.epdeltas_expanded = Some(
            resp.epdeltas
                .iter()
                .map(|row| {
                    let context = FixtureContext {
                        was_home: row.was_home,
                        opponent_team_id: row.opponent_team,
                        opponent_strength: row.opponent_strength,
                    };
                    EpDeltaExpanded {
                        player: describe_player(&snapshot, row.element),
                        epdelta: row.epdelta,
                        fixture: describe_fixture(&snapshot, &context),
                    }
                })
                .collect(),
        );
        resp.recommended_captain_safe_expanded = Some(CaptainCandidateExpanded {
            player: describe_player(&snapshot, safe.element),
            score: safe.score,
        });
        resp.recommended_captain_aggressive_expanded = Some(CaptainCandidateExpanded {
            player: describe_player(&snapshot, aggressive.element),
            score: aggressive.score,
        });
        resp.transfer_suggestions_expanded = Some(expand_transfers(&snapshot, &resp.transfer_suggestions));
    }

    Ok(warp::reply::json(&resp))
}

pub async fn get_names_index(ctx: AppContext) -> Result<impl Reply, Rejection> {
    let payload = ctx.source.bootstrap().await.map_err(ApiError::from)?;
    let snapshot = Snapshot::from_bootstrap(&payload);
    Ok(warp::reply::json(&NamesIndex::build(&snapshot)))
}

/// Planner transfer rows: gain at least the configured minimum, one row per
/// incoming player, gain rounded to 2 dp.
fn planner_transfer_rows(suggestions: &[TransferSuggestion], min_gain: f64) -> Vec<TransferRow> {
    filter_suggestions(suggestions, min_gain)
        .iter()
        .map(|s| TransferRow::from_suggestion(s, s.reason.clone(), round2(s.gain())))
        .collect()
}

pub async fn get_gameweek_planner(
    tid: i64,
    gw: i64,
    query: PlannerQuery,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let (tid, gw) = match (u32::try_from(tid), u32::try_from(gw)) {
        (Ok(t), Ok(g)) if t > 0 && g > 0 => (t, g),
        _ => return Err(ApiError::Validation("Invalid tid/gw".to_string()).into()),
    };
    let mode = query.mode.unwrap_or(ctx.planner.default_mode);
    let include_transfers = query.include_transfers.unwrap_or(true);
    info!(tid, gw, %mode, strategy = ?query.picks_strategy, "gameweek planner");

    let (payload, fixtures) = tokio::try_join!(ctx.source.bootstrap(), ctx.source.fixtures())
        .map_err(ApiError::from)?;
    let snapshot = Snapshot::from_bootstrap(&payload);

    let (picks, picks_gw_used) = match query.picks_strategy {
        PicksStrategy::Exact => {
            let picks = ctx.source.manager_picks(tid, gw).await.map_err(ApiError::from)?;
            (picks, gw)
        }
        PicksStrategy::Latest => find_latest_picks(ctx.source.as_ref(), tid, snapshot.last_live_gameweek()).await?,
    };

    let fixtures_gw = fixtures_for_gameweek(&fixtures, gw);
    let ownership = snapshot.ownership_index();
    let plan = plan_gameweek(&PlanInput {
        picks: &picks.picks,
        snapshot: &snapshot,
        fixtures_gw: &fixtures_gw,
        gw,
        ownership: &ownership,
        mode,
    })
    .map_err(ApiError::from)?;

    let bank_used = query.bank_override.unwrap_or_else(|| picks.bank());
    let linked = link_fixtures_for_manager(gw, &picks.picks, &fixtures, &snapshot);

    let transfer_suggestions = include_transfers.then(|| {
        let budget = TransferBudget {
            bank: bank_used,
            allowance: if query.allow_hit { ctx.planner.hit_allowance } else { 0 },
        };
        let suggestions = suggest_transfers(&linked, &snapshot, budget);
        planner_transfer_rows(&suggestions, ctx.planner.min_transfer_gain)
    });

    let mut resp = PlannerResponse {
        schema_version: PLANNER_SCHEMA_VERSION,
        generated_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        meta: PlannerMeta {
            tid,
            gw,
            mode,
            allow_hit: query.allow_hit,
            bank_used,
        },
        data: PlannerData {
            gw,
            picks_gw_used,
            plan: plan.data,
        },
        actions: plan.actions,
        summary: plan.summary,
        summary_long: plan.summary_long,
        transfer_suggestions,
        actions_expanded: None,
        current_expanded: None,
        optimal_expanded: None,
        bench_expanded: None,
        transfer_suggestions_expanded: None,
    };

    if query.expand {
        let fixture_of: HashMap<PlayerId, FixtureContext> = linked
            .iter()
            .filter_map(|row| Some((row.element(), row.fixture?)))
            .collect();
        let data = &resp.data.plan;
        let slot = |id: PlayerId, captaincy: bool| PlannerSlot {
            player: describe_player(&snapshot, id),
            fixture: fixture_of.get(&id).map(|f| describe_fixture(&snapshot, f)),
            epdelta: data.per_player_ep.get(id),
            is_captain: captaincy && id == data.captain,
            is_vice_captain: captaincy && id == data.vice_captain,
        };

        let current: Vec<PlannerSlot> = data.current_start.iter().map(|&id| slot(id, true)).collect();
        let optimal: Vec<PlannerSlot> = data.optimal_start.iter().map(|&id| slot(id, true)).collect();
        let bench: Vec<PlannerSlot> = data.optimal_bench.iter().map(|&id| slot(id, false)).collect();
        let actions: Vec<_> = resp.actions.iter().map(|a| expand_action(&snapshot, a)).collect();

        resp.current_expanded = Some(current);
        resp.optimal_expanded = Some(optimal);
        resp.bench_expanded = Some(bench);
        resp.actions_expanded = Some(actions);
        resp.transfer_suggestions_expanded = resp
            .transfer_suggestions
            .as_deref()
            .filter(|rows| !rows.is_empty())
            .map(|rows| expand_transfers(&snapshot, rows));
    }

    Ok(warp::reply::json(&resp))
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// All routes, CORS open to any origin. Rejections are left to the caller.
pub fn create_routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let ctx_filter = warp::any().map(move || ctx.clone());
    let tools = warp::path("tools");

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&HealthResponse { status: "ok" }));

    let bootstrap = tools
        .and(warp::path("get_bootstrap_data"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(get_bootstrap_data);

    let fixtures = tools
        .and(warp::path("get_fixtures"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(get_fixtures);

    let fixtures_by_gw = tools
        .and(warp::path("get_fixtures_by_gw"))
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(get_fixtures_by_gw);

    let manager_picks = tools
        .and(warp::path("get_manager_picks"))
        .and(warp::path::param::<i64>())
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ExpandQuery>())
        .and(ctx_filter.clone())
        .and_then(get_manager_picks);

    let summary = tools
        .and(warp::path("get_manager_gameweek_summary"))
        .and(warp::path::param::<i64>())
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<ExpandQuery>())
        .and(ctx_filter.clone())
        .and_then(get_manager_gameweek_summary);

    let analysis = tools
        .and(warp::path("get_manager_gameweek_analysis"))
        .and(warp::path::param::<i64>())
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<AnalysisQuery>())
        .and(ctx_filter.clone())
        .and_then(get_manager_gameweek_analysis);

    let names = tools
        .and(warp::path("get_names_index"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(get_names_index);

    let planner = tools
        .and(warp::path("get_gameweek_planner"))
        .and(warp::path::param::<i64>())
        .and(warp::path::param::<i64>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<PlannerQuery>())
        .and(ctx_filter)
        .and_then(get_gameweek_planner);

    health
        .or(bootstrap)
        .or(fixtures)
        .or(fixtures_by_gw)
        .or(manager_picks)
        .or(summary)
        .or(analysis)
        .or(names)
        .or(planner)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "OPTIONS"]),
        )
}

/// Routes with rejections rendered as JSON errors.
pub fn app(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    create_routes(ctx).recover(handle_rejection)
}
