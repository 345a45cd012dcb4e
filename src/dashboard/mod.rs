use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::alias::{AliasKind, AliasTable};
use crate::matches::presets::PRESETS;
use crate::matches::{FormatConfig, Match, MatchId, Race, SharedRegistry};
use crate::sc2::matcher::SharedMatcher;
use crate::sc2::{MonitorState, Task, TaskFlags};

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub matcher: SharedMatcher,
    pub alias_file: PathBuf,
    pub monitor_state: watch::Receiver<MonitorState>,
    pub tasks: TaskFlags,
}

type ApiError = (StatusCode, String);

#[derive(Debug, Serialize)]
pub struct MatchSummary {
    pub id: MatchId,
    pub team1: String,
    pub team2: String,
    pub score: (u32, u32),
    pub best_of: u32,
}

#[derive(Debug, Serialize)]
pub struct MatchList {
    pub order: Vec<MatchId>,
    pub active: MatchId,
    pub selected: MatchId,
    pub matches: Vec<MatchSummary>,
}

#[derive(Debug, Serialize)]
pub struct ActiveMatchView {
    pub id: MatchId,
    pub score: (u32, u32),
    pub best_of: u32,
    pub wins_required: u32,
    pub winner: i8,
    pub is_decided: bool,
    #[serde(rename = "match")]
    pub data: Match,
}

#[derive(Debug, Serialize)]
pub struct MonitorView {
    pub state: MonitorState,
    pub update_score: bool,
    pub toggle_score: bool,
    pub toggle_production: bool,
}

#[derive(Debug, Serialize)]
pub struct AliasView {
    pub player: BTreeMap<String, Vec<String>>,
    pub team: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewMatchRequest {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedMatch {
    pub id: MatchId,
}

#[derive(Debug, Serialize)]
pub struct RemovedMatch {
    pub selected: MatchId,
    pub active: MatchId,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order: Vec<MatchId>,
}

#[derive(Debug, Deserialize)]
pub struct TeamUpdate {
    pub team: usize,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlayerUpdate {
    pub team: usize,
    pub set_index: usize,
    pub name: String,
    #[serde(default)]
    pub race: Option<Race>,
}

#[derive(Debug, Deserialize)]
pub struct MapUpdate {
    pub set_index: usize,
    pub map: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreUpdate {
    pub set_index: usize,
    pub value: i8,
    /// Manual corrections replace decided sets unless told otherwise.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct PresetRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub reset_options: bool,
}

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
    pub kind: AliasKind,
    pub name: String,
    pub alias: String,
}

/// Build the Axum router for the status and editing API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/matches", get(matches_handler).post(create_match_handler))
        .route(
            "/api/matches/:id",
            get(match_handler).delete(remove_match_handler),
        )
        .route("/api/matches/:id/activate", post(activate_handler))
        .route("/api/matches/:id/select", post(select_handler))
        .route("/api/matches/:id/teams", put(teams_handler))
        .route("/api/matches/:id/players", put(players_handler))
        .route("/api/matches/:id/maps", put(maps_handler))
        .route("/api/matches/:id/score", put(score_handler))
        .route("/api/matches/:id/format", put(format_handler))
        .route("/api/matches/:id/preset", put(preset_handler))
        .route("/api/matches/:id/swap", put(swap_handler))
        .route("/api/matches/:id/reset", put(reset_handler))
        .route("/api/order", put(order_handler))
        .route("/api/active", get(active_handler))
        .route("/api/presets", get(presets_handler))
        .route(
            "/api/aliases",
            get(aliases_handler)
                .post(add_alias_handler)
                .delete(remove_alias_handler),
        )
        .route("/api/monitor", get(monitor_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn index_handler() -> impl IntoResponse {
    Html(STATUS_HTML)
}

fn not_found(id: MatchId) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Match {} not found", id))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message.into())
}

fn summary(id: MatchId, m: &Match) -> MatchSummary {
    let name = |team| m.team_or_player(team).unwrap_or_default().to_string();
    MatchSummary {
        id,
        team1: name(0),
        team2: name(1),
        score: m.score(),
        best_of: m.best_of(),
    }
}

/// Apply `edit` to match `id` as one bulk update and return the result.
///
/// Edits validate before mutating, so a rejected request leaves the match
/// untouched.
async fn edit_match<F>(state: &AppState, id: MatchId, edit: F) -> Result<Json<Match>, ApiError>
where
    F: FnOnce(&mut Match) -> Result<(), String>,
{
    let mut registry = state.registry.write().await;
    let active = registry.active_id();
    let m = registry.get_mut(id).ok_or_else(|| not_found(id))?;
    m.bulk_update(edit).map_err(bad_request)?;
    let updated = m.clone();
    if id != active {
        registry.mark_changed();
    }
    Ok(Json(updated))
}

/// GET /api/matches
async fn matches_handler(State(state): State<Arc<AppState>>) -> Json<MatchList> {
    let registry = state.registry.read().await;
    let matches = registry
        .order()
        .iter()
        .filter_map(|&id| registry.get(id).map(|m| summary(id, m)))
        .collect();
    Json(MatchList {
        order: registry.order().to_vec(),
        active: registry.active_id(),
        selected: registry.selected_id(),
        matches,
    })
}

/// POST /api/matches
async fn create_match_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewMatchRequest>,
) -> Result<(StatusCode, Json<CreatedMatch>), ApiError> {
    let mut seed = Match::new();
    if let Some(preset) = &req.preset {
        if !seed.apply_preset(preset) {
            return Err(bad_request(format!("Unknown preset '{}'", preset)));
        }
    }
    let mut registry = state.registry.write().await;
    let id = registry.new_match(Some(seed));
    if req.activate {
        registry.activate(id);
    }
    registry.mark_changed();
    info!("Created match {} via API", id);
    Ok((StatusCode::CREATED, Json(CreatedMatch { id })))
}

/// GET /api/matches/:id
async fn match_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Match>, ApiError> {
    let registry = state.registry.read().await;
    registry
        .get(MatchId(id))
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(MatchId(id)))
}

/// DELETE /api/matches/:id
async fn remove_match_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<RemovedMatch>, ApiError> {
    let id = MatchId(id);
    let mut registry = state.registry.write().await;
    if registry.get(id).is_none() {
        return Err(not_found(id));
    }
    let selected = registry.remove_match(id).ok_or_else(|| {
        (
            StatusCode::CONFLICT,
            "The last match cannot be removed".to_string(),
        )
    })?;
    registry.mark_changed();
    Ok(Json(RemovedMatch {
        selected,
        active: registry.active_id(),
    }))
}

/// POST /api/matches/:id/activate
async fn activate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let id = MatchId(id);
    let mut registry = state.registry.write().await;
    if !registry.activate(id) {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/matches/:id/select
async fn select_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let id = MatchId(id);
    let mut registry = state.registry.write().await;
    if !registry.select(id) {
        return Err(not_found(id));
    }
    registry.mark_changed();
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/order
async fn order_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OrderRequest>,
) -> Result<StatusCode, ApiError> {
    let mut registry = state.registry.write().await;
    if !registry.set_order(req.order) {
        return Err(bad_request("Order must list every match exactly once"));
    }
    registry.mark_changed();
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/matches/:id/teams
async fn teams_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(updates): Json<Vec<TeamUpdate>>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        if updates.iter().any(|u| u.team > 1) {
            return Err("team must be 0 or 1".to_string());
        }
        for u in &updates {
            m.set_team(u.team, &u.name, u.tag.as_deref());
        }
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/players
async fn players_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(updates): Json<Vec<PlayerUpdate>>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        if let Some(u) = updates.iter().find(|u| m.player(u.team, u.set_index).is_none()) {
            return Err(format!("No player slot {}/{}", u.team, u.set_index));
        }
        for u in &updates {
            m.set_player(u.team, u.set_index, u.name.trim(), u.race);
        }
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/maps
async fn maps_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(updates): Json<Vec<MapUpdate>>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        if let Some(u) = updates.iter().find(|u| m.set(u.set_index).is_none()) {
            return Err(format!("No set {}", u.set_index));
        }
        for u in &updates {
            m.set_map(u.set_index, u.map.trim());
        }
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/score
async fn score_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(update): Json<ScoreUpdate>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        if !m.set_score(update.set_index, update.value, update.overwrite) {
            return Err(format!(
                "Cannot write {} into set {}",
                update.value, update.set_index
            ));
        }
        if m.format().all_kill {
            m.all_kill_advance();
        }
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/format
async fn format_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(format): Json<FormatConfig>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        m.set_format(format);
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/preset
async fn preset_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(req): Json<PresetRequest>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        if m.apply_preset(&req.name) {
            Ok(())
        } else {
            Err(format!("Unknown preset '{}'", req.name))
        }
    })
    .await
}

/// PUT /api/matches/:id/swap
async fn swap_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        m.swap_teams();
        Ok(())
    })
    .await
}

/// PUT /api/matches/:id/reset
async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<Match>, ApiError> {
    edit_match(&state, MatchId(id), |m| {
        m.reset(req.reset_options);
        Ok(())
    })
    .await
}

/// GET /api/active
async fn active_handler(State(state): State<Arc<AppState>>) -> Result<Json<ActiveMatchView>, ApiError> {
    let registry = state.registry.read().await;
    let id = registry.active_id();
    let m = registry.active().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Active match {} missing", id),
        )
    })?;
    Ok(Json(ActiveMatchView {
        id,
        score: m.score(),
        best_of: m.best_of(),
        wins_required: m.wins_required(),
        winner: m.winner(),
        is_decided: m.is_decided(),
        data: m.clone(),
    }))
}

/// GET /api/presets
async fn presets_handler() -> Json<Vec<&'static str>> {
    Json(PRESETS.iter().map(|p| p.name).collect())
}

fn alias_view(aliases: &AliasTable) -> AliasView {
    let grouped = |kind: AliasKind| -> BTreeMap<String, Vec<String>> {
        aliases
            .aliases_by_name(kind)
            .into_iter()
            .map(|(name, list)| {
                (
                    name.to_string(),
                    list.into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    };
    AliasView {
        player: grouped(AliasKind::Player),
        team: grouped(AliasKind::Team),
    }
}

/// Write the alias file off the runtime.
async fn persist_aliases(state: &AppState, aliases: AliasTable) -> Result<(), ApiError> {
    let path = state.alias_file.clone();
    let internal = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, e);
    tokio::task::spawn_blocking(move || aliases.save(&path))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| {
            warn!("Failed to save aliases: {:#}", e);
            internal(format!("{:#}", e))
        })
}

/// GET /api/aliases
async fn aliases_handler(State(state): State<Arc<AppState>>) -> Json<AliasView> {
    let matcher = state.matcher.read().await;
    Json(alias_view(matcher.aliases()))
}

/// POST /api/aliases
async fn add_alias_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AliasRequest>,
) -> Result<Json<AliasView>, ApiError> {
    let snapshot = {
        let mut matcher = state.matcher.write().await;
        let aliases = matcher.aliases_mut();
        let added = match req.kind {
            AliasKind::Player => aliases.add_player_alias(&req.name, &req.alias),
            AliasKind::Team => aliases.add_team_alias(&req.name, &req.alias),
        };
        added.map_err(|e| bad_request(e.to_string()))?;
        aliases.clone()
    };
    let view = alias_view(&snapshot);
    persist_aliases(&state, snapshot).await?;
    Ok(Json(view))
}

/// DELETE /api/aliases
async fn remove_alias_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AliasRequest>,
) -> Result<Json<AliasView>, ApiError> {
    let snapshot = {
        let mut matcher = state.matcher.write().await;
        let aliases = matcher.aliases_mut();
        let removed = match req.kind {
            AliasKind::Player => aliases.remove_player_alias(&req.name, &req.alias),
            AliasKind::Team => aliases.remove_team_alias(&req.name, &req.alias),
        };
        if !removed {
            return Err((
                StatusCode::NOT_FOUND,
                format!("{} is not an alias of {}", req.alias, req.name),
            ));
        }
        aliases.clone()
    };
    let view = alias_view(&snapshot);
    persist_aliases(&state, snapshot).await?;
    Ok(Json(view))
}

/// GET /api/monitor
async fn monitor_handler(State(state): State<Arc<AppState>>) -> Json<MonitorView> {
    Json(MonitorView {
        state: *state.monitor_state.borrow(),
        update_score: state.tasks.is_active(Task::UpdateScore),
        toggle_score: state.tasks.is_active(Task::ToggleScore),
        toggle_production: state.tasks.is_active(Task::ToggleProduction),
    })
}

/// Embedded status page polling the JSON endpoints.
const STATUS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>SC2 Match Sync</title>
<style>
  body { background: #0f1117; color: #e0e0e0; font-family: 'Segoe UI', system-ui, sans-serif; padding: 1.5rem 2rem; }
  h1 { font-size: 1.4rem; margin-bottom: 1rem; }
  .panel { background: #1a1d27; border: 1px solid #2a2d3a; border-radius: 10px; padding: 1rem 1.2rem; margin-bottom: 1rem; }
  .score { font-size: 2rem; font-weight: 700; }
  .muted { color: #8888aa; font-size: .85rem; }
  table { width: 100%; border-collapse: collapse; }
  td, th { padding: .4rem .6rem; text-align: left; border-bottom: 1px solid #1e2130; }
</style>
</head>
<body>
<h1>SC2 Match Sync <span class="muted" id="monitor"></span></h1>
<div class="panel">
  <div class="muted" id="league"></div>
  <div class="score" id="score">-</div>
  <div class="muted" id="bo"></div>
</div>
<div class="panel">
  <table><thead><tr><th>Set</th><th>Map</th><th>Player 1</th><th>Player 2</th><th>Result</th></tr></thead>
  <tbody id="sets"></tbody></table>
</div>
<script>
async function refresh() {
  try {
    const mon = await (await fetch('/api/monitor')).json();
    document.getElementById('monitor').textContent = mon.state;
    const a = await (await fetch('/api/active')).json();
    const m = a.match;
    document.getElementById('league').textContent = m.league;
    document.getElementById('score').textContent =
      `${m.teams[0].name} ${a.score[0]} : ${a.score[1]} ${m.teams[1].name}`;
    document.getElementById('bo').textContent = `Bo${a.best_of}` + (a.is_decided ? ' (decided)' : '');
    const rows = m.sets.map((s, i) => {
      const p1 = m.players[0][i], p2 = m.players[1][i];
      const res = s.score < 0 ? '1 : 0' : s.score > 0 ? '0 : 1' : '';
      return `<tr><td>${s.label}</td><td>${s.map}</td><td>${p1.name} (${p1.race})</td><td>${p2.name} (${p2.race})</td><td>${res}</td></tr>`;
    });
    document.getElementById('sets').innerHTML = rows.join('');
  } catch (e) {
    document.getElementById('monitor').textContent = 'offline';
  }
}
refresh();
setInterval(refresh, 2000);
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::model::MatchChange;
    use crate::matches::registry::MatchRegistry;
    use crate::sc2::matcher::PlayerMatcher;
    use serde_json::{json, Value};

    struct TestApp {
        base: String,
        http: reqwest::Client,
        state: AppState,
        monitor_tx: watch::Sender<MonitorState>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        async fn start() -> TestApp {
            let mut registry = MatchRegistry::new();
            if let Some(m) = registry.active_mut() {
                m.set_team(0, "MiXed Minds", Some("MxM"));
                m.set_team(1, "Team Liquid", None);
                m.set_score(0, -1, false);
            }
            registry.new_match(None);

            let dir = tempfile::tempdir().expect("tempdir");
            let (monitor_tx, monitor_state) = watch::channel(MonitorState::Idle);
            let state = AppState {
                registry: registry.into_shared(),
                matcher: PlayerMatcher::default().into_shared(),
                alias_file: dir.path().join("alias.json"),
                monitor_state,
                tasks: TaskFlags::with(&[Task::UpdateScore]),
            };

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind");
            let addr = listener.local_addr().expect("addr");
            let app = router(state.clone());
            tokio::spawn(async move {
                let _ = axum::serve(listener, app).await;
            });

            TestApp {
                base: format!("http://{}", addr),
                http: reqwest::Client::new(),
                state,
                monitor_tx,
                _dir: dir,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let resp = self.http.get(self.url(path)).send().await.expect("request");
            read(resp).await
        }

        async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
            let resp = self
                .http
                .request(method, self.url(path))
                .json(&body)
                .send()
                .await
                .expect("request");
            read(resp).await
        }
    }

    async fn read(resp: reqwest::Response) -> (StatusCode, Value) {
        let status = StatusCode::from_u16(resp.status().as_u16()).expect("status");
        let text = resp.text().await.expect("body");
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (status, body)
    }

    #[tokio::test]
    async fn test_matches_listing() {
        let app = TestApp::start().await;
        let (status, list) = app.get("/api/matches").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["order"], json!([0, 1]));
        assert_eq!(list["active"], json!(0));
        assert_eq!(list["matches"][0]["team1"], "MiXed Minds");
        assert_eq!(list["matches"][0]["score"], json!([1, 0]));
    }

    #[tokio::test]
    async fn test_unknown_match_is_404() {
        let app = TestApp::start().await;
        let (status, _) = app.get("/api/matches/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .send(reqwest::Method::PUT, "/api/matches/42/swap", json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_active_view() {
        let app = TestApp::start().await;
        let (status, view) = app.get("/api/active").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["id"], json!(0));
        assert_eq!(view["score"], json!([1, 0]));
        assert_eq!(view["best_of"], json!(5));
        assert_eq!(view["is_decided"], json!(false));
        assert_eq!(view["winner"], json!(0));
    }

    #[tokio::test]
    async fn test_monitor_view_follows_watch() {
        let app = TestApp::start().await;
        app.monitor_tx
            .send(MonitorState::TwoPlayerGame)
            .expect("receiver alive");
        let (_, view) = app.get("/api/monitor").await;
        assert_eq!(view["state"], "TwoPlayerGame");
        assert_eq!(view["update_score"], json!(true));
        assert_eq!(view["toggle_score"], json!(false));
    }

    #[tokio::test]
    async fn test_create_activate_and_remove() {
        let app = TestApp::start().await;
        let mut changes = app.state.registry.read().await.subscribe();

        let (status, created) = app
            .send(
                reqwest::Method::POST,
                "/api/matches",
                json!({"preset": "Chobo Team League", "activate": true}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], json!(2));
        assert!(changes.try_recv().is_ok());
        {
            let registry = app.state.registry.read().await;
            assert_eq!(registry.active_id(), MatchId(2));
            let m = registry.active().expect("active");
            assert_eq!(m.league(), "Chobo Team League");
            assert_eq!(m.min_sets(), 8);
        }

        let (status, _) = app
            .send(reqwest::Method::POST, "/api/matches", json!({"preset": "Nope"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, removed) = app
            .send(reqwest::Method::DELETE, "/api/matches/2", json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(removed["active"], json!(1));

        let (status, _) = app
            .send(reqwest::Method::POST, "/api/matches/0/activate", json!({}))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app
            .send(reqwest::Method::POST, "/api/matches/1/select", json!({}))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let registry = app.state.registry.read().await;
        assert_eq!(registry.active_id(), MatchId(0));
        assert_eq!(registry.selected_id(), MatchId(1));
    }

    #[tokio::test]
    async fn test_last_match_cannot_be_removed() {
        let app = TestApp::start().await;
        let (status, _) = app
            .send(reqwest::Method::DELETE, "/api/matches/1", json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .send(reqwest::Method::DELETE, "/api/matches/0", json!({}))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reorder() {
        let app = TestApp::start().await;
        let (status, _) = app
            .send(reqwest::Method::PUT, "/api/order", json!({"order": [1, 1]}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .send(reqwest::Method::PUT, "/api/order", json!({"order": [1, 0]}))
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            app.state.registry.read().await.order(),
            &[MatchId(1), MatchId(0)]
        );
    }

    #[tokio::test]
    async fn test_edit_lineup_then_score() {
        let app = TestApp::start().await;
        let (status, m) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/1/players",
                json!([
                    {"team": 0, "set_index": 0, "name": "Serral", "race": "Zerg"},
                    {"team": 1, "set_index": 0, "name": "Maru", "race": "Terran"}
                ]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["players"][0][0]["name"], "Serral");
        assert_eq!(m["players"][1][0]["race"], "Terran");

        let (status, _) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/1/players",
                json!([
                    {"team": 0, "set_index": 1, "name": "Clem"},
                    {"team": 0, "set_index": 9, "name": "Reynor"}
                ]),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let registry = app.state.registry.read().await;
        let untouched = registry.get(MatchId(1)).expect("match");
        assert_eq!(untouched.player(0, 1).map(|p| p.name.as_str()), Some("TBD"));
        drop(registry);

        let (status, m) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/1/score",
                json!({"set_index": 0, "value": 1}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["sets"][0]["score"], json!(1));

        let (status, _) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/1/score",
                json!({"set_index": 0, "value": -1, "overwrite": false}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_active_edit_wakes_subscribers() {
        let app = TestApp::start().await;
        let mut changes = app.state.registry.read().await.subscribe();
        let (status, _) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/1/maps",
                json!([{"set_index": 0, "map": "Alcyone"}]),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(changes.try_recv().ok(), Some(MatchChange::Meta));
    }

    #[tokio::test]
    async fn test_format_swap_and_reset() {
        let app = TestApp::start().await;
        let (status, m) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/0/format",
                json!({"best_of": 3, "all_kill": false, "solo": false, "ace_extension": 0, "veto_count": 2}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["sets"].as_array().map(Vec::len), Some(3));
        assert_eq!(m["vetoes"].as_array().map(Vec::len), Some(2));

        let (status, m) = app
            .send(reqwest::Method::PUT, "/api/matches/0/swap", json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["teams"][0]["name"], "Team Liquid");
        assert_eq!(m["sets"][0]["score"], json!(1));

        let (status, m) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/0/preset",
                json!({"name": "koprulu team league"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["format"]["all_kill"], json!(true));

        let (status, m) = app
            .send(
                reqwest::Method::PUT,
                "/api/matches/0/reset",
                json!({"reset_options": true}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(m["format"]["all_kill"], json!(false));
        assert_eq!(m["teams"][0]["name"], "TBD");
    }

    #[tokio::test]
    async fn test_aliases_feed_matcher_and_file() {
        let app = TestApp::start().await;
        let body = json!({"kind": "player", "name": "Serral", "alias": "Joona"});
        let (status, view) = app.send(reqwest::Method::POST, "/api/aliases", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["player"]["Serral"], json!(["Joona"]));
        assert_eq!(
            app.state.matcher.read().await.aliases().translate_player("Joona"),
            "Serral"
        );
        assert_eq!(
            AliasTable::load(&app.state.alias_file).translate_player("Joona"),
            "Serral"
        );

        let (status, _) = app.send(reqwest::Method::POST, "/api/aliases", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.send(reqwest::Method::DELETE, "/api/aliases", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.send(reqwest::Method::DELETE, "/api/aliases", body).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            AliasTable::load(&app.state.alias_file).translate_player("Joona"),
            "Joona"
        );
    }

    #[tokio::test]
    async fn test_presets_listed() {
        let app = TestApp::start().await;
        let (status, names) = app.get("/api/presets").await;
        assert_eq!(status, StatusCode::OK);
        assert!(names
            .as_array()
            .expect("list")
            .iter()
            .any(|n| n == "Validity Star League"));
    }
}
