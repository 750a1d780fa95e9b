use anyhow::Result;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::metrics::{
    metrics_handler, record_like_toggle, record_login_attempt, record_review_submission,
};
use super::session::Session;
use super::{log_requests, state::*, ServerConfig};
use crate::account::AuthTokenValue;
use crate::catalog::{
    NewAlbum, NewBand, NewConcert, NewMember, NewSong, ValidationError,
};
use crate::fan_content::{FanContentError, LikeTarget, NewReview};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub handle: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Deserialize, Debug)]
struct ChartsQuery {
    n: Option<usize>,
}

const DEFAULT_CHART_SIZE: usize = 10;
const MAX_CHART_SIZE: usize = 100;

/// Map a fan content error onto its status code. Validation problems are the
/// caller's fault, busy stores are retryable, everything else is on us.
fn fan_content_error_response(err: FanContentError) -> Response {
    match err {
        FanContentError::Validation { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        FanContentError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
        FanContentError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        FanContentError::Consistency(_) | FanContentError::Storage(_) => {
            error!("Fan content store failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Catalog writes go through `anyhow`; surface validation failures as 400,
/// anything else as 500.
fn catalog_write_response(result: Result<usize>) -> Response {
    match result {
        Ok(id) => (StatusCode::CREATED, Json(id)).into_response(),
        Err(err) => match err.downcast_ref::<ValidationError>() {
            Some(validation) => {
                (StatusCode::BAD_REQUEST, validation.to_string()).into_response()
            }
            None => {
                debug!("Catalog write failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn login(
    State(account_store): State<GuardedAccountStore>,
    Json(body): Json<LoginBody>,
) -> Response {
    let start = Instant::now();
    let account = match account_store.verify_password(&body.handle, &body.password) {
        Ok(Some(account)) => account,
        Ok(None) => {
            record_login_attempt("failure", start.elapsed());
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(err) => {
            error!("Error verifying credentials: {}", err);
            record_login_attempt("error", start.elapsed());
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match account_store.create_token(account.id) {
        Ok(token) => {
            record_login_attempt("success", start.elapsed());
            let response_body = LoginSuccessResponse {
                token: token.0.clone(),
            };
            let response_body = match serde_json::to_string(&response_body) {
                Ok(body) => body,
                Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            };

            let cookie_value = match HeaderValue::from_str(&format!(
                "session_token={}; Path=/; HttpOnly",
                token.0
            )) {
                Ok(value) => value,
                Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            };
            response::Builder::new()
                .status(StatusCode::CREATED)
                .header(axum::http::header::SET_COOKIE, cookie_value)
                .body(Body::from(response_body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => {
            error!("Error with auth token generation: {}", err);
            record_login_attempt("error", start.elapsed());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(State(account_store): State<GuardedAccountStore>, session: Session) -> Response {
    match account_store.delete_token(&AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie_value = Cookie::build(Cookie::new("session_token", ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(axum::http::header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn get_bands(State(catalog): State<GuardedCatalogStore>) -> Response {
    match catalog.get_all_bands() {
        Ok(bands) => Json(bands).into_response(),
        Err(err) => {
            error!("Failed to list bands: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_charts(
    State(fan_content): State<GuardedFanContentStore>,
    Query(query): Query<ChartsQuery>,
) -> Response {
    let n = query.n.unwrap_or(DEFAULT_CHART_SIZE).min(MAX_CHART_SIZE);
    match fan_content.top_albums(n) {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => fan_content_error_response(err),
    }
}

async fn get_band(
    _session: Session,
    State(state): State<ServerState>,
    Path(id): Path<usize>,
) -> Response {
    let band = match state.catalog_store.get_band(id) {
        Ok(Some(band)) => band,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to read band {}: {}", id, err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let members = match state.catalog_store.get_band_members(id) {
        Ok(members) => members,
        Err(err) => {
            error!("Failed to read members of band {}: {}", id, err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let fan_stats = match state.fan_content_store.band_fan_stats(id) {
        Ok(stats) => stats,
        Err(err) => return fan_content_error_response(err),
    };

    Json(serde_json::json!({
        "band": band,
        "members": members,
        "fan_stats": fan_stats,
    }))
    .into_response()
}

async fn get_band_albums(
    _session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Path(id): Path<usize>,
) -> Response {
    match catalog.get_band(id) {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
    match catalog.get_band_albums(id) {
        Ok(albums) => Json(albums).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_band_concerts(
    _session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Path(id): Path<usize>,
) -> Response {
    match catalog.get_band(id) {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
    match catalog.get_band_concerts(id) {
        Ok(concerts) => Json(concerts).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_album(
    _session: Session,
    State(state): State<ServerState>,
    Path(id): Path<usize>,
) -> Response {
    let album = match state.catalog_store.get_album(id) {
        Ok(Some(album)) => album,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to read album {}: {}", id, err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let songs = match state.catalog_store.get_album_songs(id) {
        Ok(songs) => songs,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let reviews = match state.fan_content_store.album_reviews(id) {
        Ok(reviews) => reviews,
        Err(err) => return fan_content_error_response(err),
    };

    Json(serde_json::json!({
        "album": album,
        "songs": songs,
        "reviews": reviews,
    }))
    .into_response()
}

async fn post_review(
    session: Session,
    State(fan_content): State<GuardedFanContentStore>,
    Json(body): Json<NewReview>,
) -> Response {
    if !session.is_fan() {
        return StatusCode::FORBIDDEN.into_response();
    }
    match fan_content.submit_review(session.account_id, body) {
        Ok(review) => {
            record_review_submission("accepted");
            (StatusCode::CREATED, Json(review)).into_response()
        }
        Err(err) => {
            record_review_submission("rejected");
            fan_content_error_response(err)
        }
    }
}

fn parse_like_target(kind: &str) -> Result<LikeTarget, Response> {
    LikeTarget::from_path_segment(kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown kind {}", kind)).into_response())
}

async fn post_like_toggle(
    session: Session,
    State(fan_content): State<GuardedFanContentStore>,
    Path((kind, id)): Path<(String, usize)>,
) -> Response {
    if !session.is_fan() {
        return StatusCode::FORBIDDEN.into_response();
    }
    let target = match parse_like_target(&kind) {
        Ok(target) => target,
        Err(response) => return response,
    };
    match fan_content.toggle_like(session.account_id, target, id) {
        Ok(outcome) => {
            record_like_toggle(
                target.entity_name(),
                if outcome.is_followed() {
                    "followed"
                } else {
                    "unfollowed"
                },
            );
            Json(outcome).into_response()
        }
        Err(err) => fan_content_error_response(err),
    }
}

async fn get_likes(
    session: Session,
    State(fan_content): State<GuardedFanContentStore>,
    Path(kind): Path<String>,
) -> Response {
    let target = match parse_like_target(&kind) {
        Ok(target) => target,
        Err(response) => return response,
    };
    match fan_content.liked_ids(session.account_id, target) {
        Ok(ids) => Json(ids).into_response(),
        Err(err) => fan_content_error_response(err),
    }
}

async fn post_band(
    session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Json(body): Json<NewBand>,
) -> Response {
    if !session.is_admin() {
        return StatusCode::FORBIDDEN.into_response();
    }
    catalog_write_response(catalog.add_band(body))
}

async fn post_member(
    session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Json(body): Json<NewMember>,
) -> Response {
    if !session.can_manage_band(body.band_id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    catalog_write_response(catalog.add_member(body))
}

async fn post_album(
    session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Json(body): Json<NewAlbum>,
) -> Response {
    if !session.can_manage_band(body.band_id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    catalog_write_response(catalog.add_album(body))
}

async fn post_song(
    session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Json(body): Json<NewSong>,
) -> Response {
    // Songs belong to an album, authorization goes through the album's band.
    let band_id = match catalog.get_album(body.album_id) {
        Ok(Some(album)) => album.band_id,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    if !session.can_manage_band(band_id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    catalog_write_response(catalog.add_song(body))
}

async fn post_concert(
    session: Session,
    State(catalog): State<GuardedCatalogStore>,
    Json(body): Json<NewConcert>,
) -> Response {
    if !session.can_manage_band(body.band_id) {
        return StatusCode::FORBIDDEN.into_response();
    }
    catalog_write_response(catalog.add_concert(body))
}

macro_rules! admin_delete_handler {
    ($name:ident, $store_method:ident) => {
        async fn $name(
            session: Session,
            State(catalog): State<GuardedCatalogStore>,
            Path(id): Path<usize>,
        ) -> Response {
            if !session.is_admin() {
                return StatusCode::FORBIDDEN.into_response();
            }
            match catalog.$store_method(id) {
                Ok(()) => StatusCode::OK.into_response(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
    };
}

admin_delete_handler!(delete_band, delete_band);
admin_delete_handler!(delete_member, delete_member);
admin_delete_handler!(delete_album, delete_album);
admin_delete_handler!(delete_song, delete_song);
admin_delete_handler!(delete_concert, delete_concert);

pub(crate) fn make_app(
    config: ServerConfig,
    catalog_store: GuardedCatalogStore,
    fan_content_store: GuardedFanContentStore,
    account_store: GuardedAccountStore,
) -> Result<Router> {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        catalog_store,
        fan_content_store,
        account_store,
        hash: env!("GIT_HASH").to_owned(),
    };

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let catalog_routes: Router = Router::new()
        .route("/bands", get(get_bands))
        .route("/band", post(post_band))
        .route("/band/{id}", get(get_band))
        .route("/band/{id}", delete(delete_band))
        .route("/band/{id}/albums", get(get_band_albums))
        .route("/band/{id}/concerts", get(get_band_concerts))
        .route("/member", post(post_member))
        .route("/member/{id}", delete(delete_member))
        .route("/album", post(post_album))
        .route("/album/{id}", get(get_album))
        .route("/album/{id}", delete(delete_album))
        .route("/song", post(post_song))
        .route("/song/{id}", delete(delete_song))
        .route("/concert", post(post_concert))
        .route("/concert/{id}", delete(delete_concert))
        .with_state(state.clone());

    let charts_routes: Router = Router::new()
        .route("/albums", get(get_charts))
        .with_state(state.clone());

    let fan_routes: Router = Router::new()
        .route("/review", post(post_review))
        .route("/like/{kind}/{id}", post(post_like_toggle))
        .route("/likes/{kind}", get(get_likes))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .route("/metrics", get(metrics_handler))
        .nest("/v1/auth", auth_routes)
        .nest("/v1/catalog", catalog_routes)
        .nest("/v1/charts", charts_routes)
        .nest("/v1/fan", fan_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    catalog_store: GuardedCatalogStore,
    fan_content_store: GuardedFanContentStore,
    account_store: GuardedAccountStore,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, catalog_store, fan_content_store, account_store)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
