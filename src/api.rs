use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    bus::{Event, EventBus},
    chat::{ChatMessage, StudyPlanItem},
    connect::{
        geocode::{LocationAutocomplete, PlaceSuggestion},
        ConnectProfile, Directory, NewProfile,
    },
    echo::{EchoFeed, NewPost},
    events::{
        filter_events, CampusEvent, EventTab, ParticipantRole, RegStep, RegistrationForm,
        RegistrationWizard, CLOSE_DELAY, JOIN_DELAY,
    },
    mentor::{MentorController, SubmitOutcome},
    session::{SessionStore, User},
};

/// Everything the handlers need. One wizard slot: the SPA had a single
/// registration modal, so starting a new registration replaces (discards)
/// any abandoned one.
pub struct AppState {
    pub session: Arc<SessionStore>,
    pub mentor: Arc<MentorController>,
    pub directory: Arc<Directory>,
    pub autocomplete: LocationAutocomplete,
    pub feed: Arc<EchoFeed>,
    pub events: Vec<CampusEvent>,
    pub registration: Mutex<Option<RegistrationWizard>>,
    pub bus: Arc<EventBus>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/login", post(login))
        .route("/api/session/logout", post(logout))
        .route("/api/profile/name", put(rename))
        .route("/api/events", get(list_events))
        .route("/api/events/:id/register", post(start_registration))
        .route("/api/registration", get(get_registration).delete(cancel_registration))
        .route("/api/registration/continue", post(registration_continue))
        .route("/api/registration/role", post(registration_role))
        .route("/api/registration/submit", post(registration_submit))
        .route("/api/mentor", get(get_mentor))
        .route("/api/mentor/message", post(mentor_message))
        .route("/api/mentor/plan", get(get_plan))
        .route("/api/connect/profiles", get(list_profiles).post(add_profile))
        .route("/api/connect/profiles/:id/connect", post(connect_profile))
        .route("/api/connect/geocode", get(geocode).delete(close_geocode))
        .route("/api/echo/posts", get(list_posts).post(create_post))
        .route("/api/echo/posts/:id/like", post(toggle_like))
        .route("/api/echo/posts/:id/comments", post(add_comment))
        .route("/api/stream", get(sse_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn internal_error(err: anyhow::Error) -> StatusCode {
    error!("Request failed: {:#}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Route guard: every page except the landing view requires the session
/// user.
fn require_user(state: &AppState) -> Result<User, StatusCode> {
    state.session.current().ok_or(StatusCode::UNAUTHORIZED)
}

// -----------------------------------------------------------------------------
// Session
// -----------------------------------------------------------------------------

async fn get_session(State(state): State<Arc<AppState>>) -> Json<Option<User>> {
    Json(state.session.current())
}

async fn login(State(state): State<Arc<AppState>>) -> Result<Json<User>, StatusCode> {
    let user = state.session.login().await.map_err(internal_error)?;
    info!("Mock login as {}", user.name);
    Ok(Json(user))
}

async fn logout(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    state.session.logout().await.map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RenameBody {
    name: String,
}

async fn rename(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RenameBody>,
) -> Result<Json<User>, StatusCode> {
    require_user(&state)?;
    let user = state
        .session
        .rename(&body.name)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(user))
}

// -----------------------------------------------------------------------------
// Events & registration wizard
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    tab: Option<EventTab>,
    #[serde(default)]
    q: Option<String>,
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<CampusEvent>>, StatusCode> {
    require_user(&state)?;
    let tab = query.tab.unwrap_or(EventTab::Campus);
    let q = query.q.unwrap_or_default();
    let events = filter_events(&state.events, tab, &q)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(events))
}

async fn start_registration(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<RegistrationWizard>, StatusCode> {
    require_user(&state)?;
    if !state.events.iter().any(|e| e.id == event_id) {
        return Err(StatusCode::NOT_FOUND);
    }

    let wizard = RegistrationWizard::start(event_id);
    *state.registration.lock().unwrap() = Some(wizard.clone());
    Ok(Json(wizard))
}

async fn get_registration(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<RegistrationWizard>>, StatusCode> {
    require_user(&state)?;
    Ok(Json(state.registration.lock().unwrap().clone()))
}

/// Closing the modal early discards the wizard; no side effects.
async fn cancel_registration(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, StatusCode> {
    require_user(&state)?;
    *state.registration.lock().unwrap() = None;
    Ok(StatusCode::NO_CONTENT)
}

fn with_wizard<T>(
    state: &AppState,
    apply: impl FnOnce(&mut RegistrationWizard) -> anyhow::Result<T>,
) -> Result<(T, RegistrationWizard), StatusCode> {
    let mut slot = state.registration.lock().unwrap();
    let wizard = slot.as_mut().ok_or(StatusCode::NOT_FOUND)?;
    let value = apply(wizard).map_err(|_| StatusCode::CONFLICT)?;
    Ok((value, wizard.clone()))
}

async fn registration_continue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegistrationWizard>, StatusCode> {
    require_user(&state)?;
    let (_, wizard) = with_wizard(&state, |w| w.continue_to_role())?;
    Ok(Json(wizard))
}

#[derive(Deserialize)]
struct RoleBody {
    role: ParticipantRole,
}

async fn registration_role(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RoleBody>,
) -> Result<Json<RegistrationWizard>, StatusCode> {
    require_user(&state)?;
    let (_, wizard) = with_wizard(&state, |w| w.choose_role(body.role))?;
    Ok(Json(wizard))
}

async fn registration_submit(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RegistrationForm>,
) -> Result<Json<RegistrationWizard>, StatusCode> {
    require_user(&state)?;
    let (_, wizard) = with_wizard(&state, |w| w.submit(form))?;

    // The success screen lingers: the joined-events append runs after a
    // fixed delay, and the wizard auto-closes a little later.
    tokio::spawn(complete_registration(state.clone(), wizard.event_id.clone()));

    Ok(Json(wizard))
}

async fn complete_registration(state: Arc<AppState>, event_id: String) {
    tokio::time::sleep(JOIN_DELAY).await;
    match state.session.join_event(&event_id).await {
        Ok(Some(_)) => state.bus.publish(Event::RegistrationCompleted {
            event_id: event_id.clone(),
        }),
        Ok(None) => info!("Registration for {} finished after logout; skipped", event_id),
        Err(e) => error!("Failed to record registration for {}: {:#}", event_id, e),
    }

    tokio::time::sleep(CLOSE_DELAY).await;
    let mut slot = state.registration.lock().unwrap();
    // Only auto-close the wizard this task belongs to; the user may have
    // started another one meanwhile.
    if slot
        .as_ref()
        .map(|w| w.step == RegStep::Success && w.event_id == event_id)
        .unwrap_or(false)
    {
        *slot = None;
    }
}

// -----------------------------------------------------------------------------
// Mentor
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct MentorView {
    messages: Vec<ChatMessage>,
    typing: bool,
    has_pending_plan: bool,
}

fn mentor_view(mentor: &MentorController) -> MentorView {
    MentorView {
        messages: mentor.messages(),
        typing: mentor.is_typing(),
        has_pending_plan: mentor.has_pending_plan(),
    }
}

async fn get_mentor(State(state): State<Arc<AppState>>) -> Result<Json<MentorView>, StatusCode> {
    require_user(&state)?;
    Ok(Json(mentor_view(&state.mentor)))
}

#[derive(Deserialize)]
struct MessageBody {
    text: String,
}

async fn mentor_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MessageBody>,
) -> Result<Json<MentorView>, StatusCode> {
    require_user(&state)?;

    let pending_before = state.mentor.has_pending_plan();
    match state.mentor.submit(&body.text).await {
        SubmitOutcome::Replied => {
            if pending_before && !state.mentor.has_pending_plan() {
                state.bus.publish(Event::PlanActivated {
                    items: state.mentor.active_plan().len(),
                });
            }
            Ok(Json(mentor_view(&state.mentor)))
        }
        SubmitOutcome::Ignored => Ok(Json(mentor_view(&state.mentor))),
        SubmitOutcome::Busy => Err(StatusCode::CONFLICT),
    }
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StudyPlanItem>>, StatusCode> {
    require_user(&state)?;
    Ok(Json(state.mentor.active_plan()))
}

// -----------------------------------------------------------------------------
// Connect
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
}

#[derive(Serialize)]
struct DirectoryView {
    profiles: Vec<ConnectProfile>,
    connected: Vec<String>,
}

async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<DirectoryView>, StatusCode> {
    require_user(&state)?;
    Ok(Json(DirectoryView {
        profiles: state.directory.filter(&query.q.unwrap_or_default()),
        connected: state.directory.connected_ids().into_iter().collect(),
    }))
}

#[derive(Serialize)]
struct ConnectView {
    connected: bool,
}

/// The handshake blocks for the simulated delay, mirroring the "connecting"
/// spinner the profile card showed until the id landed in the set.
async fn connect_profile(
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<String>,
) -> Result<Json<ConnectView>, StatusCode> {
    require_user(&state)?;
    match state.directory.connect(&profile_id).await {
        Some(newly_added) => {
            if newly_added {
                state.bus.publish(Event::ConnectionEstablished { profile_id });
            }
            Ok(Json(ConnectView { connected: true }))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn add_profile(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewProfile>,
) -> Result<impl IntoResponse, StatusCode> {
    require_user(&state)?;
    match state.directory.save(new).await.map_err(internal_error)? {
        Some(profile) => Ok((StatusCode::CREATED, Json(profile))),
        None => Err(StatusCode::UNPROCESSABLE_ENTITY),
    }
}

/// Feeds the autocomplete with the latest query text and returns the current
/// suggestion list. The lookup is debounced in the background, so clients
/// poll (or watch the stream) for fresher results.
async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PlaceSuggestion>>, StatusCode> {
    require_user(&state)?;
    state.autocomplete.on_query(&query.q.unwrap_or_default());
    Ok(Json(state.autocomplete.suggestions()))
}

async fn close_geocode(State(state): State<Arc<AppState>>) -> Result<StatusCode, StatusCode> {
    require_user(&state)?;
    state.autocomplete.close();
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Echo feed
// -----------------------------------------------------------------------------

#[derive(Serialize)]
struct FeedView {
    posts: Vec<crate::echo::EchoPost>,
    liked: Vec<String>,
}

async fn list_posts(State(state): State<Arc<AppState>>) -> Result<Json<FeedView>, StatusCode> {
    require_user(&state)?;
    Ok(Json(FeedView {
        posts: state.feed.posts(),
        liked: state.feed.liked_ids().into_iter().collect(),
    }))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewPost>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = require_user(&state)?;
    match state.feed.create_post(new, &user.id) {
        Some(post) => {
            state.bus.publish(Event::PostCreated(post.clone()));
            Ok((StatusCode::CREATED, Json(post)))
        }
        None => Err(StatusCode::UNPROCESSABLE_ENTITY),
    }
}

#[derive(Serialize)]
struct LikeView {
    liked: bool,
}

async fn toggle_like(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<Json<LikeView>, StatusCode> {
    require_user(&state)?;
    match state.feed.toggle_like(&post_id) {
        Some(liked) => Ok(Json(LikeView { liked })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Deserialize)]
struct CommentBody {
    text: String,
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, StatusCode> {
    require_user(&state)?;
    match state.feed.add_comment(&post_id, &body.text) {
        Some(comment) => {
            state.bus.publish(Event::CommentAdded {
                post_id,
                comment: comment.clone(),
            });
            Ok((StatusCode::CREATED, Json(comment)))
        }
        None => Err(StatusCode::UNPROCESSABLE_ENTITY),
    }
}

// -----------------------------------------------------------------------------
// SSE stream
// -----------------------------------------------------------------------------

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::BoxError>>> {
    info!("New SSE connection established");

    let mut rx = state.bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(SseEvent::default().data(json)),
                        Err(e) => error!("Failed to serialize bus event: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Slow consumer; skip ahead.
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}
