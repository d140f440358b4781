use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{NewTicketRequest, TicketEdit, TicketStatus};
use super::export::ExportRange;
use super::service::{TicketService, TicketServiceError};
use super::visibility::{ArchiveFilter, PageRequest, TicketQuery};
use crate::identity::{Identity, IdentityError, IdentityService};
use crate::ids::{CentreId, RegionId, TicketId, UserId};
use crate::notifications::NotificationSender;
use crate::store::{HelpdeskStore, StoreError};

/// Shared handler state: the ticket service plus the identity service resolving tokens.
pub struct HelpdeskState<S, N> {
    pub tickets: Arc<TicketService<S, N>>,
    pub identity: Arc<IdentityService<S>>,
}

impl<S, N> HelpdeskState<S, N> {
    pub fn new(tickets: Arc<TicketService<S, N>>, identity: Arc<IdentityService<S>>) -> Self {
        Self { tickets, identity }
    }
}

/// Router builder exposing the helpdesk API under `/api/v1`.
pub fn helpdesk_router<S, N>(state: Arc<HelpdeskState<S, N>>) -> Router
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route(
            "/api/v1/sessions",
            post(login_handler::<S, N>).delete(logout_handler::<S, N>),
        )
        .route("/api/v1/me", get(me_handler::<S, N>))
        .route(
            "/api/v1/tickets",
            get(list_handler::<S, N>).post(create_handler::<S, N>),
        )
        .route("/api/v1/tickets/export", get(export_handler::<S, N>))
        .route(
            "/api/v1/tickets/:ticket_id",
            get(detail_handler::<S, N>).patch(edit_handler::<S, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/start",
            post(start_handler::<S, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/assign",
            post(assign_handler::<S, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/resolve",
            post(resolve_handler::<S, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/archive",
            post(archive_handler::<S, N>),
        )
        .route(
            "/api/v1/tickets/:ticket_id/unarchive",
            post(unarchive_handler::<S, N>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<S, N>))
        .route("/api/v1/filters", get(filters_handler::<S, N>))
        .route("/api/v1/subcategories", get(subcategories_handler::<S, N>))
        .route("/api/v1/technicians", get(technicians_handler::<S, N>))
        .with_state(state)
}

type SharedState<S, N> = State<Arc<HelpdeskState<S, N>>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Tickets(#[from] TicketServiceError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("the request could not be completed")]
    Interrupted,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Tickets(error) => match error {
                TicketServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TicketServiceError::NotAuthorized => StatusCode::FORBIDDEN,
                TicketServiceError::NotFound => StatusCode::NOT_FOUND,
                TicketServiceError::ReferentialIntegrity(_)
                | TicketServiceError::Transition(_) => StatusCode::CONFLICT,
                TicketServiceError::Concurrency => StatusCode::SERVICE_UNAVAILABLE,
                TicketServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
                TicketServiceError::Store(_) | TicketServiceError::Export(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Identity(error) => match error {
                IdentityError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                IdentityError::InvalidCredentials | IdentityError::UnknownSession => {
                    StatusCode::UNAUTHORIZED
                }
                IdentityError::Password(_) | IdentityError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let fields = match &self {
            ApiError::Tickets(TicketServiceError::Validation(errors))
            | ApiError::Identity(IdentityError::Validation(errors)) => Some(errors.by_field()),
            _ => None,
        };
        let payload = match fields {
            Some(fields) => json!({
                "error": "invalid input",
                "fields": fields,
            }),
            None => json!({
                "error": self.to_string(),
            }),
        };
        (status, Json(payload)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate<S, N>(
    state: &Arc<HelpdeskState<S, N>>,
    headers: &HeaderMap,
) -> Result<Identity, ApiError>
where
    S: HelpdeskStore + 'static,
{
    let token = bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    Ok(state.identity.identity_for_token(token)?)
}

fn parse_ticket_id(identity: &Identity, raw: &str) -> Result<TicketId, ApiError> {
    TicketId::parse(raw).ok_or_else(|| TicketServiceError::missing_ticket(identity).into())
}

fn parse_ids<T>(
    raw: Option<&str>,
    field: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<BTreeSet<T>, ApiError>
where
    T: Ord,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            parse(value).ok_or_else(|| ApiError::BadRequest(format!("invalid {field} id '{value}'")))
        })
        .collect()
}

/// Ticket list query string; `regions` and `centres` are comma-separated ids.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    search: Option<String>,
    status: Option<String>,
    regions: Option<String>,
    centres: Option<String>,
    archive: Option<ArchiveFilter>,
    page: Option<usize>,
    per_page: Option<usize>,
}

impl ListParams {
    fn query(&self) -> Result<TicketQuery, ApiError> {
        let status = self
            .status
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(str::parse::<TicketStatus>)
            .transpose()
            .map_err(ApiError::BadRequest)?;

        Ok(TicketQuery {
            archive: self.archive.unwrap_or_default(),
            search: self.search.clone(),
            status,
            regions: parse_ids(self.regions.as_deref(), "region", RegionId::parse)?,
            centres: parse_ids(self.centres.as_deref(), "centre", CentreId::parse)?,
        })
    }

    fn page(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    technician: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveRequest {
    #[serde(default)]
    resolution_notes: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubcategoryParams {
    #[serde(default)]
    category_id: String,
}

pub(crate) async fn login_handler<S, N>(
    State(state): SharedState<S, N>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    // argon2 verification is CPU-bound; keep it off the async workers.
    let identity = Arc::clone(&state.identity);
    let session = tokio::task::spawn_blocking(move || {
        identity.login(&request.username, &request.password)
    })
    .await
    .map_err(|error| {
        error!(%error, "login task failed");
        ApiError::Interrupted
    })??;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

pub(crate) async fn logout_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let token = bearer_token(&headers).ok_or(ApiError::Unauthenticated)?;
    if state.identity.logout(token) {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::Unauthenticated)
    }
}

pub(crate) async fn me_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    Ok(Json(identity).into_response())
}

pub(crate) async fn list_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let page = state
        .tickets
        .list(&identity, &params.query()?, params.page())?;
    Ok(Json(page).into_response())
}

pub(crate) async fn create_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Json(request): Json<NewTicketRequest>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let view = state.tickets.create(&identity, request)?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub(crate) async fn detail_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    Ok(Json(state.tickets.get(&identity, id)?).into_response())
}

pub(crate) async fn edit_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(edit): Json<TicketEdit>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    Ok(Json(state.tickets.edit(&identity, id, &edit)?).into_response())
}

pub(crate) async fn start_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    Ok(Json(state.tickets.start_progress(&identity, id)?).into_response())
}

pub(crate) async fn assign_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    let view = state.tickets.assign(&identity, id, request.technician)?;
    Ok(Json(view).into_response())
}

pub(crate) async fn resolve_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    let view = state
        .tickets
        .resolve(&identity, id, &request.resolution_notes)?;
    Ok(Json(view).into_response())
}

pub(crate) async fn archive_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    Ok(Json(state.tickets.archive(&identity, id)?).into_response())
}

pub(crate) async fn unarchive_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let id = parse_ticket_id(&identity, &ticket_id)?;
    Ok(Json(state.tickets.unarchive(&identity, id)?).into_response())
}

pub(crate) async fn dashboard_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let summary = state.tickets.dashboard(&identity, &params.query()?)?;
    Ok(Json(summary).into_response())
}

pub(crate) async fn filters_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    Ok(Json(state.tickets.filter_options(&identity)?).into_response())
}

pub(crate) async fn export_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Query(range): Query<ExportRange>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    let range = ExportRange::new(range.from, range.to).map_err(TicketServiceError::from)?;
    let body = state.tickets.export_csv(&identity, range)?;
    let disposition = format!(
        "attachment; filename=\"tickets_{}_{}.csv\"",
        range.from, range.to
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub(crate) async fn subcategories_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
    Query(params): Query<SubcategoryParams>,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    authenticate(&state, &headers)?;
    let options = state.tickets.subcategories_for(&params.category_id);
    Ok(Json(json!({ "subcategories": options })).into_response())
}

pub(crate) async fn technicians_handler<S, N>(
    State(state): SharedState<S, N>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: HelpdeskStore + 'static,
    N: NotificationSender + 'static,
{
    let identity = authenticate(&state, &headers)?;
    Ok(Json(state.tickets.technicians(&identity)?).into_response())
}
