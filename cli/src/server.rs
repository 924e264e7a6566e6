use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State, rejection::{JsonRejection, QueryRejection}},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use mealbook_core::error::MealbookError;
use mealbook_core::models::{
    GenerateListRequest, MealKind, NewCalendarEntry, NewIngredient, NewMeal, UpdateIngredient,
    UpdateMeal,
};
use mealbook_core::search::DEFAULT_LIMIT;
use mealbook_core::service::MealbookService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

/// Identity used when no allow-list is configured and the request carries
/// no identity header.
const LOCAL_USER: &str = "local";

const IDENTITY_HEADER: &str = "x-user-email";

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<MealbookService>>,
    api_key: Option<String>,
    allowed_users: Arc<HashSet<String>>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, MealbookService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// The authenticated caller, recorded as `created_by` on new records.
#[derive(Clone)]
struct Identity(String);

// --- Request / Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleItemRequest {
    list_id: String,
    item_id: String,
    is_checked: bool,
}

#[derive(Deserialize)]
struct MealsQuery {
    kind: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct CalendarQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    TooLarge,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::TooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large".to_string(),
            ),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<MealbookError> for ApiError {
    fn from(err: MealbookError) -> Self {
        match err {
            MealbookError::Validation(msg) => Self::BadRequest(msg),
            MealbookError::NotFound(msg) => Self::NotFound(msg),
            MealbookError::Store(err) => Self::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{value}'. Use YYYY-MM-DD")))
}

// --- Middleware ---

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return reject(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
        }
    }

    let claimed = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty());

    let identity = if state.allowed_users.is_empty() {
        claimed.unwrap_or_else(|| LOCAL_USER.to_string())
    } else {
        match claimed {
            Some(user) if state.allowed_users.contains(&user) => user,
            other => {
                warn!(user = other.as_deref().unwrap_or("-"), "rejected user not on allow-list");
                return reject(StatusCode::FORBIDDEN, "User is not allowed");
            }
        }
    };

    request.extensions_mut().insert(Identity(identity));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Shopping list handlers ---

async fn create_shopping_list(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    payload: Result<Json<GenerateListRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = payload?;
    let list = state.service().generate_shopping_list(&req, &user)?;
    Ok((StatusCode::CREATED, Json(json!({ "list": list }))))
}

async fn list_shopping_lists(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lists = state.service().list_shopping_lists()?;
    Ok(Json(json!({ "lists": lists })))
}

async fn get_shopping_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let list = state.service().get_shopping_list(&id)?;
    Ok(Json(json!({ "list": list })))
}

async fn delete_shopping_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_shopping_list(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_item(
    State(state): State<AppState>,
    payload: Result<Json<ToggleItemRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let item = state
        .service()
        .set_item_checked(&req.list_id, &req.item_id, req.is_checked)?;
    Ok(Json(json!({ "item": item })))
}

// --- Meal handlers ---

async fn create_meal(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    payload: Result<Json<NewMeal>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = payload?;
    let meal = state.service().create_meal(&req, &user)?;
    Ok((StatusCode::CREATED, Json(json!({ "meal": meal }))))
}

async fn list_meals(
    State(state): State<AppState>,
    query: Result<Query<MealsQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = query?;
    let kind = params
        .kind
        .as_deref()
        .map(str::parse::<MealKind>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let meals = state.service().list_meals(kind)?;
    Ok(Json(json!({ "meals": meals })))
}

async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let meal = state.service().get_meal(&id)?;
    Ok(Json(json!({ "meal": meal })))
}

async fn update_meal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateMeal>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let meal = state.service().update_meal(&id, &req)?;
    Ok(Json(json!({ "meal": meal })))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_meal(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Ingredient handlers ---

async fn create_ingredient(
    State(state): State<AppState>,
    payload: Result<Json<NewIngredient>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = payload?;
    let ingredient = state.service().create_ingredient(&req)?;
    Ok((StatusCode::CREATED, Json(json!({ "ingredient": ingredient }))))
}

async fn list_ingredients(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ingredients = state.service().list_ingredients()?;
    Ok(Json(json!({ "ingredients": ingredients })))
}

async fn search_ingredients(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = query?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let matches = state.service().search_ingredients(&params.q, limit)?;
    Ok(Json(json!({ "ingredients": matches })))
}

async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ingredient = state.service().get_ingredient(&id)?;
    Ok(Json(json!({ "ingredient": ingredient })))
}

async fn update_ingredient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateIngredient>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let ingredient = state.service().update_ingredient(&id, &req)?;
    Ok(Json(json!({ "ingredient": ingredient })))
}

// --- Calendar handlers ---

async fn schedule_meal(
    State(state): State<AppState>,
    Extension(Identity(user)): Extension<Identity>,
    payload: Result<Json<NewCalendarEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = payload?;
    let entry = state.service().schedule_meal(&req, &user)?;
    Ok((StatusCode::CREATED, Json(json!({ "entry": entry }))))
}

/// Defaults to the coming week starting today.
async fn get_calendar(
    State(state): State<AppState>,
    query: Result<Query<CalendarQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = query?;
    let start = match params.start.as_deref() {
        Some(s) => parse_date(s)?,
        None => Local::now().date_naive(),
    };
    let end = match params.end.as_deref() {
        Some(s) => parse_date(s)?,
        None => start
            .checked_add_signed(Duration::days(6))
            .ok_or_else(|| ApiError::BadRequest(format!("Date range from {start} overflows")))?,
    };
    let entries = state.service().calendar_range(start, end)?;
    Ok(Json(json!({ "entries": entries })))
}

async fn remove_calendar_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().remove_calendar_entry(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/shopping-lists",
            post(create_shopping_list).get(list_shopping_lists),
        )
        .route("/api/shopping-lists/toggle", post(toggle_item))
        .route(
            "/api/shopping-lists/{id}",
            get(get_shopping_list).delete(delete_shopping_list),
        )
        .route("/api/meals", post(create_meal).get(list_meals))
        .route(
            "/api/meals/{id}",
            get(get_meal).put(update_meal).delete(delete_meal),
        )
        .route(
            "/api/ingredients",
            post(create_ingredient).get(list_ingredients),
        )
        .route("/api/ingredients/search", get(search_ingredients))
        .route(
            "/api/ingredients/{id}",
            get(get_ingredient).put(update_ingredient),
        )
        .route("/api/calendar", post(schedule_meal).get(get_calendar))
        .route("/api/calendar/{id}", delete(remove_calendar_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: MealbookService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    allowed_users: Vec<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        api_key: api_key.clone(),
        allowed_users: Arc::new(allowed_users.into_iter().collect()),
    };
    let user_count = state.allowed_users.len();

    let app = build_router(state);

    match api_key {
        Some(ref key) if new_api_key => {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        }
        Some(ref key) => info!(
            "API key: {}...{} (see api_key file in data directory)",
            key.get(..4).unwrap_or_default(),
            key.get(key.len().saturating_sub(4)..).unwrap_or_default(),
        ),
        None => warn!("authentication disabled (--no-auth), API is open to anyone"),
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        warn!(
            "listening on {bind} with no authentication, any device on your network can access this API"
        );
    }

    if user_count == 0 {
        info!("no allow-list configured, requests are attributed to the {IDENTITY_HEADER} header or '{LOCAL_USER}'");
    } else {
        info!(users = user_count, "allow-list loaded");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
