use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, instrument, warn};

use crate::{
    barcode::LookupError,
    meals::repo_types::{GoalSettings, MealLog, UserProfile},
    meals::services::{DailySummary, GatewayError, HistoryStats, ServerStatus},
    state::AppState,
    vision::VisionError,
};

use super::dto::{BarcodeRequest, CreateMealRequest, DeleteMealsRequest, DeleteMealsResponse};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/meals", get(list_meals).delete(delete_meals))
        .route("/meals/:id", delete(delete_meal))
        .route("/meals/summary", get(get_summary))
        .route("/meals/stats", get(get_stats))
        .route("/profile", get(get_profile))
        .route("/profile/goals", put(put_goals))
        .route("/db", delete(reset_database))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", post(create_meal))
        .route("/meals/barcode", post(log_barcode))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

fn reject(e: GatewayError) -> (StatusCode, String) {
    let status = match &e {
        GatewayError::Vision(VisionError::InvalidImage(_))
        | GatewayError::NoBarcode
        | GatewayError::InvalidBarcode(_) => StatusCode::BAD_REQUEST,
        GatewayError::Vision(_) | GatewayError::Lookup(LookupError::Upstream(_)) => {
            StatusCode::BAD_GATEWAY
        }
        GatewayError::Lookup(LookupError::NotFound) => StatusCode::NOT_FOUND,
        GatewayError::Store(inner) => {
            error!(error = %inner, "store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.gateway.get_status().await)
}

#[instrument(skip(state))]
pub async fn list_meals(State(state): State<AppState>) -> Json<Vec<MealLog>> {
    Json(state.gateway.get_meals().await)
}

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    Json(body): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<MealLog>), (StatusCode, String)> {
    let meal = state.gateway.create_meal(&body.image).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(meal)))
}

#[instrument(skip(state, body))]
pub async fn log_barcode(
    State(state): State<AppState>,
    Json(body): Json<BarcodeRequest>,
) -> Result<(StatusCode, Json<MealLog>), (StatusCode, String)> {
    let Some(source) = body.into_source() else {
        return Err((StatusCode::BAD_REQUEST, "barcode or image is required".into()));
    };
    let meal = state
        .gateway
        .log_product_meal(source)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(meal)))
}

#[instrument(skip(state))]
pub async fn delete_meals(
    State(state): State<AppState>,
    Json(body): Json<DeleteMealsRequest>,
) -> Result<Json<DeleteMealsResponse>, (StatusCode, String)> {
    let deleted = state.gateway.delete_meals(&body.ids).await.map_err(reject)?;
    Ok(Json(DeleteMealsResponse { deleted }))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.gateway.delete_meals(&[id.clone()]).await.map_err(reject)? {
        0 => {
            warn!(%id, "meal not found");
            Err((StatusCode::NOT_FOUND, "Meal not found".into()))
        }
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

#[instrument(skip(state))]
pub async fn get_summary(State(state): State<AppState>) -> Json<DailySummary> {
    Json(state.gateway.daily_summary(OffsetDateTime::now_utc()).await)
}

#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>) -> Json<HistoryStats> {
    Json(state.gateway.history_stats().await)
}

#[instrument(skip(state))]
pub async fn get_profile(State(state): State<AppState>) -> Json<UserProfile> {
    Json(state.gateway.get_profile().await)
}

#[instrument(skip(state))]
pub async fn put_goals(
    State(state): State<AppState>,
    Json(patch): Json<GoalSettings>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    state
        .gateway
        .update_goals(patch)
        .await
        .map(Json)
        .map_err(reject)
}

/// Wipes everything; 205 tells the client to reset its view.
#[instrument(skip(state))]
pub async fn reset_database(State(state): State<AppState>) -> StatusCode {
    state.gateway.reset_database().await;
    StatusCode::RESET_CONTENT
}
