use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    api_error,
    errors::{ApiError, ErrorContext, ErrorResponse, classify_service_error},
    models::*,
    review_service::ReviewService,
    stats::MAX_WINDOW_DAYS,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub review_service: ReviewService,
    pub accuracy_window_days: i64,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct DueParams {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct StatsParams {
    pub window_days: Option<i64>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// Review item endpoints
pub async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<CreateReviewItemRequest>,
) -> ApiResult<ReviewItem> {
    log_api_start!("create_item", user_id = request.user_id);
    let content_id = request.content_id.clone();

    match state.review_service.add_item(request).await {
        Ok(item) => {
            log_api_success!("create_item", item_id = item.id, "review item created");
            Ok(Json(ApiResponse::success(item)))
        }
        Err(e) => {
            let context = ErrorContext::new("create_item", "review_item").with_id(&content_id);
            Err(classify_service_error(e).to_response_with_context(context))
        }
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<ReviewItem>> {
    match state.review_service.list_items(params.user_id.as_deref()).await {
        Ok(items) => {
            log_api_success!("list_items", count = items.len(), "review items listed");
            Ok(Json(ApiResponse::success(items)))
        }
        Err(e) => {
            log_api_error!("list_items", error = e, "database error listing items");
            Err(api_error!(database, "list_items", "review_item", e))
        }
    }
}

pub async fn get_due_items(
    State(state): State<AppState>,
    Query(params): Query<DueParams>,
) -> ApiResult<Vec<ReviewItem>> {
    if let Some(limit) = params.limit {
        if limit < 1 {
            return Err(ApiError::BadRequest(format!("limit must be positive, got {}", limit))
                .to_response_with_context(ErrorContext::new("get_due_items", "review_item")));
        }
    }

    match state
        .review_service
        .due_items(params.user_id.as_deref(), params.limit)
        .await
    {
        Ok(items) => {
            log_api_success!("get_due_items", count = items.len(), "due items retrieved");
            Ok(Json(ApiResponse::success(items)))
        }
        Err(e) => Err(api_error!(database, "get_due_items", "review_item", e)),
    }
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReviewItem> {
    log_api_start!("get_item", item_id = id);

    match state.review_service.get_item(id).await {
        Ok(Some(item)) => Ok(Json(ApiResponse::success(item))),
        Ok(None) => {
            log_api_warn!("get_item", item_id = id, "review item not found");
            Err(api_error!(not_found, "get_item", "review_item", id))
        }
        Err(e) => {
            log_api_error!("get_item", item_id = id, error = e, "database error retrieving item");
            let context = ErrorContext::new("get_item", "review_item").with_id(&id.to_string());
            Err(ApiError::DatabaseError(e).to_response_with_context(context))
        }
    }
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_item", item_id = id);

    match state.review_service.delete_item(id).await {
        Ok(true) => {
            log_api_success!("delete_item", item_id = id, "review item deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Ok(false) => Err(api_error!(not_found, "delete_item", "review_item", id)),
        Err(e) => {
            let context = ErrorContext::new("delete_item", "review_item").with_id(&id.to_string());
            Err(ApiError::DatabaseError(e).to_response_with_context(context))
        }
    }
}

// Review endpoints
pub async fn review_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<ReviewItem> {
    log_api_start!("review_item", item_id = id);

    match state.review_service.record_review(id, request).await {
        Ok(Some(item)) => {
            log_api_success!("review_item", item_id = id, format!("next review in {} days", item.interval));
            Ok(Json(ApiResponse::success(item)))
        }
        Ok(None) => Err(api_error!(not_found, "review_item", "review_item", id)),
        Err(e) => {
            let context = ErrorContext::new("review_item", "review_item").with_id(&id.to_string());
            Err(classify_service_error(e).to_response_with_context(context))
        }
    }
}

pub async fn get_review_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ReviewRecord>> {
    match state.review_service.get_item(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(api_error!(not_found, "get_review_history", "review_item", id)),
        Err(e) => return Err(api_error!(database, "get_review_history", "review_item", e)),
    }

    match state.review_service.review_history(id).await {
        Ok(records) => Ok(Json(ApiResponse::success(records))),
        Err(e) => Err(api_error!(database, "get_review_history", "review_record", e)),
    }
}

// Reporting endpoints
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<StatsParams>,
) -> ApiResult<ReviewStats> {
    log_api_start!("get_user_stats", user_id = user_id);
    let window_days = params.window_days.unwrap_or(state.accuracy_window_days);

    if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
        return Err(api_error!(
            validation,
            "get_user_stats",
            "review_stats",
            format!("window_days must be between 1 and {}, got {}", MAX_WINDOW_DAYS, window_days)
        ));
    }

    match state.review_service.user_stats(&user_id, window_days).await {
        Ok(stats) => {
            log_api_success!("get_user_stats", user_id = user_id, "review stats computed");
            Ok(Json(ApiResponse::success(stats)))
        }
        Err(e) => Err(classify_service_error(e)
            .to_response_with_context(ErrorContext::new("get_user_stats", "review_stats").with_id(&user_id))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Review item routes
        .route("/api/review-items", post(create_item).get(list_items))
        .route("/api/review-items/due", get(get_due_items))
        .route("/api/review-items/:id", get(get_item).delete(delete_item))
        .route("/api/review-items/:id/review", post(review_item))
        .route("/api/review-items/:id/history", get(get_review_history))
        // Reporting routes
        .route("/api/users/:user_id/review-stats", get(get_user_stats))
        .with_state(state)
}
