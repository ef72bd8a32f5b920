use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::{require_role, AuthUser, Role};
use crate::db::operations::{FlashcardFilter, Visibility};
use crate::pagination::{PageParams, SortOrder};
use crate::response::{AppError, PaginatedResponse, SuccessResponse};
use crate::services::flashcard::{self, CreateFlashcardInput, UpdateFlashcardInput};
use crate::services::history_sync::SwipeDirection;
use crate::state::AppState;

const ANY_ROLE: &[Role] = &[Role::Student, Role::Teacher, Role::Admin, Role::SuperAdmin];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/favorites", get(favorites))
        .route("/:id", get(get_one).patch(update).delete(delete_item))
        .route("/:id/approve", patch(approve))
        .route("/:id/swipe", patch(swipe))
        .route("/:id/favorite", patch(toggle_favorite))
}

/// Query string for the deck list. Kept flat: nested or flattened structs
/// lose numeric and boolean parsing in `serde_urlencoded`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    search_term: Option<String>,
    title: Option<String>,
    student_id: Option<String>,
    category_id: Option<String>,
    visibility: Option<Visibility>,
    is_approved: Option<bool>,
    page: Option<i64>,
    limit: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<SortOrder>,
}

impl ListQuery {
    fn split(self) -> (FlashcardFilter, PageParams) {
        let filter = FlashcardFilter {
            search_term: self.search_term,
            title: self.title,
            student_id: self.student_id,
            category_id: self.category_id,
            visibility: self.visibility,
            is_approved: self.is_approved,
        };
        let params = PageParams {
            page: self.page,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        };
        (filter, params)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwipeRequest {
    swipe_direction: SwipeDirection,
}

async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateFlashcardInput>, JsonRejection>,
) -> Result<Response, AppError> {
    require_role(&user, &[Role::Student])?;
    let Json(input) = payload?;

    let created = flashcard::create_flashcard(state.db(), &user, input).await?;
    Ok((
        StatusCode::CREATED,
        SuccessResponse::new("Flashcard created successfully", created),
    )
        .into_response())
}

async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    require_role(&user, ANY_ROLE)?;
    let Query(query) = query?;
    let (filter, params) = query.split();

    let (flashcards, meta) = flashcard::list_flashcards(state.db(), &filter, &params).await?;
    Ok(PaginatedResponse::new("Flashcards retrieved successfully", meta, flashcards).into_response())
}

async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_role(&user, ANY_ROLE)?;
    let view = flashcard::get_flashcard_view(state.db(), &user, &id).await?;
    Ok(SuccessResponse::new("Flashcard retrieved successfully", view).into_response())
}

async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateFlashcardInput>, JsonRejection>,
) -> Result<Response, AppError> {
    require_role(&user, ANY_ROLE)?;
    let Json(input) = payload?;

    let updated = flashcard::update_flashcard(state.db(), &user, &id, input).await?;
    Ok(SuccessResponse::new("Flashcard updated successfully", updated).into_response())
}

/// `id` names a card, not a deck.
async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_role(&user, ANY_ROLE)?;
    let deleted = flashcard::delete_flashcard_item(state.db(), &user, &id).await?;
    Ok(SuccessResponse::new("Flashcard item deleted successfully", deleted).into_response())
}

async fn approve(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_role(&user, &[Role::Teacher])?;
    let approved = flashcard::approve_flashcard(state.db(), &user, &id).await?;
    Ok(SuccessResponse::new("Flashcard approved successfully", approved).into_response())
}

async fn swipe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<SwipeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    require_role(&user, &[Role::Student])?;
    let Json(request) = payload?;

    let history = flashcard::swipe_item(state.db(), &user, &id, request.swipe_direction).await?;
    Ok(SuccessResponse::new("Flashcard swiped successfully", history).into_response())
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_role(&user, &[Role::Student])?;
    let toggle = flashcard::toggle_favorite(state.db(), &user, &id).await?;
    let message = if toggle.is_favorite {
        "Flashcard item added to favorites"
    } else {
        "Flashcard item removed from favorites"
    };
    Ok(SuccessResponse::new(message, toggle).into_response())
}

async fn favorites(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, AppError> {
    require_role(&user, &[Role::Student])?;
    let items = flashcard::list_favorites(state.db(), &user).await?;
    Ok(SuccessResponse::new("Favorite flashcard items retrieved successfully", items).into_response())
}
