use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AdminUser,
    content::{
        dto::{EntryResponse, MoveRequest, MoveResponse, ReorderRequest, ReorderResponse},
        reorder::{plan_full_reorder, plan_move, OrderedList, ReorderError},
        repo::{self, SqlOrderStore},
        repo_types::{Collection, OrderableRow},
    },
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/content/:collection", get(list_public))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/:collection", get(list_admin))
        .route("/admin/:collection/reorder", put(reorder))
        .route("/admin/:collection/:id/move", put(move_entry))
}

fn parse_collection(slug: &str) -> Result<Collection, (StatusCode, String)> {
    Collection::from_slug(slug)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "unknown collection".to_string()))
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "content handler failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn reorder_error_response(e: ReorderError) -> (StatusCode, String) {
    match e {
        ReorderError::InvalidPermutation | ReorderError::UnknownId => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        ReorderError::PersistenceFailure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn to_response(row: OrderableRow) -> EntryResponse {
    EntryResponse {
        id: row.id,
        title: row.title,
        content: row.content,
        sort_order: row.sort_order,
        created_at: row.created_at,
    }
}

#[instrument(skip(state))]
pub async fn list_public(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<EntryResponse>>, (StatusCode, String)> {
    let collection = parse_collection(&collection)?;
    let rows = repo::list(&state.db, collection).await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(to_response).collect()))
}

#[instrument(skip(state, _admin))]
pub async fn list_admin(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(collection): Path<String>,
) -> Result<Json<Vec<EntryResponse>>, (StatusCode, String)> {
    let collection = parse_collection(&collection)?;
    let rows = repo::list(&state.db, collection).await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(to_response).collect()))
}

/// Drag-end reorder: the body carries the complete new sequence. Changed
/// pairs are persisted as a batch of per-id updates; on failure the
/// in-memory list rolls back and the client gets a single retryable error.
#[instrument(skip(state, admin, payload))]
pub async fn reorder(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(collection): Path<String>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, (StatusCode, String)> {
    let collection = parse_collection(&collection)?;
    let rows = repo::list(&state.db, collection).await.map_err(internal)?;
    let mut list = OrderedList::new(rows.iter().map(OrderableRow::ordered_item).collect());

    let plan =
        plan_full_reorder(list.items(), &payload.ordered_ids).map_err(reorder_error_response)?;
    let updated = plan.len();

    let store = SqlOrderStore {
        db: &state.db,
        collection,
    };
    list.apply(&store, &plan)
        .await
        .map_err(reorder_error_response)?;

    info!(
        user_id = %admin.0.user_id,
        collection = collection.table(),
        updated,
        "collection reordered"
    );
    Ok(Json(ReorderResponse { updated }))
}

/// Up/down button: swap with the adjacent record. Moving the first record
/// up or the last down is a no-op and issues no writes.
#[instrument(skip(state, admin, payload))]
pub async fn move_entry(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((collection, id)): Path<(String, Uuid)>,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, (StatusCode, String)> {
    let collection = parse_collection(&collection)?;
    let rows = repo::list(&state.db, collection).await.map_err(internal)?;
    let mut list = OrderedList::new(rows.iter().map(OrderableRow::ordered_item).collect());

    let Some(swap) =
        plan_move(list.items(), id, payload.direction).map_err(reorder_error_response)?
    else {
        return Ok(Json(MoveResponse { moved: false }));
    };

    let store = SqlOrderStore {
        db: &state.db,
        collection,
    };
    list.apply(&store, &swap)
        .await
        .map_err(reorder_error_response)?;

    info!(
        user_id = %admin.0.user_id,
        collection = collection.table(),
        %id,
        "entry moved"
    );
    Ok(Json(MoveResponse { moved: true }))
}
