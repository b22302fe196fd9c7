use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::content::reorder::MoveDirection;

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
    pub sort_order: i32,
    pub created_at: OffsetDateTime,
}

/// Full reordering from a drag end: the complete new sequence of ids.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    /// Number of records whose order actually changed.
    pub updated: usize,
}

/// Single-step move from the up/down buttons.
#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    /// False when the record was already at the boundary.
    pub moved: bool,
}
