use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::content::reorder::OrderedItem;

/// The orderable collections the admin dashboard can rearrange. Table
/// names come from this enum only, never from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Certifications,
    Experience,
    Services,
}

impl Collection {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "certifications" => Some(Self::Certifications),
            "experience" => Some(Self::Experience),
            "services" => Some(Self::Services),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Certifications => "certifications",
            Self::Experience => "experience_entries",
            Self::Services => "service_offerings",
        }
    }
}

/// One row of an orderable collection. Entity-specific display fields
/// (issuer, company, period, icon, ...) live in `content` and are edited
/// by forms outside this core; ordering only touches `sort_order`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderableRow {
    pub id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
    pub sort_order: i32,
    pub created_at: OffsetDateTime,
}

impl OrderableRow {
    pub fn ordered_item(&self) -> OrderedItem {
        OrderedItem {
            id: self.id,
            sort_order: self.sort_order,
            created_at: self.created_at,
        }
    }
}
