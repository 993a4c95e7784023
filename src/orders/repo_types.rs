use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Order owned by a user; removed together with its owner.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub item: String,
    pub quantity: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub item: String,
    pub quantity: i32,
}
