use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 购买时的商品快照，目录后续怎么改都不影响已出的票据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketItem {
    pub product_id: Uuid,
    pub title: String,
    pub price: f64,
    pub quantity: u32,
}

/// 购买凭据，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub code: String,
    pub purchaser: String,
    pub amount: f64,
    pub purchase_datetime: DateTime<Utc>,
    pub items: Vec<TicketItem>,
}

/// 待创建的票据，id/code/时间由存储层分配
#[derive(Debug, Clone)]
pub struct TicketDraft {
    pub purchaser: String,
    pub amount: f64,
    pub items: Vec<TicketItem>,
}
