use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::models::ticket::{Ticket, TicketDraft, TicketItem};
use crate::error::AppError;

/// 票据只增不改：接口上没有任何更新或删除操作
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, draft: TicketDraft) -> Result<Ticket, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, AppError>;
    /// 按购买时间倒序
    async fn list_by_purchaser(&self, email: &str) -> Result<Vec<Ticket>, AppError>;
}

pub struct MySqlTicketRepository {
    pool: MySqlPool,
}

impl MySqlTicketRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, ticket_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TicketItem>>, AppError> {
        if ticket_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ticket_ids.len()].join(", ");
        let sql = format!(
            "SELECT ticket_id, product_id, title, price, quantity FROM ticket_items WHERE ticket_id IN ({placeholders}) ORDER BY position"
        );
        let mut query = sqlx::query_as::<_, TicketItemRow>(&sql);
        for id in ticket_ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut grouped: HashMap<Uuid, Vec<TicketItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.ticket_id).or_default().push(TicketItem {
                product_id: row.product_id,
                title: row.title,
                price: row.price,
                quantity: row.quantity,
            });
        }
        Ok(grouped)
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    code: String,
    purchaser: String,
    amount: f64,
    purchase_datetime: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TicketItemRow {
    ticket_id: Uuid,
    product_id: Uuid,
    title: String,
    price: f64,
    quantity: u32,
}

#[async_trait]
impl TicketRepository for MySqlTicketRepository {
    async fn create(&self, draft: TicketDraft) -> Result<Ticket, AppError> {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            code: Uuid::new_v4().to_string(),
            purchaser: draft.purchaser,
            amount: draft.amount,
            purchase_datetime: Utc::now(),
            items: draft.items,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO tickets (id, code, purchaser, amount, purchase_datetime) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(ticket.id)
        .bind(&ticket.code)
        .bind(&ticket.purchaser)
        .bind(ticket.amount)
        .bind(ticket.purchase_datetime)
        .execute(&mut *tx)
        .await?;

        for (position, item) in ticket.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO ticket_items (ticket_id, position, product_id, title, price, quantity)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(ticket.id)
            .bind(position as u32)
            .bind(item.product_id)
            .bind(&item.title)
            .bind(item.price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ticket)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, AppError> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, code, purchaser, amount, purchase_datetime FROM tickets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.load_items(&[row.id]).await?;
        Ok(Some(Ticket {
            id: row.id,
            code: row.code,
            purchaser: row.purchaser,
            amount: row.amount,
            purchase_datetime: row.purchase_datetime,
            items: items.remove(&id).unwrap_or_default(),
        }))
    }

    async fn list_by_purchaser(&self, email: &str) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT id, code, purchaser, amount, purchase_datetime
            FROM tickets
            WHERE purchaser = ?
            ORDER BY purchase_datetime DESC, id
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut items = self.load_items(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| Ticket {
                items: items.remove(&row.id).unwrap_or_default(),
                id: row.id,
                code: row.code,
                purchaser: row.purchaser,
                amount: row.amount,
                purchase_datetime: row.purchase_datetime,
            })
            .collect())
    }
}
