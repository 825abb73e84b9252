use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::cart::CartItem;
use crate::domain::models::ticket::{Ticket, TicketDraft, TicketItem};
use crate::error::AppError;
use crate::repository::{CartRepository, ProductRepository, TicketRepository};

/// 未能成交的行：requested 是购物车里要的数量，available 是当时的库存
#[derive(Debug, Clone, Serialize)]
pub struct OutOfStockItem {
    pub product_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub requested: u32,
    pub available: i32,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOutcome {
    pub ticket: Ticket,
    pub remainder: Vec<CartItem>,
    pub out_of_stock: Vec<OutOfStockItem>,
}

pub struct CheckoutService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    tickets: Arc<dyn TicketRepository>,
}

impl CheckoutService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        tickets: Arc<dyn TicketRepository>,
    ) -> Self {
        Self {
            carts,
            products,
            tickets,
        }
    }

    /// 结算：能买的生成票据并扣库存，买不到的留在购物车里。
    /// 部分成交是正常结果，不是错误。
    pub async fn purchase(
        &self,
        cart_id: Uuid,
        purchaser: &str,
    ) -> Result<PurchaseOutcome, AppError> {
        // 1. 读取购物车
        let cart = self
            .carts
            .find_by_id(cart_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cart {cart_id} not found")))?;

        if cart.items.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let mut lines: Vec<TicketItem> = Vec::new();
        let mut remainder: Vec<CartItem> = Vec::new();
        let mut out_of_stock: Vec<OutOfStockItem> = Vec::new();
        let mut amount = 0.0;

        for item in &cart.items {
            // 2. 取当前商品；已下架的按无库存处理
            let Some(product) = self.products.find_by_id(item.product_id).await? else {
                out_of_stock.push(OutOfStockItem {
                    product_id: item.product_id,
                    title: None,
                    requested: item.quantity,
                    available: 0,
                });
                remainder.push(item.clone());
                continue;
            };

            // 3. 条件扣减。同一商品上的并发结算由存储层串行化，
            //    这里不做任何引擎级别的加锁
            let purchased = product.stock >= item.quantity as i32
                && self
                    .products
                    .decrement_stock_if_available(product.id, item.quantity)
                    .await?;

            if purchased {
                amount += product.price * f64::from(item.quantity);
                lines.push(TicketItem {
                    product_id: product.id,
                    title: product.title.clone(),
                    price: product.price,
                    quantity: item.quantity,
                });
            } else {
                // 4. 库存不足（或并发落败）：重新读取以报告当前可用量，
                //    整行按原数量留在购物车里
                let available = self
                    .products
                    .find_by_id(item.product_id)
                    .await?
                    .map(|p| p.stock)
                    .unwrap_or(0);
                out_of_stock.push(OutOfStockItem {
                    product_id: product.id,
                    title: Some(product.title),
                    requested: item.quantity,
                    available,
                });
                remainder.push(item.clone());
            }
        }

        // 5. 一件都买不到：不出票，不动购物车（前面也没有发生任何扣减）
        if lines.is_empty() {
            return Err(AppError::NothingPurchasable);
        }

        // 6. 出票并把未成交的部分写回购物车
        let ticket = self
            .tickets
            .create(TicketDraft {
                purchaser: purchaser.to_string(),
                amount,
                items: lines,
            })
            .await?;
        self.carts.replace_items(cart_id, &remainder).await?;

        tracing::info!(
            ticket = %ticket.code,
            purchaser,
            amount,
            unfulfilled = remainder.len(),
            "purchase completed"
        );

        Ok(PurchaseOutcome {
            ticket,
            remainder,
            out_of_stock,
        })
    }
}
