use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// 业务编码，全局唯一
    pub code: String,
    pub price: f64,
    pub stock: i32,
    pub category: String,
    /// 是否上架
    pub status: bool,
    pub thumbnails: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        description: &str,
        code: &str,
        price: f64,
        stock: i32,
        category: &str,
        thumbnails: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            code: code.to_string(),
            price,
            stock,
            category: category.to_string(),
            status: true,
            thumbnails,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 目录查询条件：query 同时匹配分类和上架状态的字面值
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub query: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        match &self.query {
            Some(q) => product.category == *q || product.status == (q == "true"),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSort {
    Asc,
    Desc,
}

impl PriceSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(PriceSort::Asc),
            "desc" => Some(PriceSort::Desc),
            _ => None,
        }
    }
}
