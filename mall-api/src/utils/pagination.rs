use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<u64>,
    pub page: Option<u64>,
}

impl PaginationParams {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// 分页结果，带上下页导航信息
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
}

impl<T> Paginated<T> {
    /// limit 必须 >= 1，由调用方保证
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let pages = total.div_ceil(limit);
        let has_prev_page = page > 1;
        let has_next_page = page < pages;

        Self {
            items,
            total,
            page,
            limit,
            total_pages: pages.max(1),
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            has_prev_page: self.has_prev_page,
            has_next_page: self.has_next_page,
            prev_page: self.prev_page,
            next_page: self.next_page,
        }
    }
}
