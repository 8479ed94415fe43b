//! Pagination controller
//!
//! Turns a page number and page size into a window over a builder's query
//! and avoids the count round trip when the first page already holds
//! every row.

use serde::Serialize;

use super::builder::QueryBuilder;
use crate::engine::config::PaginationConfig;
use crate::engine::error::Result;
use crate::engine::executor::{Executor, Row};

/// Normalised page position. A page size of zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Clamp caller input: pages start at 1, negative sizes fall back to
    /// the configured default, sizes above the configured maximum are capped.
    pub fn new(page: i64, page_size: i64, config: &PaginationConfig) -> Self {
        let page = u64::try_from(page.max(1)).unwrap_or(1);
        let size = u64::try_from(page_size).unwrap_or(config.default_page_size);
        let page_size = match config.max_page_size {
            Some(max) if size > max => max,
            _ => size,
        };
        Self { page, page_size }
    }

    pub fn is_unbounded(&self) -> bool {
        self.page_size == 0
    }

    pub fn limit(&self) -> Option<u64> {
        (!self.is_unbounded()).then_some(self.page_size)
    }

    /// Rows before this page, capped at what a signed 64-bit `OFFSET` holds
    pub fn offset(&self) -> Option<u64> {
        (!self.is_unbounded()).then(|| {
            (self.page - 1)
                .saturating_mul(self.page_size)
                .min(i64::MAX as u64)
        })
    }
}

/// One fetched page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Row>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl Page {
    pub fn pages(&self) -> u64 {
        if self.page_size == 0 {
            return u64::from(self.total > 0);
        }
        self.total.div_ceil(self.page_size)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1 && self.page_size > 0
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    pub fn prev_num(&self) -> Option<u64> {
        self.has_prev().then(|| self.page - 1)
    }

    pub fn next_num(&self) -> Option<u64> {
        self.has_next().then(|| self.page + 1)
    }
}

/// Walks pages of one query. Keeps the builder, not a compiled query, so
/// every page is a fresh immutable `CompiledQuery`.
pub struct Paginator<'a, E: Executor + ?Sized> {
    executor: &'a E,
    builder: QueryBuilder,
    config: PaginationConfig,
    request: PageRequest,
    total: Option<u64>,
}

impl<'a, E: Executor + ?Sized> Paginator<'a, E> {
    pub fn new(
        executor: &'a E,
        builder: QueryBuilder,
        page: i64,
        page_size: i64,
        config: &PaginationConfig,
    ) -> Self {
        Self {
            executor,
            builder,
            config: config.clone(),
            request: PageRequest::new(page, page_size, config),
            total: None,
        }
    }

    pub fn request(&self) -> PageRequest {
        self.request
    }

    /// Fetch the current page
    pub fn fetch(&mut self) -> Result<Page> {
        let query = self
            .builder
            .paginate_query(&self.request, self.config.order_by_identifier)?;
        let items = self.executor.fetch(&query)?;
        let fetched = items.len() as u64;

        let total = match self.total {
            Some(total) => total,
            None if self.request.is_unbounded() => fetched,
            None if self.request.page == 1 && fetched < self.request.page_size => fetched,
            None => {
                tracing::debug!(page = self.request.page, "issuing count query");
                self.executor.count(&query)?
            }
        };
        self.total = Some(total);

        Ok(Page {
            items,
            total,
            page: self.request.page,
            page_size: self.request.page_size,
        })
    }

    /// Advance one page. `None` once the known total is exhausted.
    pub fn next(&mut self) -> Result<Option<Page>> {
        if self.request.is_unbounded() {
            return Ok(None);
        }
        if let Some(total) = self.total {
            if self.request.page.saturating_mul(self.request.page_size) >= total {
                return Ok(None);
            }
        }
        self.request.page += 1;
        self.fetch().map(Some)
    }

    /// Step back one page. `None` on the first page.
    pub fn prev(&mut self) -> Result<Option<Page>> {
        if self.request.page <= 1 || self.request.is_unbounded() {
            return Ok(None);
        }
        self.request.page -= 1;
        self.fetch().map(Some)
    }
}
