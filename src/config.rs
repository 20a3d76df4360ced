//! Startup configuration.

use serde::{Deserialize, Serialize};

/// Bytes per page, including the header.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool may cache.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Configuration fixed at database construction time.
///
/// `page_size` is set once; every heap file and page of the database
/// instance uses the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Bytes per page.
    pub page_size: usize,
    /// Buffer pool capacity, in pages.
    pub buffer_pool_pages: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_POOL_PAGES,
        }
    }
}
