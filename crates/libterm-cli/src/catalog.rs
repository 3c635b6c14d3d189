//! Catalog used when the kiosk runs without a library system.
//!
//! Every card is a patron and every tag is an in-stock copy of its own
//! record, so the full take/return sequence reaches the cabinet and the
//! log shows what a real catalog would have been asked.

use libterm_gate::catalog::{CatalogResult, STATUS_IN_STOCK};
use libterm_gate::{BookRecord, CatalogService, CopyRecord};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCatalog;

impl CatalogService for LoggingCatalog {
    async fn validate_card(&self, uid: &str) -> CatalogResult<bool> {
        info!(uid, "Catalog: validate card");
        Ok(true)
    }

    async fn find_book_by_tag(&self, key: &str) -> CatalogResult<Option<BookRecord>> {
        info!(key, "Catalog: find book");
        Ok(Some(BookRecord {
            id: 0,
            brief: format!("Copy {key}"),
            copies: vec![CopyRecord::new(key, STATUS_IN_STOCK)],
        }))
    }

    async fn issue(&self, key: &str) -> CatalogResult<String> {
        info!(key, "Catalog: issue");
        Ok(format!("Copy {key}"))
    }

    async fn return_book(&self, key: &str) -> CatalogResult<String> {
        info!(key, "Catalog: return");
        Ok(format!("Copy {key}"))
    }
}
