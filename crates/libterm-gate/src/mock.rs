//! In-memory catalog for tests and dry runs.

use crate::catalog::{BookRecord, CatalogResult, CatalogService, STATUS_IN_STOCK, keys_match};
use crate::error::CatalogError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Status written to a copy when it is issued.
const STATUS_ISSUED: &str = "1";

/// A call made to the [`MockCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    ValidateCard(String),
    FindBook(String),
    Issue(String),
    Return(String),
}

#[derive(Debug, Default)]
struct CatalogState {
    cards: HashSet<String>,
    books: Vec<BookRecord>,
    offline: bool,
    reject_writes: Option<String>,
    delay: Duration,
    calls: Vec<CatalogCall>,
}

type Shared = Arc<Mutex<CatalogState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, CatalogState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Catalog backed by a list of records.
///
/// Issuing and returning flip the matched copy's status, so a second take
/// of the same copy is refused as already issued.
#[derive(Debug, Clone)]
pub struct MockCatalog {
    shared: Shared,
}

/// Test-side control of a [`MockCatalog`].
#[derive(Debug, Clone)]
pub struct MockCatalogHandle {
    shared: Shared,
}

impl MockCatalog {
    pub fn new() -> (Self, MockCatalogHandle) {
        let shared = Shared::default();
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockCatalogHandle { shared },
        )
    }

    async fn enter(&self, call: CatalogCall) -> CatalogResult<()> {
        let delay = {
            let mut state = lock(&self.shared);
            state.calls.push(call);
            if state.offline {
                return Err(CatalogError::unavailable("mock catalog offline"));
            }
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn set_status(&self, key: &str, status: &str) -> CatalogResult<String> {
        let mut state = lock(&self.shared);
        if let Some(reason) = &state.reject_writes {
            return Err(CatalogError::rejected(reason.clone()));
        }
        for record in &mut state.books {
            if let Some(copy) = record.copies.iter_mut().find(|c| keys_match(&c.tag, key)) {
                copy.status = status.to_string();
                return Ok(record.brief.clone());
            }
        }
        Err(CatalogError::rejected(format!("no copy tagged {key}")))
    }
}

impl CatalogService for MockCatalog {
    async fn validate_card(&self, uid: &str) -> CatalogResult<bool> {
        self.enter(CatalogCall::ValidateCard(uid.to_string())).await?;
        Ok(lock(&self.shared).cards.contains(uid))
    }

    async fn find_book_by_tag(&self, key: &str) -> CatalogResult<Option<BookRecord>> {
        self.enter(CatalogCall::FindBook(key.to_string())).await?;
        Ok(lock(&self.shared)
            .books
            .iter()
            .find(|record| record.copy_for(key).is_some())
            .cloned())
    }

    async fn issue(&self, key: &str) -> CatalogResult<String> {
        self.enter(CatalogCall::Issue(key.to_string())).await?;
        self.set_status(key, STATUS_ISSUED)
    }

    async fn return_book(&self, key: &str) -> CatalogResult<String> {
        self.enter(CatalogCall::Return(key.to_string())).await?;
        self.set_status(key, STATUS_IN_STOCK)
    }
}

impl MockCatalogHandle {
    /// Register a patron card.
    pub fn add_card(&self, uid: impl Into<String>) {
        lock(&self.shared).cards.insert(uid.into());
    }

    pub fn add_book(&self, record: BookRecord) {
        lock(&self.shared).books.push(record);
    }

    /// Every call fails as unavailable.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.shared).offline = offline;
    }

    /// Issue and return are rejected with `reason`.
    pub fn reject_writes(&self, reason: impl Into<String>) {
        lock(&self.shared).reject_writes = Some(reason.into());
    }

    /// Every call waits this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.shared).delay = delay;
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        lock(&self.shared).calls.clone()
    }

    /// Current status of the copy tagged `key`.
    pub fn copy_status(&self, key: &str) -> Option<String> {
        lock(&self.shared)
            .books
            .iter()
            .find_map(|record| record.copy_for(key))
            .map(|copy| copy.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CopyRecord;

    fn record() -> BookRecord {
        BookRecord {
            id: 7,
            brief: "Bulgakov. The Master and Margarita".into(),
            copies: vec![CopyRecord::new("5A4C1C33", "0")],
        }
    }

    #[tokio::test]
    async fn test_issue_and_return_flip_status() {
        let (catalog, handle) = MockCatalog::new();
        handle.add_book(record());

        let brief = catalog.issue("E2801160600002085A4C1C33").await.unwrap();
        assert_eq!(brief, "Bulgakov. The Master and Margarita");
        assert_eq!(handle.copy_status("5A4C1C33").as_deref(), Some("1"));

        catalog.return_book("5A4C1C33").await.unwrap();
        assert_eq!(handle.copy_status("5A4C1C33").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let (catalog, handle) = MockCatalog::new();
        handle.add_card("04AB12CD");
        handle.set_offline(true);

        assert!(matches!(
            catalog.validate_card("04AB12CD").await,
            Err(CatalogError::Unavailable { .. })
        ));
        assert_eq!(
            handle.calls(),
            vec![CatalogCall::ValidateCard("04AB12CD".into())]
        );
    }

    #[tokio::test]
    async fn test_unknown_tag_not_found() {
        let (catalog, handle) = MockCatalog::new();
        handle.add_book(record());

        assert!(catalog.find_book_by_tag("FFFFFFFF").await.unwrap().is_none());
        assert!(catalog.issue("FFFFFFFF").await.is_err());
    }
}
