//! Book take and return workflow.
//!
//! [`BookOperations`] is what the gate's channels run once an identifier is
//! accepted. It talks to the catalog and the cabinet:
//!
//! | Channel | Steps |
//! |---------|-------|
//! | card | validate card, remember the patron |
//! | book-take | patron known, find record, copy in stock, issue, open bin, OK + beep |
//! | book-return | find record, bin has space, return, open bin, OK + beep |
//!
//! Any refusal signals `ERR` on the cabinet and comes back as an
//! [`OperationError`]. A failed `open_bin` after the catalog has recorded
//! the loan is logged only; the loan stands.
//!
//! Actuator calls block (the space query waits for a reply), so they run on
//! the blocking pool.

use crate::catalog::{BookRecord, CatalogService};
use crate::error::OperationError;
use crate::gate::{ActionResult, EventGate};
use libterm_core::constants::DEFAULT_BEEP_MS;
use libterm_core::{GateChannel, NormalizedIdentifier};
use libterm_hardware::traits::CabinetActuator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Beep length after a successful take or return.
    pub beep_ms: u32,

    /// Refuse takes until a patron card has been accepted.
    pub require_card: bool,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            beep_ms: DEFAULT_BEEP_MS,
            require_card: true,
        }
    }
}

/// A recorded take or return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookReceipt {
    pub record_id: u32,

    /// Catalog description, folded onto one line.
    pub brief: String,

    /// Tag key the operation was made with.
    pub key: String,
}

/// A completed business action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completed {
    CardAccepted { uid: String },
    Issued(BookReceipt),
    Returned(BookReceipt),
}

impl fmt::Display for Completed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::CardAccepted { uid } => write!(f, "card {uid} accepted"),
            Self::Issued(r) => write!(f, "issued {} (record {})", r.key, r.record_id),
            Self::Returned(r) => write!(f, "returned {} (record {})", r.key, r.record_id),
        }
    }
}

/// Card check, take and return against a catalog and a cabinet.
pub struct BookOperations<C> {
    catalog: Arc<C>,
    actuator: Arc<dyn CabinetActuator>,
    config: OperationsConfig,
    patron: Mutex<Option<String>>,
}

impl<C> fmt::Debug for BookOperations<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookOperations")
            .field("config", &self.config)
            .field("patron", &self.patron())
            .finish_non_exhaustive()
    }
}

impl<C> BookOperations<C> {
    /// UID of the patron whose card was accepted last.
    pub fn patron(&self) -> Option<String> {
        self.patron
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the current patron.
    pub fn end_session(&self) {
        if let Some(uid) = self
            .patron
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!(%uid, "Patron session ended");
        }
    }

    fn set_patron(&self, uid: &str) {
        *self.patron.lock().unwrap_or_else(PoisonError::into_inner) = Some(uid.to_string());
    }

    /// Run `f` against the actuator on the blocking pool.
    async fn cabinet<R, F>(&self, f: F) -> Result<R, OperationError>
    where
        F: FnOnce(&dyn CabinetActuator) -> R + Send + 'static,
        R: Send + 'static,
    {
        let actuator = Arc::clone(&self.actuator);
        tokio::task::spawn_blocking(move || f(actuator.as_ref()))
            .await
            .map_err(|e| OperationError::actuator(e.to_string()))
    }

    async fn refuse(&self, error: OperationError) -> OperationError {
        if let Err(e) = self.cabinet(|a| a.send_error()).await {
            warn!(error = %e, "Could not signal error on the cabinet");
        }
        error
    }

    async fn finish(&self, operation: &'static str) {
        let beep_ms = self.config.beep_ms;
        let result = self
            .cabinet(move |a| {
                let opened = a.open_bin();
                a.send_ok();
                a.send_beep(beep_ms);
                opened
            })
            .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(operation, error = %e, "Bin did not open"),
            Err(e) => warn!(operation, error = %e, "Cabinet call failed"),
        }
    }
}

impl<C: CatalogService> BookOperations<C> {
    pub fn new(
        catalog: Arc<C>,
        actuator: Arc<dyn CabinetActuator>,
        config: OperationsConfig,
    ) -> Self {
        Self {
            catalog,
            actuator,
            config,
            patron: Mutex::new(None),
        }
    }

    /// Validate a patron card and make it the current patron.
    pub async fn accept_card(&self, uid: &str) -> ActionResult {
        match self.catalog.validate_card(uid).await {
            Ok(true) => {
                self.set_patron(uid);
                info!(%uid, "Patron card accepted");
                Ok(Completed::CardAccepted {
                    uid: uid.to_string(),
                })
            }
            Ok(false) => Err(self
                .refuse(OperationError::CardRejected {
                    uid: uid.to_string(),
                })
                .await),
            Err(e) => Err(self.refuse(e.into()).await),
        }
    }

    /// Issue the copy tagged `key` to the current patron.
    pub async fn take(&self, key: &str) -> ActionResult {
        match self.try_take(key).await {
            Ok(receipt) => {
                self.finish("take").await;
                info!(key, record = receipt.record_id, "Book issued");
                Ok(Completed::Issued(receipt))
            }
            Err(e) => Err(self.refuse(e).await),
        }
    }

    /// Take back the copy tagged `key`.
    pub async fn return_book(&self, key: &str) -> ActionResult {
        match self.try_return(key).await {
            Ok(receipt) => {
                self.finish("return").await;
                info!(key, record = receipt.record_id, "Book returned");
                Ok(Completed::Returned(receipt))
            }
            Err(e) => Err(self.refuse(e).await),
        }
    }

    async fn try_take(&self, key: &str) -> Result<BookReceipt, OperationError> {
        if self.config.require_card && self.patron().is_none() {
            return Err(OperationError::NoPatron);
        }

        let record = self.find(key).await?;
        let copy = record
            .copy_for(key)
            .ok_or_else(|| OperationError::CopyNotMatched {
                key: key.to_string(),
                record_id: record.id,
            })?;
        if !copy.is_in_stock() {
            return Err(OperationError::AlreadyIssued {
                key: key.to_string(),
                status: copy.status.clone(),
            });
        }

        let brief = self.catalog.issue(key).await?;
        receipt(&record, key, &brief, "loan")
    }

    async fn try_return(&self, key: &str) -> Result<BookReceipt, OperationError> {
        let record = self.find(key).await?;

        let has_space = self.cabinet(|a| a.has_space()).await?;
        if !has_space {
            return Err(OperationError::NoSpace);
        }

        let brief = self.catalog.return_book(key).await?;
        receipt(&record, key, &brief, "return")
    }

    async fn find(&self, key: &str) -> Result<BookRecord, OperationError> {
        let record = self
            .catalog
            .find_book_by_tag(key)
            .await?
            .ok_or_else(|| OperationError::book_not_found(key))?;
        debug!(key, record = record.id, copies = record.copies.len(), "Record found");
        Ok(record)
    }

    /// Register the card, take and return actions on `gate`.
    pub fn register_actions(self: &Arc<Self>, gate: &mut EventGate) {
        let ops = Arc::clone(self);
        gate.register(GateChannel::Card, move |key: NormalizedIdentifier| {
            let ops = Arc::clone(&ops);
            async move { ops.accept_card(key.as_str()).await }
        });

        let ops = Arc::clone(self);
        gate.register(GateChannel::BookTake, move |key: NormalizedIdentifier| {
            let ops = Arc::clone(&ops);
            async move { ops.take(key.as_str()).await }
        });

        let ops = Arc::clone(self);
        gate.register(GateChannel::BookReturn, move |key: NormalizedIdentifier| {
            let ops = Arc::clone(&ops);
            async move { ops.return_book(key.as_str()).await }
        });
    }
}

fn receipt(
    record: &BookRecord,
    key: &str,
    brief: &str,
    operation: &'static str,
) -> Result<BookReceipt, OperationError> {
    let brief = brief.split_whitespace().collect::<Vec<_>>().join(" ");
    if brief.is_empty() {
        return Err(OperationError::NotRecorded { operation });
    }
    Ok(BookReceipt {
        record_id: record.id,
        brief,
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CopyRecord;
    use crate::mock::{CatalogCall, MockCatalog, MockCatalogHandle};
    use libterm_hardware::mock::RecordingActuator;

    const TAG: &str = "E2801160600002085A4C1C33";

    fn setup(config: OperationsConfig) -> (BookOperations<MockCatalog>, MockCatalogHandle, RecordingActuator) {
        let (catalog, handle) = MockCatalog::new();
        handle.add_card("04AB12CD");
        handle.add_book(BookRecord {
            id: 42,
            brief: "Chekhov.\r\nShort stories".into(),
            copies: vec![CopyRecord::new(TAG, "0")],
        });
        let actuator = RecordingActuator::new();
        let ops = BookOperations::new(Arc::new(catalog), Arc::new(actuator.clone()), config);
        (ops, handle, actuator)
    }

    #[tokio::test]
    async fn test_take_after_card() {
        let (ops, catalog, actuator) = setup(OperationsConfig::default());

        ops.accept_card("04AB12CD").await.unwrap();
        assert_eq!(ops.patron().as_deref(), Some("04AB12CD"));

        let done = ops.take(TAG).await.unwrap();
        assert_eq!(
            done,
            Completed::Issued(BookReceipt {
                record_id: 42,
                brief: "Chekhov. Short stories".into(),
                key: TAG.into(),
            })
        );
        assert_eq!(actuator.commands(), vec!["OPEN", "OK", "BEEP:120"]);
        assert_eq!(catalog.copy_status(TAG).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_take_without_patron_refused() {
        let (ops, catalog, actuator) = setup(OperationsConfig::default());

        assert_eq!(ops.take(TAG).await, Err(OperationError::NoPatron));
        assert_eq!(actuator.commands(), vec!["ERR"]);
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_take_without_card_when_not_required() {
        let (ops, _catalog, _actuator) = setup(OperationsConfig {
            require_card: false,
            ..OperationsConfig::default()
        });
        assert!(matches!(ops.take(TAG).await, Ok(Completed::Issued(_))));
    }

    #[tokio::test]
    async fn test_second_take_already_issued() {
        let (ops, _catalog, actuator) = setup(OperationsConfig::default());
        ops.accept_card("04AB12CD").await.unwrap();
        ops.take(TAG).await.unwrap();

        let err = ops.take(TAG).await.unwrap_err();
        assert!(matches!(err, OperationError::AlreadyIssued { ref status, .. } if status == "1"));
        assert_eq!(actuator.commands().last().map(String::as_str), Some("ERR"));
    }

    #[tokio::test]
    async fn test_unknown_card_rejected() {
        let (ops, _catalog, actuator) = setup(OperationsConfig::default());

        let err = ops.accept_card("DEADBEEF").await.unwrap_err();
        assert_eq!(
            err,
            OperationError::CardRejected {
                uid: "DEADBEEF".into()
            }
        );
        assert!(ops.patron().is_none());
        assert_eq!(actuator.commands(), vec!["ERR"]);
    }

    #[tokio::test]
    async fn test_return_checks_space_first() {
        let (ops, catalog, actuator) = setup(OperationsConfig::default());
        actuator.set_space(false);

        assert_eq!(ops.return_book(TAG).await, Err(OperationError::NoSpace));
        assert_eq!(actuator.commands(), vec!["SPACE?", "ERR"]);
        assert!(!catalog.calls().contains(&CatalogCall::Return(TAG.into())));
    }

    #[tokio::test]
    async fn test_return_opens_bin() {
        let (ops, catalog, actuator) = setup(OperationsConfig {
            beep_ms: 200,
            ..OperationsConfig::default()
        });

        let done = ops.return_book("5A4C1C33").await.unwrap();
        assert!(matches!(done, Completed::Returned(ref r) if r.record_id == 42));
        assert_eq!(actuator.commands(), vec!["SPACE?", "OPEN", "OK", "BEEP:200"]);
        assert_eq!(
            catalog.calls(),
            vec![
                CatalogCall::FindBook("5A4C1C33".into()),
                CatalogCall::Return("5A4C1C33".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let (ops, _catalog, actuator) = setup(OperationsConfig::default());

        assert_eq!(
            ops.return_book("FFFFFFFF").await,
            Err(OperationError::book_not_found("FFFFFFFF"))
        );
        assert_eq!(actuator.commands(), vec!["ERR"]);
    }

    #[tokio::test]
    async fn test_catalog_rejection_surfaces() {
        let (ops, catalog, _actuator) = setup(OperationsConfig::default());
        catalog.reject_writes("reader has overdue loans");
        ops.accept_card("04AB12CD").await.unwrap();

        assert!(matches!(
            ops.take(TAG).await,
            Err(OperationError::Catalog(crate::error::CatalogError::Rejected { .. }))
        ));
    }

    #[tokio::test]
    async fn test_bin_failure_keeps_loan() {
        let (ops, catalog, actuator) = setup(OperationsConfig::default());
        actuator.set_online(false);
        ops.accept_card("04AB12CD").await.unwrap();

        assert!(ops.take(TAG).await.is_ok());
        assert_eq!(catalog.copy_status(TAG).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_end_session_forgets_patron() {
        let (ops, _catalog, _actuator) = setup(OperationsConfig::default());
        ops.accept_card("04AB12CD").await.unwrap();
        ops.end_session();
        assert!(ops.patron().is_none());
    }

    #[test]
    fn test_receipt_rejects_empty_brief() {
        let record = BookRecord {
            id: 1,
            brief: String::new(),
            copies: Vec::new(),
        };
        assert_eq!(
            receipt(&record, TAG, " \r\n ", "loan"),
            Err(OperationError::NotRecorded { operation: "loan" })
        );
    }
}
