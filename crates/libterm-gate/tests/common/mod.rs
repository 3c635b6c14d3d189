//! Common test utilities for kiosk pipeline tests.
//!
//! [`Kiosk`] wires mock serial readers, the reader manager, the router and
//! the gate the way the binary does, with a mock catalog and a recording
//! cabinet in place of the external services.

#![allow(dead_code)]

use libterm_core::SourceChannel;
use libterm_gate::mock::{MockCatalog, MockCatalogHandle};
use libterm_gate::{
    BookOperations, BookRecord, CopyRecord, DispatchStats, EventGate, EventRouter, GateConfig,
    KioskMode, OperationsConfig, dispatch_events,
};
use libterm_hardware::mock::{MockLineHandle, MockLineTransport, RecordingActuator};
use libterm_hardware::{LineConfig, ManagerConfig, ReaderManager, SerialReader, SerialReaderConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Generous upper bound for anything the pipeline should do promptly.
pub const SETTLE: Duration = Duration::from_secs(3);

pub const PATRON: &str = "04AB12CD";
pub const BOOK_TAG: &str = "E2801160600002085A4C1C33";

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn reader_config(port: &str) -> SerialReaderConfig {
    SerialReaderConfig {
        line: LineConfig {
            reconnect_delay_ms: 50,
            ..LineConfig::for_port(port)
        },
        ..SerialReaderConfig::default()
    }
}

/// A running kiosk pipeline.
pub struct Kiosk {
    pub card: MockLineHandle,
    pub books: Vec<MockLineHandle>,
    pub catalog: MockCatalogHandle,
    pub cabinet: RecordingActuator,
    pub router: EventRouter,
    pub operations: Arc<BookOperations<MockCatalog>>,
    stop: oneshot::Sender<()>,
    pump: JoinHandle<DispatchStats>,
}

impl Kiosk {
    /// Start a kiosk with one card reader and `book_readers` book readers.
    ///
    /// `name` keeps port names unique across tests.
    pub fn start(name: &str, book_readers: usize, gate_config: GateConfig) -> Self {
        let (catalog, catalog_handle) = MockCatalog::new();
        catalog_handle.add_card(PATRON);
        catalog_handle.add_book(BookRecord {
            id: 42,
            brief: "Chekhov. Short stories".into(),
            copies: vec![CopyRecord::new(BOOK_TAG, "0")],
        });
        let cabinet = RecordingActuator::new();

        let mut manager = ReaderManager::new(ManagerConfig::default());

        let (card_transport, card) = MockLineTransport::new();
        manager.register(
            SourceChannel::Card,
            SerialReader::card_reader(
                "card",
                &reader_config(&format!("{name}-CARD")),
                Arc::new(card_transport),
            )
            .into(),
        );

        let mut books = Vec::new();
        for i in 0..book_readers {
            let (transport, handle) = MockLineTransport::new();
            manager.register(
                SourceChannel::Book,
                SerialReader::book_reader(
                    format!("book-{i}"),
                    &reader_config(&format!("{name}-BOOK{i}")),
                    Arc::new(transport),
                )
                .into(),
            );
            books.push(handle);
        }

        let operations = Arc::new(BookOperations::new(
            Arc::new(catalog),
            Arc::new(cabinet.clone()),
            OperationsConfig::default(),
        ));
        let mut gate = EventGate::new(gate_config, Handle::current());
        operations.register_actions(&mut gate);

        let router = EventRouter::new(KioskMode::Idle);
        let mut readers = manager.start();
        let (stop, stop_rx) = oneshot::channel();
        let pump_router = router.clone();
        let pump = tokio::spawn(async move {
            let stats = tokio::select! {
                stats = dispatch_events(&mut readers, &pump_router, &gate) => stats,
                _ = stop_rx => DispatchStats::default(),
            };
            let _ = readers.shutdown().await;
            stats
        });

        Self {
            card,
            books,
            catalog: catalog_handle,
            cabinet,
            router,
            operations,
            stop,
            pump,
        }
    }

    /// Present the patron card and wait until it is accepted.
    pub async fn present_card(&self) {
        assert!(eventually(SETTLE, || self.card.is_open()).await);
        self.card.push_line(&format!("UID: {PATRON}"));
        assert!(eventually(SETTLE, || self.operations.patron().is_some()).await);
    }

    /// Put `tag` in front of book reader `index`.
    pub async fn present_book(&self, index: usize, tag: &str) {
        let reader = &self.books[index];
        assert!(eventually(SETTLE, || reader.is_open()).await);
        reader.push_line(tag);
    }

    /// Stop the pump and every reader.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.pump.await;
    }
}
