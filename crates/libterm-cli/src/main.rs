//! `libterm`: run the kiosk reader pipeline from a config file.
//!
//! Readers feed the event gate, and the gate drives the book workflow
//! against a logging-only catalog and the configured cabinet.

mod catalog;
mod config;

use anyhow::Result;
use catalog::LoggingCatalog;
use clap::Parser;
use config::KioskConfig;
use libterm_core::SourceChannel;
use libterm_gate::{BookOperations, EventGate, EventRouter, KioskMode, dispatch_events};
use libterm_hardware::traits::{CabinetActuator, CardService, LineTransport, SerialPorts};
use libterm_hardware::{
    ContactlessDriver, NullActuator, ReaderManager, SerialActuator, SerialReader,
    SerialReaderConfig, resolve_detected,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the kiosk config file
    #[arg(long, short, default_value = "libterm.json")]
    config: PathBuf,

    /// Start in this mode instead of the configured one (idle, take, return)
    #[arg(long)]
    mode: Option<KioskMode>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,libterm=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(feature = "hardware-serial")]
fn serial_transport() -> Option<Arc<dyn LineTransport>> {
    Some(Arc::new(libterm_hardware::backend::serial::SerialLineTransport))
}

#[cfg(not(feature = "hardware-serial"))]
fn serial_transport() -> Option<Arc<dyn LineTransport>> {
    None
}

#[cfg(feature = "hardware-serial")]
fn serial_ports() -> Option<Arc<dyn SerialPorts>> {
    Some(Arc::new(libterm_hardware::backend::serial::SystemSerialPorts))
}

#[cfg(not(feature = "hardware-serial"))]
fn serial_ports() -> Option<Arc<dyn SerialPorts>> {
    None
}

#[cfg(feature = "hardware-pcsc")]
fn card_service() -> Option<Arc<dyn CardService>> {
    Some(Arc::new(libterm_hardware::backend::pcsc::PcscCardService))
}

#[cfg(not(feature = "hardware-pcsc"))]
fn card_service() -> Option<Arc<dyn CardService>> {
    None
}

#[cfg(feature = "hardware-serial")]
fn list_ports() {
    let ports = libterm_hardware::backend::serial::describe_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("VID_{vid:04X}&PID_{pid:04X}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<16} {:<22} {} {}",
            port.name,
            ids,
            port.manufacturer.as_deref().unwrap_or(""),
            port.product.as_deref().unwrap_or("")
        );
    }
}

#[cfg(not(feature = "hardware-serial"))]
fn list_ports() {
    println!("Built without serial support (feature `hardware-serial`)");
}

/// The cabinet actuator, or a logging stand-in if none is configured or
/// it cannot be started.
fn build_actuator(
    config: &KioskConfig,
    transport: Option<&Arc<dyn LineTransport>>,
) -> Arc<dyn CabinetActuator> {
    let Some(actuator_config) = &config.actuator else {
        info!("No cabinet configured, cabinet commands are logged only");
        return Arc::new(NullActuator);
    };
    let Some(transport) = transport else {
        warn!("Cabinet configured but serial support is not built in");
        return Arc::new(NullActuator);
    };

    let mut actuator = SerialActuator::new("cabinet", actuator_config, Arc::clone(transport));
    match actuator.start() {
        Ok(()) => Arc::new(actuator),
        Err(e) => {
            error!(error = %e, "Failed to start cabinet actuator");
            Arc::new(NullActuator)
        }
    }
}

/// The card reader to build, with a `detect` port replaced by the port
/// that talks. `None` if none is configured or detection found nothing.
///
/// Blocks while listening on the ports.
fn card_reader_config(
    card: Option<&SerialReaderConfig>,
    transport: &dyn LineTransport,
    ports: Option<&dyn SerialPorts>,
) -> Option<SerialReaderConfig> {
    let card = card?;
    if !card.line.port.is_detect() {
        return Some(card.clone());
    }
    let Some(ports) = ports else {
        warn!("Card reader port detection needs serial support");
        return None;
    };

    info!("Card reader port not configured, detecting");
    match resolve_detected(&card.line, transport, ports) {
        Some(line) => {
            info!(
                port = %line.port,
                baud = line.baud_rate,
                newline = ?line.newline,
                "Card reader detected"
            );
            Some(SerialReaderConfig {
                line,
                ..card.clone()
            })
        }
        None => {
            warn!("No card reader detected");
            None
        }
    }
}

fn build_manager(
    config: &KioskConfig,
    card_reader: Option<&SerialReaderConfig>,
    transport: Option<&Arc<dyn LineTransport>>,
) -> ReaderManager {
    let mut manager = ReaderManager::new(config.manager.clone());

    let serial_readers = usize::from(card_reader.is_some()) + config.book_readers.len();
    match transport {
        Some(transport) => {
            if let Some(card) = card_reader {
                manager.register(
                    SourceChannel::Card,
                    SerialReader::card_reader("card", card, Arc::clone(transport)).into(),
                );
            }
            for (i, book) in config.book_readers.iter().enumerate() {
                manager.register(
                    SourceChannel::Book,
                    SerialReader::book_reader(format!("book-{i}"), book, Arc::clone(transport))
                        .into(),
                );
            }
        }
        None if serial_readers > 0 => {
            warn!(
                readers = serial_readers,
                "Serial readers configured but serial support is not built in"
            );
        }
        None => {}
    }

    if let Some(contactless) = &config.contactless {
        match card_service() {
            Some(service) => manager.register(
                SourceChannel::Card,
                ContactlessDriver::new("contactless", contactless.clone(), service).into(),
            ),
            None => warn!("Contactless reader configured but PC/SC support is not built in"),
        }
    }

    manager
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if args.list_ports {
        list_ports();
        return Ok(());
    }

    let config = KioskConfig::load(&args.config)?;
    info!(
        config = %args.config.display(),
        readers = config.reader_count(),
        "Library terminal starting"
    );

    let transport = serial_transport();
    let actuator = build_actuator(&config, transport.as_ref());
    let card_reader = match transport.clone() {
        Some(line_transport) => {
            let card = config.card_reader.clone();
            tokio::task::spawn_blocking(move || {
                let ports = serial_ports();
                card_reader_config(card.as_ref(), line_transport.as_ref(), ports.as_deref())
            })
            .await?
        }
        None => config.card_reader.clone(),
    };
    let manager = build_manager(&config, card_reader.as_ref(), transport.as_ref());

    let operations = Arc::new(BookOperations::new(
        Arc::new(LoggingCatalog),
        actuator,
        config.operations.clone(),
    ));
    let mut gate = EventGate::new(config.gate.clone(), Handle::current());
    operations.register_actions(&mut gate);

    let router = EventRouter::new(args.mode.unwrap_or(config.mode));
    info!(mode = %router.mode(), "Kiosk mode");

    let mut readers = manager.start();
    for failure in readers.startup_failures() {
        error!(
            reader = %failure.reader,
            role = %failure.role,
            error = %failure.error,
            "Reader failed to start"
        );
    }
    if readers.running() == 0 {
        warn!("No readers running");
    }

    tokio::select! {
        stats = dispatch_events(&mut readers, &router, &gate) => {
            info!(?stats, "Reader events ended");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutting down");
        }
    }

    readers.shutdown().await?;
    info!("Stopped");
    Ok(())
}
