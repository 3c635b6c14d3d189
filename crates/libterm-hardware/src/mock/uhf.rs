//! Mock vendor UHF library.
//!
//! The mock hosts at most one reader, reachable on a single
//! port/baud/address combination. Opening with the reader's address or
//! the broadcast address `0xFF` succeeds and echoes the reader's own
//! address back, like the real device does.

use crate::traits::{UhfVendorApi, VendorCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Return code of a failed open.
pub const MOCK_OPEN_FAILED: VendorCode = 0x30;

/// A recorded vendor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorCall {
    OpenPort { port: u32, address: u8, baud_code: u8 },
    AutoOpenPort { address: u8, baud_code: u8 },
    SetActiveMode { address: u8, index: i32 },
    ClearTagBuffer { address: u8, index: i32 },
    CloseSpecificPort(u32),
    ClosePort,
}

#[derive(Debug, Clone, Copy)]
struct Reader {
    port: u32,
    baud_code: u8,
    address: u8,
    auto_detectable: bool,
}

#[derive(Debug)]
struct UhfState {
    reader: Option<Reader>,
    open_failure: VendorCode,
    active_mode_failure: Option<VendorCode>,
    calls: Vec<VendorCall>,
    reads: VecDeque<Vec<u8>>,
    read_count: usize,
}

type Shared = Arc<Mutex<UhfState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, UhfState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted vendor library.
#[derive(Debug, Clone)]
pub struct MockUhfVendor {
    shared: Shared,
}

/// Test-side control of a [`MockUhfVendor`].
#[derive(Debug, Clone)]
pub struct MockUhfHandle {
    shared: Shared,
}

impl MockUhfVendor {
    /// A library with no reader attached.
    pub fn new() -> (Self, MockUhfHandle) {
        let shared = Arc::new(Mutex::new(UhfState {
            reader: None,
            open_failure: MOCK_OPEN_FAILED,
            active_mode_failure: None,
            calls: Vec::new(),
            reads: VecDeque::new(),
            read_count: 0,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockUhfHandle { shared },
        )
    }

    fn index_for(port: u32) -> i32 {
        port as i32 + 1000
    }
}

fn answers(reader: &Reader, baud_code: u8, address: u8) -> bool {
    reader.baud_code == baud_code && (address == reader.address || address == 0xFF)
}

impl UhfVendorApi for MockUhfVendor {
    fn open_port(&self, port: u32, address: &mut u8, baud_code: u8) -> Result<i32, VendorCode> {
        let mut state = lock(&self.shared);
        state.calls.push(VendorCall::OpenPort {
            port,
            address: *address,
            baud_code,
        });

        match state.reader {
            Some(reader) if reader.port == port && answers(&reader, baud_code, *address) => {
                *address = reader.address;
                Ok(Self::index_for(port))
            }
            _ => Err(state.open_failure),
        }
    }

    fn auto_open_port(&self, address: &mut u8, baud_code: u8) -> Result<(u32, i32), VendorCode> {
        let mut state = lock(&self.shared);
        state.calls.push(VendorCall::AutoOpenPort {
            address: *address,
            baud_code,
        });

        match state.reader {
            Some(reader) if reader.auto_detectable && answers(&reader, baud_code, *address) => {
                *address = reader.address;
                Ok((reader.port, Self::index_for(reader.port)))
            }
            _ => Err(state.open_failure),
        }
    }

    fn set_active_mode(&self, address: &mut u8, index: i32) -> Result<(), VendorCode> {
        let mut state = lock(&self.shared);
        state.calls.push(VendorCall::SetActiveMode {
            address: *address,
            index,
        });
        state.active_mode_failure.map_or(Ok(()), Err)
    }

    fn clear_tag_buffer(&self, address: &mut u8, index: i32) -> Result<(), VendorCode> {
        lock(&self.shared).calls.push(VendorCall::ClearTagBuffer {
            address: *address,
            index,
        });
        Ok(())
    }

    fn read_active_mode_data(&self, buffer: &mut [u8], _index: i32) -> Result<usize, VendorCode> {
        let mut state = lock(&self.shared);
        state.read_count += 1;
        let Some(data) = state.reads.pop_front() else {
            return Ok(0);
        };
        let n = data.len().min(buffer.len());
        buffer[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn close_specific_port(&self, port: u32) -> Result<(), VendorCode> {
        lock(&self.shared)
            .calls
            .push(VendorCall::CloseSpecificPort(port));
        Ok(())
    }

    fn close_port(&self) -> Result<(), VendorCode> {
        lock(&self.shared).calls.push(VendorCall::ClosePort);
        Ok(())
    }
}

impl MockUhfHandle {
    /// Attach a reader answering on COM `port` at `baud_code` and `address`.
    pub fn attach_reader(&self, port: u32, baud_code: u8, address: u8) {
        lock(&self.shared).reader = Some(Reader {
            port,
            baud_code,
            address,
            auto_detectable: false,
        });
    }

    /// Attach a reader only the vendor's auto-detect finds.
    pub fn attach_hidden_reader(&self, port: u32, baud_code: u8, address: u8) {
        lock(&self.shared).reader = Some(Reader {
            port,
            baud_code,
            address,
            auto_detectable: true,
        });
    }

    pub fn set_open_failure(&self, code: VendorCode) {
        lock(&self.shared).open_failure = code;
    }

    pub fn fail_active_mode(&self, code: VendorCode) {
        lock(&self.shared).active_mode_failure = Some(code);
    }

    /// Queue one buffer returned by the next active-mode read.
    pub fn push_read(&self, data: Vec<u8>) {
        lock(&self.shared).reads.push_back(data);
    }

    pub fn calls(&self) -> Vec<VendorCall> {
        lock(&self.shared).calls.clone()
    }

    /// Only the open attempts, direct and auto.
    pub fn open_calls(&self) -> Vec<VendorCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    VendorCall::OpenPort { .. } | VendorCall::AutoOpenPort { .. }
                )
            })
            .collect()
    }

    pub fn read_count(&self) -> usize {
        lock(&self.shared).read_count
    }
}
