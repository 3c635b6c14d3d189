//! PC/SC card service through the `pcsc` crate.

use crate::traits::{CardContext, CardService, CardServiceError, CardSession};
use libterm_core::constants::UID_RESPONSE_CAPACITY;
use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode};
use std::ffi::CString;
use tracing::debug;

impl From<pcsc::Error> for CardServiceError {
    fn from(error: pcsc::Error) -> Self {
        match error {
            pcsc::Error::SharingViolation => Self::SharingViolation,
            pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard => Self::NoSmartcard,
            pcsc::Error::NoReadersAvailable => Self::NoReadersAvailable,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The system smart card service.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcscCardService;

impl CardService for PcscCardService {
    fn establish(&self) -> Result<Box<dyn CardContext>, CardServiceError> {
        let context = Context::establish(Scope::User)?;
        Ok(Box::new(PcscContext(context)))
    }
}

struct PcscContext(Context);

impl CardContext for PcscContext {
    fn list_readers(&self) -> Result<Vec<String>, CardServiceError> {
        let readers = self.0.list_readers_owned()?;
        Ok(readers
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardSession>, CardServiceError> {
        let name = CString::new(reader)
            .map_err(|_| CardServiceError::Other(format!("invalid reader name {reader:?}")))?;
        let card = self.0.connect(&name, ShareMode::Shared, Protocols::ANY)?;
        Ok(Box::new(PcscSession(Some(card))))
    }
}

/// Connected card, disconnected with "leave card" on drop.
struct PcscSession(Option<Card>);

impl CardSession for PcscSession {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardServiceError> {
        let card = self
            .0
            .as_ref()
            .ok_or_else(|| CardServiceError::Other("card disconnected".to_string()))?;
        let mut buffer = [0u8; UID_RESPONSE_CAPACITY];
        let response = card.transmit(apdu, &mut buffer)?;
        Ok(response.to_vec())
    }
}

impl Drop for PcscSession {
    fn drop(&mut self) {
        if let Some(card) = self.0.take()
            && let Err((_, e)) = card.disconnect(Disposition::LeaveCard)
        {
            debug!(error = %e, "Card disconnect failed");
        }
    }
}
