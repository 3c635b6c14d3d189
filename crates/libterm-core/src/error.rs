use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid port selector: {0}")]
    InvalidPortSelector(String),

    #[error("Unknown baud rate: {0}")]
    UnknownBaudRate(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
