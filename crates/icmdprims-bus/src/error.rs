use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur on the SPI bus or its chip-select line.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The exchange did not complete within the configured timeout.
    #[error("bus exchange timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to open a bus or GPIO device node.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred during the exchange.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transmit and receive buffers must have the same length.
    #[error("tx/rx length mismatch (tx {tx} bytes, rx {rx} bytes)")]
    LengthMismatch { tx: usize, rx: usize },

    /// An exchange was attempted while chip-select was released.
    #[error("exchange attempted without chip-select asserted")]
    NotSelected,

    /// Driving the chip-select line failed.
    #[error("chip-select error: {0}")]
    Select(String),

    /// Injected or device-reported failure.
    #[error("bus fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
