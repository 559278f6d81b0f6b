/// Error types returned from the crate. All fallible public APIs return an `AntError`.
use rusb::Error as UsbError;
use thiserror::Error;

/// Frame codec failures. These are always recovered locally by [`crate::frame::scan_stream`] —
/// malformed bytes are skipped up to the next sync byte and never surface to a caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("frame shorter than the minimum 5 bytes")]
    ShortFrame,
    #[error("first byte is not the sync byte 0xA4")]
    BadSync,
    #[error("length byte does not match the buffer length")]
    LenMismatch,
    #[error("checksum byte does not match the computed XOR")]
    BadCrc,
}

/// Transport-level failures. Fatal to the session; surfaced from `open`/`reset`/`close`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no matching ANT+ USB device found")]
    NotFound,
    #[error("usb i/o failed: {0}")]
    IoFailed(#[from] UsbError),
    #[error("transport is closed")]
    Closed,
}

/// Channel state machine failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("channel is not in the Idle state")]
    WrongState,
}

#[derive(Error, Debug)]
pub enum AntError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("timed out waiting for channel to open")]
    Timeout,
}
