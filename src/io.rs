use core::result;

use thiserror::Error;

/// Errors surfaced by the stack.
///
/// Only misuse of the configuration API and transport failures reach the
/// caller. Losses on the link itself are recovered by the restart timers of
/// the negotiation automata and are therefore *not* represented here.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Operation on an interface whose transport is not up.
	#[error("no device")]
	NoDevice,
	/// Empty buffer, impossible option value or bad length.
	#[error("invalid argument")]
	InvalidArgument,
	/// Outbound payload exceeds the peer's advertised MRU.
	#[error("packet exceeds peer MRU")]
	TooLong,
	/// Length field disagrees with the buffer or an option overruns it.
	#[error("malformed packet")]
	BadPacket,
	/// Unknown option code in `set`/`get`.
	#[error("option not supported")]
	NotSupported,
	/// The transport refused bytes.
	#[error("transport error: {0:?}")]
	Io(embedded_io::ErrorKind),
}

impl embedded_io::Error for Error {
	fn kind(&self) -> embedded_io::ErrorKind {
		match self {
			Error::Io(kind) => *kind,
			Error::InvalidArgument => embedded_io::ErrorKind::InvalidInput,
			_ => embedded_io::ErrorKind::Other,
		}
	}
}

pub type Result<T> = result::Result<T, Error>;
