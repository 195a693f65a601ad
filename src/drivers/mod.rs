//! Collaborator traits of the stack: the byte transport, the monotonic
//! clock and the one-shot timer service.
//!
//! The stack never owns hardware. The embedder supplies a [`SerialPort`]
//! wired to the UART (or to an AT modem in data mode), implements
//! [`TimerDriver`] on top of the platform timer facility, and pumps fired
//! timer messages back into the interface mailbox.

pub mod pppos;

use crate::ppp::Message;

/// A full-duplex byte transport.
///
/// Writes are blocking; reception is interrupt driven and reaches the stack
/// through [`PpposRx::on_byte`](pppos::PpposRx::on_byte), which the embedder
/// calls from the UART receive interrupt.
pub trait SerialPort: embedded_io::Write {
	/// Drops the data carrier and closes the device.
	fn close(&mut self);

	/// Reopens the device, e.g. after a dial-up transition.
	fn reopen(&mut self, baudrate: u32) -> Result<(), Self::Error>;
}

/// Monotonic microsecond clock.
pub trait Clock {
	fn now_us(&self) -> u64;
}

/// One-shot timer service.
///
/// Arming a slot replaces any earlier arming of the same slot. When a timer
/// expires the embedder posts the stored message into the interface mailbox;
/// the worker then handles it like any other event.
pub trait TimerDriver: Clock {
	fn arm(&mut self, slot: TimerSlot, delta_us: u64, msg: Message);
	fn cancel(&mut self, slot: TimerSlot);
}

/// Timer slots owned by the stack, one per timed component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
	/// LCP restart timer.
	Lcp,
	/// NCP (IPCP or IPv6CP) restart timer.
	Ncp,
	/// Authentication retry timer.
	Auth,
	/// Echo monitor period.
	Monitor,
}

pub mod error {
	use core::fmt;

	use crate::io::Error;

	/// Driver-level failures, passed on to higher layers.
	#[derive(Debug)]
	pub enum DriverError {
		InitSerialFail(embedded_io::ErrorKind),
		InitPppFail(Error),
	}

	impl From<Error> for DriverError {
		fn from(err: Error) -> Self {
			DriverError::InitPppFail(err)
		}
	}

	impl fmt::Display for DriverError {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			match self {
				DriverError::InitSerialFail(err) => {
					write!(f, "serial port failed: {err:?}")
				}
				DriverError::InitPppFail(err) => {
					write!(f, "ppp driver failed: {err:?}")
				}
			}
		}
	}
}
