//! A PPP-over-serial link-layer stack for embedded devices.
//!
//! The crate carries IPv4 or IPv6 datagrams over a byte-oriented
//! asynchronous link, typically a cellular modem in data mode behind a
//! UART. Bottom up:
//!
//! - HDLC-like framing (RFC 1662): byte stuffing against the negotiated
//!   character map, FCS-16, flag detection, frame assembly into a
//!   lock-free ring ([`drivers::pppos`], [`hdlc`]).
//! - PPP encapsulation: protocol-field and address/control compression,
//!   MRU policing, dispatch by protocol number ([`netif`]).
//! - The RFC 1661 option negotiation automaton and its instantiations:
//!   LCP, IPCP, IPv6CP, plus PAP authentication and an internal echo
//!   monitor supervising link liveness.
//!
//! The embedder supplies the serial port, a monotonic clock with one-shot
//! timers and an upper layer for the decoded datagrams (see [`drivers`] and
//! [`netif::UpperLayer`]), then pumps the single-threaded event loop:
//!
//! ```ignore
//! static BUFFERS: PppBuffers = PppBuffers::new();
//!
//! let (mut iface, mut rx) = Interface::new(&BUFFERS, port, timers, upper, Config::default());
//! uart.on_byte(move |byte| rx.on_byte(byte)); // interrupt context
//! iface.set(Netopt::DialUp, Some(b"*99#"))?;
//! // ... once the modem reports data mode:
//! iface.carrier_up();
//! loop {
//! 	iface.poll();
//! 	// block on the mailbox / wfi
//! }
//! ```

#![no_std]
#![warn(rust_2018_idioms)]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate std;

mod collections;
pub mod config;
pub mod drivers;
mod hdlc;
mod io;
pub mod netif;
mod netopt;
mod ppp;

pub use crate::drivers::pppos::PpposRx;
pub use crate::drivers::{Clock, SerialPort, TimerDriver, TimerSlot};
pub use crate::io::{Error, Result};
pub use crate::netif::{
	Config, Interface, LinkAddresses, Mailbox, NcpMode, PppBuffers, Stats, UpperLayer,
};
pub use crate::netopt::{DEVICE_TYPE_PPPOS, Netopt};
pub use crate::ppp::dcp::DcpTunables;
pub use crate::ppp::fsm::{FsmTunables, State as FsmState};
pub use crate::ppp::pap::{PapState, PapTunables};
pub use crate::ppp::{Event, Message, Protocol, Target};
