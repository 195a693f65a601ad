//! PPP encapsulation and the control-protocol family, see RFC 1661.
//!
//! The modules below follow the layering of the stack: [`opt`] and [`pkt`]
//! cover the wire format of control packets, [`fsm`] implements the option
//! negotiation automaton, and the per-protocol modules instantiate it (or,
//! for PAP and the driver supervisor, implement their own small automata).

pub mod dcp;
pub mod fsm;
pub mod ipcp;
pub mod ipv6cp;
pub mod lcp;
pub mod opt;
pub mod pap;
pub mod pkt;

use alloc::collections::vec_deque::VecDeque;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::drivers::TimerDriver;
use crate::hdlc;
use crate::io::{Error, Result};
use crate::netif::{SharedState, UpperLayer};

/// Assigned PPP protocol numbers handled by this stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Protocol {
	/// Internet Protocol version 4
	Ipv4 = 0x0021,
	/// Internet Protocol version 6
	Ipv6 = 0x0057,
	/// IPv4 Control Protocol, RFC 1332
	Ipcp = 0x8021,
	/// IPv6 Control Protocol, RFC 5072
	Ipv6cp = 0x8057,
	/// Link Control Protocol, RFC 1661
	Lcp = 0xc021,
	/// Password Authentication Protocol, RFC 1334
	Pap = 0xc023,
}

/// Per-protocol coarse state, used to gate the demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
	#[default]
	Down,
	Starting,
	Up,
}

/// Dispatch targets inside one interface.
///
/// The protocols form a chain (DCP below LCP, LCP below the authenticator,
/// the authenticator below the NCP, the NCP below the IP encapsulator) and
/// talk to each other exclusively by posting [`Message`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
	Dcp,
	Lcp,
	Auth,
	Ncp,
	Ip,
}

/// Events exchanged between the protocols of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
	/// Administrative open.
	Open,
	/// Administrative close.
	Close,
	/// The layer below came up.
	LinkUp,
	/// The layer below went down.
	LinkDown,
	/// The restart (or retry) timer fired.
	Timeout,
	/// The layer above started.
	UlStarted,
	/// The layer above finished.
	UlFinished,
	/// Echo monitor tick.
	Monitor,
	/// An echo round-trip proved the link alive.
	LinkAlive,
	/// LCP negotiated PAP for the local side.
	AuthLocalPap,
}

/// A queued unit of work for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
	/// At least one complete frame was committed to the receive ring.
	RxFrame,
	/// A protocol event for `target`.
	Protocol { target: Target, event: Event },
}

/// Negotiated link-layer parameters pushed down from LCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkTuning {
	AccmTx(u32),
	PeerMru(u16),
	LocalMru(u16),
	/// Peer accepts a compressed protocol field.
	PfcTx(bool),
	/// Peer accepts omitted address/control fields.
	AcfcTx(bool),
}

/// Outbound packet sink of the control protocols: encapsulates and frames a
/// control packet, and absorbs negotiated link tuning.
pub(crate) trait PacketSink {
	fn send_control(&mut self, proto: Protocol, code: u8, id: u8, payload: &[u8]) -> Result<()>;
	fn tune(&mut self, tuning: LinkTuning);
}

/// Requests a protocol cannot perform itself; the interface applies them
/// once the current dispatch completes.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PendingCtl {
	/// Drop the data carrier (close the transport).
	pub carrier_down: bool,
	/// Report LINK_UP to the host.
	pub link_up: bool,
	/// Report LINK_DOWN to the host.
	pub link_down: bool,
}

/// Borrowed context handed into every protocol dispatch.
pub(crate) struct Ctx<'a> {
	pub link: &'a mut dyn PacketSink,
	pub timers: &'a mut dyn TimerDriver,
	pub shared: &'a SharedState,
	pub upper: &'a mut dyn UpperLayer,
	pub queue: &'a mut VecDeque<Message>,
	pub ctl: &'a mut PendingCtl,
}

impl Ctx<'_> {
	/// Posts an event to another protocol of the same interface. Events are
	/// handled in order once the current dispatch returns.
	pub fn post(&mut self, target: Target, event: Event) {
		self.queue.push_back(Message::Protocol { target, event });
	}
}

/// Result of stripping the HDLC address/control fields and the PPP protocol
/// field from a deframed payload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Demux<'a> {
	pub protocol: u16,
	pub info: &'a [u8],
}

/// Parses the layer-2 header of a deframed payload.
///
/// The address/control pair is optional (ACFC); when the address byte is
/// present the pair must be exactly `ff 03`. The protocol field is one byte
/// when its first byte is odd (PFC), two bytes otherwise.
pub(crate) fn demux(payload: &[u8]) -> Result<Demux<'_>> {
	let payload = match payload {
		[hdlc::ADDRESS, hdlc::CONTROL, rest @ ..] => rest,
		[hdlc::ADDRESS, ..] => return Err(Error::BadPacket),
		_ => payload,
	};
	match payload {
		[first, rest @ ..] if first & 1 != 0 => Ok(Demux {
			protocol: *first as u16,
			info: rest,
		}),
		[hi, lo, rest @ ..] => Ok(Demux {
			protocol: u16::from_be_bytes([*hi, *lo]),
			info: rest,
		}),
		_ => Err(Error::BadPacket),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn demux_full_header() {
		let d = demux(&[0xff, 0x03, 0xc0, 0x21, 0x01, 0x01, 0x00, 0x04]).unwrap();
		assert_eq!(d.protocol, 0xc021);
		assert_eq!(d.info, &[0x01, 0x01, 0x00, 0x04]);
	}

	#[test]
	fn demux_acfc_omitted() {
		let d = demux(&[0x80, 0x21, 0x01, 0x01, 0x00, 0x04]).unwrap();
		assert_eq!(d.protocol, 0x8021);
	}

	#[test]
	fn demux_compressed_protocol() {
		// after PFC negotiation an IPv4 datagram carries a one-byte 0x21
		let d = demux(&[0xff, 0x03, 0x21, 0x45, 0x00]).unwrap();
		assert_eq!(d.protocol, 0x0021);
		assert_eq!(d.info, &[0x45, 0x00]);
	}

	#[test]
	fn demux_rejects_bad_control() {
		assert_eq!(demux(&[0xff, 0x7f, 0x21, 0x00]), Err(Error::BadPacket));
		assert!(demux(&[]).is_err());
	}
}
