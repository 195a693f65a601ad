//! IPv6 Control Protocol, RFC 5072.
//!
//! The only negotiated option is the 64-bit Interface-Identifier; combined
//! with `fe80::/10` it yields the link-local addresses of both ends.

use alloc::vec::Vec;

use core::net::Ipv6Addr;

use crate::drivers::TimerSlot;
use crate::ppp::fsm::{ConfEntry, FsmProtocol, OptFlags, opt_value};
use crate::ppp::opt::Opt;
use crate::ppp::pkt::CodeSet;
use crate::ppp::{Ctx, Protocol, Target};

/// Interface-Identifier configuration option.
const OPT_IFACE_ID: u8 = 1;

/// Combines an interface identifier with the link-local prefix.
pub(crate) fn link_local(ifid: [u8; 8]) -> Ipv6Addr {
	let mut octets = [0u8; 16];
	octets[0] = 0xfe;
	octets[1] = 0x80;
	octets[8..].copy_from_slice(&ifid);
	Ipv6Addr::from(octets)
}

pub(crate) struct Ipv6cpProto {
	conf: [ConfEntry; 1],
	pub local_ifid: [u8; 8],
	pub peer_ifid: [u8; 8],
}

impl Ipv6cpProto {
	pub fn new(ifid: [u8; 8]) -> Self {
		Self {
			conf: [ConfEntry::new(
				OPT_IFACE_ID,
				8,
				OptFlags::ENABLED,
				u64::from_be_bytes(ifid),
			)],
			local_ifid: [0; 8],
			peer_ifid: [0; 8],
		}
	}
}

impl FsmProtocol for Ipv6cpProto {
	const PROTOCOL: Protocol = Protocol::Ipv6cp;
	const TARGET: Target = Target::Ncp;
	const UPPER: Option<Target> = Some(Target::Ip);
	const LOWER: Option<Target> = Some(Target::Lcp);
	const SUPPORTED: CodeSet = CodeSet::CONF_REQ
		.union(CodeSet::CONF_ACK)
		.union(CodeSet::CONF_NAK)
		.union(CodeSet::CONF_REJ)
		.union(CodeSet::TERM_REQ)
		.union(CodeSet::TERM_ACK)
		.union(CodeSet::CODE_REJ);
	const TIMER_SLOT: TimerSlot = TimerSlot::Ncp;
	const NAME: &'static str = "ipv6cp";

	fn conf(&self) -> &[ConfEntry] {
		&self.conf
	}

	fn conf_mut(&mut self) -> &mut [ConfEntry] {
		&mut self.conf
	}

	fn is_valid(&self, opt: &Opt<'_>) -> bool {
		opt.typ == OPT_IFACE_ID && opt.payload.len() == 8
	}

	fn build_nak(&self, _typ: u8, _buf: &mut Vec<u8>) {
		// we have no better identifier to suggest
	}

	fn apply(&mut self, opt: &Opt<'_>, is_peer: bool, _ctx: &mut Ctx<'_>) {
		if opt.typ != OPT_IFACE_ID || opt.payload.len() != 8 {
			return;
		}
		let ifid = opt_value(opt.payload).to_be_bytes();
		if is_peer {
			self.peer_ifid = ifid;
		} else {
			info!("ipv6cp: link-local address {}", link_local(ifid));
			self.local_ifid = ifid;
		}
	}

	fn on_layer_down(&mut self, _ctx: &mut Ctx<'_>) {
		self.local_ifid = [0; 8];
		self.peer_ifid = [0; 8];
	}
}
