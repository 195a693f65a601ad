//! IPv4 Control Protocol, RFC 1332.
//!
//! Only the IP-Address option is negotiated. Requesting `0.0.0.0` asks the
//! peer to assign an address, which is what cellular networks expect.

use alloc::vec::Vec;

use core::net::Ipv4Addr;

use crate::drivers::TimerSlot;
use crate::ppp::fsm::{ConfEntry, FsmProtocol, OptFlags, opt_value};
use crate::ppp::opt::{self, Opt};
use crate::ppp::pkt::CodeSet;
use crate::ppp::{Ctx, Protocol, Target};

/// IP-Address configuration option.
const OPT_IP_ADDRESS: u8 = 3;

pub(crate) struct IpcpProto {
	conf: [ConfEntry; 1],
	/// Address assigned to this end of the link.
	pub local_addr: Ipv4Addr,
	/// Address of the peer.
	pub peer_addr: Ipv4Addr,
}

impl IpcpProto {
	pub fn new() -> Self {
		Self {
			conf: [ConfEntry::new(OPT_IP_ADDRESS, 4, OptFlags::ENABLED, 0)],
			local_addr: Ipv4Addr::UNSPECIFIED,
			peer_addr: Ipv4Addr::UNSPECIFIED,
		}
	}
}

impl FsmProtocol for IpcpProto {
	const PROTOCOL: Protocol = Protocol::Ipcp;
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
	const NAME: &'static str = "ipcp";

	fn conf(&self) -> &[ConfEntry] {
		&self.conf
	}

	fn conf_mut(&mut self) -> &mut [ConfEntry] {
		&mut self.conf
	}

	fn is_valid(&self, opt: &Opt<'_>) -> bool {
		// an all-zero address means "please assign one", answered by Nak
		opt.typ == OPT_IP_ADDRESS && opt.payload.len() == 4 && opt_value(opt.payload) != 0
	}

	fn build_nak(&self, typ: u8, buf: &mut Vec<u8>) {
		if typ == OPT_IP_ADDRESS {
			opt::push(buf, OPT_IP_ADDRESS, &self.peer_addr.octets());
		}
	}

	fn apply(&mut self, opt: &Opt<'_>, is_peer: bool, _ctx: &mut Ctx<'_>) {
		if opt.typ != OPT_IP_ADDRESS || opt.payload.len() != 4 {
			return;
		}
		let addr = Ipv4Addr::from(u32::from_be_bytes([
			opt.payload[0],
			opt.payload[1],
			opt.payload[2],
			opt.payload[3],
		]));
		if is_peer {
			self.peer_addr = addr;
		} else {
			info!("ipcp: obtained address {addr}");
			self.local_addr = addr;
		}
	}

	fn on_layer_down(&mut self, _ctx: &mut Ctx<'_>) {
		self.local_addr = Ipv4Addr::UNSPECIFIED;
		self.peer_addr = Ipv4Addr::UNSPECIFIED;
	}
}
