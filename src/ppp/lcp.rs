//! Link Control Protocol, RFC 1661 sections 5 and 6.
//!
//! LCP owns the link-wide negotiation (MRU, ACCM, authentication, header
//! compression) and doubles as the sender of Protocol-Rejects and of the
//! echo traffic the driver supervisor uses to monitor the link.

use alloc::vec::Vec;

use core::sync::atomic::Ordering;

use crate::config;
use crate::drivers::TimerSlot;
use crate::io::Result;
use crate::ppp::fsm::{ConfEntry, Fsm, FsmProtocol, FsmTunables, OptFlags, opt_value};
use crate::ppp::opt::{self, Opt};
use crate::ppp::pkt::{Code, CodeSet};
use crate::ppp::{Ctx, Event, LinkTuning, Protocol, Target};

/// LCP configuration option types.
const OPT_MRU: u8 = 1;
const OPT_ACCM: u8 = 2;
const OPT_AUTH: u8 = 3;
const OPT_PFC: u8 = 7;
const OPT_ACFC: u8 = 8;

/// The protocol-specific half of the LCP automaton.
pub(crate) struct LcpProto {
	conf: [ConfEntry; 5],
	/// The peer demanded we authenticate ourselves with PAP.
	pub auth_local: bool,
	/// The peer agreed to authenticate itself with PAP.
	pub auth_remote: bool,
}

impl LcpProto {
	fn new() -> Self {
		Self {
			conf: [
				ConfEntry::new(OPT_MRU, 2, OptFlags::empty(), config::DEFAULT_MRU as u64),
				ConfEntry::new(OPT_ACCM, 4, OptFlags::empty(), config::DEFAULT_ACCM as u64),
				ConfEntry::new(OPT_AUTH, 2, OptFlags::empty(), Protocol::Pap as u16 as u64),
				ConfEntry::new(OPT_PFC, 0, OptFlags::empty(), 0),
				ConfEntry::new(OPT_ACFC, 0, OptFlags::empty(), 0),
			],
			auth_local: false,
			auth_remote: false,
		}
	}
}

impl FsmProtocol for LcpProto {
	const PROTOCOL: Protocol = Protocol::Lcp;
	const TARGET: Target = Target::Lcp;
	const UPPER: Option<Target> = Some(Target::Auth);
	const LOWER: Option<Target> = Some(Target::Dcp);
	const SUPPORTED: CodeSet = CodeSet::CONF_REQ
		.union(CodeSet::CONF_ACK)
		.union(CodeSet::CONF_NAK)
		.union(CodeSet::CONF_REJ)
		.union(CodeSet::TERM_REQ)
		.union(CodeSet::TERM_ACK)
		.union(CodeSet::CODE_REJ)
		.union(CodeSet::ECHO_REQ)
		.union(CodeSet::ECHO_REP)
		.union(CodeSet::DISC_REQ);
	const TIMER_SLOT: TimerSlot = TimerSlot::Lcp;
	const NAME: &'static str = "lcp";

	fn conf(&self) -> &[ConfEntry] {
		&self.conf
	}

	fn conf_mut(&mut self) -> &mut [ConfEntry] {
		&mut self.conf
	}

	fn is_valid(&self, opt: &Opt<'_>) -> bool {
		match opt.typ {
			OPT_MRU => {
				opt.payload.len() == 2 && opt_value(opt.payload) <= config::MAX_MRU as u64
			}
			// any character map is fine
			OPT_ACCM => opt.payload.len() == 4,
			// only PAP is implemented
			OPT_AUTH => {
				opt.payload.len() == 2 && opt_value(opt.payload) == Protocol::Pap as u16 as u64
			}
			OPT_PFC | OPT_ACFC => opt.payload.is_empty(),
			_ => false,
		}
	}

	fn build_nak(&self, typ: u8, buf: &mut Vec<u8>) {
		match typ {
			OPT_MRU => opt::push(buf, OPT_MRU, &config::DEFAULT_MRU.to_be_bytes()),
			OPT_AUTH => opt::push(buf, OPT_AUTH, &(Protocol::Pap as u16).to_be_bytes()),
			_ => {}
		}
	}

	fn apply(&mut self, opt: &Opt<'_>, is_peer: bool, ctx: &mut Ctx<'_>) {
		let value = opt_value(opt.payload);
		match opt.typ {
			OPT_MRU => {
				let tuning = if is_peer {
					LinkTuning::PeerMru(value as u16)
				} else {
					LinkTuning::LocalMru(value as u16)
				};
				ctx.link.tune(tuning);
			}
			OPT_ACCM => {
				if is_peer {
					// the peer told us which characters it needs escaped
					ctx.link.tune(LinkTuning::AccmTx(value as u32));
				} else {
					// the peer agreed to escape what we asked for
					ctx.shared.accm_rx.store(value as u32, Ordering::Relaxed);
				}
			}
			OPT_AUTH => {
				if is_peer {
					self.auth_local = true;
					ctx.post(Target::Auth, Event::AuthLocalPap);
				} else {
					self.auth_remote = true;
				}
			}
			OPT_PFC => {
				if is_peer {
					ctx.link.tune(LinkTuning::PfcTx(true));
				}
			}
			OPT_ACFC => {
				if is_peer {
					ctx.link.tune(LinkTuning::AcfcTx(true));
				}
			}
			_ => {}
		}
	}

	fn on_layer_down(&mut self, ctx: &mut Ctx<'_>) {
		// negotiated link parameters die with the layer
		self.auth_local = false;
		self.auth_remote = false;
		ctx.link.tune(LinkTuning::PeerMru(config::DEFAULT_MRU));
		ctx.link.tune(LinkTuning::LocalMru(config::DEFAULT_MRU));
		ctx.link.tune(LinkTuning::AccmTx(config::DEFAULT_ACCM));
		ctx.link.tune(LinkTuning::PfcTx(false));
		ctx.link.tune(LinkTuning::AcfcTx(false));
		ctx.shared
			.accm_rx
			.store(config::DEFAULT_ACCM, Ordering::Relaxed);
	}
}

/// The LCP instance of one interface.
pub(crate) struct Lcp {
	pub fsm: Fsm<LcpProto>,
	/// Identifier sequence of monitor Echo-Requests.
	monitor_id: u8,
	/// Identifier sequence of Protocol-Rejects.
	pr_id: u8,
}

impl Lcp {
	pub fn new(tunables: FsmTunables) -> Self {
		Self {
			fsm: Fsm::new(LcpProto::new(), tunables),
			monitor_id: 0,
			pr_id: 0,
		}
	}

	pub fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match event {
			Event::Monitor => self.send_echo_request(ctx),
			// a finished upper layer takes the whole link down
			Event::UlFinished => ctx.post(Target::Dcp, Event::UlFinished),
			_ => self.fsm.handle(event, ctx),
		}
	}

	pub fn receive(&mut self, info: &[u8], ctx: &mut Ctx<'_>) -> Result<()> {
		self.fsm.receive(info, ctx)
	}

	/// Emits the monitor Echo-Request, RFC 1661 section 5.8. The magic
	/// number option is not negotiated, so the field is zero.
	fn send_echo_request(&mut self, ctx: &mut Ctx<'_>) {
		if self.fsm.state() != super::fsm::State::Opened {
			return;
		}
		self.monitor_id = self.monitor_id.wrapping_add(1);
		let _ = ctx.link.send_control(
			Protocol::Lcp,
			Code::EchoRequest.into(),
			self.monitor_id,
			&[0, 0, 0, 0],
		);
	}

	/// Wraps a packet of an unknown protocol in a Protocol-Reject,
	/// RFC 1661 section 5.7. Only sent while the link is opened.
	pub fn send_protocol_reject(&mut self, protocol: u16, info: &[u8], ctx: &mut Ctx<'_>) {
		if self.fsm.state() != super::fsm::State::Opened {
			return;
		}
		self.pr_id = self.pr_id.wrapping_add(1);
		let mut data = Vec::with_capacity(2 + info.len());
		data.extend_from_slice(&protocol.to_be_bytes());
		data.extend_from_slice(info);
		let _ = ctx
			.link
			.send_control(Protocol::Lcp, Code::ProtocolReject.into(), self.pr_id, &data);
	}
}
