//! The Option Negotiation Automaton of RFC 1661 section 4.
//!
//! The transition table is encoded in full: ten states, sixteen events, and
//! the action sets of section 4.1. Events that are undefined for the
//! current state are silently ignored, which is what keeps the restricted
//! automaton safe against stray packets.

use alloc::vec::Vec;

use crate::drivers::TimerSlot;
use crate::io::{Error, Result};
use crate::ppp::opt::{self, Opt};
use crate::ppp::pkt::{Code, CodeSet, ControlPkt};
use crate::ppp::{Ctx, Event, Message, Protocol, ProtocolState, Target};

/// Automaton states, RFC 1661 section 4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
	Initial = 0,
	Starting,
	Closed,
	Stopped,
	Closing,
	Stopping,
	ReqSent,
	AckRcvd,
	AckSent,
	Opened,
}

/// Automaton events, RFC 1661 section 4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsmEvent {
	Up,
	Down,
	Open,
	Close,
	/// Timeout with restart counter > 0.
	TimeoutP,
	/// Timeout with restart counter exhausted.
	TimeoutM,
	/// Good Configure-Request received.
	RcrP,
	/// Bad Configure-Request received.
	RcrM,
	Rca,
	Rcn,
	Rtr,
	Rta,
	Ruc,
	/// Permitted Code-Reject or Protocol-Reject.
	RxjP,
	/// Catastrophic Code-Reject or Protocol-Reject.
	RxjM,
	Rxr,
}

bitflags! {
	/// Action set attached to one transition, RFC 1661 section 4.4.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub(crate) struct Actions: u16 {
		const TLU = 1 << 0;
		const TLD = 1 << 1;
		const TLS = 1 << 2;
		const TLF = 1 << 3;
		const IRC = 1 << 4;
		const ZRC = 1 << 5;
		const SCR = 1 << 6;
		const SCA = 1 << 7;
		const SCN = 1 << 8;
		const STR = 1 << 9;
		const STA = 1 << 10;
		const SCJ = 1 << 11;
		const SER = 1 << 12;
	}
}

/// The transition table of RFC 1661 section 4.1, one row per event.
///
/// `None` marks a (state, event) pair for which the automaton does nothing,
/// covering both the table's empty cells and the cannot-occur cells.
#[rustfmt::skip]
fn transition(state: State, event: FsmEvent) -> Option<(Actions, State)> {
	use FsmEvent::*;
	use State::*;

	const NONE: Actions = Actions::empty();
	let t = |actions, next| Some((actions, next));

	match (event, state) {
		(Up, Initial) => t(NONE, Closed),
		(Up, Starting) => t(Actions::IRC | Actions::SCR, ReqSent),
		(Up, _) => None,

		(Down, Closed) => t(NONE, Initial),
		(Down, Stopped) => t(Actions::TLS, Starting),
		(Down, Closing) => t(NONE, Initial),
		(Down, Stopping | ReqSent | AckRcvd | AckSent) => t(NONE, Starting),
		(Down, Opened) => t(Actions::TLD, Starting),
		(Down, _) => None,

		(Open, Initial) => t(Actions::TLS, Starting),
		(Open, Starting) => t(NONE, Starting),
		(Open, Closed) => t(Actions::IRC | Actions::SCR, ReqSent),
		(Open, Stopped) => t(NONE, Stopped),
		(Open, Closing) => t(NONE, Stopping),
		(Open, Stopping) => t(NONE, Stopping),
		(Open, ReqSent) => t(NONE, ReqSent),
		(Open, AckRcvd) => t(NONE, AckRcvd),
		(Open, AckSent) => t(NONE, AckSent),
		(Open, Opened) => t(NONE, Opened),

		(Close, Initial) => t(NONE, Initial),
		(Close, Starting) => t(Actions::TLF, Initial),
		(Close, Closed) => t(NONE, Closed),
		(Close, Stopped) => t(NONE, Closed),
		(Close, Closing) => t(NONE, Closing),
		(Close, Stopping) => t(NONE, Closing),
		(Close, ReqSent | AckRcvd | AckSent) => t(Actions::IRC | Actions::STR, Closing),
		(Close, Opened) => t(Actions::TLD | Actions::IRC | Actions::STR, Closing),

		(TimeoutP, Closing) => t(Actions::STR, Closing),
		(TimeoutP, Stopping) => t(Actions::STR, Stopping),
		(TimeoutP, ReqSent) => t(Actions::SCR, ReqSent),
		(TimeoutP, AckRcvd) => t(Actions::SCR, ReqSent),
		(TimeoutP, AckSent) => t(Actions::SCR, AckSent),
		(TimeoutP, _) => None,

		(TimeoutM, Closing) => t(Actions::TLF, Closed),
		(TimeoutM, Stopping) => t(Actions::TLF, Stopped),
		(TimeoutM, ReqSent | AckRcvd | AckSent) => t(Actions::TLF, Stopped),
		(TimeoutM, _) => None,

		(RcrP, Closed) => t(Actions::STA, Closed),
		(RcrP, Stopped) => t(Actions::IRC | Actions::SCR | Actions::SCA, AckSent),
		(RcrP, Closing) => t(NONE, Closing),
		(RcrP, Stopping) => t(NONE, Stopping),
		(RcrP, ReqSent) => t(Actions::SCA, AckSent),
		(RcrP, AckRcvd) => t(Actions::SCA | Actions::TLU, Opened),
		(RcrP, AckSent) => t(Actions::SCA, AckSent),
		(RcrP, Opened) => t(Actions::TLD | Actions::SCR | Actions::SCA, AckSent),
		(RcrP, _) => None,

		(RcrM, Closed) => t(Actions::STA, Closed),
		(RcrM, Stopped) => t(Actions::IRC | Actions::SCR | Actions::SCN, ReqSent),
		(RcrM, Closing) => t(NONE, Closing),
		(RcrM, Stopping) => t(NONE, Stopping),
		(RcrM, ReqSent) => t(Actions::SCN, ReqSent),
		(RcrM, AckRcvd) => t(Actions::SCN, AckRcvd),
		(RcrM, AckSent) => t(Actions::SCN, AckSent),
		(RcrM, Opened) => t(Actions::TLD | Actions::SCR | Actions::SCN, ReqSent),
		(RcrM, _) => None,

		(Rca, Closed) => t(Actions::STA, Closed),
		(Rca, Stopped) => t(Actions::STA, Stopped),
		(Rca, Closing) => t(NONE, Closing),
		(Rca, Stopping) => t(NONE, Stopping),
		(Rca, ReqSent) => t(Actions::IRC, AckRcvd),
		(Rca, AckRcvd) => t(Actions::SCR, ReqSent),
		(Rca, AckSent) => t(Actions::IRC | Actions::TLU, Opened),
		(Rca, Opened) => t(Actions::TLD | Actions::SCR, ReqSent),
		(Rca, _) => None,

		(Rcn, Closed) => t(Actions::STA, Closed),
		(Rcn, Stopped) => t(Actions::STA, Stopped),
		(Rcn, Closing) => t(NONE, Closing),
		(Rcn, Stopping) => t(NONE, Stopping),
		(Rcn, ReqSent) => t(Actions::IRC | Actions::SCR, ReqSent),
		(Rcn, AckRcvd) => t(Actions::SCR, ReqSent),
		(Rcn, AckSent) => t(Actions::IRC | Actions::SCR, AckSent),
		(Rcn, Opened) => t(Actions::TLD | Actions::SCR, ReqSent),
		(Rcn, _) => None,

		(Rtr, Closed) => t(Actions::STA, Closed),
		(Rtr, Stopped) => t(Actions::STA, Stopped),
		(Rtr, Closing) => t(Actions::STA, Closing),
		(Rtr, Stopping) => t(Actions::STA, Stopping),
		(Rtr, ReqSent | AckRcvd | AckSent) => t(Actions::STA, ReqSent),
		(Rtr, Opened) => t(Actions::TLD | Actions::ZRC | Actions::STA, Stopping),
		(Rtr, _) => None,

		(Rta, Closed) => t(NONE, Closed),
		(Rta, Stopped) => t(NONE, Stopped),
		(Rta, Closing) => t(Actions::TLF, Closed),
		(Rta, Stopping) => t(Actions::TLF, Stopped),
		(Rta, ReqSent) => t(NONE, ReqSent),
		(Rta, AckRcvd) => t(NONE, ReqSent),
		(Rta, AckSent) => t(NONE, AckSent),
		(Rta, Opened) => t(Actions::TLD | Actions::SCR, ReqSent),
		(Rta, _) => None,

		(Ruc, Initial | Starting) => None,
		(Ruc, s) => t(Actions::SCJ, s),

		(RxjP, Closed | Stopped | Closing | Stopping | Opened) => t(NONE, state),
		(RxjP, ReqSent | AckRcvd) => t(NONE, ReqSent),
		(RxjP, AckSent) => t(NONE, AckSent),
		(RxjP, _) => None,

		(RxjM, Closed) => t(Actions::TLF, Closed),
		(RxjM, Stopped) => t(Actions::TLF, Stopped),
		(RxjM, Closing) => t(Actions::TLF, Closed),
		(RxjM, Stopping) => t(Actions::TLF, Stopped),
		(RxjM, ReqSent | AckRcvd | AckSent) => t(Actions::TLF, Stopped),
		(RxjM, Opened) => t(Actions::TLD | Actions::IRC | Actions::STR, Stopping),
		(RxjM, _) => None,

		(Rxr, Opened) => t(Actions::SER, Opened),
		(Rxr, Initial | Starting) => None,
		(Rxr, s) => t(NONE, s),
	}
}

bitflags! {
	/// Per-option negotiation flags.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub(crate) struct OptFlags: u8 {
		/// The option is included in our Configure-Requests.
		const ENABLED = 1 << 0;
		/// The peer's Configure-Request must carry the option.
		const REQUIRED = 1 << 1;
	}
}

/// One row of a protocol's option table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConfEntry {
	pub typ: u8,
	/// Payload size in bytes (without the TLV header), at most 8.
	pub size: u8,
	pub flags: OptFlags,
	pub default_flags: OptFlags,
	/// Current value, low `size` bytes in network order.
	pub value: u64,
	pub default_value: u64,
}

impl ConfEntry {
	pub const fn new(typ: u8, size: u8, flags: OptFlags, default_value: u64) -> Self {
		Self {
			typ,
			size,
			flags,
			default_flags: flags,
			value: default_value,
			default_value,
		}
	}

	/// The low `size` bytes of the current value, network order.
	pub fn payload(&self) -> ([u8; 8], usize) {
		let bytes = self.value.to_be_bytes();
		let n = self.size as usize;
		let mut out = [0u8; 8];
		out[..n].copy_from_slice(&bytes[8 - n..]);
		(out, n)
	}

	pub fn reset(&mut self) {
		self.value = self.default_value;
		self.flags = self.default_flags;
	}
}

/// Folds an option payload of up to eight bytes into a value.
pub(crate) fn opt_value(payload: &[u8]) -> u64 {
	payload
		.iter()
		.fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
}

/// Protocol-specific half of an automaton instance: the option table and
/// the three capability hooks of every negotiable option, plus the layer
/// transition hooks.
pub(crate) trait FsmProtocol {
	const PROTOCOL: Protocol;
	const TARGET: Target;
	const UPPER: Option<Target>;
	const LOWER: Option<Target>;
	const SUPPORTED: CodeSet;
	const TIMER_SLOT: TimerSlot;
	const NAME: &'static str;

	fn conf(&self) -> &[ConfEntry];
	fn conf_mut(&mut self) -> &mut [ConfEntry];

	/// Whether the value carried by a *known* option is acceptable.
	fn is_valid(&self, opt: &Opt<'_>) -> bool;

	/// Appends the Nak suggestion for an invalid option.
	fn build_nak(&self, typ: u8, buf: &mut Vec<u8>);

	/// Installs an accepted option; `is_peer` is true when the option came
	/// out of the peer's Configure-Request.
	fn apply(&mut self, opt: &Opt<'_>, is_peer: bool, ctx: &mut Ctx<'_>);

	fn on_layer_up(&mut self, _ctx: &mut Ctx<'_>) {}
	fn on_layer_down(&mut self, _ctx: &mut Ctx<'_>) {}
}

/// Runtime tunables of one automaton instance.
#[derive(Debug, Clone, Copy)]
pub struct FsmTunables {
	pub restart_timer_us: u64,
	pub max_configure: u8,
	pub max_terminate: u8,
}

impl Default for FsmTunables {
	fn default() -> Self {
		Self {
			restart_timer_us: crate::config::RESTART_TIMER_US,
			max_configure: crate::config::MAX_CONFIGURE,
			max_terminate: crate::config::MAX_TERMINATE,
		}
	}
}

/// Longest options body we ever emit in one Configure-Request.
const CR_OPTS_MAX: usize = 64;

/// A control protocol instance: the generic automaton plus the
/// protocol-specific part `P`.
pub(crate) struct Fsm<P: FsmProtocol> {
	pub proto: P,
	state: State,
	/// Coarse protocol state used by the demultiplexer gate.
	prot_state: ProtocolState,
	tunables: FsmTunables,
	restart_counter: u8,
	/// Identifier of the Configure-Request awaiting acknowledgement.
	cr_id: u8,
	/// Identifier of the last Terminate-Request sent.
	tr_id: u8,
	/// Identifier sequence for Code-Rejects.
	cj_id: u8,
	/// Byte-exact copy of the options body of the outstanding
	/// Configure-Request, compared against incoming Acks.
	cr_sent_opts: heapless::Vec<u8, CR_OPTS_MAX>,
}

impl<P: FsmProtocol> Fsm<P> {
	pub fn new(proto: P, tunables: FsmTunables) -> Self {
		Self {
			proto,
			state: State::Initial,
			prot_state: ProtocolState::Down,
			tunables,
			restart_counter: 0,
			cr_id: 0,
			tr_id: 0,
			cj_id: 0,
			cr_sent_opts: heapless::Vec::new(),
		}
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn prot_state(&self) -> ProtocolState {
		self.prot_state
	}

	/// Handles an inter-protocol event.
	pub fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match event {
			Event::Open => self.trigger(FsmEvent::Open, None, ctx),
			Event::Close => self.trigger(FsmEvent::Close, None, ctx),
			Event::LinkUp => {
				self.prot_state = ProtocolState::Starting;
				self.trigger(FsmEvent::Up, None, ctx);
			}
			Event::LinkDown => self.trigger(FsmEvent::Down, None, ctx),
			Event::Timeout => {
				let event = if self.restart_counter > 0 {
					FsmEvent::TimeoutP
				} else {
					FsmEvent::TimeoutM
				};
				self.trigger(event, None, ctx);
			}
			Event::UlStarted => {
				// late joiner: the layer above started after we opened
				if self.state == State::Opened
					&& let Some(upper) = P::UPPER
				{
					ctx.post(upper, Event::LinkUp);
				}
			}
			_ => trace!("{}: ignoring event {:?}", P::NAME, event),
		}
	}

	/// Handles a received control packet for this protocol.
	pub fn receive(&mut self, info: &[u8], ctx: &mut Ctx<'_>) -> Result<()> {
		let pkt = ControlPkt::parse(info)?;
		if let Some(event) = self.classify(&pkt, ctx)? {
			self.trigger(event, Some(&pkt), ctx);
		}
		Ok(())
	}

	/// Classifies a packet into an automaton event.
	///
	/// `Ok(None)` means the packet is stale (identifier or option mismatch)
	/// and silently discarded; `Err` means it is malformed.
	fn classify(&mut self, pkt: &ControlPkt<'_>, ctx: &mut Ctx<'_>) -> Result<Option<FsmEvent>> {
		if !P::SUPPORTED.supports(pkt.code) {
			return Ok(Some(FsmEvent::Ruc));
		}
		let code = Code::try_from(pkt.code).map_err(|_| Error::BadPacket)?;
		match code {
			Code::ConfigureRequest => self.handle_rcr(pkt, ctx).map(Some),
			Code::ConfigureAck => self.handle_rca(pkt, ctx),
			Code::ConfigureNak => self.handle_rcn_nak(pkt),
			Code::ConfigureReject => self.handle_rcn_rej(pkt),
			Code::TerminateRequest => Ok(Some(FsmEvent::Rtr)),
			Code::TerminateAck => Ok(if pkt.id == self.tr_id {
				Some(FsmEvent::Rta)
			} else {
				trace!("{}: stale Terminate-Ack id {}", P::NAME, pkt.id);
				None
			}),
			Code::CodeReject | Code::ProtocolReject => Ok(Some(handle_rxj(pkt))),
			Code::EchoRequest | Code::EchoReply | Code::DiscardRequest => Ok(Some(FsmEvent::Rxr)),
		}
	}

	/// RFC 1661 section 4.6, Configure-Request: every option must be known,
	/// valid, and every required option must be present.
	fn handle_rcr(&mut self, pkt: &ControlPkt<'_>, ctx: &mut Ctx<'_>) -> Result<FsmEvent> {
		let opts = opt::parse(pkt.data)?;

		for opt in &opts {
			let known = self.proto.conf().iter().any(|c| c.typ == opt.typ);
			if !known || !self.proto.is_valid(opt) {
				return Ok(FsmEvent::RcrM);
			}
		}
		for conf in self.proto.conf() {
			if conf.flags.contains(OptFlags::REQUIRED)
				&& !opts.iter().any(|opt| opt.typ == conf.typ)
			{
				return Ok(FsmEvent::RcrM);
			}
		}

		// all acceptable: install the peer's side before acknowledging
		for opt in &opts {
			self.proto.apply(opt, true, ctx);
		}
		Ok(FsmEvent::RcrP)
	}

	/// Configure-Ack: identifier and options must match the outstanding
	/// request byte for byte.
	fn handle_rca(&mut self, pkt: &ControlPkt<'_>, ctx: &mut Ctx<'_>) -> Result<Option<FsmEvent>> {
		let opts = opt::parse(pkt.data)?;
		if pkt.id != self.cr_id || pkt.data != &self.cr_sent_opts[..] {
			trace!("{}: stale or mismatched Configure-Ack", P::NAME);
			return Ok(None);
		}
		for opt in &opts {
			if !self.proto.conf().iter().any(|c| c.typ == opt.typ) {
				return Err(Error::BadPacket);
			}
			self.proto.apply(opt, false, ctx);
		}
		Ok(Some(FsmEvent::Rca))
	}

	/// Configure-Nak: enable what we did not offer, adopt acceptable
	/// suggestions, give up on the rest.
	fn handle_rcn_nak(&mut self, pkt: &ControlPkt<'_>) -> Result<Option<FsmEvent>> {
		let opts = opt::parse(pkt.data)?;
		if opts.is_empty() {
			return Err(Error::BadPacket);
		}
		if pkt.id != self.cr_id {
			trace!("{}: stale Configure-Nak id {}", P::NAME, pkt.id);
			return Ok(None);
		}
		for opt in &opts {
			let valid = self.proto.is_valid(opt);
			let suggested = opt_value(opt.payload);
			if let Some(conf) = self.proto.conf_mut().iter_mut().find(|c| c.typ == opt.typ) {
				if !conf.flags.contains(OptFlags::ENABLED) {
					conf.flags |= OptFlags::ENABLED;
				} else if valid {
					conf.value = suggested;
				} else {
					conf.flags -= OptFlags::ENABLED;
				}
			}
		}
		Ok(Some(FsmEvent::Rcn))
	}

	/// Configure-Reject: every rejected option must be one we actually
	/// sent; each of them is withdrawn from further requests.
	fn handle_rcn_rej(&mut self, pkt: &ControlPkt<'_>) -> Result<Option<FsmEvent>> {
		let opts = opt::parse(pkt.data)?;
		if pkt.id != self.cr_id {
			trace!("{}: stale Configure-Reject id {}", P::NAME, pkt.id);
			return Ok(None);
		}
		for opt in &opts {
			if !opt::is_subset_of(opt, &self.cr_sent_opts) {
				trace!("{}: Configure-Reject for an option we never sent", P::NAME);
				return Ok(None);
			}
		}
		for opt in &opts {
			if let Some(conf) = self.proto.conf_mut().iter_mut().find(|c| c.typ == opt.typ) {
				conf.flags -= OptFlags::ENABLED;
			}
		}
		Ok(Some(FsmEvent::Rcn))
	}

	/// Feeds one automaton event through the transition table.
	pub(crate) fn trigger(
		&mut self,
		event: FsmEvent,
		pkt: Option<&ControlPkt<'_>>,
		ctx: &mut Ctx<'_>,
	) {
		let Some((actions, next)) = transition(self.state, event) else {
			debug!(
				"{}: illegal transition, {:?} in state {:?}",
				P::NAME,
				event,
				self.state
			);
			return;
		};
		debug!(
			"{}: state change {:?} -> {:?} on {:?}",
			P::NAME,
			self.state,
			next,
			event
		);
		self.run_actions(actions, pkt, ctx);
		self.state = next;
		// states without a running restart timer
		if matches!(
			next,
			State::Initial | State::Starting | State::Closed | State::Stopped | State::Opened
		) {
			ctx.timers.cancel(P::TIMER_SLOT);
		}
	}

	fn run_actions(&mut self, actions: Actions, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		if actions.contains(Actions::TLU) {
			self.this_layer_up(ctx);
		}
		if actions.contains(Actions::TLD) {
			self.this_layer_down(ctx);
		}
		if actions.contains(Actions::TLS) {
			self.this_layer_started(ctx);
		}
		if actions.contains(Actions::TLF) {
			self.this_layer_finished(ctx);
		}
		if actions.contains(Actions::IRC) {
			self.restart_counter = if actions.contains(Actions::SCR) {
				self.tunables.max_configure
			} else {
				self.tunables.max_terminate
			};
		}
		if actions.contains(Actions::ZRC) {
			self.restart_counter = 0;
			self.arm_restart_timer(ctx);
		}
		if actions.contains(Actions::SCR) {
			self.send_configure_request(ctx);
		}
		if actions.contains(Actions::SCA) {
			self.send_configure_ack(pkt, ctx);
		}
		if actions.contains(Actions::SCN) {
			self.send_configure_nak_or_rej(pkt, ctx);
		}
		if actions.contains(Actions::STR) {
			self.send_terminate_request(ctx);
		}
		if actions.contains(Actions::STA) {
			self.send_terminate_ack(pkt, ctx);
		}
		if actions.contains(Actions::SCJ) {
			self.send_code_reject(pkt, ctx);
		}
		if actions.contains(Actions::SER) {
			self.send_echo_reply(pkt, ctx);
		}
	}

	fn reset_conf(&mut self) {
		for conf in self.proto.conf_mut() {
			conf.reset();
		}
	}

	fn this_layer_up(&mut self, ctx: &mut Ctx<'_>) {
		self.prot_state = ProtocolState::Up;
		self.proto.on_layer_up(ctx);
		if let Some(upper) = P::UPPER {
			ctx.post(upper, Event::LinkUp);
		}
	}

	fn this_layer_down(&mut self, ctx: &mut Ctx<'_>) {
		self.reset_conf();
		self.prot_state = ProtocolState::Down;
		self.proto.on_layer_down(ctx);
		if let Some(upper) = P::UPPER {
			ctx.post(upper, Event::LinkDown);
		}
	}

	fn this_layer_started(&mut self, ctx: &mut Ctx<'_>) {
		self.reset_conf();
		if let Some(lower) = P::LOWER {
			ctx.post(lower, Event::UlStarted);
		}
	}

	fn this_layer_finished(&mut self, ctx: &mut Ctx<'_>) {
		if let Some(lower) = P::LOWER {
			ctx.post(lower, Event::UlFinished);
		}
	}

	fn arm_restart_timer(&mut self, ctx: &mut Ctx<'_>) {
		ctx.timers.arm(
			P::TIMER_SLOT,
			self.tunables.restart_timer_us,
			Message::Protocol {
				target: P::TARGET,
				event: Event::Timeout,
			},
		);
	}

	/// scr: build the enabled options, remember them, send with a fresh
	/// identifier and restart the timer.
	fn send_configure_request(&mut self, ctx: &mut Ctx<'_>) {
		self.restart_counter = self.restart_counter.saturating_sub(1);

		let mut opts = Vec::new();
		for conf in self.proto.conf() {
			if conf.flags.contains(OptFlags::ENABLED) {
				let (payload, n) = conf.payload();
				opt::push(&mut opts, conf.typ, &payload[..n]);
			}
		}
		self.cr_sent_opts.clear();
		// the table bounds the body; see CR_OPTS_MAX
		let _ = self.cr_sent_opts.extend_from_slice(&opts);

		self.cr_id = self.cr_id.wrapping_add(1);
		let _ = ctx.link.send_control(
			P::PROTOCOL,
			Code::ConfigureRequest.into(),
			self.cr_id,
			&opts,
		);
		self.arm_restart_timer(ctx);
	}

	/// sca: echo the peer's options verbatim.
	fn send_configure_ack(&mut self, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		if let Some(pkt) = pkt {
			let _ = ctx
				.link
				.send_control(P::PROTOCOL, Code::ConfigureAck.into(), pkt.id, pkt.data);
		}
	}

	/// scn: a Reject listing only the unknown options takes precedence;
	/// otherwise a Nak carrying suggestions for the invalid options plus
	/// every required option the request left out.
	fn send_configure_nak_or_rej(&mut self, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		let Some(pkt) = pkt else { return };
		let Ok(opts) = opt::parse(pkt.data) else {
			return;
		};

		let mut rej = Vec::new();
		for opt in &opts {
			if !self.proto.conf().iter().any(|c| c.typ == opt.typ) {
				opt.write(&mut rej);
			}
		}
		if !rej.is_empty() {
			let _ = ctx
				.link
				.send_control(P::PROTOCOL, Code::ConfigureReject.into(), pkt.id, &rej);
			return;
		}

		let mut nak = Vec::new();
		for opt in &opts {
			if !self.proto.is_valid(opt) {
				self.proto.build_nak(opt.typ, &mut nak);
			}
		}
		for conf in self.proto.conf() {
			if conf.flags.contains(OptFlags::REQUIRED)
				&& !opts.iter().any(|opt| opt.typ == conf.typ)
			{
				let (payload, n) = conf.payload();
				opt::push(&mut nak, conf.typ, &payload[..n]);
			}
		}
		let _ = ctx
			.link
			.send_control(P::PROTOCOL, Code::ConfigureNak.into(), pkt.id, &nak);
	}

	/// str: also restarts the timer so the terminate phase retransmits.
	fn send_terminate_request(&mut self, ctx: &mut Ctx<'_>) {
		self.restart_counter = self.restart_counter.saturating_sub(1);
		self.tr_id = self.tr_id.wrapping_add(1);
		let _ = ctx
			.link
			.send_control(P::PROTOCOL, Code::TerminateRequest.into(), self.tr_id, &[]);
		self.arm_restart_timer(ctx);
	}

	/// sta: echo the peer's terminate data.
	fn send_terminate_ack(&mut self, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		let (id, data) = match pkt {
			Some(pkt) => (pkt.id, pkt.data),
			None => (self.tr_id, &[][..]),
		};
		let _ = ctx
			.link
			.send_control(P::PROTOCOL, Code::TerminateAck.into(), id, data);
	}

	/// scj: wrap the offending packet in a Code-Reject.
	fn send_code_reject(&mut self, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		let Some(pkt) = pkt else { return };
		let rejected = ControlPkt::build(pkt.code, pkt.id, pkt.data);
		self.cj_id = self.cj_id.wrapping_add(1);
		let _ = ctx
			.link
			.send_control(P::PROTOCOL, Code::CodeReject.into(), self.cj_id, &rejected);
	}

	/// ser: answer Echo-Requests, consume Echo-Replies and Discards, and in
	/// all cases tell the layer below that the link is alive.
	fn send_echo_reply(&mut self, pkt: Option<&ControlPkt<'_>>, ctx: &mut Ctx<'_>) {
		let Some(pkt) = pkt else { return };
		if pkt.code == u8::from(Code::EchoRequest) {
			let _ = ctx
				.link
				.send_control(P::PROTOCOL, Code::EchoReply.into(), pkt.id, pkt.data);
		}
		if let Some(lower) = P::LOWER {
			ctx.post(lower, Event::LinkAlive);
		}
	}
}

/// Code-Reject classification: rejection of a code we depend on is fatal.
fn handle_rxj(pkt: &ControlPkt<'_>) -> FsmEvent {
	let rejected = pkt.data.first().copied().unwrap_or(0);
	if (Code::ConfigureRequest as u8..=Code::TerminateAck as u8).contains(&rejected) {
		FsmEvent::RxjM
	} else {
		FsmEvent::RxjP
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use alloc::collections::vec_deque::VecDeque;
	use alloc::vec::Vec;

	use super::*;
	use crate::drivers::{Clock, TimerDriver, TimerSlot};
	use crate::netif::{SharedState, UpperLayer};
	use crate::ppp::PendingCtl;

	#[derive(Default)]
	pub struct TestSink {
		pub sent: Vec<(Protocol, u8, u8, Vec<u8>)>,
		pub tuned: Vec<crate::ppp::LinkTuning>,
	}

	impl crate::ppp::PacketSink for TestSink {
		fn send_control(
			&mut self,
			proto: Protocol,
			code: u8,
			id: u8,
			payload: &[u8],
		) -> crate::io::Result<()> {
			self.sent.push((proto, code, id, payload.to_vec()));
			Ok(())
		}

		fn tune(&mut self, tuning: crate::ppp::LinkTuning) {
			self.tuned.push(tuning);
		}
	}

	#[derive(Default)]
	pub struct TestTimers {
		pub armed: Vec<(TimerSlot, u64)>,
		pub cancelled: Vec<TimerSlot>,
	}

	impl Clock for TestTimers {
		fn now_us(&self) -> u64 {
			0
		}
	}

	impl TimerDriver for TestTimers {
		fn arm(&mut self, slot: TimerSlot, delta_us: u64, _msg: Message) {
			self.armed.push((slot, delta_us));
		}

		fn cancel(&mut self, slot: TimerSlot) {
			self.cancelled.push(slot);
		}
	}

	#[derive(Default)]
	pub struct TestUpper {
		pub received: Vec<(Protocol, Vec<u8>)>,
		pub ups: usize,
		pub downs: usize,
	}

	impl UpperLayer for TestUpper {
		fn receive(&mut self, proto: Protocol, datagram: &[u8]) {
			self.received.push((proto, datagram.to_vec()));
		}

		fn link_up(&mut self, _info: &crate::netif::LinkAddresses) {
			self.ups += 1;
		}

		fn link_down(&mut self) {
			self.downs += 1;
		}
	}

	pub struct Harness {
		pub sink: TestSink,
		pub timers: TestTimers,
		pub upper: TestUpper,
		pub shared: SharedState,
		pub queue: VecDeque<Message>,
		pub ctl: PendingCtl,
	}

	impl Harness {
		pub fn new() -> Self {
			Self {
				sink: TestSink::default(),
				timers: TestTimers::default(),
				upper: TestUpper::default(),
				shared: SharedState::new(),
				queue: VecDeque::new(),
				ctl: PendingCtl::default(),
			}
		}

		pub fn ctx(&mut self) -> Ctx<'_> {
			Ctx {
				link: &mut self.sink,
				timers: &mut self.timers,
				shared: &self.shared,
				upper: &mut self.upper,
				queue: &mut self.queue,
				ctl: &mut self.ctl,
			}
		}
	}

	/// A minimal protocol with one two-byte option (type 1, valid ≤ 2000).
	pub struct TestProto {
		conf: [ConfEntry; 1],
	}

	impl TestProto {
		pub fn new(flags: OptFlags) -> Self {
			Self {
				conf: [ConfEntry::new(1, 2, flags, 1500)],
			}
		}
	}

	impl FsmProtocol for TestProto {
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
		const NAME: &'static str = "test";

		fn conf(&self) -> &[ConfEntry] {
			&self.conf
		}

		fn conf_mut(&mut self) -> &mut [ConfEntry] {
			&mut self.conf
		}

		fn is_valid(&self, opt: &Opt<'_>) -> bool {
			opt.typ == 1 && opt.payload.len() == 2 && opt_value(opt.payload) <= 2000
		}

		fn build_nak(&self, typ: u8, buf: &mut Vec<u8>) {
			if typ == 1 {
				opt::push(buf, 1, &1500u16.to_be_bytes());
			}
		}

		fn apply(&mut self, _opt: &Opt<'_>, _is_peer: bool, _ctx: &mut Ctx<'_>) {}
	}

	fn opened_fsm(h: &mut Harness) -> Fsm<TestProto> {
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		// peer acks our request, we ack the peer's
		let cr_id = fsm.cr_id;
		fsm.receive(&ControlPkt::build(2, cr_id, &[]), &mut h.ctx())
			.unwrap();
		fsm.receive(&ControlPkt::build(1, 7, &[]), &mut h.ctx())
			.unwrap();
		assert_eq!(fsm.state(), State::Opened);
		fsm
	}

	#[test]
	fn open_up_sends_configure_request() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::ENABLED), FsmTunables::default());

		fsm.handle(Event::Open, &mut h.ctx());
		assert_eq!(fsm.state(), State::Starting);
		assert_eq!(
			h.queue.pop_front(),
			Some(Message::Protocol {
				target: Target::Dcp,
				event: Event::UlStarted
			})
		);

		fsm.handle(Event::LinkUp, &mut h.ctx());
		assert_eq!(fsm.state(), State::ReqSent);
		let (proto, code, id, data) = h.sink.sent.remove(0);
		assert_eq!(proto, Protocol::Lcp);
		assert_eq!(code, 1);
		assert_eq!(id, 1);
		assert_eq!(data, [0x01, 0x04, 0x05, 0xdc]);
		assert_eq!(fsm.restart_counter, crate::config::MAX_CONFIGURE - 1);
		assert!(!h.timers.armed.is_empty());
	}

	#[test]
	fn restart_counter_strictly_decreases_between_requests() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::ENABLED), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		let after_first = fsm.restart_counter;
		fsm.handle(Event::Timeout, &mut h.ctx());
		assert_eq!(fsm.restart_counter, after_first - 1);
		fsm.handle(Event::Timeout, &mut h.ctx());
		assert_eq!(fsm.restart_counter, after_first - 2);
	}

	#[test]
	fn timeout_with_exhausted_counter_finishes() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		h.queue.clear();
		fsm.restart_counter = 0;
		fsm.handle(Event::Timeout, &mut h.ctx());
		assert_eq!(fsm.state(), State::Stopped);
		assert!(h.queue.contains(&Message::Protocol {
			target: Target::Dcp,
			event: Event::UlFinished
		}));
	}

	#[test]
	fn minimum_configure_request_is_acked() {
		// spec scenario: ConfReq id=1 without options in REQ_SENT
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		assert_eq!(fsm.state(), State::ReqSent);
		h.sink.sent.clear();

		fsm.receive(&[0x01, 0x01, 0x00, 0x04], &mut h.ctx()).unwrap();
		assert_eq!(fsm.state(), State::AckSent);
		let (_, code, id, data) = h.sink.sent.remove(0);
		assert_eq!((code, id), (2, 1));
		assert!(data.is_empty());
	}

	#[test]
	fn idempotent_open_in_opened() {
		let mut h = Harness::new();
		let mut fsm = opened_fsm(&mut h);
		let sent_before = h.sink.sent.len();
		fsm.handle(Event::Open, &mut h.ctx());
		assert_eq!(fsm.state(), State::Opened);
		assert_eq!(h.sink.sent.len(), sent_before);
	}

	#[test]
	fn unknown_option_gets_rejected_not_naked() {
		// a request carrying both an unknown and an invalid option must be
		// answered with a Reject listing only the unknown one
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		h.sink.sent.clear();

		let mut body = Vec::new();
		opt::push(&mut body, 0x99, &[0xca, 0xfe]); // unknown
		opt::push(&mut body, 1, &[0x0f, 0xa0]); // known but invalid (4000)
		let req = ControlPkt::build(1, 2, &body);
		fsm.receive(&req, &mut h.ctx()).unwrap();

		assert_eq!(fsm.state(), State::ReqSent);
		let (_, code, id, data) = h.sink.sent.remove(0);
		assert_eq!((code, id), (4, 2));
		let mut expected = Vec::new();
		opt::push(&mut expected, 0x99, &[0xca, 0xfe]);
		assert_eq!(data, expected);
	}

	#[test]
	fn invalid_option_gets_naked_with_suggestion() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		h.sink.sent.clear();

		let mut body = Vec::new();
		opt::push(&mut body, 1, &[0x0f, 0xa0]); // 4000 > 2000
		fsm.receive(&ControlPkt::build(1, 3, &body), &mut h.ctx())
			.unwrap();

		let (_, code, _, data) = h.sink.sent.remove(0);
		assert_eq!(code, 3);
		let mut expected = Vec::new();
		opt::push(&mut expected, 1, &1500u16.to_be_bytes());
		assert_eq!(data, expected);
	}

	#[test]
	fn required_option_missing_is_naked() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(
			TestProto::new(OptFlags::ENABLED | OptFlags::REQUIRED),
			FsmTunables::default(),
		);
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		h.sink.sent.clear();

		fsm.receive(&ControlPkt::build(1, 9, &[]), &mut h.ctx())
			.unwrap();
		let (_, code, id, data) = h.sink.sent.remove(0);
		assert_eq!((code, id), (3, 9));
		let mut expected = Vec::new();
		opt::push(&mut expected, 1, &1500u16.to_be_bytes());
		assert_eq!(data, expected);
	}

	#[test]
	fn mismatched_ack_is_discarded() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::ENABLED), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());

		// correct id, different option bytes
		let mut body = Vec::new();
		opt::push(&mut body, 1, &[0x05, 0xdd]);
		let ack = ControlPkt::build(2, fsm.cr_id, &body);
		fsm.receive(&ack, &mut h.ctx()).unwrap();
		assert_eq!(fsm.state(), State::ReqSent);

		// stale id
		let ack = ControlPkt::build(2, fsm.cr_id.wrapping_add(1), &fsm.cr_sent_opts.clone());
		fsm.receive(&ack, &mut h.ctx()).unwrap();
		assert_eq!(fsm.state(), State::ReqSent);

		// the real thing
		let ack = ControlPkt::build(2, fsm.cr_id, &fsm.cr_sent_opts.clone());
		fsm.receive(&ack, &mut h.ctx()).unwrap();
		assert_eq!(fsm.state(), State::AckRcvd);
	}

	#[test]
	fn nak_adopts_suggested_value() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::ENABLED), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());

		let mut body = Vec::new();
		opt::push(&mut body, 1, &[0x02, 0x00]); // suggest 512
		fsm.receive(&ControlPkt::build(3, fsm.cr_id, &body), &mut h.ctx())
			.unwrap();
		assert_eq!(fsm.proto.conf[0].value, 512);
		// the automaton re-requests with the adopted value
		let (_, code, _, data) = h.sink.sent.pop().unwrap();
		assert_eq!(code, 1);
		let mut expected = Vec::new();
		opt::push(&mut expected, 1, &[0x02, 0x00]);
		assert_eq!(data, expected);
	}

	#[test]
	fn reject_withdraws_option() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::ENABLED), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());

		let sent = fsm.cr_sent_opts.to_vec();
		fsm.receive(&ControlPkt::build(4, fsm.cr_id, &sent), &mut h.ctx())
			.unwrap();
		assert!(!fsm.proto.conf[0].flags.contains(OptFlags::ENABLED));
		// the follow-up request is empty
		let (_, code, _, data) = h.sink.sent.pop().unwrap();
		assert_eq!(code, 1);
		assert!(data.is_empty());
	}

	#[test]
	fn catastrophic_code_reject_stops() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());

		// peer rejects our Configure-Request code: fatal
		let rejected = ControlPkt::build(1, 1, &[]);
		fsm.receive(&ControlPkt::build(7, 1, &rejected), &mut h.ctx())
			.unwrap();
		assert_eq!(fsm.state(), State::Stopped);
	}

	#[test]
	fn echo_request_answered_only_when_opened() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		h.sink.sent.clear();

		fsm.receive(&ControlPkt::build(9, 5, &[0, 0, 0, 0]), &mut h.ctx())
			.unwrap();
		assert!(h.sink.sent.is_empty(), "no reply outside OPENED");

		let mut fsm = opened_fsm(&mut h);
		h.sink.sent.clear();
		h.queue.clear();
		fsm.receive(&ControlPkt::build(9, 5, &[0, 0, 0, 0]), &mut h.ctx())
			.unwrap();
		let (_, code, id, data) = h.sink.sent.remove(0);
		assert_eq!((code, id), (10, 5));
		assert_eq!(data, [0, 0, 0, 0]);
		assert!(h.queue.contains(&Message::Protocol {
			target: Target::Dcp,
			event: Event::LinkAlive
		}));
	}

	#[test]
	fn terminate_request_acknowledged() {
		let mut h = Harness::new();
		let mut fsm = opened_fsm(&mut h);
		h.sink.sent.clear();
		h.queue.clear();

		fsm.receive(&ControlPkt::build(5, 11, b"bye"), &mut h.ctx())
			.unwrap();
		assert_eq!(fsm.state(), State::Stopping);
		let (_, code, id, data) = h.sink.sent.remove(0);
		assert_eq!((code, id), (6, 11));
		assert_eq!(data, b"bye");
		// tld ran
		assert!(h.queue.contains(&Message::Protocol {
			target: Target::Auth,
			event: Event::LinkDown
		}));
	}

	#[test]
	fn malformed_packet_is_an_error() {
		let mut h = Harness::new();
		let mut fsm = Fsm::new(TestProto::new(OptFlags::empty()), FsmTunables::default());
		fsm.handle(Event::Open, &mut h.ctx());
		fsm.handle(Event::LinkUp, &mut h.ctx());
		let state = fsm.state();

		// length field overruns the buffer
		assert_eq!(
			fsm.receive(&[0x01, 0x01, 0x00, 0x09, 0x00], &mut h.ctx()),
			Err(Error::BadPacket)
		);
		// option overruns the packet
		assert_eq!(
			fsm.receive(&[0x01, 0x02, 0x00, 0x07, 0x01, 0x04, 0x00], &mut h.ctx()),
			Err(Error::BadPacket)
		);
		assert_eq!(fsm.state(), state);
	}
}
