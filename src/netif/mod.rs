//! The PPP interface: one instance per physical link.
//!
//! An [`Interface`] owns the transport, the transmit framer, the five
//! protocol instances and the single-threaded event loop that feeds them.
//! The receive interrupt runs in the detached [`PpposRx`] half and reaches
//! the worker only through the shared [`Mailbox`] and the frame ring; see
//! [`PppBuffers::split`](Interface::new).
//!
//! All protocol work happens inside [`poll`](Interface::poll) (or
//! [`handle_message`](Interface::handle_message)) on the embedder's single
//! worker; nothing here is re-entrant.

use alloc::collections::vec_deque::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use core::net::{Ipv4Addr, Ipv6Addr};
use core::sync::atomic::{AtomicU32, Ordering};

use embedded_io::Error as _;
use heapless::mpmc::Queue as MpMcQueue;

use crate::collections::{FrameConsumer, FrameRing};
use crate::config;
use crate::drivers::pppos::PpposRx;
use crate::drivers::{Clock, SerialPort, TimerDriver};
use crate::hdlc::FrameWriter;
use crate::io::{Error, Result};
use crate::netopt::{DEVICE_TYPE_PPPOS, Netopt};
use crate::ppp::dcp::{Dcp, DcpTunables};
use crate::ppp::fsm::{Fsm, FsmTunables, State};
use crate::ppp::ipcp::IpcpProto;
use crate::ppp::ipv6cp::{self, Ipv6cpProto};
use crate::ppp::lcp::Lcp;
use crate::ppp::pap::{Pap, PapState, PapTunables};
use crate::ppp::pkt::ControlPkt;
use crate::ppp::{
	Ctx, Event, LinkTuning, Message, PacketSink, PendingCtl, Protocol, ProtocolState, Target, demux,
};

/// The bounded event queue of one interface.
///
/// Lock-free; the receive interrupt, the timer glue and the worker itself
/// all post into it. When it is full the newest message is dropped and a
/// counter bumped - protocol correctness then relies on the restart timers
/// re-driving the lost event.
pub struct Mailbox {
	queue: MpMcQueue<Message, { config::MSG_QUEUE_SIZE }>,
}

impl Mailbox {
	pub(crate) const fn new() -> Self {
		Self {
			queue: MpMcQueue::new(),
		}
	}

	/// Posts a message; returns false when the queue is full.
	pub fn post(&self, msg: Message) -> bool {
		self.queue.enqueue(msg).is_ok()
	}

	pub(crate) fn take(&self) -> Option<Message> {
		self.queue.dequeue()
	}
}

/// State shared between the worker and the receive interrupt. A few
/// atomics; nothing here is ever locked.
pub struct SharedState {
	/// Receive character map consulted by the interrupt handler.
	pub(crate) accm_rx: AtomicU32,
	pub(crate) crc_errors: AtomicU32,
	pub(crate) overruns: AtomicU32,
	pub(crate) queue_drops: AtomicU32,
}

impl SharedState {
	pub(crate) const fn new() -> Self {
		Self {
			accm_rx: AtomicU32::new(config::DEFAULT_ACCM),
			crc_errors: AtomicU32::new(0),
			overruns: AtomicU32::new(0),
			queue_drops: AtomicU32::new(0),
		}
	}
}

/// Statically allocatable buffers and shared state of one interface.
pub struct PppBuffers {
	ring: FrameRing<{ config::RX_RING_SIZE }>,
	mailbox: Mailbox,
	shared: SharedState,
}

impl PppBuffers {
	pub const fn new() -> Self {
		Self {
			ring: FrameRing::new(),
			mailbox: Mailbox::new(),
			shared: SharedState::new(),
		}
	}

	/// The mailbox, for the timer glue: a fired timer posts its message
	/// here and wakes the worker.
	pub fn mailbox(&self) -> &Mailbox {
		&self.mailbox
	}
}

impl Default for PppBuffers {
	fn default() -> Self {
		Self::new()
	}
}

/// Which network control protocol the interface runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NcpMode {
	#[default]
	Ipv4,
	Ipv6,
}

/// Per-interface configuration.
#[derive(Debug, Clone)]
pub struct Config {
	pub mode: NcpMode,
	/// PAP credentials.
	pub username: String,
	pub password: String,
	/// Our IPv6 interface identifier proposal.
	pub ipv6_ifid: [u8; 8],
	pub baudrate: u32,
	pub lcp: FsmTunables,
	pub ncp: FsmTunables,
	pub pap: PapTunables,
	pub dcp: DcpTunables,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			mode: NcpMode::Ipv4,
			username: String::new(),
			password: String::new(),
			ipv6_ifid: [0; 8],
			baudrate: 115_200,
			lcp: FsmTunables::default(),
			ncp: FsmTunables::default(),
			pap: PapTunables::default(),
			dcp: DcpTunables::default(),
		}
	}
}

/// Addresses negotiated for the link, reported with the link-up event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkAddresses {
	pub ipv4_local: Option<Ipv4Addr>,
	pub ipv4_peer: Option<Ipv4Addr>,
	pub ipv6_local: Option<Ipv6Addr>,
	pub ipv6_peer: Option<Ipv6Addr>,
}

/// The upper network layer consuming this link.
pub trait UpperLayer {
	/// Delivers one inbound datagram; `proto` is [`Protocol::Ipv4`] or
	/// [`Protocol::Ipv6`].
	fn receive(&mut self, proto: Protocol, datagram: &[u8]);
	fn link_up(&mut self, addresses: &LinkAddresses);
	fn link_down(&mut self);
}

/// Observability counters of one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
	/// Frames dropped for a bad FCS.
	pub crc_errors: u32,
	/// Frames lost because the receive ring was full.
	pub overruns: u32,
	/// Events lost because the mailbox was full.
	pub queue_drops: u32,
	/// Inbound packets dropped by the demultiplexer.
	pub rx_drops: u32,
	/// Outbound packets the transport refused.
	pub tx_errors: u32,
}

/// Transmit half of the link layer: owns the serial port, the negotiated
/// transmit parameters and the framer.
struct LinkTx<T: SerialPort> {
	port: T,
	/// Data carrier present; nothing is sent without it.
	up: bool,
	accm_tx: u32,
	peer_mru: u16,
	local_mru: u16,
	pfc_tx: bool,
	acfc_tx: bool,
	station_id: u8,
	control: u8,
	last_xmit_us: u64,
	idle_gap_us: u64,
	/// Refreshed by the worker before every dispatch.
	now_us: u64,
	tx_errors: u32,
}

impl<T: SerialPort> LinkTx<T> {
	fn new(port: T) -> Self {
		Self {
			port,
			up: false,
			accm_tx: config::DEFAULT_ACCM,
			peer_mru: config::DEFAULT_MRU,
			local_mru: config::DEFAULT_MRU,
			pfc_tx: false,
			acfc_tx: false,
			station_id: crate::hdlc::ADDRESS,
			control: crate::hdlc::CONTROL,
			last_xmit_us: 0,
			idle_gap_us: config::MAX_IDLE_TIME_US,
			now_us: 0,
			tx_errors: 0,
		}
	}

	/// Encapsulates and frames one PPP packet, RFC 1662 section 3.1.
	fn send_packet(&mut self, proto: Protocol, info: &[u8]) -> Result<()> {
		if !self.up {
			return Err(Error::NoDevice);
		}
		if 2 + info.len() > self.peer_mru as usize {
			return Err(Error::TooLong);
		}

		let mut wire = Vec::with_capacity(info.len() + 16);
		// a long-idle receiver needs an opening flag to resynchronize
		let leading = self.now_us.saturating_sub(self.last_xmit_us) >= self.idle_gap_us;
		let mut writer = FrameWriter::new(&mut wire, self.accm_tx, leading);

		// LCP itself is always sent with the full, uncompressed header
		let is_lcp = proto == Protocol::Lcp;
		if !self.acfc_tx || is_lcp {
			writer.push(self.station_id);
			writer.push(self.control);
		}
		let protnum: u16 = proto.into();
		if self.pfc_tx && !is_lcp && protnum <= 0xff {
			writer.push(protnum as u8);
		} else {
			writer.write(&protnum.to_be_bytes());
		}
		writer.write(info);
		writer.finish();

		self.last_xmit_us = self.now_us;
		self.port.write_all(&wire).map_err(|err| {
			self.tx_errors = self.tx_errors.saturating_add(1);
			Error::Io(err.kind())
		})?;
		Ok(())
	}
}

impl<T: SerialPort> PacketSink for LinkTx<T> {
	fn send_control(&mut self, proto: Protocol, code: u8, id: u8, payload: &[u8]) -> Result<()> {
		let pkt = ControlPkt::build(code, id, payload);
		self.send_packet(proto, &pkt).inspect_err(|err| {
			debug!("tx {proto:?} code {code} failed: {err:?}");
		})
	}

	fn tune(&mut self, tuning: LinkTuning) {
		debug!("link tuning: {tuning:?}");
		match tuning {
			LinkTuning::AccmTx(map) => self.accm_tx = map,
			LinkTuning::PeerMru(mru) => self.peer_mru = mru,
			LinkTuning::LocalMru(mru) => self.local_mru = mru,
			LinkTuning::PfcTx(on) => self.pfc_tx = on,
			LinkTuning::AcfcTx(on) => self.acfc_tx = on,
		}
	}
}

/// The active network control protocol.
enum Ncp {
	V4(Fsm<IpcpProto>),
	V6(Fsm<Ipv6cpProto>),
}

impl Ncp {
	fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match self {
			Ncp::V4(fsm) => fsm.handle(event, ctx),
			Ncp::V6(fsm) => fsm.handle(event, ctx),
		}
	}

	fn receive(&mut self, info: &[u8], ctx: &mut Ctx<'_>) -> Result<()> {
		match self {
			Ncp::V4(fsm) => fsm.receive(info, ctx),
			Ncp::V6(fsm) => fsm.receive(info, ctx),
		}
	}

	fn state(&self) -> State {
		match self {
			Ncp::V4(fsm) => fsm.state(),
			Ncp::V6(fsm) => fsm.state(),
		}
	}

	fn protocol(&self) -> Protocol {
		match self {
			Ncp::V4(_) => Protocol::Ipcp,
			Ncp::V6(_) => Protocol::Ipv6cp,
		}
	}
}

/// The datagram encapsulator sitting on top of the NCP.
#[derive(Default)]
struct IpLayer {
	state: ProtocolState,
}

impl IpLayer {
	fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match event {
			Event::LinkUp => {
				self.state = ProtocolState::Up;
				ctx.ctl.link_up = true;
			}
			Event::LinkDown => {
				self.state = ProtocolState::Down;
				ctx.ctl.link_down = true;
			}
			_ => {}
		}
	}
}

/// One PPP interface. See the module documentation.
pub struct Interface<'a, T: SerialPort, D: TimerDriver, U: UpperLayer> {
	link: LinkTx<T>,
	timers: D,
	upper: U,
	cons: FrameConsumer<'a, { config::RX_RING_SIZE }>,
	mailbox: &'a Mailbox,
	shared: &'a SharedState,
	pending: VecDeque<Message>,
	dcp: Dcp,
	lcp: Lcp,
	pap: Pap,
	ncp: Ncp,
	ip: IpLayer,
	mode: NcpMode,
	apn: Option<String>,
	baudrate: u32,
	link_reported_up: bool,
	rx_drops: u32,
}

impl<'a, T: SerialPort, D: TimerDriver, U: UpperLayer> Interface<'a, T, D, U> {
	/// Creates the interface and its interrupt-side receive handle.
	///
	/// `buffers` is usually a `static`; splitting it twice panics.
	pub fn new(
		buffers: &'a PppBuffers,
		port: T,
		timers: D,
		upper: U,
		config: Config,
	) -> (Self, PpposRx<'a>) {
		let (prod, cons) = buffers.ring.split();
		let rx = PpposRx::new(prod, &buffers.mailbox, &buffers.shared);

		let ncp = match config.mode {
			NcpMode::Ipv4 => Ncp::V4(Fsm::new(IpcpProto::new(), config.ncp)),
			NcpMode::Ipv6 => Ncp::V6(Fsm::new(Ipv6cpProto::new(config.ipv6_ifid), config.ncp)),
		};

		let iface = Self {
			link: LinkTx::new(port),
			timers,
			upper,
			cons,
			mailbox: &buffers.mailbox,
			shared: &buffers.shared,
			pending: VecDeque::new(),
			dcp: Dcp::new(config.dcp),
			lcp: Lcp::new(config.lcp),
			pap: Pap::new(config.username, config.password, config.pap),
			ncp,
			ip: IpLayer::default(),
			mode: config.mode,
			apn: None,
			baudrate: config.baudrate,
			link_reported_up: false,
			rx_drops: 0,
		};
		(iface, rx)
	}

	/// Drains the mailbox. Returns whether any work was done.
	pub fn poll(&mut self) -> bool {
		let mut worked = false;
		while let Some(msg) = self.mailbox.take() {
			worked = true;
			self.handle_message(msg);
		}
		worked
	}

	/// Handles one message and everything it fans out into.
	pub fn handle_message(&mut self, msg: Message) {
		self.pending.push_back(msg);
		while let Some(msg) = self.pending.pop_front() {
			match msg {
				Message::RxFrame => self.drain_rx(),
				Message::Protocol { target, event } => self.dispatch(target, event),
			}
		}
	}

	/// The modem entered data mode: the carrier is up.
	pub fn carrier_up(&mut self) {
		self.link.up = true;
		self.handle_message(Message::Protocol {
			target: Target::Dcp,
			event: Event::LinkUp,
		});
	}

	/// The modem lost the carrier.
	pub fn carrier_lost(&mut self) {
		self.link.up = false;
		self.handle_message(Message::Protocol {
			target: Target::Dcp,
			event: Event::LinkDown,
		});
	}

	/// Sends one IPv4 or IPv6 datagram over the link.
	pub fn send(&mut self, proto: Protocol, datagram: &[u8]) -> Result<()> {
		if !matches!(proto, Protocol::Ipv4 | Protocol::Ipv6) {
			return Err(Error::InvalidArgument);
		}
		if self.ip.state != ProtocolState::Up {
			return Err(Error::NoDevice);
		}
		self.link.now_us = self.timers.now_us();
		self.link.send_packet(proto, datagram)
	}

	/// Counter snapshot.
	pub fn stats(&self) -> Stats {
		Stats {
			crc_errors: self.shared.crc_errors.load(Ordering::Relaxed),
			overruns: self.shared.overruns.load(Ordering::Relaxed),
			queue_drops: self.shared.queue_drops.load(Ordering::Relaxed),
			rx_drops: self.rx_drops,
			tx_errors: self.link.tx_errors,
		}
	}

	pub fn lcp_state(&self) -> State {
		self.lcp.fsm.state()
	}

	pub fn auth_state(&self) -> PapState {
		self.pap.state()
	}

	pub fn ncp_state(&self) -> State {
		self.ncp.state()
	}

	pub fn is_ipv6_ready(&self) -> bool {
		self.mode == NcpMode::Ipv6 && self.ip.state == ProtocolState::Up
	}

	/// The configured access point name, for the modem glue.
	pub fn apn(&self) -> Option<&str> {
		self.apn.as_deref()
	}

	/// Sets a control-surface option.
	pub fn set(&mut self, opt: Netopt, value: Option<&[u8]>) -> Result<usize> {
		match (opt, value) {
			(Netopt::AccmRx, Some(v)) => {
				let map = u32::from_be_bytes(v.try_into().map_err(|_| Error::InvalidArgument)?);
				self.shared.accm_rx.store(map, Ordering::Relaxed);
				Ok(4)
			}
			(Netopt::AccmTx, Some(v)) => {
				let map = u32::from_be_bytes(v.try_into().map_err(|_| Error::InvalidArgument)?);
				self.link.accm_tx = map;
				Ok(4)
			}
			(Netopt::ApnName, Some(v)) => {
				let apn = core::str::from_utf8(v).map_err(|_| Error::InvalidArgument)?;
				self.apn = Some(String::from(apn));
				Ok(v.len())
			}
			(Netopt::DialUp, Some(v)) => {
				let code = core::str::from_utf8(v).map_err(|_| Error::InvalidArgument)?;
				info!("dialing up ({code})");
				self.link
					.port
					.reopen(self.baudrate)
					.map_err(|err| Error::Io(err.kind()))?;
				self.handle_message(Message::Protocol {
					target: Target::Dcp,
					event: Event::Open,
				});
				Ok(v.len())
			}
			(Netopt::DialUp, None) => {
				info!("hanging up");
				self.handle_message(Message::Protocol {
					target: Target::Dcp,
					event: Event::Close,
				});
				Ok(0)
			}
			(Netopt::HdlcControl, Some(&[control])) => {
				self.link.control = control;
				Ok(1)
			}
			(Netopt::HdlcStationId, Some(&[station_id])) => {
				self.link.station_id = station_id;
				Ok(1)
			}
			(
				Netopt::AccmRx
				| Netopt::AccmTx
				| Netopt::ApnName
				| Netopt::HdlcControl
				| Netopt::HdlcStationId,
				_,
			) => Err(Error::InvalidArgument),
			_ => Err(Error::NotSupported),
		}
	}

	/// Reads a control-surface option into `buf`, returning the length.
	pub fn get(&self, opt: Netopt, buf: &mut [u8]) -> Result<usize> {
		let put = |buf: &mut [u8], bytes: &[u8]| {
			if buf.len() < bytes.len() {
				return Err(Error::InvalidArgument);
			}
			buf[..bytes.len()].copy_from_slice(bytes);
			Ok(bytes.len())
		};
		match opt {
			Netopt::IsWired => put(buf, &[0]),
			Netopt::DeviceType => put(buf, &DEVICE_TYPE_PPPOS.to_be_bytes()),
			Netopt::LcpState => put(buf, &[self.lcp_state() as u8]),
			Netopt::AuthState => put(buf, &[self.auth_state() as u8]),
			Netopt::IpcpState => put(buf, &[self.ncp_state() as u8]),
			Netopt::IsIpv6Ready => put(buf, &[self.is_ipv6_ready() as u8]),
			_ => Err(Error::NotSupported),
		}
	}

	/// Dispatches one protocol event and applies whatever the protocols
	/// asked the interface to do.
	fn dispatch(&mut self, target: Target, event: Event) {
		trace!("dispatch {event:?} to {target:?}");
		let mut ctl = PendingCtl::default();
		self.link.now_us = self.timers.now_us();
		{
			let mut ctx = Ctx {
				link: &mut self.link,
				timers: &mut self.timers,
				shared: self.shared,
				upper: &mut self.upper,
				queue: &mut self.pending,
				ctl: &mut ctl,
			};
			match target {
				Target::Dcp => self.dcp.handle(event, &mut ctx),
				Target::Lcp => self.lcp.handle(event, &mut ctx),
				Target::Auth => self.pap.handle(event, &mut ctx),
				Target::Ncp => self.ncp.handle(event, &mut ctx),
				Target::Ip => self.ip.handle(event, &mut ctx),
			}
		}
		self.apply_ctl(ctl);
	}

	fn apply_ctl(&mut self, ctl: PendingCtl) {
		if ctl.carrier_down {
			debug!("dropping data carrier");
			self.link.up = false;
			self.link.port.close();
			self.handle_ctl_link_teardown();
		}
		if ctl.link_up && !self.link_reported_up {
			self.link_reported_up = true;
			let addresses = self.addresses();
			info!("link is up: {addresses:?}");
			self.upper.link_up(&addresses);
		}
		if ctl.link_down && self.link_reported_up {
			self.link_reported_up = false;
			info!("link is down");
			self.upper.link_down();
		}
	}

	/// A dropped carrier is a Down event for the whole stack.
	fn handle_ctl_link_teardown(&mut self) {
		self.pending.push_back(Message::Protocol {
			target: Target::Dcp,
			event: Event::LinkDown,
		});
	}

	/// Pulls every committed frame out of the ring.
	fn drain_rx(&mut self) {
		while let Some(len) = self.cons.frame_len() {
			let mut frame = alloc::vec![0u8; len];
			if self.cons.pop_into(&mut frame).is_none() {
				break;
			}
			self.process_frame(&frame);
		}
	}

	/// Demultiplexes one deframed, FCS-checked frame.
	fn process_frame(&mut self, frame: &[u8]) {
		// the deframer keeps the FCS trailer in the ring
		let Some(payload) = frame.len().checked_sub(2).map(|n| &frame[..n]) else {
			return;
		};

		let parsed = match demux(payload) {
			Ok(parsed) => parsed,
			Err(_) => {
				self.rx_drops += 1;
				debug!("unsupported hdlc header, dropping frame");
				return;
			}
		};
		if 2 + parsed.info.len() > self.link.local_mru as usize {
			self.rx_drops += 1;
			debug!("inbound packet exceeds MRU, dropping");
			return;
		}

		trace!("packet received, protocol {:04x}", parsed.protocol);
		let Ok(proto) = Protocol::try_from(parsed.protocol) else {
			// unknown protocol number: Protocol-Reject through LCP
			let (protocol, info) = (parsed.protocol, parsed.info.to_vec());
			self.with_ctx(|view, ctx| {
				view.lcp.send_protocol_reject(protocol, &info, ctx);
			});
			return;
		};

		// the restricted automaton of RFC 1661 section 3.2: packets for a
		// protocol whose phase has not come yet are silently discarded
		let allowed = match proto {
			Protocol::Lcp => self.link.up,
			Protocol::Pap => self.pap.prot_state() == ProtocolState::Starting,
			Protocol::Ipcp | Protocol::Ipv6cp => {
				proto == self.ncp.protocol() && self.lcp.fsm.prot_state() == ProtocolState::Up
			}
			Protocol::Ipv4 | Protocol::Ipv6 => self.ip.state == ProtocolState::Up,
		};
		if !allowed {
			self.rx_drops += 1;
			debug!("{proto:?} packet outside its phase, dropping");
			return;
		}

		match proto {
			Protocol::Ipv4 | Protocol::Ipv6 => {
				self.upper.receive(proto, parsed.info);
			}
			_ => {
				let info = parsed.info.to_vec();
				let result = self.with_ctx(|view, ctx| match proto {
					Protocol::Lcp => view.lcp.receive(&info, ctx),
					Protocol::Pap => view.pap.receive(&info, ctx),
					_ => view.ncp.receive(&info, ctx),
				});
				if let Err(err) = result {
					self.rx_drops += 1;
					debug!("{proto:?} packet dropped: {err:?}");
				}
			}
		}
	}

	/// Runs `f` with a dispatch context, then applies the control flags.
	fn with_ctx<R>(
		&mut self,
		f: impl FnOnce(&mut ProtocolsView<'_>, &mut Ctx<'_>) -> R,
	) -> R {
		let mut ctl = PendingCtl::default();
		self.link.now_us = self.timers.now_us();
		let result = {
			let mut ctx = Ctx {
				link: &mut self.link,
				timers: &mut self.timers,
				shared: self.shared,
				upper: &mut self.upper,
				queue: &mut self.pending,
				ctl: &mut ctl,
			};
			let mut view = ProtocolsView {
				lcp: &mut self.lcp,
				pap: &mut self.pap,
				ncp: &mut self.ncp,
			};
			f(&mut view, &mut ctx)
		};
		self.apply_ctl(ctl);
		result
	}

	fn addresses(&self) -> LinkAddresses {
		let mut addresses = LinkAddresses::default();
		match &self.ncp {
			Ncp::V4(fsm) => {
				if !fsm.proto.local_addr.is_unspecified() {
					addresses.ipv4_local = Some(fsm.proto.local_addr);
				}
				if !fsm.proto.peer_addr.is_unspecified() {
					addresses.ipv4_peer = Some(fsm.proto.peer_addr);
				}
			}
			Ncp::V6(fsm) => {
				if fsm.proto.local_ifid != [0; 8] {
					addresses.ipv6_local = Some(ipv6cp::link_local(fsm.proto.local_ifid));
				}
				if fsm.proto.peer_ifid != [0; 8] {
					addresses.ipv6_peer = Some(ipv6cp::link_local(fsm.proto.peer_ifid));
				}
			}
		}
		addresses
	}
}

/// Mutable view of the wire-facing protocol instances, handed to frame
/// processing.
struct ProtocolsView<'a> {
	lcp: &'a mut Lcp,
	pap: &'a mut Pap,
	ncp: &'a mut Ncp,
}

#[cfg(test)]
mod tests {
	use alloc::boxed::Box;
	use alloc::vec::Vec;

	use core::convert::Infallible;

	use super::*;

	#[derive(Default)]
	struct MockPort {
		out: Vec<u8>,
		closed: bool,
	}

	impl embedded_io::ErrorType for MockPort {
		type Error = Infallible;
	}

	impl embedded_io::Write for MockPort {
		fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Infallible> {
			self.out.extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> core::result::Result<(), Infallible> {
			Ok(())
		}
	}

	impl SerialPort for MockPort {
		fn close(&mut self) {
			self.closed = true;
		}

		fn reopen(&mut self, _baudrate: u32) -> core::result::Result<(), Infallible> {
			self.closed = false;
			Ok(())
		}
	}

	struct NullTimers;

	impl Clock for NullTimers {
		fn now_us(&self) -> u64 {
			0
		}
	}

	impl TimerDriver for NullTimers {
		fn arm(&mut self, _slot: crate::drivers::TimerSlot, _delta_us: u64, _msg: Message) {}
		fn cancel(&mut self, _slot: crate::drivers::TimerSlot) {}
	}

	#[derive(Default)]
	struct NullUpper {
		rx: Vec<(Protocol, Vec<u8>)>,
		ups: usize,
		downs: usize,
	}

	impl UpperLayer for NullUpper {
		fn receive(&mut self, proto: Protocol, datagram: &[u8]) {
			self.rx.push((proto, datagram.to_vec()));
		}

		fn link_up(&mut self, _addresses: &LinkAddresses) {
			self.ups += 1;
		}

		fn link_down(&mut self) {
			self.downs += 1;
		}
	}

	fn link() -> LinkTx<MockPort> {
		let mut link = LinkTx::new(MockPort::default());
		link.up = true;
		link.accm_tx = 0;
		link
	}

	#[test]
	fn default_header_is_uncompressed() {
		let mut link = link();
		link.send_packet(Protocol::Ipv4, &[0x45, 0x00]).unwrap();
		assert_eq!(&link.port.out[..6], &[0xff, 0x03, 0x00, 0x21, 0x45, 0x00]);
		assert_eq!(*link.port.out.last().unwrap(), 0x7e);
	}

	#[test]
	fn idle_link_gets_a_leading_flag() {
		let mut link = link();
		link.now_us = config::MAX_IDLE_TIME_US;
		link.send_packet(Protocol::Ipv4, &[0x45]).unwrap();
		assert_eq!(link.port.out[0], 0x7e);

		// immediately afterwards no opening flag is needed
		link.port.out.clear();
		link.send_packet(Protocol::Ipv4, &[0x45]).unwrap();
		assert_ne!(link.port.out[0], 0x7e);
	}

	#[test]
	fn pfc_compresses_data_but_never_lcp() {
		let mut link = link();
		link.pfc_tx = true;
		link.send_packet(Protocol::Ipv4, &[0x45, 0x00]).unwrap();
		// single-byte protocol field 0x21
		assert_eq!(&link.port.out[..3], &[0xff, 0x03, 0x21]);

		link.port.out.clear();
		link.send_packet(Protocol::Lcp, &[0x09, 0x01, 0x00, 0x04]).unwrap();
		assert_eq!(&link.port.out[..4], &[0xff, 0x03, 0xc0, 0x21]);

		// a high protocol number cannot be compressed
		link.port.out.clear();
		link.send_packet(Protocol::Ipcp, &[0x01, 0x01, 0x00, 0x04]).unwrap();
		assert_eq!(&link.port.out[..4], &[0xff, 0x03, 0x80, 0x21]);
	}

	#[test]
	fn acfc_omits_address_and_control_but_never_for_lcp() {
		let mut link = link();
		link.acfc_tx = true;
		link.pfc_tx = true;
		link.send_packet(Protocol::Ipv4, &[0x45]).unwrap();
		assert_eq!(link.port.out[0], 0x21);

		link.port.out.clear();
		link.send_packet(Protocol::Lcp, &[0x09, 0x01, 0x00, 0x04]).unwrap();
		assert_eq!(&link.port.out[..4], &[0xff, 0x03, 0xc0, 0x21]);
	}

	#[test]
	fn oversized_packet_is_refused() {
		let mut link = link();
		link.peer_mru = 8;
		assert_eq!(
			link.send_packet(Protocol::Ipv4, &[0u8; 7]),
			Err(Error::TooLong)
		);
		assert!(link.port.out.is_empty());
		assert!(link.send_packet(Protocol::Ipv4, &[0u8; 6]).is_ok());
	}

	#[test]
	fn no_carrier_no_bytes() {
		let mut link = link();
		link.up = false;
		assert_eq!(
			link.send_packet(Protocol::Ipv4, &[0x45]),
			Err(Error::NoDevice)
		);
	}

	fn iface() -> Interface<'static, MockPort, NullTimers, NullUpper> {
		let buffers: &'static PppBuffers = Box::leak(Box::new(PppBuffers::new()));
		let (iface, _rx) = Interface::new(
			buffers,
			MockPort::default(),
			NullTimers,
			NullUpper::default(),
			Config::default(),
		);
		iface
	}

	/// A deframed frame as the ring hands it to the worker: layer-2 bytes
	/// plus a (here fake) FCS trailer.
	fn deframed(proto: u16, info: &[u8]) -> Vec<u8> {
		let mut frame = vec![0xff, 0x03];
		frame.extend_from_slice(&proto.to_be_bytes());
		frame.extend_from_slice(info);
		frame.extend_from_slice(&[0, 0]);
		frame
	}

	fn opened_iface() -> Interface<'static, MockPort, NullTimers, NullUpper> {
		let mut iface = iface();
		iface.set(Netopt::DialUp, Some(b"*99#".as_slice())).unwrap();
		iface.carrier_up();
		// our Configure-Request went out with id 1 and no options
		iface.process_frame(&deframed(0xc021, &[0x02, 0x01, 0x00, 0x04]));
		iface.process_frame(&deframed(0xc021, &[0x01, 0x01, 0x00, 0x04]));
		assert_eq!(iface.lcp_state(), State::Opened);
		iface.link.port.out.clear();
		iface
	}

	/// Undoes the byte stuffing of one captured frame.
	fn unstuff(wire: &[u8]) -> Vec<u8> {
		let mut out = Vec::new();
		let mut esc = false;
		for &byte in wire {
			match byte {
				0x7e => {}
				0x7d => esc = true,
				_ => out.push(if core::mem::take(&mut esc) {
					byte ^ 0x20
				} else {
					byte
				}),
			}
		}
		out
	}

	#[test]
	fn unknown_protocol_is_protocol_rejected() {
		let mut iface = opened_iface();
		iface.process_frame(&deframed(0x8035, &[0xaa, 0xbb]));

		let out = unstuff(&iface.link.port.out);
		assert!(!out.is_empty(), "a Protocol-Reject must go out");
		// protocol field of the carrier packet is LCP
		let lcp_at = out.windows(2).position(|w| w == [0xc0, 0x21]).unwrap();
		// code 8, then id, then length, then the offending protocol
		assert_eq!(out[lcp_at + 2], 0x08);
		assert_eq!(&out[lcp_at + 6..lcp_at + 8], &[0x80, 0x35]);
	}

	#[test]
	fn lcp_packets_ignored_without_carrier() {
		let mut iface = iface();
		iface.process_frame(&deframed(0xc021, &[0x01, 0x01, 0x00, 0x04]));
		assert!(iface.link.port.out.is_empty());
		assert_eq!(iface.stats().rx_drops, 1);
	}

	#[test]
	fn datagrams_gated_until_ncp_opens() {
		let mut iface = opened_iface();
		iface.process_frame(&deframed(0x0021, &[0x45, 0x00]));
		assert!(iface.upper.rx.is_empty());
		assert_eq!(iface.send(Protocol::Ipv4, &[0x45]), Err(Error::NoDevice));
	}

	#[test]
	fn oversized_inbound_frame_is_dropped() {
		let mut iface = opened_iface();
		let big = vec![0u8; config::DEFAULT_MRU as usize + 1];
		iface.process_frame(&deframed(0x0021, &big));
		assert_eq!(iface.stats().rx_drops, 1);
		assert!(iface.upper.rx.is_empty());
	}

	#[test]
	fn control_surface_roundtrip() {
		let mut iface = iface();

		iface
			.set(Netopt::AccmRx, Some(&[0x00, 0x0a, 0x00, 0x00]))
			.unwrap();
		assert_eq!(
			iface.shared.accm_rx.load(Ordering::Relaxed),
			0x000a_0000
		);
		iface
			.set(Netopt::AccmTx, Some(&[0, 0, 0, 0]))
			.unwrap();
		assert_eq!(iface.link.accm_tx, 0);
		iface.set(Netopt::HdlcStationId, Some(&[0x55])).unwrap();
		assert_eq!(iface.link.station_id, 0x55);
		assert_eq!(
			iface.set(Netopt::AccmRx, Some(&[1, 2])),
			Err(Error::InvalidArgument)
		);
		assert_eq!(
			iface.set(Netopt::IsWired, Some(&[1])),
			Err(Error::NotSupported)
		);

		let mut buf = [0u8; 4];
		assert_eq!(iface.get(Netopt::IsWired, &mut buf), Ok(1));
		assert_eq!(buf[0], 0);
		assert_eq!(iface.get(Netopt::DeviceType, &mut buf), Ok(2));
		assert_eq!(
			u16::from_be_bytes([buf[0], buf[1]]),
			crate::netopt::DEVICE_TYPE_PPPOS
		);
		assert_eq!(iface.get(Netopt::LcpState, &mut buf), Ok(1));
		assert_eq!(buf[0], State::Initial as u8);
		assert_eq!(iface.get(Netopt::IsIpv6Ready, &mut buf), Ok(1));
		assert_eq!(buf[0], 0);
		assert_eq!(
			iface.get(Netopt::ApnName, &mut buf),
			Err(Error::NotSupported)
		);
	}

	#[test]
	fn apn_is_stored_for_the_modem_glue() {
		let mut iface = iface();
		iface
			.set(Netopt::ApnName, Some(b"internet".as_slice()))
			.unwrap();
		assert_eq!(iface.apn.as_deref(), Some("internet"));
	}
}
