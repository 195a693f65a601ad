//! Password Authentication Protocol, RFC 1334.
//!
//! PAP is a plain two-packet exchange, not an instance of the negotiation
//! automaton. This end only ever authenticates itself; when LCP did not
//! negotiate authentication the layer is transparent and simply passes the
//! link-up indication through to the network control protocol.

use alloc::string::String;
use alloc::vec::Vec;

use crate::config;
use crate::drivers::TimerSlot;
use crate::io::{Error, Result};
use crate::ppp::pkt::ControlPkt;
use crate::ppp::{Ctx, Event, Message, Protocol, ProtocolState, Target};

/// Authenticate-Request.
const AUTH_REQ: u8 = 1;
/// Authenticate-Ack.
const AUTH_ACK: u8 = 2;
/// Authenticate-Nak.
const AUTH_NAK: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PapState {
	#[default]
	Initial,
	/// Authenticate-Request sent, waiting for the verdict.
	Started,
	Up,
	Down,
}

/// Runtime tunables of the authentication exchange.
#[derive(Debug, Clone, Copy)]
pub struct PapTunables {
	pub retry_timer_us: u64,
	pub max_retry: u8,
}

impl Default for PapTunables {
	fn default() -> Self {
		Self {
			retry_timer_us: config::AUTH_TIMER_US,
			max_retry: config::AUTH_MAX_RETRY,
		}
	}
}

pub(crate) struct Pap {
	state: PapState,
	prot_state: ProtocolState,
	/// Set when LCP negotiated PAP for the local side.
	required: bool,
	id: u8,
	retries: u8,
	tunables: PapTunables,
	username: String,
	password: String,
}

impl Pap {
	pub fn new(username: String, password: String, tunables: PapTunables) -> Self {
		Self {
			state: PapState::Initial,
			prot_state: ProtocolState::Down,
			required: false,
			id: 0,
			retries: 0,
			tunables,
			username,
			password,
		}
	}

	pub fn state(&self) -> PapState {
		self.state
	}

	pub fn prot_state(&self) -> ProtocolState {
		self.prot_state
	}

	pub fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match event {
			Event::AuthLocalPap => self.required = true,
			Event::LinkUp => {
				if self.required {
					debug!("pap: starting authentication");
					self.state = PapState::Started;
					self.prot_state = ProtocolState::Starting;
					self.retries = 0;
					self.send_request(ctx);
				} else {
					// nothing to prove, hand the link straight up
					self.state = PapState::Up;
					self.prot_state = ProtocolState::Up;
					ctx.post(Target::Ncp, Event::LinkUp);
				}
			}
			Event::LinkDown => {
				self.state = PapState::Initial;
				self.prot_state = ProtocolState::Down;
				self.required = false;
				ctx.timers.cancel(TimerSlot::Auth);
				ctx.post(Target::Ncp, Event::LinkDown);
			}
			Event::Timeout => {
				if self.state != PapState::Started {
					return;
				}
				self.retries += 1;
				if self.retries >= self.tunables.max_retry {
					warn!("pap: no answer after {} attempts", self.retries);
					self.fail(ctx);
				} else {
					self.send_request(ctx);
				}
			}
			_ => trace!("pap: ignoring event {event:?}"),
		}
	}

	pub fn receive(&mut self, info: &[u8], ctx: &mut Ctx<'_>) -> Result<()> {
		let pkt = ControlPkt::parse(info)?;
		match pkt.code {
			AUTH_ACK if self.state == PapState::Started && pkt.id == self.id => {
				debug!("pap: authentication succeeded");
				ctx.timers.cancel(TimerSlot::Auth);
				self.state = PapState::Up;
				self.prot_state = ProtocolState::Up;
				ctx.post(Target::Ncp, Event::LinkUp);
			}
			AUTH_NAK if self.state == PapState::Started && pkt.id == self.id => {
				warn!("pap: peer refused our credentials");
				ctx.timers.cancel(TimerSlot::Auth);
				self.fail(ctx);
			}
			AUTH_ACK | AUTH_NAK => {
				trace!("pap: stale answer id {}", pkt.id);
			}
			AUTH_REQ => {
				// we never ask the peer to authenticate
				trace!("pap: unsolicited Authenticate-Request, id {}", pkt.id);
			}
			_ => return Err(Error::BadPacket),
		}
		Ok(())
	}

	fn send_request(&mut self, ctx: &mut Ctx<'_>) {
		let user = self.username.as_bytes();
		let pass = self.password.as_bytes();
		let mut data = Vec::with_capacity(2 + user.len() + pass.len());
		data.push(user.len() as u8);
		data.extend_from_slice(user);
		data.push(pass.len() as u8);
		data.extend_from_slice(pass);

		self.id = self.id.wrapping_add(1);
		let _ = ctx
			.link
			.send_control(Protocol::Pap, AUTH_REQ, self.id, &data);
		ctx.timers.arm(
			TimerSlot::Auth,
			self.tunables.retry_timer_us,
			Message::Protocol {
				target: Target::Auth,
				event: Event::Timeout,
			},
		);
	}

	fn fail(&mut self, ctx: &mut Ctx<'_>) {
		self.state = PapState::Down;
		self.prot_state = ProtocolState::Down;
		// let LCP (and through it the supervisor) tear the link down
		ctx.post(Target::Lcp, Event::UlFinished);
	}
}
