//! PPP-over-serial receive path.
//!
//! [`PpposRx`] is the interrupt-side half of an interface. The UART driver
//! calls [`on_byte`](PpposRx::on_byte) for every received byte; the handler
//! unstuffs, drops ACCM-selected characters, walks the frame state machine
//! and folds the FCS. Only data bytes are stored. A good frame is committed
//! to the ring and announced with a single mailbox message; anything else is
//! rolled back without the worker ever waking up.
//!
//! The handler never allocates, never blocks and never calls into the
//! automata.

use core::sync::atomic::Ordering;

use crate::collections::FrameProducer;
use crate::config::RX_RING_SIZE;
use crate::hdlc::{self, RxState, fcs};
use crate::netif::{Mailbox, SharedState};
use crate::ppp::Message;

pub struct PpposRx<'a> {
	prod: FrameProducer<'a, RX_RING_SIZE>,
	mailbox: &'a Mailbox,
	shared: &'a SharedState,
	state: RxState,
	fcs: u16,
	esc: bool,
	overrun: bool,
}

impl<'a> PpposRx<'a> {
	pub(crate) fn new(
		prod: FrameProducer<'a, RX_RING_SIZE>,
		mailbox: &'a Mailbox,
		shared: &'a SharedState,
	) -> Self {
		Self {
			prod,
			mailbox,
			shared,
			state: RxState::Idle,
			fcs: fcs::INIT,
			esc: false,
			overrun: false,
		}
	}

	/// Feeds one received byte into the deframer. Interrupt context.
	pub fn on_byte(&mut self, byte: u8) {
		#[cfg(feature = "frame-trace")]
		trace!("[IN] {byte:02x}");

		match byte {
			hdlc::FLAG => self.end_of_frame(),
			hdlc::ESCAPE => self.esc = true,
			_ => self.data_byte(byte),
		}
	}

	fn end_of_frame(&mut self) {
		let complete = self.state == RxState::Data && self.prod.len() >= hdlc::MIN_FRAME;
		if complete && !self.overrun && self.fcs == fcs::GOOD {
			if self.prod.commit() && !self.mailbox.post(Message::RxFrame) {
				self.shared.queue_drops.fetch_add(1, Ordering::Relaxed);
			}
		} else {
			if complete && !self.overrun {
				self.shared.crc_errors.fetch_add(1, Ordering::Relaxed);
			}
			self.prod.abort();
		}

		self.fcs = fcs::INIT;
		self.esc = false;
		self.overrun = false;
		self.state = RxState::Address;
		if !self.prod.start() {
			self.overrun = true;
		}
	}

	fn data_byte(&mut self, byte: u8) {
		// mapped control characters are line noise, not data
		if byte < 0x20 && self.shared.accm_rx.load(Ordering::Relaxed) & (1 << byte) != 0 {
			#[cfg(feature = "frame-trace")]
			trace!("dropping accm char {byte:02x}");
			return;
		}

		let byte = if core::mem::take(&mut self.esc) {
			byte ^ hdlc::XOR_COMPLEMENT
		} else {
			byte
		};

		match self.state {
			RxState::Idle => {
				// cold start without an opening flag
				self.fcs = fcs::INIT;
				if !self.prod.start() {
					self.overrun = true;
				}
				self.state = RxState::Control;
			}
			RxState::Address => self.state = RxState::Control,
			RxState::Control => self.state = RxState::Data,
			RxState::Data => {}
		}

		self.fcs = fcs::update(self.fcs, byte);
		if !self.prod.push(byte) && !self.overrun {
			self.overrun = true;
			self.shared.overruns.fetch_add(1, Ordering::Relaxed);
		}
	}
}
