//! Driver control protocol: the internal supervisor of one PPP interface.
//!
//! DCP never appears on the wire. It sequences the administrative opens,
//! relays the data-carrier state of the modem into the automata, and keeps
//! an echo monitor running while the link is up: every period it asks LCP
//! for an Echo-Request, and when too many go unanswered it declares the
//! link dead.

use crate::config;
use crate::drivers::TimerSlot;
use crate::ppp::{Ctx, Event, Message, Target};

/// Runtime tunables of the echo monitor.
#[derive(Debug, Clone, Copy)]
pub struct DcpTunables {
	/// Grace period between link-up and the first monitor tick.
	pub monitor_init_delay_us: u64,
	/// Monitor period.
	pub monitor_timeout_us: u64,
	/// Unanswered Echo-Requests tolerated before the link counts as dead.
	pub dead_counter: u8,
}

impl Default for DcpTunables {
	fn default() -> Self {
		Self {
			monitor_init_delay_us: config::MONITOR_INIT_DELAY_US,
			monitor_timeout_us: config::MONITOR_TIMEOUT_US,
			dead_counter: config::DEAD_COUNTER,
		}
	}
}

pub(crate) struct Dcp {
	tunables: DcpTunables,
	/// Echo requests sent since the last reply.
	dead_counter: u8,
	/// Data carrier present.
	carrier: bool,
}

impl Dcp {
	pub fn new(tunables: DcpTunables) -> Self {
		Self {
			tunables,
			dead_counter: 0,
			carrier: false,
		}
	}

	pub fn handle(&mut self, event: Event, ctx: &mut Ctx<'_>) {
		match event {
			Event::Open => {
				// administrative open; the modem dialing happens outside
				ctx.post(Target::Lcp, Event::Open);
				ctx.post(Target::Ncp, Event::Open);
			}
			Event::Close => {
				ctx.post(Target::Ncp, Event::Close);
				ctx.post(Target::Lcp, Event::Close);
			}
			Event::LinkUp => {
				debug!("dcp: carrier up");
				self.carrier = true;
				self.dead_counter = 0;
				ctx.post(Target::Lcp, Event::LinkUp);
				ctx.timers.arm(
					TimerSlot::Monitor,
					self.tunables.monitor_init_delay_us,
					Message::Protocol {
						target: Target::Dcp,
						event: Event::Monitor,
					},
				);
			}
			Event::LinkDown => {
				debug!("dcp: carrier lost");
				self.carrier = false;
				ctx.timers.cancel(TimerSlot::Monitor);
				ctx.post(Target::Lcp, Event::LinkDown);
			}
			Event::Monitor => self.monitor_tick(ctx),
			Event::LinkAlive => self.dead_counter = 0,
			Event::UlStarted => {
				// LCP wants the link; dialing is driven by the host
				trace!("dcp: lower layer requested");
			}
			Event::UlFinished => {
				// LCP wound down for good: drop the carrier
				debug!("dcp: link finished");
				ctx.timers.cancel(TimerSlot::Monitor);
				self.carrier = false;
				ctx.ctl.carrier_down = true;
				ctx.ctl.link_down = true;
			}
			_ => trace!("dcp: ignoring event {event:?}"),
		}
	}

	fn monitor_tick(&mut self, ctx: &mut Ctx<'_>) {
		if !self.carrier {
			return;
		}
		if self.dead_counter >= self.tunables.dead_counter {
			warn!(
				"dcp: no echo reply after {} requests, link is dead",
				self.dead_counter
			);
			ctx.timers.cancel(TimerSlot::Monitor);
			ctx.post(Target::Lcp, Event::Close);
			ctx.ctl.link_down = true;
			return;
		}
		self.dead_counter += 1;
		ctx.post(Target::Lcp, Event::Monitor);
		ctx.timers.arm(
			TimerSlot::Monitor,
			self.tunables.monitor_timeout_us,
			Message::Protocol {
				target: Target::Dcp,
				event: Event::Monitor,
			},
		);
	}
}
