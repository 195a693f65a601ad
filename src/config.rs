//! Compile-time defaults of the stack.
//!
//! Everything that RFC 1661 leaves tunable can also be overridden per
//! interface through [`Config`](crate::netif::Config); the constants here
//! are the values used when the caller does not care.

/// Size of the receive ring buffer in bytes. Must be a power of two.
///
/// Reduce this if the expected traffic does not include full MRU sized
/// packets.
pub const RX_RING_SIZE: usize = 2048;

/// Capacity of the event mailbox. Must be a power of two.
///
/// The lock-free queue backing the mailbox requires a power of two, so the
/// classic "20 messages" default rounds up to 32.
pub const MSG_QUEUE_SIZE: usize = 32;

/// Idle gap after which the next transmitted frame is preceded by an
/// opening flag, in microseconds.
pub const MAX_IDLE_TIME_US: u64 = 100_000;

/// Default value of the Maximum Receive Unit.
pub const DEFAULT_MRU: u16 = 1500;

/// Largest MRU this implementation accepts from a peer.
pub const MAX_MRU: u16 = 2000;

/// Default Async-Control-Character-Map: escape every control character.
pub const DEFAULT_ACCM: u32 = 0xffff_ffff;

/// Restart timer of the negotiation automata, in microseconds.
pub const RESTART_TIMER_US: u64 = 3_000_000;

/// Maximum number of unanswered Configure-Requests.
pub const MAX_CONFIGURE: u8 = 10;

/// Maximum number of unanswered Terminate-Requests.
pub const MAX_TERMINATE: u8 = 2;

/// Number of Authenticate-Request retries before giving up.
pub const AUTH_MAX_RETRY: u8 = 3;

/// Retry timer of the authentication exchange, in microseconds.
pub const AUTH_TIMER_US: u64 = 3_000_000;

/// Delay between the link coming up and the first echo monitor tick, in
/// microseconds.
pub const MONITOR_INIT_DELAY_US: u64 = 15_000_000;

/// Period of the echo monitor, in microseconds.
pub const MONITOR_TIMEOUT_US: u64 = 10_000_000;

/// Number of unanswered Echo-Requests before the link is assumed dead.
pub const DEAD_COUNTER: u8 = 5;
