//! A lock-free single-producer/single-consumer ring buffer for whole frames.
//!
//! The producer side runs in interrupt context. It writes bytes of the frame
//! currently being deframed *tentatively*: nothing becomes visible to the
//! consumer until [`FrameProducer::commit`] publishes the frame in one store.
//! A frame that turns out to be bad (FCS mismatch, truncated, overrun) is
//! discarded with [`FrameProducer::abort`] without the consumer ever seeing
//! it.
//!
//! Each committed frame is preceded by a two-byte little-endian length, so
//! the consumer pops frames, not bytes.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Backing storage plus indices. `N` must be a power of two.
pub struct FrameRing<const N: usize> {
	buf: UnsafeCell<[u8; N]>,
	/// Consumer read position (free-running).
	head: AtomicUsize,
	/// Committed write position (free-running). Only `commit` advances it.
	tail: AtomicUsize,
	split: AtomicBool,
}

// The unsafe cell is only written through the producer and only read through
// the consumer, each of which exists at most once.
unsafe impl<const N: usize> Sync for FrameRing<N> {}

/// Length prefix stored before every committed frame.
const HDR: usize = 2;

impl<const N: usize> FrameRing<N> {
	pub const fn new() -> Self {
		assert!(N.is_power_of_two());
		assert!(N >= 16);
		Self {
			buf: UnsafeCell::new([0; N]),
			head: AtomicUsize::new(0),
			tail: AtomicUsize::new(0),
			split: AtomicBool::new(false),
		}
	}

	/// Splits the ring into its two endpoints. Panics when called twice.
	pub fn split(&self) -> (FrameProducer<'_, N>, FrameConsumer<'_, N>) {
		assert!(
			!self.split.swap(true, Ordering::AcqRel),
			"ring already split"
		);
		let tail = self.tail.load(Ordering::Relaxed);
		(
			FrameProducer {
				ring: self,
				write: tail,
				frame_start: tail,
				open: false,
			},
			FrameConsumer { ring: self },
		)
	}

	#[inline]
	fn at(&self, pos: usize) -> *mut u8 {
		unsafe { (self.buf.get() as *mut u8).add(pos & (N - 1)) }
	}
}

impl<const N: usize> Default for FrameRing<N> {
	fn default() -> Self {
		Self::new()
	}
}

/// Interrupt-side endpoint.
pub struct FrameProducer<'a, const N: usize> {
	ring: &'a FrameRing<N>,
	/// Local write position, ahead of `tail` while a frame is open.
	write: usize,
	frame_start: usize,
	open: bool,
}

impl<const N: usize> FrameProducer<'_, N> {
	/// Begins a new frame, discarding any open one.
	///
	/// Returns `false` when there is no room left for even the length
	/// prefix; the frame is then lost and `push` will refuse bytes.
	pub fn start(&mut self) -> bool {
		let tail = self.ring.tail.load(Ordering::Relaxed);
		self.frame_start = tail;
		self.write = tail.wrapping_add(HDR);
		// reserve the length slot
		self.open = self.free() >= HDR;
		self.open
	}

	/// Appends one byte to the open frame.
	pub fn push(&mut self, byte: u8) -> bool {
		if !self.open || self.free_at(self.write) == 0 {
			self.open = false;
			return false;
		}
		unsafe { *self.ring.at(self.write) = byte };
		self.write = self.write.wrapping_add(1);
		true
	}

	/// Number of bytes pushed to the open frame so far.
	pub fn len(&self) -> usize {
		self.write
			.wrapping_sub(self.frame_start)
			.saturating_sub(HDR)
	}

	/// Publishes the open frame to the consumer.
	pub fn commit(&mut self) -> bool {
		if !self.open {
			return false;
		}
		let len = self.len();
		debug_assert!(len <= u16::MAX as usize);
		unsafe {
			*self.ring.at(self.frame_start) = len as u8;
			*self.ring.at(self.frame_start.wrapping_add(1)) = (len >> 8) as u8;
		}
		self.ring.tail.store(self.write, Ordering::Release);
		self.open = false;
		true
	}

	/// Throws the open frame away.
	pub fn abort(&mut self) {
		self.write = self.ring.tail.load(Ordering::Relaxed);
		self.frame_start = self.write;
		self.open = false;
	}

	#[inline]
	fn free(&self) -> usize {
		let head = self.ring.head.load(Ordering::Acquire);
		let tail = self.ring.tail.load(Ordering::Relaxed);
		N - tail.wrapping_sub(head)
	}

	#[inline]
	fn free_at(&self, write: usize) -> usize {
		let head = self.ring.head.load(Ordering::Acquire);
		N - write.wrapping_sub(head)
	}
}

/// Worker-side endpoint.
pub struct FrameConsumer<'a, const N: usize> {
	ring: &'a FrameRing<N>,
}

impl<const N: usize> FrameConsumer<'_, N> {
	/// Length of the next committed frame, if any.
	pub fn frame_len(&self) -> Option<usize> {
		let head = self.ring.head.load(Ordering::Relaxed);
		let tail = self.ring.tail.load(Ordering::Acquire);
		if head == tail {
			return None;
		}
		let lo = unsafe { *self.ring.at(head) } as usize;
		let hi = unsafe { *self.ring.at(head.wrapping_add(1)) } as usize;
		Some(lo | (hi << 8))
	}

	/// Pops the next frame into `out`, which must be large enough.
	///
	/// Returns the frame length, or `None` when the ring is empty.
	pub fn pop_into(&mut self, out: &mut [u8]) -> Option<usize> {
		let len = self.frame_len()?;
		let head = self.ring.head.load(Ordering::Relaxed);
		debug_assert!(out.len() >= len);
		for (i, slot) in out[..len].iter_mut().enumerate() {
			*slot = unsafe { *self.ring.at(head.wrapping_add(HDR + i)) };
		}
		self.ring
			.head
			.store(head.wrapping_add(HDR + len), Ordering::Release);
		Some(len)
	}

	pub fn is_empty(&self) -> bool {
		self.frame_len().is_none()
	}
}
