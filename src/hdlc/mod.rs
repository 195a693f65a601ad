//! HDLC-like framing for asynchronous serial links, see RFC 1662.
//!
//! Frames are delimited by the flag byte `0x7e`; interior occurrences of the
//! flag, the control escape `0x7d` and every character selected by the
//! Async-Control-Character-Map are sent as `0x7d` followed by the character
//! XORed with `0x20`. A 16-bit FCS over the unstuffed frame contents is
//! appended low byte first.

pub mod fcs;

use alloc::vec::Vec;

/// Flag sequence delimiting frames.
pub const FLAG: u8 = 0x7e;
/// Control escape.
pub const ESCAPE: u8 = 0x7d;
/// Value XORed onto an escaped character.
pub const XOR_COMPLEMENT: u8 = 0x20;
/// All-stations address used by PPP.
pub const ADDRESS: u8 = 0xff;
/// Unnumbered information control field used by PPP.
pub const CONTROL: u8 = 0x03;
/// Fewest stored bytes a frame may have between two flags.
pub const MIN_FRAME: usize = 4;

/// Deframer byte-walk state. The variant names the field expected next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxState {
	#[default]
	Idle,
	Address,
	Control,
	Data,
}

#[inline]
fn must_escape(accm: u32, byte: u8) -> bool {
	byte == FLAG || byte == ESCAPE || (byte < 0x20 && accm & (1 << byte) != 0)
}

/// Serializer for one outbound frame.
///
/// Bytes are stuffed against the transmit ACCM and folded into the running
/// FCS; [`finish`](Self::finish) appends the complemented FCS and the
/// closing flag.
pub(crate) struct FrameWriter<'a> {
	out: &'a mut Vec<u8>,
	accm: u32,
	fcs: u16,
}

impl<'a> FrameWriter<'a> {
	pub fn new(out: &'a mut Vec<u8>, accm: u32, leading_flag: bool) -> Self {
		if leading_flag {
			out.push(FLAG);
		}
		Self {
			out,
			accm,
			fcs: fcs::INIT,
		}
	}

	/// Appends one payload byte, stuffed if necessary.
	pub fn push(&mut self, byte: u8) {
		self.fcs = fcs::update(self.fcs, byte);
		self.push_stuffed(byte);
	}

	pub fn write(&mut self, bytes: &[u8]) {
		for &byte in bytes {
			self.push(byte);
		}
	}

	/// Appends the FCS trailer and the closing flag.
	pub fn finish(self) {
		let fcs = fcs::finish(self.fcs);
		let out = self.out;
		let accm = self.accm;
		for byte in [fcs as u8, (fcs >> 8) as u8] {
			if must_escape(accm, byte) {
				out.push(ESCAPE);
				out.push(byte ^ XOR_COMPLEMENT);
			} else {
				out.push(byte);
			}
		}
		out.push(FLAG);
	}

	#[inline]
	fn push_stuffed(&mut self, byte: u8) {
		if must_escape(self.accm, byte) {
			self.out.push(ESCAPE);
			self.out.push(byte ^ XOR_COMPLEMENT);
		} else {
			self.out.push(byte);
		}
	}
}
