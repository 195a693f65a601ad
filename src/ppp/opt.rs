//! Configuration option TLVs, see RFC 1661 section 5.
//!
//! An option is `type | length | value` where `length` counts the two
//! header bytes as well.

use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::io::{Error, Result};

/// Size of the type/length header.
pub const HDR_SIZE: usize = 2;

/// A borrowed view of one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opt<'a> {
	pub typ: u8,
	pub payload: &'a [u8],
}

impl Opt<'_> {
	/// Total encoded length including the header.
	pub fn wire_len(&self) -> usize {
		HDR_SIZE + self.payload.len()
	}

	/// Appends the encoded option to `buf`.
	pub fn write(&self, buf: &mut Vec<u8>) {
		buf.push(self.typ);
		buf.push(self.wire_len() as u8);
		buf.extend_from_slice(self.payload);
	}
}

/// Parses an options body into a list, validating every length field.
///
/// Returns [`Error::BadPacket`] when an option overruns the buffer or
/// declares a length below the header size.
pub fn parse(mut body: &[u8]) -> Result<SmallVec<[Opt<'_>; 8]>> {
	let mut opts = SmallVec::new();
	while !body.is_empty() {
		if body.len() < HDR_SIZE {
			return Err(Error::BadPacket);
		}
		let len = body[1] as usize;
		if len < HDR_SIZE || len > body.len() {
			return Err(Error::BadPacket);
		}
		opts.push(Opt {
			typ: body[0],
			payload: &body[HDR_SIZE..len],
		});
		body = &body[len..];
	}
	Ok(opts)
}

/// Whether `opt` occurs, byte for byte, inside the encoded options `body`.
pub fn is_subset_of(opt: &Opt<'_>, body: &[u8]) -> bool {
	match parse(body) {
		Ok(opts) => opts.iter().any(|o| o == opt),
		Err(_) => false,
	}
}

/// Appends a `type | length | value` triple to `buf`.
pub fn push(buf: &mut Vec<u8>, typ: u8, payload: &[u8]) {
	Opt { typ, payload }.write(buf);
}
