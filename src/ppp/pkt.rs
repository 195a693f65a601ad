//! Control-protocol packets: `code | identifier | length` followed by data,
//! see RFC 1661 section 5.

use alloc::vec::Vec;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::io::{Error, Result};

/// Size of the code/identifier/length header.
pub const HDR_SIZE: usize = 4;

/// Packet codes of the LCP-like control protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Code {
	ConfigureRequest = 1,
	ConfigureAck = 2,
	ConfigureNak = 3,
	ConfigureReject = 4,
	TerminateRequest = 5,
	TerminateAck = 6,
	CodeReject = 7,
	ProtocolReject = 8,
	EchoRequest = 9,
	EchoReply = 10,
	DiscardRequest = 11,
}

bitflags! {
	/// Mask of the codes a control protocol implements; anything outside
	/// the mask classifies as an unknown code.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct CodeSet: u16 {
		const CONF_REQ = 1 << 0;
		const CONF_ACK = 1 << 1;
		const CONF_NAK = 1 << 2;
		const CONF_REJ = 1 << 3;
		const TERM_REQ = 1 << 4;
		const TERM_ACK = 1 << 5;
		const CODE_REJ = 1 << 6;
		const PROT_REJ = 1 << 7;
		const ECHO_REQ = 1 << 8;
		const ECHO_REP = 1 << 9;
		const DISC_REQ = 1 << 10;
	}
}

impl CodeSet {
	/// Whether the raw code byte is inside the mask.
	pub fn supports(&self, code: u8) -> bool {
		matches!(code, 1..=11) && self.bits() & (1 << (code - 1)) != 0
	}
}

/// A parsed control packet. `data` is bounded by the length field, not by
/// the frame, so trailing padding is invisible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPkt<'a> {
	pub code: u8,
	pub id: u8,
	pub data: &'a [u8],
}

impl<'a> ControlPkt<'a> {
	/// Parses a control packet out of the information field.
	///
	/// The length field must cover at least the header and must not exceed
	/// the buffer.
	pub fn parse(info: &'a [u8]) -> Result<Self> {
		if info.len() < HDR_SIZE {
			return Err(Error::BadPacket);
		}
		let length = u16::from_be_bytes([info[2], info[3]]) as usize;
		if length < HDR_SIZE || length > info.len() {
			return Err(Error::BadPacket);
		}
		Ok(ControlPkt {
			code: info[0],
			id: info[1],
			data: &info[HDR_SIZE..length],
		})
	}

	/// Serializes a `code | id | length | data` packet.
	pub fn build(code: u8, id: u8, data: &[u8]) -> Vec<u8> {
		let mut out = Vec::with_capacity(HDR_SIZE + data.len());
		out.push(code);
		out.push(id);
		out.extend_from_slice(&((HDR_SIZE + data.len()) as u16).to_be_bytes());
		out.extend_from_slice(data);
		out
	}
}
