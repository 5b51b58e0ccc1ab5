//! TCP segment header codec and Internet checksum.
//!
//! The transport core treats this module as a pure codec: it builds headers,
//! parses them back, and asks for a checksum to be fixed up or verified. The
//! checksum covers a pseudo-header (source address, destination address, a zero
//! byte, protocol number 6, TCP length) followed by header and payload.

use std::fmt;
use std::net::Ipv4Addr;
use std::ops::BitOr;

use thiserror::Error;

/// Number of 32-bit words in a header without options.
pub const BASE_HEADER_WORDS: u8 = 5;
/// Number of bytes in a header without options.
pub const BASE_HEADER_LEN: usize = BASE_HEADER_WORDS as usize * 4;
/// IP protocol number for TCP (pseudo-header).
const PROTO_TCP: u8 = 6;
/// Byte offset of the checksum field inside the header.
const CHECKSUM_OFFSET: usize = 16;

/// Control bits of a TCP header.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const FIN: Flags = Flags(0x01);
    pub const SYN: Flags = Flags(0x02);
    pub const RST: Flags = Flags(0x04);
    pub const PSH: Flags = Flags(0x08);
    pub const ACK: Flags = Flags(0x10);
    pub const URG: Flags = Flags(0x20);

    pub const fn from_bits(bits: u8) -> Flags {
        Flags(bits & 0x3f)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    pub const fn ack(self) -> bool {
        self.contains(Flags::ACK)
    }

    pub const fn fin(self) -> bool {
        self.contains(Flags::FIN)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 6] = [
            (Flags::SYN, "SYN"),
            (Flags::ACK, "ACK"),
            (Flags::FIN, "FIN"),
            (Flags::RST, "RST"),
            (Flags::PSH, "PSH"),
            (Flags::URG, "URG"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Errors produced while decoding a header.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SegmentError {
    #[error("segment of {len} bytes is too short for a TCP header")]
    TooShort { len: usize },
    #[error("data offset of {offset} words is invalid for a {len}-byte segment")]
    BadDataOffset { offset: u8, len: usize },
}

/// The fixed TCP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    pub flags: Flags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// Header without options, zero checksum and a zero window.
    pub fn new(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: Flags) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            data_offset: BASE_HEADER_WORDS,
            flags,
            window: 0,
            checksum: 0,
            urgent: 0,
        }
    }

    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// Header length in bytes; the payload starts right after it.
    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    /// Parses the header at the start of `raw`. Options, if any, are skipped
    /// via the data offset; the checksum is not verified here.
    pub fn decode(raw: &[u8]) -> Result<Self, SegmentError> {
        if raw.len() < BASE_HEADER_LEN {
            return Err(SegmentError::TooShort { len: raw.len() });
        }
        let be16 = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
        let be32 = |i: usize| u32::from_be_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);

        let data_offset = raw[12] >> 4;
        let header_len = data_offset as usize * 4;
        if data_offset < BASE_HEADER_WORDS || header_len > raw.len() {
            return Err(SegmentError::BadDataOffset {
                offset: data_offset,
                len: raw.len(),
            });
        }

        Ok(Self {
            src_port: be16(0),
            dst_port: be16(2),
            seq: be32(4),
            ack: be32(8),
            data_offset,
            flags: Flags::from_bits(raw[13]),
            window: be16(14),
            checksum: be16(CHECKSUM_OFFSET),
            urgent: be16(18),
        })
    }

    /// Serialises the fixed 20-byte header (options are never emitted).
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.ack.to_be_bytes());
        out.push(BASE_HEADER_WORDS << 4);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.window.to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.urgent.to_be_bytes());
    }
}

fn sum_words(mut acc: u64, bytes: &[u8]) -> u64 {
    let mut chunks = bytes.chunks_exact(2);
    for w in &mut chunks {
        acc += u16::from_be_bytes([w[0], w[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        acc += u16::from_be_bytes([*last, 0]) as u64;
    }
    acc
}

/// Ones' complement checksum over pseudo-header + `segment`.
///
/// Over a segment whose checksum field is already correct the result is 0.
pub fn calc_checksum(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = PROTO_TCP;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    let mut acc = sum_words(0, &pseudo);
    acc = sum_words(acc, segment);
    while acc >> 16 != 0 {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    !(acc as u16)
}

/// Zeroes the checksum field, computes the checksum and writes it back.
pub fn fix_checksum(mut segment: Vec<u8>, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    if segment.len() < BASE_HEADER_LEN {
        return segment;
    }
    segment[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].fill(0);
    let sum = calc_checksum(&segment, src, dst);
    segment[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    segment
}

pub fn verify_checksum(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> bool {
    calc_checksum(segment, src, dst) == 0
}

/// Encodes `header` + `payload` and fixes up the checksum for `src -> dst`.
pub fn build_segment(header: &TcpHeader, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let mut out = Vec::with_capacity(BASE_HEADER_LEN + payload.len());
    header.encode(&mut out);
    out.extend_from_slice(payload);
    fix_checksum(out, src, dst)
}
