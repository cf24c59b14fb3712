//! Fixed-size envelope header.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U32},
};

use crate::{EnvelopeFlags, FieldName, Opcode, ProtocolError, Result};

/// 16-byte envelope header.
///
/// ```text
/// 0      4   5   6   7   8          12         16
/// ┌──────┬───┬───┬───┬───┬──────────┬──────────┐
/// │ SFLD │ver│op │fld│flg│ sequence │ pay. len │
/// └──────┴───┴───┴───┴───┴──────────┴──────────┘
/// ```
///
/// Multi-byte integers are big-endian.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct EnvelopeHeader {
    magic: [u8; 4],
    version: u8,
    opcode: u8,
    field: u8,
    flags: u8,
    sequence: U32<BigEndian>,
    payload_size: U32<BigEndian>,
}

const _: () = assert!(std::mem::size_of::<EnvelopeHeader>() == EnvelopeHeader::SIZE);

impl EnvelopeHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;
    /// Magic prefix.
    pub const MAGIC: [u8; 4] = *b"SFLD";
    /// Current protocol version.
    pub const VERSION: u8 = 1;
    /// Largest payload accepted in either direction.
    pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

    /// Build a header for a message about `field`.
    pub fn new(opcode: Opcode, field: FieldName, sequence: u32) -> Self {
        let flags =
            if opcode.is_inbound() { EnvelopeFlags::empty() } else { EnvelopeFlags::HOST_TO_FRAME };

        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            opcode: opcode.to_u8(),
            field: field.wire_id(),
            flags: flags.bits(),
            sequence: U32::new(sequence),
            payload_size: U32::new(0),
        }
    }

    /// Parse and validate a header from the front of `bytes`.
    ///
    /// Returns the header and the bytes that follow it.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = Self::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::Truncated { needed: Self::SIZE, available: bytes.len() }
        })?;

        if header.magic != Self::MAGIC {
            return Err(ProtocolError::BadMagic(header.magic));
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let opcode = header.opcode()?;
        let inbound_flag = !header.flags().contains(EnvelopeFlags::HOST_TO_FRAME);
        if opcode.is_inbound() != inbound_flag {
            return Err(ProtocolError::WrongDirection(opcode));
        }

        header.field()?;

        let size = header.payload_size();
        if size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size, max: Self::MAX_PAYLOAD_SIZE });
        }

        Ok((header, rest))
    }

    /// Header bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Message opcode.
    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::from_u8(self.opcode).ok_or(ProtocolError::UnknownOpcode(self.opcode))
    }

    /// Field the message concerns.
    pub fn field(&self) -> Result<FieldName> {
        FieldName::from_wire_id(self.field)
    }

    /// Direction and reserved bits.
    pub fn flags(&self) -> EnvelopeFlags {
        EnvelopeFlags::from_bits_truncate(self.flags)
    }

    /// Per-channel sequence number.
    pub fn sequence(&self) -> u32 {
        self.sequence.get()
    }

    /// Declared payload length.
    pub fn payload_size(&self) -> usize {
        self.payload_size.get() as usize
    }

    /// Set the declared payload length.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = U32::new(size);
    }
}
