//! Message opcodes.

/// Message type carried in the envelope header.
///
/// `0x01..=0x1F` travel frame → host, `0x20..=0x3F` travel host → frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Frame validity flipped.
    FieldValidChange = 0x01,
    /// Frame input became empty or non-empty.
    FieldFilledChange = 0x02,
    /// Frame input gained or lost focus.
    FieldFocusChange = 0x03,
    /// Frame produced an encrypted token.
    FieldEncryptedData = 0x04,
    /// Frame set or cleared its error code.
    FieldError = 0x05,
    /// Card-number frame detected (or lost) a brand.
    FieldBrand = 0x06,
    /// Frame cleared its input after a host reset.
    FieldResetAck = 0x07,

    /// Host asks the frame to encrypt its current value.
    RequestEncryption = 0x20,
    /// Host tells the frame its requirement policy.
    ApplyPolicy = 0x21,
    /// Host asks the frame to clear its input.
    Reset = 0x22,
}

impl Opcode {
    /// Decode an opcode byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::FieldValidChange),
            0x02 => Some(Self::FieldFilledChange),
            0x03 => Some(Self::FieldFocusChange),
            0x04 => Some(Self::FieldEncryptedData),
            0x05 => Some(Self::FieldError),
            0x06 => Some(Self::FieldBrand),
            0x07 => Some(Self::FieldResetAck),
            0x20 => Some(Self::RequestEncryption),
            0x21 => Some(Self::ApplyPolicy),
            0x22 => Some(Self::Reset),
            _ => None,
        }
    }

    /// Encode to the header byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// True when the opcode travels frame → host.
    pub const fn is_inbound(self) -> bool {
        (self as u8) < 0x20
    }

    /// Protocol name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FieldValidChange => "FIELD_VALID_CHANGE",
            Self::FieldFilledChange => "FIELD_FILLED_CHANGE",
            Self::FieldFocusChange => "FIELD_FOCUS_CHANGE",
            Self::FieldEncryptedData => "FIELD_ENCRYPTED_DATA",
            Self::FieldError => "FIELD_ERROR",
            Self::FieldBrand => "FIELD_BRAND",
            Self::FieldResetAck => "FIELD_RESET_ACK",
            Self::RequestEncryption => "REQUEST_ENCRYPTION",
            Self::ApplyPolicy => "APPLY_POLICY",
            Self::Reset => "RESET",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte);
            }
        }
    }

    #[test]
    fn direction_split() {
        assert!(Opcode::FieldEncryptedData.is_inbound());
        assert!(Opcode::FieldBrand.is_inbound());
        assert!(Opcode::FieldResetAck.is_inbound());
        assert!(!Opcode::RequestEncryption.is_inbound());
        assert!(!Opcode::Reset.is_inbound());
    }
}
