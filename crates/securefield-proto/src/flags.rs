//! Bit flags for envelopes and field state.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Envelope header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EnvelopeFlags: u8 {
        /// Envelope travels from the host into a frame.
        const HOST_TO_FRAME = 0b0000_0001;
    }
}

bitflags! {
    /// Observable input state of one field, as reported by its frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FieldFlags: u8 {
        /// The input holds at least one character.
        const FILLED = 0b0000_0001;
        /// The input passed the frame's own validation.
        const VALID = 0b0000_0010;
        /// The input currently has focus.
        const FOCUSED = 0b0000_0100;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_flags_toggle_independently() {
        let mut flags = FieldFlags::empty();
        flags.set(FieldFlags::FILLED, true);
        flags.set(FieldFlags::VALID, true);
        flags.set(FieldFlags::FILLED, false);

        assert!(!flags.contains(FieldFlags::FILLED));
        assert!(flags.contains(FieldFlags::VALID));
        assert!(!flags.contains(FieldFlags::FOCUSED));
    }

    #[test]
    fn unknown_envelope_bits_are_dropped() {
        assert_eq!(EnvelopeFlags::from_bits_truncate(0xFF), EnvelopeFlags::HOST_TO_FRAME);
    }
}
