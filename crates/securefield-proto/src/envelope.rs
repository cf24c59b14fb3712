//! Header + payload framing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    EnvelopeHeader, FieldName, FieldPayload, HostPayload, Payload, ProtocolError, Result,
};

/// One message about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<P> {
    /// Field the message concerns.
    pub field: FieldName,
    /// Per-channel sequence number, assigned by the sender.
    pub sequence: u32,
    /// Typed body.
    pub payload: P,
}

/// Frame → host message.
pub type FieldMessage = Envelope<FieldPayload>;

/// Host → frame message.
pub type HostRequest = Envelope<HostPayload>;

impl<P: Payload> Envelope<P> {
    /// Create an envelope.
    pub fn new(field: FieldName, sequence: u32, payload: P) -> Self {
        Self { field, sequence, payload }
    }

    /// Serialize header and payload into one buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = Vec::new();
        self.payload.encode_body(&mut body)?;

        if body.len() > EnvelopeHeader::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: body.len(),
                max: EnvelopeHeader::MAX_PAYLOAD_SIZE,
            });
        }

        let mut header = EnvelopeHeader::new(self.payload.opcode(), self.field, self.sequence);
        header.set_payload_size(body.len() as u32);

        let mut out = BytesMut::with_capacity(EnvelopeHeader::SIZE + body.len());
        out.put_slice(&header.to_bytes());
        out.put_slice(&body);
        Ok(out.freeze())
    }

    /// Parse an envelope, validating the header before touching the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, body) = EnvelopeHeader::parse(bytes)?;

        let declared = header.payload_size();
        if body.len() != declared {
            return Err(ProtocolError::LengthMismatch { declared, actual: body.len() });
        }

        let payload = P::decode_body(header.opcode()?, body)?;
        Ok(Self { field: header.field()?, sequence: header.sequence(), payload })
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{EncryptedToken, FieldPolicy, payloads::PolicyUpdate};

    #[test]
    fn field_message_survives_encoding() {
        let message = FieldMessage::new(
            FieldName::EncryptedSecurityCode,
            42,
            FieldPayload::encrypted(Some(3), EncryptedToken::new("sf1$abc")),
        );

        let bytes = message.encode().unwrap();
        assert_eq!(FieldMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn host_message_cannot_decode_as_field_message() {
        let request = HostRequest::new(
            FieldName::EncryptedCardNumber,
            0,
            HostPayload::ApplyPolicy(PolicyUpdate { policy: FieldPolicy::Optional }),
        );
        let bytes = request.encode().unwrap();

        assert!(matches!(FieldMessage::decode(&bytes), Err(ProtocolError::WrongDirection(_))));
        assert_eq!(HostRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn trailing_garbage_rejected() {
        let message = FieldMessage::new(FieldName::HolderName, 1, FieldPayload::filled(true));
        let mut bytes = message.encode().unwrap().to_vec();
        bytes.push(0xFF);

        let err = FieldMessage::decode(&bytes).unwrap_err();
        assert_snapshot!(err, @"payload length mismatch: header declares 9, got 10");
    }

    #[test]
    fn truncated_payload_rejected() {
        let message = FieldMessage::new(FieldName::HolderName, 1, FieldPayload::focused(true));
        let bytes = message.encode().unwrap();

        let err = FieldMessage::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::LengthMismatch { .. }));
    }
}
