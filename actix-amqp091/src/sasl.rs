use amqp091_codec::types::FieldValue;
use amqp091_codec::{AmqpCodecError, Buffer, Encode};
use bytes::Bytes;
use bytestring::ByteString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Sasl mechanism used in `connection.start-ok`
pub enum SaslMechanism {
    /// RabbitMQ field table login, the default
    AmqPlain,
    Plain,
    Anonymous,
}

impl Default for SaslMechanism {
    fn default() -> Self {
        SaslMechanism::AmqPlain
    }
}

impl SaslMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::AmqPlain => "AMQPLAIN",
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::Anonymous => "ANONYMOUS",
        }
    }

    /// Check space separated mechanism list from `connection.start`
    pub fn is_offered(&self, mechanisms: &[u8]) -> bool {
        let name = self.name().as_bytes();
        mechanisms
            .split(|b| *b == b' ')
            .any(|m| m == name)
    }

    /// Build `start-ok` response blob.
    pub fn response(&self, user: &str, password: &str) -> Result<Bytes, AmqpCodecError> {
        match self {
            SaslMechanism::AmqPlain => {
                // field table entries without the table length prefix
                let mut buf = Buffer::new();
                ByteString::from_static("LOGIN").encode(&mut buf)?;
                FieldValue::from(user).encode(&mut buf)?;
                ByteString::from_static("PASSWORD").encode(&mut buf)?;
                FieldValue::from(password).encode(&mut buf)?;
                Ok(buf.freeze())
            }
            SaslMechanism::Plain => {
                let mut buf = Buffer::with_capacity(user.len() + password.len() + 2);
                buf.append(b"\x00")
                    .append(user.as_bytes())
                    .append(b"\x00")
                    .append(password.as_bytes());
                Ok(buf.freeze())
            }
            SaslMechanism::Anonymous => Ok(Bytes::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amqplain() {
        let resp = SaslMechanism::AmqPlain.response("guest", "pass").unwrap();
        assert_eq!(
            resp,
            &b"\x05LOGINS\x00\x00\x00\x05guest\x08PASSWORDS\x00\x00\x00\x04pass"[..]
        );
    }

    #[test]
    fn test_plain() {
        let resp = SaslMechanism::Plain.response("guest", "guest").unwrap();
        assert_eq!(resp, &b"\x00guest\x00guest"[..]);
        assert!(SaslMechanism::Anonymous
            .response("guest", "guest")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_offered() {
        assert!(SaslMechanism::Plain.is_offered(b"AMQPLAIN PLAIN"));
        assert!(SaslMechanism::AmqPlain.is_offered(b"AMQPLAIN PLAIN"));
        assert!(!SaslMechanism::Anonymous.is_offered(b"AMQPLAIN PLAIN"));
        assert!(!SaslMechanism::Plain.is_offered(b"PLAINTEXT"));
    }
}
