//! Veilstore wire protocol
//!
//! Every frame starts with a fixed ASCII token naming the message kind,
//! followed (for payload-carrying kinds) by a newline and a bincode body.
//! Frames travel inside length-delimited envelopes (see [`crate::framing`]),
//! so no read ever relies on socket EOF. Incoming bytes are parsed exactly
//! once, at this boundary, into the closed [`Message`] enum.

use crate::error::{NetworkError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire tokens, fixed ASCII tags
pub const REQUEST_UPLOAD: &str = "REQUEST_UPLOAD";
pub const UPLOAD_APPROVED: &str = "UPLOAD_APPROVED";
pub const UPLOAD_DENIED: &str = "UPLOAD_DENIED";
pub const SHARE_DATA: &str = "SHARE_DATA";
pub const UPLOADED_SUCCESS: &str = "UPLOADED_SUCCESS";
pub const UPLOADED_FAILED: &str = "UPLOADED_FAILED";
pub const REQUEST_FILE: &str = "REQUEST_FILE";
pub const FILE_LIST: &str = "FILE_LIST";
pub const PIR_QUERY: &str = "PIR_QUERY";
pub const PIR_RESPONSE: &str = "PIR_RESPONSE";
pub const QUERY_REJECTED: &str = "QUERY_REJECTED";

/// Share naming convention: `"<file>_part<index>"`
pub fn share_name(stem: &str, part: u32) -> String {
    format!("{stem}_part{part}")
}

/// A share being uploaded to a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePayload {
    /// Unique name on the receiving store
    pub name: String,
    /// Raw share bytes, one block
    pub data: Vec<u8>,
}

/// The responder's name-list snapshot for a lookup round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListPayload {
    /// Stored names in the store's stable order
    pub names: Vec<String>,
}

/// The requester's encrypted selector vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirQueryPayload {
    /// One opaque ciphertext per listed name, in list order
    pub selector: Vec<Vec<u8>>,
    /// The requester's public key (big-endian modulus bytes)
    pub public_key: Vec<u8>,
}

/// The responder's accumulated ciphertexts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirResponsePayload {
    /// One ciphertext per share sub-chunk, in chunk order
    pub chunks: Vec<Vec<u8>>,
}

/// Closed set of protocol messages
#[derive(Debug, Clone)]
pub enum Message {
    RequestUpload,
    UploadApproved,
    UploadDenied,
    ShareData(SharePayload),
    UploadedSuccess,
    UploadedFailed,
    RequestFile,
    FileList(FileListPayload),
    PirQuery(PirQueryPayload),
    PirResponse(PirResponsePayload),
    QueryRejected(String),
}

impl Message {
    /// The wire token for this message kind
    pub fn token(&self) -> &'static str {
        match self {
            Message::RequestUpload => REQUEST_UPLOAD,
            Message::UploadApproved => UPLOAD_APPROVED,
            Message::UploadDenied => UPLOAD_DENIED,
            Message::ShareData(_) => SHARE_DATA,
            Message::UploadedSuccess => UPLOADED_SUCCESS,
            Message::UploadedFailed => UPLOADED_FAILED,
            Message::RequestFile => REQUEST_FILE,
            Message::FileList(_) => FILE_LIST,
            Message::PirQuery(_) => PIR_QUERY,
            Message::PirResponse(_) => PIR_RESPONSE,
            Message::QueryRejected(_) => QUERY_REJECTED,
        }
    }

    /// Encode into frame bytes: token, then `\n` + bincode body if any
    pub fn encode(&self) -> Result<Bytes> {
        let mut frame = self.token().as_bytes().to_vec();
        let body = match self {
            Message::ShareData(payload) => Some(serialize(payload)?),
            Message::FileList(payload) => Some(serialize(payload)?),
            Message::PirQuery(payload) => Some(serialize(payload)?),
            Message::PirResponse(payload) => Some(serialize(payload)?),
            Message::QueryRejected(reason) => Some(serialize(reason)?),
            _ => None,
        };
        if let Some(body) = body {
            frame.push(b'\n');
            frame.extend_from_slice(&body);
        }
        Ok(Bytes::from(frame))
    }

    /// Decode one frame; the single place raw bytes become a message
    pub fn decode(frame: &[u8]) -> Result<Message> {
        let (token, body) = match frame.iter().position(|&b| b == b'\n') {
            Some(split) => (&frame[..split], &frame[split + 1..]),
            None => (frame, &[][..]),
        };
        let token = std::str::from_utf8(token)
            .map_err(|_| NetworkError::MalformedFrame("non-UTF8 token".to_string()))?;

        match token {
            REQUEST_UPLOAD => Ok(Message::RequestUpload),
            UPLOAD_APPROVED => Ok(Message::UploadApproved),
            UPLOAD_DENIED => Ok(Message::UploadDenied),
            UPLOADED_SUCCESS => Ok(Message::UploadedSuccess),
            UPLOADED_FAILED => Ok(Message::UploadedFailed),
            REQUEST_FILE => Ok(Message::RequestFile),
            SHARE_DATA => Ok(Message::ShareData(deserialize(body)?)),
            FILE_LIST => Ok(Message::FileList(deserialize(body)?)),
            PIR_QUERY => Ok(Message::PirQuery(deserialize(body)?)),
            PIR_RESPONSE => Ok(Message::PirResponse(deserialize(body)?)),
            QUERY_REJECTED => Ok(Message::QueryRejected(deserialize(body)?)),
            other => Err(NetworkError::MalformedFrame(format!(
                "unknown token: {other:?}"
            ))),
        }
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| NetworkError::MalformedFrame(e.to_string()))
}

fn deserialize<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    bincode::deserialize(body).map_err(|e| NetworkError::MalformedFrame(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) -> Message {
        Message::decode(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_bare_token_roundtrip() {
        for message in [
            Message::RequestUpload,
            Message::UploadApproved,
            Message::UploadDenied,
            Message::UploadedSuccess,
            Message::UploadedFailed,
            Message::RequestFile,
        ] {
            let token = message.token();
            assert_eq!(roundtrip(message).token(), token);
        }
    }

    #[test]
    fn test_share_data_roundtrip() {
        let decoded = roundtrip(Message::ShareData(SharePayload {
            name: "report_part3".to_string(),
            data: vec![1, 2, 3, 10, 255],
        }));
        match decoded {
            Message::ShareData(payload) => {
                assert_eq!(payload.name, "report_part3");
                // Payload bytes survive even when they contain newlines
                assert_eq!(payload.data, vec![1, 2, 3, 10, 255]);
            }
            other => panic!("wrong message: {}", other.token()),
        }
    }

    #[test]
    fn test_pir_query_roundtrip() {
        let decoded = roundtrip(Message::PirQuery(PirQueryPayload {
            selector: vec![vec![9u8; 64], vec![8u8; 64]],
            public_key: vec![7u8; 32],
        }));
        match decoded {
            Message::PirQuery(payload) => {
                assert_eq!(payload.selector.len(), 2);
                assert_eq!(payload.public_key.len(), 32);
            }
            other => panic!("wrong message: {}", other.token()),
        }
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(matches!(
            Message::decode(b"REQUEST_EVERYTHING"),
            Err(NetworkError::MalformedFrame(_))
        ));
        assert!(matches!(
            Message::decode(&[0xFF, 0xFE]),
            Err(NetworkError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let mut frame = SHARE_DATA.as_bytes().to_vec();
        frame.push(b'\n');
        frame.extend_from_slice(&[1, 2]);
        assert!(matches!(
            Message::decode(&frame),
            Err(NetworkError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_share_name_convention() {
        assert_eq!(share_name("budget.xlsx", 4), "budget.xlsx_part4");
    }
}
