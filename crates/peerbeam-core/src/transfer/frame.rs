//! Data channel framing.
//!
//! | Frame | Message | Direction |
//! |-------|---------|-----------|
//! | metadata | text `{"type":"metadata","name":..,"size":..,"mimeType":..}` | sender -> receiver, once, first |
//! | chunk | binary, raw file bytes | sender -> receiver, in order |
//! | ack | text `ACK` | receiver -> sender, once, last |

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::file::FileMetadata;
use crate::transport::ChannelMessage;

/// Literal text of the completion acknowledgement.
pub const ACK: &str = "ACK";

/// A decoded data channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// File announcement
    Metadata(FileMetadata),
    /// Receiver holds the whole file
    Ack,
    /// Raw file bytes
    Chunk(Bytes),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlFrame {
    Metadata(FileMetadata),
}

impl Frame {
    /// Encode into a channel message.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the metadata cannot be encoded.
    pub fn encode(&self) -> Result<ChannelMessage> {
        Ok(match self {
            Self::Metadata(meta) => {
                ChannelMessage::Text(serde_json::to_string(&ControlFrame::Metadata(meta.clone()))?)
            }
            Self::Ack => ChannelMessage::Text(ACK.to_string()),
            Self::Chunk(data) => ChannelMessage::Binary(data.clone()),
        })
    }

    /// Decode a channel message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for text that is neither `ACK` nor a
    /// metadata frame.
    pub fn decode(message: ChannelMessage) -> Result<Self> {
        match message {
            ChannelMessage::Binary(data) => Ok(Self::Chunk(data)),
            ChannelMessage::Text(text) if text == ACK => Ok(Self::Ack),
            ChannelMessage::Text(text) => match serde_json::from_str::<ControlFrame>(&text) {
                Ok(ControlFrame::Metadata(meta)) => Ok(Self::Metadata(meta)),
                Err(e) => Err(Error::Protocol(format!("unrecognized control frame: {e}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FileMetadata {
        FileMetadata {
            name: "report.pdf".into(),
            size: 130_000,
            mime_type: "application/pdf".into(),
        }
    }

    #[test]
    fn test_metadata_wire_format() {
        let ChannelMessage::Text(text) = Frame::Metadata(meta()).encode().unwrap() else {
            panic!("metadata must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "metadata",
                "name": "report.pdf",
                "size": 130_000,
                "mimeType": "application/pdf"
            })
        );
    }

    #[test]
    fn test_decode_browser_metadata() {
        let text = r#"{"type":"metadata","name":"a.txt","size":3,"mimeType":"text/plain"}"#;
        let frame = Frame::decode(ChannelMessage::Text(text.into())).unwrap();
        assert_eq!(
            frame,
            Frame::Metadata(FileMetadata {
                name: "a.txt".into(),
                size: 3,
                mime_type: "text/plain".into(),
            })
        );
    }

    #[test]
    fn test_ack_and_chunk() {
        assert_eq!(
            Frame::Ack.encode().unwrap(),
            ChannelMessage::Text("ACK".into())
        );
        assert_eq!(
            Frame::decode(ChannelMessage::Text("ACK".into())).unwrap(),
            Frame::Ack
        );

        let data = Bytes::from_static(b"\x00\x01\x02");
        assert_eq!(
            Frame::decode(ChannelMessage::Binary(data.clone())).unwrap(),
            Frame::Chunk(data)
        );
    }

    #[test]
    fn test_unknown_text_is_protocol_error() {
        for text in ["ack", "hello", r#"{"type":"chunk"}"#] {
            let err = Frame::decode(ChannelMessage::Text(text.into())).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)), "{text}");
        }
    }
}
