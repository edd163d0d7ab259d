//! Decoded RTMP message shapes (spec §4.7's event list), sitting above the
//! raw chunk layer. One [`Event`] is exactly one complete, reassembled
//! RTMP message body plus its timestamp/chunk-stream id.

use bytes::Bytes;

use crate::rtmp::protocol::message::Command;

/// RTMP message type ids, standard across RTMP 1.0 implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTypeId {
    SetChunkSize,
    AbortMessage,
    Acknowledgement,
    UserControl,
    WindowAckSize,
    SetPeerBandwidth,
    Audio,
    Video,
    DataAmf3,
    SharedObjectAmf3,
    CommandAmf3,
    DataAmf0,
    SharedObjectAmf0,
    CommandAmf0,
    Aggregate,
}

impl MessageTypeId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::SetChunkSize,
            2 => Self::AbortMessage,
            3 => Self::Acknowledgement,
            4 => Self::UserControl,
            5 => Self::WindowAckSize,
            6 => Self::SetPeerBandwidth,
            8 => Self::Audio,
            9 => Self::Video,
            15 => Self::DataAmf3,
            16 => Self::SharedObjectAmf3,
            17 => Self::CommandAmf3,
            18 => Self::DataAmf0,
            19 => Self::SharedObjectAmf0,
            20 => Self::CommandAmf0,
            22 => Self::Aggregate,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::SetChunkSize => 1,
            Self::AbortMessage => 2,
            Self::Acknowledgement => 3,
            Self::UserControl => 4,
            Self::WindowAckSize => 5,
            Self::SetPeerBandwidth => 6,
            Self::Audio => 8,
            Self::Video => 9,
            Self::DataAmf3 => 15,
            Self::SharedObjectAmf3 => 16,
            Self::CommandAmf3 => 17,
            Self::DataAmf0 => 18,
            Self::SharedObjectAmf0 => 19,
            Self::CommandAmf0 => 20,
            Self::Aggregate => 22,
        }
    }
}

/// One reassembled RTMP message, recognized exactly per spec §4.7's event
/// list: command invocations (AMF0/AMF3), metadata, audio/video payloads,
/// and the protocol-control messages that manage the chunk stream itself.
#[derive(Debug, Clone)]
pub enum Event {
    Command { chunk_stream_id: u32, message_stream_id: u32, command: Command },
    Metadata { message_stream_id: u32, timestamp_ms: u32, values: Vec<crate::rtmp::amf::AmfValue> },
    Audio { message_stream_id: u32, timestamp_ms: u32, data: Bytes },
    Video { message_stream_id: u32, timestamp_ms: u32, data: Bytes },
    SetChunkSize(u32),
    WindowAckSize(u32),
    SetPeerBandwidth { window_size: u32, limit_type: u8 },
    UserControl { event_type: u16, data: Bytes },
    Acknowledgement(u32),
    Aggregate { message_stream_id: u32, timestamp_ms: u32, data: Bytes },
}
