//! RTMP protocol-level constants, grounded on
//! `whisperstreamlib/rtmp/rtmp_protocol.h`'s `rtmp::Protocol` constant set.

/// Handshake packet size (C1/S1/C2/S2), fixed by the RTMP spec.
pub const HANDSHAKE_SIZE: usize = 1536;

/// Version byte sent as C0/S0. Lenient servers (this one included) accept
/// anything `>= 3`.
pub const RTMP_VERSION: u8 = 3;

/// Default chunk size before any `Set Chunk Size` message negotiates a
/// larger one.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Upper bound on a negotiated chunk size (`kMaxChunkSize` in the original).
pub const MAX_CHUNK_SIZE: usize = 65536;

/// Reserved low-numbered chunk stream ids, mirroring `Protocol::k*Channel`.
pub const CS_ID_PROTOCOL_CONTROL: u32 = 2;
pub const CS_ID_COMMAND: u32 = 3;
pub const CS_ID_METADATA: u32 = 5;
pub const CS_ID_AUDIO: u32 = 6;
pub const CS_ID_VIDEO: u32 = 7;

/// Well-known AMF0 command method names (`rtmp::kMethod*`).
pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_CREATE_STREAM: &str = "createStream";
pub const METHOD_DELETE_STREAM: &str = "deleteStream";
pub const METHOD_ERROR: &str = "_error";
pub const METHOD_RESULT: &str = "_result";
pub const METHOD_PUBLISH: &str = "publish";
pub const METHOD_UNPUBLISH: &str = "unpublish";
pub const METHOD_PLAY: &str = "play";
pub const METHOD_PAUSE: &str = "pause";
pub const METHOD_SEEK: &str = "seek";
pub const METHOD_ON_STATUS: &str = "onStatus";
pub const METHOD_ON_METADATA: &str = "onMetaData";
