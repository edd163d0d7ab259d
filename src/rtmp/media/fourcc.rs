//! Codec FourCCs used by Enhanced RTMP's `VideoPacketType`/`AudioPacketType`
//! extensions (E-RTMP v2, "FourCC Usage").

/// Video codec identifiers carried in an Enhanced RTMP `ExVideoTagHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFourCc {
    Avc,
    Hevc,
    Av1,
    Vp9,
    Vp8,
}

/// Audio codec identifiers carried in an Enhanced RTMP `ExAudioTagHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFourCc {
    Aac,
    Opus,
    Mp3,
    Ac3,
    Eac3,
    Flac,
}
