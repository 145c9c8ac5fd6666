//! Per-stream-type packet body parsing.
//!
//! After the 16-bit sequence number, every audio packet carries a
//! stream-properties block followed by the audio payload. Both are specific
//! to the stream type and codec, so the inbound stream delegates them to a
//! [`StreamFormat`] chosen when the stream is created.
//!
//! [`PcmFormat`] is the built-in format: a little-endian `u16` sample count
//! followed by little-endian `i16` samples.

use crate::audio::AudioSample;

/// Audio packet types understood by the inbound path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    MixedAudio = 1,
    MicrophoneAudio = 2,
    InjectedAudio = 3,
    /// Carries only a sample count; the receiver synthesizes the silence.
    SilentAudioFrame = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::MixedAudio),
            2 => Ok(PacketType::MicrophoneAudio),
            3 => Ok(PacketType::InjectedAudio),
            4 => Ok(PacketType::SilentAudioFrame),
            other => anyhow::bail!("Unknown audio packet type {}", other),
        }
    }
}

/// Result of parsing the stream-properties block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProperties {
    pub bytes_read: usize,
    /// Samples of audio this packet represents, all channels included.
    pub num_audio_samples: usize,
}

/// Destination for decoded audio.
pub trait AudioSink<Sample> {
    /// Appends decoded samples. Returns how many were stored.
    fn write_samples(&mut self, samples: &[Sample]) -> usize;

    /// Appends `len` samples of synthesized silence, which the sink may
    /// partly drop to shrink its latency. Returns how many were stored.
    fn write_silent_samples(&mut self, len: usize) -> usize;
}

/// Codec and property parsing for one stream type.
pub trait StreamFormat<Sample>: Send + Sync {
    /// Parses the properties block at the start of `data`.
    fn parse_stream_properties(&mut self, packet_type: PacketType, data: &[u8])
    -> StreamProperties;

    /// Decodes the payload at the start of `data` into `sink`.
    /// Returns the number of bytes consumed.
    fn parse_audio_data(
        &mut self,
        packet_type: PacketType,
        data: &[u8],
        num_audio_samples: usize,
        sink: &mut dyn AudioSink<Sample>,
    ) -> usize;
}

const PCM_PROPERTIES_LEN: usize = 2;
const PCM_BYTES_PER_SAMPLE: usize = 2;

/// Uncompressed 16-bit PCM.
pub struct PcmFormat<Sample> {
    decoded: Vec<Sample>,
}

impl<Sample: AudioSample> PcmFormat<Sample> {
    /// `max_packet_samples` sizes the decode scratch so steady-state decoding
    /// does not allocate.
    pub fn new(max_packet_samples: usize) -> Self {
        Self {
            decoded: Vec::with_capacity(max_packet_samples),
        }
    }
}

impl<Sample: AudioSample> StreamFormat<Sample> for PcmFormat<Sample> {
    fn parse_stream_properties(
        &mut self,
        _packet_type: PacketType,
        data: &[u8],
    ) -> StreamProperties {
        let Some(count) = data.get(..PCM_PROPERTIES_LEN) else {
            return StreamProperties::default();
        };
        StreamProperties {
            bytes_read: PCM_PROPERTIES_LEN,
            num_audio_samples: u16::from_le_bytes([count[0], count[1]]) as usize,
        }
    }

    fn parse_audio_data(
        &mut self,
        packet_type: PacketType,
        data: &[u8],
        num_audio_samples: usize,
        sink: &mut dyn AudioSink<Sample>,
    ) -> usize {
        if packet_type == PacketType::SilentAudioFrame {
            sink.write_silent_samples(num_audio_samples);
            return 0;
        }

        let available = data.len() / PCM_BYTES_PER_SAMPLE;
        let count = num_audio_samples.min(available);

        self.decoded.clear();
        self.decoded.extend(
            data[..count * PCM_BYTES_PER_SAMPLE]
                .chunks_exact(PCM_BYTES_PER_SAMPLE)
                .map(|bytes| Sample::from_wire_i16(i16::from_le_bytes([bytes[0], bytes[1]]))),
        );
        sink.write_samples(&self.decoded);

        count * PCM_BYTES_PER_SAMPLE
    }
}

/// Encodes the body of a PCM audio packet: sequence number, sample count and
/// samples.
pub fn encode_pcm_body(sequence: u16, samples: &[i16], out: &mut Vec<u8>) {
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&(samples.len() as u16).to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Encodes the body of a silent frame packet carrying only a sample count.
pub fn encode_silent_body(sequence: u16, num_samples: u16, out: &mut Vec<u8>) {
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&num_samples.to_le_bytes());
}
