//! The boundary to the generative services.
//!
//! Every call returns `anyhow::Result<CallOutcome<T>>`. The three outcome
//! variants are the only signals the retry layer reacts to; anything in the
//! `Err` arm is passed through untouched.

pub mod gemini;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::credentials::Credential;
use crate::model::ContentPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Plan,
    Speech,
    Image,
    Music,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallKind::Plan => "plan",
            CallKind::Speech => "speech",
            CallKind::Image => "image",
            CallKind::Music => "music",
        })
    }
}

#[derive(Debug)]
pub enum CallOutcome<T> {
    Ready(T),
    /// The credential hit its rate or usage limit.
    QuotaExhausted(String),
    /// The call completed but carried nothing usable.
    EmptyContent(String),
}

/// Lets the retry layer treat a technically successful but empty payload as empty content.
pub trait Payload {
    fn is_empty_payload(&self) -> bool;
}

impl Payload for ContentPlan {
    fn is_empty_payload(&self) -> bool {
        self.word_pairs.is_empty()
    }
}

impl Payload for Vec<u8> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

/// Signed 16-bit little-endian PCM as returned by the speech model.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.channels) / f64::from(self.sample_rate)
    }
}

impl Payload for PcmAudio {
    fn is_empty_payload(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Raw interleaved PCM chunks from the streaming music model.
pub type AudioChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<Vec<u8>>> + Send>>;

// A stream cannot be inspected without polling it; callers wait for the first chunk instead.
impl Payload for AudioChunkStream {
    fn is_empty_payload(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub prompt: String,
    pub system_instruction: String,
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, Clone)]
pub struct MusicRequest {
    pub prompt: String,
    pub bpm: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn plan(
        &self,
        key: &Credential,
        request: &PlanRequest,
    ) -> anyhow::Result<CallOutcome<ContentPlan>>;

    async fn speech(
        &self,
        key: &Credential,
        request: &SpeechRequest,
    ) -> anyhow::Result<CallOutcome<PcmAudio>>;

    async fn image(&self, key: &Credential, prompt: &str) -> anyhow::Result<CallOutcome<Vec<u8>>>;

    /// Opens a music session. Chunks are stereo 16-bit 48 kHz PCM; dropping the stream ends it.
    async fn music(
        &self,
        key: &Credential,
        request: &MusicRequest,
    ) -> anyhow::Result<CallOutcome<AudioChunkStream>>;
}
