//! In-process stand-ins for the generative services and the compositor.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::api::{
    AudioChunkStream, CallOutcome, GenerativeBackend, MusicRequest, PcmAudio, PlanRequest,
    SpeechRequest,
};
use crate::audio::music_byte_rate;
use crate::credentials::Credential;
use crate::error::Result;
use crate::model::{ContentPlan, sample_plan};
use crate::render::{Compositor, RenderJob};
use crate::timeline::Timeline;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub plan: usize,
    pub speech: usize,
    pub image: usize,
    pub music: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicBehavior {
    /// One-second chunks, forever.
    Endless,
    /// Never yields a chunk.
    Hang,
    /// The session is refused outright.
    Refused,
    /// The session opens and closes without sending audio.
    Silent,
}

pub struct FakeBackend {
    plan: ContentPlan,
    music: MusicBehavior,
    speech_samples: usize,
    speech_quota: bool,
    counts: Mutex<CallCounts>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            plan: sample_plan(3),
            music: MusicBehavior::Endless,
            speech_samples: 24_000,
            speech_quota: false,
            counts: Mutex::new(CallCounts::default()),
        }
    }

    pub fn with_plan(mut self, plan: ContentPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_music(mut self, music: MusicBehavior) -> Self {
        self.music = music;
        self
    }

    /// Every speech call reports an exhausted quota.
    pub fn with_speech_quota_exhausted(mut self) -> Self {
        self.speech_quota = true;
        self
    }

    pub fn calls(&self) -> CallCounts {
        *self.counts.lock().unwrap()
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        bump(&mut self.counts.lock().unwrap());
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn plan(
        &self,
        _key: &Credential,
        _request: &PlanRequest,
    ) -> anyhow::Result<CallOutcome<ContentPlan>> {
        self.count(|c| c.plan += 1);
        Ok(CallOutcome::Ready(self.plan.clone()))
    }

    async fn speech(
        &self,
        _key: &Credential,
        _request: &SpeechRequest,
    ) -> anyhow::Result<CallOutcome<PcmAudio>> {
        self.count(|c| c.speech += 1);
        if self.speech_quota {
            return Ok(CallOutcome::QuotaExhausted("tts requests per day".into()));
        }
        Ok(CallOutcome::Ready(PcmAudio {
            samples: vec![0; self.speech_samples],
            sample_rate: 24_000,
            channels: 1,
        }))
    }

    async fn image(
        &self,
        _key: &Credential,
        _prompt: &str,
    ) -> anyhow::Result<CallOutcome<Vec<u8>>> {
        self.count(|c| c.image += 1);
        Ok(CallOutcome::Ready(b"\x89PNG fake".to_vec()))
    }

    async fn music(
        &self,
        _key: &Credential,
        _request: &MusicRequest,
    ) -> anyhow::Result<CallOutcome<AudioChunkStream>> {
        self.count(|c| c.music += 1);
        let stream: AudioChunkStream = match self.music {
            MusicBehavior::Endless => Box::pin(stream::repeat_with(|| {
                anyhow::Ok(vec![0u8; music_byte_rate()])
            })),
            MusicBehavior::Hang => Box::pin(stream::pending::<anyhow::Result<Vec<u8>>>()),
            MusicBehavior::Refused => anyhow::bail!("music session refused"),
            MusicBehavior::Silent => Box::pin(stream::empty::<anyhow::Result<Vec<u8>>>()),
        };
        Ok(CallOutcome::Ready(stream))
    }
}

/// Writes a placeholder video and remembers every timeline it was asked to render.
#[derive(Default)]
pub struct FakeCompositor {
    rendered: Mutex<Vec<Timeline>>,
}

impl FakeCompositor {
    pub fn rendered(&self) -> Vec<Timeline> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compositor for FakeCompositor {
    async fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        std::fs::write(job.output, b"fake mp4")?;
        self.rendered.lock().unwrap().push(job.timeline.clone());
        Ok(())
    }
}
