//! Idempotent production of the project's media files.
//!
//! Every producer checks its target first. An existing file is never
//! regenerated, and metadata such as speech length is read back from it.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, future, stream};
use rand::seq::SliceRandom;
use serde_json::json;

use crate::api::{
    AudioChunkStream, CallKind, CallOutcome, GenerativeBackend, MusicRequest, SpeechRequest,
};
use crate::audio::{MusicWriter, music_byte_rate, wav_duration, write_bytes, write_pcm_wav};
use crate::config::{Delays, MusicSettings, VoiceSettings};
use crate::error::{Error, Result};
use crate::layout::AssetLayout;
use crate::log::ProjectLog;
use crate::model::ContentPlan;
use crate::retry::RetryingCaller;

pub struct AssetGenerator {
    caller: RetryingCaller,
    backend: Arc<dyn GenerativeBackend>,
    log: Arc<ProjectLog>,
    voices: VoiceSettings,
    delays: Delays,
    music: MusicSettings,
}

impl AssetGenerator {
    pub fn new(
        caller: RetryingCaller,
        backend: Arc<dyn GenerativeBackend>,
        log: Arc<ProjectLog>,
        voices: VoiceSettings,
        delays: Delays,
        music: MusicSettings,
    ) -> Self {
        Self {
            caller,
            backend,
            log,
            voices,
            delays,
            music,
        }
    }

    /// Intro and word speech plus the background image. Music waits for the final duration.
    pub async fn core_assets(&self, plan: &ContentPlan, layout: &AssetLayout) -> Result<()> {
        fs::create_dir_all(layout.dir())?;

        self.log.info("Generating TTS audio for intro and word pairs...");
        self.intro(plan, layout).await?;
        self.words(plan, layout).await?;
        self.log.ok("All TTS audio generated.");

        self.log.info("Generating background image...");
        self.background_image(&plan.image_generation_prompt, &layout.background())
            .await?;
        self.log.ok("Background image generated.");
        Ok(())
    }

    pub async fn intro(&self, plan: &ContentPlan, layout: &AssetLayout) -> Result<f64> {
        self.speech(&plan.intro_text, &layout.intro_audio()).await
    }

    pub async fn words(&self, plan: &ContentPlan, layout: &AssetLayout) -> Result<Vec<f64>> {
        let mut durations = Vec::with_capacity(plan.word_pairs.len());
        for index in 0..plan.word_pairs.len() {
            durations.push(self.word(plan, layout, index).await?);
        }
        Ok(durations)
    }

    pub async fn word(
        &self,
        plan: &ContentPlan,
        layout: &AssetLayout,
        index: usize,
    ) -> Result<f64> {
        let pair = plan.word_pairs.get(index).ok_or(Error::NoWordAtIndex {
            index,
            count: plan.word_pairs.len(),
        })?;
        self.speech(&pair.target_word, &layout.word_audio(index)).await
    }

    /// Speaks `text` into a mono WAV at `path` and returns its length in seconds.
    pub async fn speech(&self, text: &str, path: &Path) -> Result<f64> {
        let voice = self.pick_voice();
        let details = json!({
            "text": text,
            "output_path": path.display().to_string(),
            "voice": voice,
        });

        if path.exists() {
            let duration = wav_duration(path)?;
            self.log
                .info_with(format!("Skipping existing TTS for '{}...'.", preview(text)), details);
            return Ok(duration);
        }
        self.log
            .info_with(format!("Generating TTS for '{}...'.", preview(text)), details.clone());

        let request = SpeechRequest {
            text: text.to_string(),
            voice,
        };
        let target = file_label(path);
        let backend = &self.backend;
        let request = &request;
        let audio = self
            .caller
            .execute(CallKind::Speech, &target, |key| async move {
                backend.speech(&key, request).await
            })
            .await?;
        tokio::time::sleep(self.delays.tts()).await;

        write_pcm_wav(path, &audio)?;
        let duration = wav_duration(path)?;
        self.log.info_with(
            format!("Saved TTS audio to {target} ({duration:.2}s)."),
            details,
        );
        Ok(duration)
    }

    pub async fn background_image(&self, prompt: &str, path: &Path) -> Result<()> {
        let details = json!({ "prompt": prompt, "output_path": path.display().to_string() });
        if path.exists() {
            self.log.info_with("Skipping existing background image.", details);
            return Ok(());
        }
        self.log
            .info_with("Requesting new background image from API.", details.clone());

        let target = file_label(path);
        let backend = &self.backend;
        let bytes = self
            .caller
            .execute(CallKind::Image, &target, |key| async move {
                backend.image(&key, prompt).await
            })
            .await?;
        tokio::time::sleep(self.delays.image()).await;

        write_bytes(path, &bytes)?;
        self.log
            .info_with(format!("Saved background image to {target}"), details);
        Ok(())
    }

    /// Best effort: returns whether `music.wav` exists afterwards.
    /// Failures are logged, never raised.
    pub async fn music(&self, plan: &ContentPlan, duration_s: f64, layout: &AssetLayout) -> bool {
        let path = layout.music();
        let details = json!({
            "prompt": plan.music_prompt,
            "duration_s": duration_s,
            "output_path": path.display().to_string(),
        });
        if path.exists() {
            self.log.info_with("Skipping existing music track.", details);
            return true;
        }

        let deadline = self.music.deadline(duration_s);
        self.log.info_with(
            format!(
                "Generating music track for {duration_s:.2}s (timeout: {:.0}s).",
                deadline.as_secs_f64()
            ),
            details.clone(),
        );

        let result = match tokio::time::timeout(
            deadline,
            self.stream_music(&plan.music_prompt, duration_s, layout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::MusicTimeout {
                secs: deadline.as_secs_f64(),
            }),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                self.log.warn_with(
                    format!("Music generation failed and will be SKIPPED. Reason: {err}"),
                    details,
                );
                for leftover in [layout.music_partial(), path] {
                    if leftover.exists() {
                        if let Err(e) = fs::remove_file(&leftover) {
                            self.log.error(format!(
                                "Could not remove partial music file {}: {e}",
                                leftover.display()
                            ));
                        }
                    }
                }
                false
            }
        }
    }

    async fn stream_music(
        &self,
        prompt: &str,
        duration_s: f64,
        layout: &AssetLayout,
    ) -> Result<()> {
        let request = MusicRequest {
            prompt: prompt.to_string(),
            bpm: self.music.bpm,
            temperature: self.music.temperature,
        };
        let backend = &self.backend;
        let request = &request;
        let mut stream = self
            .caller
            .execute(CallKind::Music, "music.wav", |key| async move {
                first_chunk_ready(backend.music(&key, request).await).await
            })
            .await?;

        let frame = 4;
        let target_bytes =
            (duration_s.max(0.0) * music_byte_rate() as f64) as usize / frame * frame;
        let partial = layout.music_partial();
        let mut writer = MusicWriter::create(&partial)?;
        let mut received = 0usize;

        while received < target_bytes {
            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = chunk.map_err(|e| Error::MusicFailure(format!("{e:#}")))?;
            let take = chunk.len().min(target_bytes - received);
            writer.write_bytes(&chunk[..take])?;
            received += take;
        }
        drop(stream);
        if received == 0 {
            return Err(Error::MusicFailure("music stream carried no audio".into()));
        }
        writer.finalize()?;

        let saved_s = received as f64 / music_byte_rate() as f64;
        if received < target_bytes {
            self.log.warn(format!(
                "Stream ended before reaching target duration. Saved {saved_s:.2}s of {duration_s:.2}s requested."
            ));
        } else {
            self.log.info("Target audio duration reached. Stopping stream capture.");
        }

        fs::rename(&partial, layout.music())?;
        self.log.ok(format!(
            "Successfully generated music and saved to {}",
            file_label(&layout.music())
        ));
        Ok(())
    }

    fn pick_voice(&self) -> String {
        if self.voices.random {
            if let Some(voice) = self.voices.pool.choose(&mut rand::thread_rng()) {
                return voice.clone();
            }
        }
        self.voices.default_voice.clone()
    }
}

/// Holds a music session back until its first chunk arrives, so a session
/// that closes silently counts as empty content for key rotation.
async fn first_chunk_ready(
    outcome: anyhow::Result<CallOutcome<AudioChunkStream>>,
) -> anyhow::Result<CallOutcome<AudioChunkStream>> {
    let mut chunks = match outcome? {
        CallOutcome::Ready(chunks) => chunks,
        other => return Ok(other),
    };
    match chunks.next().await {
        None => Ok(CallOutcome::EmptyContent(
            "music session closed before sending audio".into(),
        )),
        Some(first) => {
            let replayed: AudioChunkStream =
                Box::pin(stream::once(future::ready(first)).chain(chunks));
            Ok(CallOutcome::Ready(replayed))
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(30).collect()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
