use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt, stream};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use super::{
    AudioChunkStream, CallOutcome, GenerativeBackend, MusicRequest, PcmAudio, PlanRequest,
    SpeechRequest,
};
use crate::config::Models;
use crate::credentials::Credential;
use crate::model::ContentPlan;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MUSIC_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateMusic";
const SPEECH_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Result of one `generateContent` call before it is interpreted per call kind.
#[derive(Debug)]
enum Reply {
    Parts(Vec<Part>),
    Quota(String),
    Empty(String),
}

/// Talks to the Gemini REST API for plans, speech and images, and to the Lyria websocket for music.
pub struct GeminiBackend {
    client: Client,
    models: Models,
}

impl GeminiBackend {
    pub fn new(models: Models) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, models })
    }

    async fn generate(&self, key: &Credential, model: &str, body: &Value) -> Result<Reply> {
        let url = format!("{API_BASE}/{model}:generateContent");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key.secret())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Gemini request to {model} failed"))?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        debug!(model, status = status.as_u16(), bytes = raw.len(), "gemini response");
        classify(status, &raw)
    }
}

fn classify(status: StatusCode, raw: &str) -> Result<Reply> {
    if !status.is_success() {
        let error = serde_json::from_str::<ErrorBody>(raw).ok().map(|b| b.error);
        let quota = status == StatusCode::TOO_MANY_REQUESTS
            || error.as_ref().is_some_and(|e| e.status == "RESOURCE_EXHAUSTED");
        let detail = match &error {
            Some(e) => format!("{} {}: {}", e.code, e.status, e.message),
            None => format!(
                "HTTP {}: {}",
                status.as_u16(),
                raw.chars().take(800).collect::<String>()
            ),
        };
        if quota {
            return Ok(Reply::Quota(detail));
        }
        anyhow::bail!("Gemini request rejected: {detail}");
    }

    let parsed: GenerateResponse =
        serde_json::from_str(raw).context("Gemini response is not valid JSON")?;
    let parts = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();
    if parts.is_empty() {
        return Ok(Reply::Empty("response has no candidates or content parts".into()));
    }
    Ok(Reply::Parts(parts))
}

fn plan_schema() -> Value {
    let string = json!({ "type": "STRING" });
    json!({
        "type": "OBJECT",
        "properties": {
            "project_slug": string,
            "source_language": string,
            "target_language": string,
            "topic": string,
            "video_title": string,
            "video_description": string,
            "intro_text": string,
            "word_pairs": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": { "source_word": string, "target_word": string },
                    "required": ["source_word", "target_word"]
                }
            },
            "music_prompt": string,
            "image_generation_prompt": string,
            "hashtags": { "type": "ARRAY", "items": string }
        },
        "required": [
            "project_slug", "source_language", "target_language", "topic", "video_title",
            "video_description", "intro_text", "word_pairs", "music_prompt",
            "image_generation_prompt", "hashtags"
        ]
    })
}

/// Reads `rate=N` from an `audio/L16;codec=pcm;rate=24000` mime type.
fn sample_rate_from_mime(mime: Option<&str>) -> u32 {
    mime.into_iter()
        .flat_map(|m| m.split(';'))
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
        .unwrap_or(SPEECH_SAMPLE_RATE)
}

fn first_inline(parts: Vec<Part>) -> Option<InlineData> {
    parts.into_iter().find_map(|p| p.inline_data)
}

/// Concatenated PCM from every `serverContent.audioChunks[].data` in one music message.
fn decode_audio_chunks(payload: &[u8]) -> Result<Vec<u8>> {
    let message: Value = serde_json::from_slice(payload).context("music message is not JSON")?;
    let mut pcm = Vec::new();
    let chunks = message
        .pointer("/serverContent/audioChunks")
        .and_then(Value::as_array);
    for chunk in chunks.into_iter().flatten() {
        if let Some(data) = chunk.get("data").and_then(Value::as_str) {
            pcm.extend(BASE64.decode(data).context("music chunk is not base64")?);
        }
    }
    Ok(pcm)
}

fn is_setup_complete(payload: &[u8]) -> bool {
    serde_json::from_slice::<Value>(payload)
        .map(|v| v.get("setupComplete").is_some())
        .unwrap_or(false)
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn plan(
        &self,
        key: &Credential,
        request: &PlanRequest,
    ) -> Result<CallOutcome<ContentPlan>> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": plan_schema(),
            },
        });
        let parts = match self.generate(key, &self.models.planner, &body).await? {
            Reply::Parts(parts) => parts,
            Reply::Quota(detail) => return Ok(CallOutcome::QuotaExhausted(detail)),
            Reply::Empty(detail) => return Ok(CallOutcome::EmptyContent(detail)),
        };
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            return Ok(CallOutcome::EmptyContent("plan response carried no text".into()));
        }
        let plan = ContentPlan::from_json(&text)
            .context("Model returned a response, but the plan JSON could not be parsed")?;
        Ok(CallOutcome::Ready(plan))
    }

    async fn speech(
        &self,
        key: &Credential,
        request: &SpeechRequest,
    ) -> Result<CallOutcome<PcmAudio>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("Say: {}", request.text) }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": request.voice } }
                },
            },
        });
        let parts = match self.generate(key, &self.models.tts, &body).await? {
            Reply::Parts(parts) => parts,
            Reply::Quota(detail) => return Ok(CallOutcome::QuotaExhausted(detail)),
            Reply::Empty(detail) => return Ok(CallOutcome::EmptyContent(detail)),
        };
        let Some(inline) = first_inline(parts) else {
            return Ok(CallOutcome::EmptyContent(format!(
                "TTS returned no audio for text '{}'",
                request.text
            )));
        };
        let bytes = BASE64.decode(&inline.data).context("TTS audio is not base64")?;
        let rate = sample_rate_from_mime(inline.mime_type.as_deref());
        Ok(CallOutcome::Ready(PcmAudio::from_le_bytes(&bytes, rate, 1)))
    }

    async fn image(&self, key: &Credential, prompt: &str) -> Result<CallOutcome<Vec<u8>>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let parts = match self.generate(key, &self.models.image, &body).await? {
            Reply::Parts(parts) => parts,
            Reply::Quota(detail) => return Ok(CallOutcome::QuotaExhausted(detail)),
            Reply::Empty(detail) => return Ok(CallOutcome::EmptyContent(detail)),
        };
        match first_inline(parts) {
            Some(inline) => Ok(CallOutcome::Ready(
                BASE64.decode(&inline.data).context("image data is not base64")?,
            )),
            None => Ok(CallOutcome::EmptyContent(format!(
                "image response had no inline data for prompt: {prompt}"
            ))),
        }
    }

    async fn music(
        &self,
        key: &Credential,
        request: &MusicRequest,
    ) -> Result<CallOutcome<AudioChunkStream>> {
        let url = format!("{MUSIC_ENDPOINT}?key={}", key.secret());
        let mut socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(tungstenite::Error::Http(resp)) if resp.status().as_u16() == 429 => {
                return Ok(CallOutcome::QuotaExhausted(
                    "music session refused with HTTP 429".into(),
                ));
            }
            Err(e) => return Err(e).context("music websocket connect failed"),
        };

        let setup = json!({ "setup": { "model": self.models.music } });
        socket.send(Message::Text(setup.to_string())).await?;
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) if is_setup_complete(text.as_bytes()) => break,
                Some(Ok(Message::Binary(bytes))) if is_setup_complete(&bytes) => break,
                Some(Ok(Message::Close(frame))) => {
                    anyhow::bail!("music session closed during setup: {frame:?}")
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e).context("music setup failed"),
                None => anyhow::bail!("music session ended during setup"),
            }
        }

        let commands = [
            json!({
                "clientContent": {
                    "weightedPrompts": [{ "text": request.prompt, "weight": 1.0 }]
                }
            }),
            json!({
                "musicGenerationConfig": {
                    "bpm": request.bpm,
                    "temperature": request.temperature
                }
            }),
            json!({ "playbackControl": "PLAY" }),
        ];
        for command in commands {
            socket.send(Message::Text(command.to_string())).await?;
        }

        let chunks = stream::unfold(socket, |mut socket| async move {
            loop {
                let decoded = match socket.next().await? {
                    Ok(Message::Text(text)) => decode_audio_chunks(text.as_bytes()),
                    Ok(Message::Binary(bytes)) => decode_audio_chunks(&bytes),
                    Ok(Message::Close(_)) => return None,
                    Ok(_) => continue,
                    Err(e) => Err(anyhow::Error::new(e).context("music stream failed")),
                };
                match decoded {
                    Ok(pcm) if pcm.is_empty() => continue,
                    other => return Some((other, socket)),
                }
            }
        });
        Ok(CallOutcome::Ready(Box::pin(chunks)))
    }
}
