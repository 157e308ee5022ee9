use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::api::{CallKind, GenerativeBackend, PlanRequest};
use crate::error::{Error, Result};
use crate::log::ProjectLog;
use crate::model::ContentPlan;
use crate::retry::RetryingCaller;

const SYSTEM_INSTRUCTION: &str = "You are an expert multilingual content planner for short-form language-learning videos. \
Analyze the user's prompt and produce a structured plan as valid JSON that follows the provided schema exactly. Rules:
1. Language identification: identify the `source_language` (the audience's language) and the `target_language` (the language being learned) from the prompt. Do not default to English unless the prompt asks for it.
2. Content type: honour the requested kind and count. '5 words' means exactly 5 single words, '4 phrases' means 4 phrases. Never mix content types.
3. Intro: `intro_text` is written in the source language and explains the format, for example that each word is shown and the viewer has a few seconds to guess the translation.
4. Metadata: write `video_title` and `video_description` in the source language, ready to post on social media.
5. Image prompt: from the topic, write a rich `image_generation_prompt` that sets a fitting mood and asks for a vertical 9:16 aspect ratio.
6. Slug: `project_slug` is a short kebab-case summary of the theme.
7. Hashtags: 8 to 12 relevant hashtags, mixing the source and target languages.";

pub struct ContentPlanner {
    caller: RetryingCaller,
    backend: Arc<dyn GenerativeBackend>,
    log: Arc<ProjectLog>,
    delay: Duration,
}

impl ContentPlanner {
    pub fn new(
        caller: RetryingCaller,
        backend: Arc<dyn GenerativeBackend>,
        log: Arc<ProjectLog>,
        delay: Duration,
    ) -> Self {
        Self {
            caller,
            backend,
            log,
            delay,
        }
    }

    /// Asks the planner model for a plan and rejects it unless both languages can be voiced.
    pub async fn generate_plan(&self, prompt: &str) -> Result<ContentPlan> {
        self.log.info_with(
            "Starting content planning...",
            serde_json::json!({ "user_prompt": prompt }),
        );
        let request = PlanRequest {
            prompt: prompt.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        };
        let backend = &self.backend;
        let request = &request;
        let plan = self
            .caller
            .execute(CallKind::Plan, "content plan", |key| async move {
                backend.plan(&key, request).await
            })
            .await?;

        tokio::time::sleep(self.delay).await;

        plan.validate()?;
        self.log.ok_with(
            "Successfully generated content plan.",
            serde_json::to_value(&plan)?,
        );
        Ok(plan)
    }
}

fn non_slug_regex() -> Result<&'static Regex> {
    static NON_SLUG_RE: OnceCell<Regex> = OnceCell::new();
    NON_SLUG_RE
        .get_or_try_init(|| Regex::new(r"[^a-z0-9]+").context("failed to compile slug regex"))
        .map_err(Error::Service)
}

/// Lowercase ASCII letters, digits and single dashes.
pub fn slugify(raw: &str) -> Result<String> {
    let lowered = raw.to_lowercase();
    let slug = non_slug_regex()?.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        Ok("project".to_string())
    } else {
        Ok(slug.to_string())
    }
}

/// `<slug>-<YYYYmmddHHMMSS>`, unique per second of creation.
pub fn project_name(slug: &str, at: DateTime<Utc>) -> Result<String> {
    Ok(format!("{}-{}", slugify(slug)?, at.format("%Y%m%d%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::credentials::CredentialPool;
    use crate::model::sample_plan;
    use crate::testing::FakeBackend;

    fn planner(backend: Arc<FakeBackend>) -> ContentPlanner {
        let log = Arc::new(ProjectLog::detached());
        let pool = Arc::new(CredentialPool::new(["k1", "k2"]).unwrap());
        ContentPlanner::new(
            RetryingCaller::new(pool, log.clone()),
            backend,
            log,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn returns_validated_plan() {
        let backend = Arc::new(FakeBackend::new());
        let plan = planner(backend.clone()).generate_plan("5 bar words").await.unwrap();
        assert_eq!(plan, sample_plan(3));
        assert_eq!(backend.calls().plan, 1);
    }

    #[tokio::test]
    async fn unsupported_target_language_is_rejected() {
        let mut klingon = sample_plan(3);
        klingon.target_language = "Klingon".into();
        let backend = Arc::new(FakeBackend::new().with_plan(klingon));

        let err = planner(backend).generate_plan("klingon words").await.unwrap_err();
        match err {
            Error::UnsupportedLanguage { role, language, supported } => {
                assert_eq!(role, "Target");
                assert_eq!(language, "Klingon");
                assert!(supported.contains(&"japanese"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn slugs_are_sanitized() {
        assert_eq!(slugify("Japanese Bar Words!").unwrap(), "japanese-bar-words");
        assert_eq!(slugify("--already-kebab--").unwrap(), "already-kebab");
        assert_eq!(slugify("日本語").unwrap(), "project");
    }

    #[test]
    fn project_name_appends_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(project_name("bar words", at).unwrap(), "bar-words-20250102030405");
    }
}
