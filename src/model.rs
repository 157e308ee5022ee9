use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Languages the speech backend can voice. Plans naming anything else are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Language {
    Arabic,
    Bengali,
    Dutch,
    English,
    French,
    German,
    Hindi,
    Indonesian,
    Italian,
    Japanese,
    Korean,
    Marathi,
    Polish,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Tamil,
    Telugu,
    Thai,
    Turkish,
    Ukrainian,
    Vietnamese,
}

impl Language {
    pub const ALL: [Language; 23] = [
        Language::Arabic,
        Language::Bengali,
        Language::Dutch,
        Language::English,
        Language::French,
        Language::German,
        Language::Hindi,
        Language::Indonesian,
        Language::Italian,
        Language::Japanese,
        Language::Korean,
        Language::Marathi,
        Language::Polish,
        Language::Portuguese,
        Language::Romanian,
        Language::Russian,
        Language::Spanish,
        Language::Tamil,
        Language::Telugu,
        Language::Thai,
        Language::Turkish,
        Language::Ukrainian,
        Language::Vietnamese,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Arabic => "arabic",
            Language::Bengali => "bengali",
            Language::Dutch => "dutch",
            Language::English => "english",
            Language::French => "french",
            Language::German => "german",
            Language::Hindi => "hindi",
            Language::Indonesian => "indonesian",
            Language::Italian => "italian",
            Language::Japanese => "japanese",
            Language::Korean => "korean",
            Language::Marathi => "marathi",
            Language::Polish => "polish",
            Language::Portuguese => "portuguese",
            Language::Romanian => "romanian",
            Language::Russian => "russian",
            Language::Spanish => "spanish",
            Language::Tamil => "tamil",
            Language::Telugu => "telugu",
            Language::Thai => "thai",
            Language::Turkish => "turkish",
            Language::Ukrainian => "ukrainian",
            Language::Vietnamese => "vietnamese",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.as_str()).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == wanted)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPair {
    pub source_word: String,
    pub target_word: String,
}

/// The structured plan produced by the planning call. Word pair order fixes scene order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub project_slug: String,
    pub source_language: String,
    pub target_language: String,
    pub topic: String,
    pub video_title: String,
    pub video_description: String,
    pub intro_text: String,
    pub word_pairs: Vec<WordPair>,
    pub music_prompt: String,
    pub image_generation_prompt: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl ContentPlan {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks both languages against the supported set and that there is at least one word.
    pub fn validate(&self) -> Result<(Language, Language)> {
        let source = parse_language("Source", &self.source_language)?;
        let target = parse_language("Target", &self.target_language)?;
        if self.word_pairs.is_empty() {
            return Err(Error::EmptyWordList);
        }
        Ok((source, target))
    }
}

fn parse_language(role: &'static str, name: &str) -> Result<Language> {
    name.parse().map_err(|_| Error::UnsupportedLanguage {
        role,
        language: name.to_string(),
        supported: Language::supported_names(),
    })
}

#[cfg(test)]
pub(crate) fn sample_plan(words: usize) -> ContentPlan {
    ContentPlan {
        project_slug: "japanese-bar-words".into(),
        source_language: "English".into(),
        target_language: "Japanese".into(),
        topic: "Ordering at a bar".into(),
        video_title: "Five bar words".into(),
        video_description: "Guess before the timer runs out.".into(),
        intro_text: "You get five seconds to guess each translation!".into(),
        word_pairs: (0..words)
            .map(|i| WordPair {
                source_word: format!("word {i}"),
                target_word: format!("kotoba {i}"),
            })
            .collect(),
        music_prompt: "calm lofi beat".into(),
        image_generation_prompt: "neon bar at night, 9:16".into(),
        hashtags: vec!["#japanese".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parse_ignores_case_and_whitespace() {
        assert_eq!(" Japanese ".parse::<Language>(), Ok(Language::Japanese));
        assert_eq!("UKRAINIAN".parse::<Language>(), Ok(Language::Ukrainian));
        assert!("Klingon".parse::<Language>().is_err());
    }

    #[test]
    fn validate_accepts_supported_pair() {
        let plan = sample_plan(2);
        assert_eq!(
            plan.validate().unwrap(),
            (Language::English, Language::Japanese)
        );
    }

    #[test]
    fn validate_names_unsupported_target_and_lists_options() {
        let mut plan = sample_plan(1);
        plan.target_language = "Klingon".into();
        let err = plan.validate().unwrap_err();
        match &err {
            Error::UnsupportedLanguage {
                role,
                language,
                supported,
            } => {
                assert_eq!(*role, "Target");
                assert_eq!(language, "Klingon");
                assert_eq!(supported.len(), Language::ALL.len());
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("Klingon"));
        assert!(message.contains("vietnamese"));
    }

    #[test]
    fn validate_rejects_empty_word_list() {
        let plan = sample_plan(0);
        assert!(matches!(plan.validate(), Err(Error::EmptyWordList)));
    }

    #[test]
    fn plan_json_without_hashtags_defaults_to_empty() {
        let mut value = serde_json::to_value(sample_plan(1)).unwrap();
        value.as_object_mut().unwrap().remove("hashtags");
        let plan = ContentPlan::from_json(&value.to_string()).unwrap();
        assert!(plan.hashtags.is_empty());
        assert_eq!(plan.word_pairs.len(), 1);
    }
}
