//! Session configuration submitted by the host before a quiz starts.
//!
//! A `Configuration` is validated once, at the `Configuring -> Introducing`
//! boundary, and is then only read by the controller and forwarded to the
//! collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the topic length, in characters.
pub const MAX_TOPIC_LEN: usize = 200;
/// Number of fresh questions asked before the quiz moves on to the summary.
pub const DEFAULT_QUESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Elementary,
    MiddleSchool,
    HighSchool,
    University,
    Professional,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Elementary,
        Level::MiddleSchool,
        Level::HighSchool,
        Level::University,
        Level::Professional,
    ];

    /// Human readable label, used when filling prompt templates.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Elementary => "elementary school",
            Level::MiddleSchool => "middle school",
            Level::HighSchool => "high school",
            Level::University => "university",
            Level::Professional => "professional",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "elementary" | "elementaryschool" | "primary" => Ok(Level::Elementary),
            "middle" | "middleschool" => Ok(Level::MiddleSchool),
            "high" | "highschool" => Ok(Level::HighSchool),
            "university" | "college" => Ok(Level::University),
            "professional" | "expert" => Ok(Level::Professional),
            _ => Err(format!("unknown level: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Italian,
    Portuguese,
    Japanese,
    Chinese,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Italian => "Italian",
            Language::Portuguese => "Portuguese",
            Language::Japanese => "Japanese",
            Language::Chinese => "Chinese",
        }
    }

    /// BCP-47 tag handed to the narrator as a pronunciation hint.
    pub fn hint(&self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Spanish => "es-ES",
            Language::French => "fr-FR",
            Language::German => "de-DE",
            Language::Italian => "it-IT",
            Language::Portuguese => "pt-BR",
            Language::Japanese => "ja-JP",
            Language::Chinese => "zh-CN",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "es" | "spanish" => Ok(Language::Spanish),
            "fr" | "french" => Ok(Language::French),
            "de" | "german" => Ok(Language::German),
            "it" | "italian" => Ok(Language::Italian),
            "pt" | "portuguese" => Ok(Language::Portuguese),
            "ja" | "japanese" => Ok(Language::Japanese),
            "zh" | "chinese" => Ok(Language::Chinese),
            _ => Err(format!("unknown language: {s}")),
        }
    }
}

/// Opaque context produced by the document loader. The controller never
/// looks inside, it only forwards the handle to collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("topic must not be empty")]
    TopicEmpty,
    #[error("topic is {len} characters long, the limit is {max}")]
    TopicTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub topic: String,
    pub level: Level,
    pub language: Language,
    pub document: Option<DocumentHandle>,
    pub question_limit: usize,
}

impl Configuration {
    pub fn new(topic: impl Into<String>, level: Level, language: Language) -> Self {
        Self {
            topic: topic.into(),
            level,
            language,
            document: None,
            question_limit: DEFAULT_QUESTION_LIMIT,
        }
    }

    pub fn with_document(mut self, document: DocumentHandle) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_question_limit(mut self, limit: usize) -> Self {
        self.question_limit = limit;
        self
    }

    /// Trims the topic and checks its bounds.
    pub fn validate(mut self) -> Result<Self, ConfigurationError> {
        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(ConfigurationError::TopicEmpty);
        }
        let len = topic.chars().count();
        if len > MAX_TOPIC_LEN {
            return Err(ConfigurationError::TopicTooLong {
                len,
                max: MAX_TOPIC_LEN,
            });
        }
        self.topic = topic.to_string();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_trims_topic() {
        let config = Configuration::new("  Photosynthesis \n", Level::HighSchool, Language::English)
            .validate()
            .expect("topic should be valid");
        assert_eq!(config.topic, "Photosynthesis");
    }

    #[test]
    fn test_validate_rejects_blank_and_long_topics() {
        let blank = Configuration::new("   ", Level::HighSchool, Language::English).validate();
        assert_eq!(blank, Err(ConfigurationError::TopicEmpty));

        let long = "x".repeat(MAX_TOPIC_LEN + 1);
        let result = Configuration::new(long, Level::University, Language::German).validate();
        assert_eq!(
            result,
            Err(ConfigurationError::TopicTooLong {
                len: MAX_TOPIC_LEN + 1,
                max: MAX_TOPIC_LEN
            })
        );
    }

    #[test]
    fn test_level_and_language_parse_loosely() {
        assert_eq!("high-school".parse::<Level>(), Ok(Level::HighSchool));
        assert_eq!("Middle School".parse::<Level>(), Ok(Level::MiddleSchool));
        assert_eq!("university".parse::<Level>(), Ok(Level::University));
        assert!("kindergarten".parse::<Level>().is_err());

        assert_eq!("ES".parse::<Language>(), Ok(Language::Spanish));
        assert_eq!("japanese".parse::<Language>(), Ok(Language::Japanese));
        assert_eq!(Language::French.hint(), "fr-FR");
    }
}
