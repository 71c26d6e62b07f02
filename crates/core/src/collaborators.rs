//! Contracts of the generative services the controller talks to.
//!
//! Every trait is a plain request/response boundary. The controller holds
//! them as `Arc<dyn Trait>` so the OpenAI client, the simulated tutor and
//! test mocks are interchangeable.

use crate::configuration::{Configuration, Language};
use crate::history::{HistoryItem, Illustration};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;

/// Raw output of the scoring service, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: u32,
    pub explanation: String,
    pub illustration_request: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub suggestions: Vec<String>,
}

/// Mono 16-bit little-endian PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
}

impl Audio {
    /// How long the clip takes to play.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let samples = (self.pcm.len() / 2) as f64;
        Duration::from_secs_f64(samples / f64::from(self.sample_rate))
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Introducer: Send + Sync {
    async fn introduce(&self, config: &Configuration) -> Result<String>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// `Ok(None)` (or an empty string) means the quiz has no more questions.
    async fn next_question(
        &self,
        config: &Configuration,
        answered: &[HistoryItem],
    ) -> Result<Option<String>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        config: &Configuration,
        question: &str,
        answer: &str,
    ) -> Result<Evaluation>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, config: &Configuration, history: &[HistoryItem]) -> Result<Summary>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn illustrate(&self, request: &str) -> Result<Option<Illustration>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, text: &str, language: Language) -> Result<Option<Audio>>;
}

/// Where narration audio ends up. `play` replaces whatever is playing.
///
/// Both methods are called with the narration state locked and must return
/// promptly: hand the work to a device or writer thread instead of blocking.
#[cfg_attr(test, automock)]
pub trait AudioSink: Send + Sync {
    fn play(&self, audio: Audio);
    fn stop(&self);
}

/// The full set of services a session needs.
#[derive(Clone)]
pub struct Collaborators {
    pub introducer: Arc<dyn Introducer>,
    pub questions: Arc<dyn QuestionSource>,
    pub evaluator: Arc<dyn AnswerEvaluator>,
    pub summarizer: Arc<dyn Summarizer>,
    pub images: Arc<dyn ImageSynthesizer>,
    pub narrator: Arc<dyn Narrator>,
}

impl Collaborators {
    /// Uses one implementation for every service.
    pub fn uniform<T>(tutor: Arc<T>) -> Self
    where
        T: Introducer
            + QuestionSource
            + AnswerEvaluator
            + Summarizer
            + ImageSynthesizer
            + Narrator
            + 'static,
    {
        Self {
            introducer: tutor.clone(),
            questions: tutor.clone(),
            evaluator: tutor.clone(),
            summarizer: tutor.clone(),
            images: tutor.clone(),
            narrator: tutor,
        }
    }
}

/// Sink that drops everything, for hosts without audio output.
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, audio: Audio) {
        tracing::debug!("Discarding {} bytes of narration audio", audio.pcm.len());
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_duration() {
        let clip = Audio {
            pcm: vec![0; 48_000],
            sample_rate: 24_000,
        };
        assert_eq!(clip.duration(), Duration::from_secs(1));
        let broken = Audio {
            pcm: vec![0; 4],
            sample_rate: 0,
        };
        assert_eq!(broken.duration(), Duration::ZERO);
    }
}
