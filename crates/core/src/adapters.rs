//! Thin wrappers that call a collaborator and normalise what comes back.

use crate::collaborators::{AnswerEvaluator, QuestionSource, Summarizer, Summary};
use crate::configuration::Configuration;
use crate::history::{HistoryItem, MAX_SCORE};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const MIN_SUGGESTIONS: usize = 3;
pub const MAX_SUGGESTIONS: usize = 5;

pub const FALLBACK_EXPLANATION: &str = "Your answer could not be evaluated right now, so it was \
recorded with a score of 0. You will be able to try this question again in review.";

pub(crate) async fn bounded<T, F>(timeout: Option<Duration>, what: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .with_context(|| format!("{what} did not answer within {limit:?}"))?,
        None => call.await,
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub struct QuestionSourceAdapter {
    source: Arc<dyn QuestionSource>,
    timeout: Option<Duration>,
}

impl QuestionSourceAdapter {
    pub fn new(source: Arc<dyn QuestionSource>, timeout: Option<Duration>) -> Self {
        Self { source, timeout }
    }

    /// `Ok(None)` is the normal end of the quiz: the question limit was reached or
    /// the collaborator had nothing more to ask.
    pub async fn next(
        &self,
        config: &Configuration,
        history: &[HistoryItem],
    ) -> Result<Option<String>> {
        if history.len() >= config.question_limit {
            tracing::info!(
                "Question limit of {} reached, no more questions",
                config.question_limit
            );
            return Ok(None);
        }
        let question = bounded(
            self.timeout,
            "question source",
            self.source.next_question(config, history),
        )
        .await
        .context("Question source failed to produce the next question")?;
        Ok(question.as_deref().and_then(non_blank))
    }
}

/// A normalised evaluation. `degraded` carries the reason when the score is a
/// local substitute rather than the evaluator's verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: u32,
    pub explanation: String,
    pub illustration_request: Option<String>,
    pub degraded: Option<String>,
}

pub struct AnswerEvaluatorAdapter {
    evaluator: Arc<dyn AnswerEvaluator>,
    timeout: Option<Duration>,
}

impl AnswerEvaluatorAdapter {
    pub fn new(evaluator: Arc<dyn AnswerEvaluator>, timeout: Option<Duration>) -> Self {
        Self { evaluator, timeout }
    }

    /// Never fails: an evaluator error becomes a zero score with a fallback explanation.
    pub async fn assess(&self, config: &Configuration, question: &str, answer: &str) -> Assessment {
        let result = bounded(
            self.timeout,
            "answer evaluator",
            self.evaluator.evaluate(config, question, answer),
        )
        .await;

        match result {
            Ok(evaluation) => {
                if evaluation.score > MAX_SCORE {
                    tracing::warn!(
                        "Evaluator returned score {} above the maximum, clamping to {}",
                        evaluation.score,
                        MAX_SCORE
                    );
                }
                Assessment {
                    score: evaluation.score.min(MAX_SCORE),
                    explanation: non_blank(&evaluation.explanation)
                        .unwrap_or_else(|| "No explanation was provided.".to_string()),
                    illustration_request: evaluation
                        .illustration_request
                        .as_deref()
                        .and_then(non_blank),
                    degraded: None,
                }
            }
            Err(e) => {
                tracing::warn!("Answer evaluation failed, substituting a zero score: {:?}", e);
                Assessment {
                    score: 0,
                    explanation: FALLBACK_EXPLANATION.to_string(),
                    illustration_request: None,
                    degraded: Some(format!("{e:#}")),
                }
            }
        }
    }
}

pub struct SummaryAdapter {
    summarizer: Arc<dyn Summarizer>,
    timeout: Option<Duration>,
}

impl SummaryAdapter {
    pub fn new(summarizer: Arc<dyn Summarizer>, timeout: Option<Duration>) -> Self {
        Self {
            summarizer,
            timeout,
        }
    }

    pub async fn summarize(
        &self,
        config: &Configuration,
        history: &[HistoryItem],
    ) -> Result<Summary> {
        let summary = bounded(
            self.timeout,
            "summarizer",
            self.summarizer.summarize(config, history),
        )
        .await
        .context("Summarizer failed")?;

        let text = non_blank(&summary.text)
            .ok_or_else(|| anyhow::anyhow!("Summarizer returned an empty summary"))?;

        let mut suggestions: Vec<String> = Vec::new();
        for suggestion in summary.suggestions.iter().filter_map(|s| non_blank(s)) {
            if !suggestions.contains(&suggestion) {
                suggestions.push(suggestion);
            }
        }
        suggestions.truncate(MAX_SUGGESTIONS);
        if suggestions.len() < MIN_SUGGESTIONS {
            tracing::warn!(
                "Summarizer returned {} suggestions, expected at least {}",
                suggestions.len(),
                MIN_SUGGESTIONS
            );
        }

        Ok(Summary { text, suggestions })
    }
}
