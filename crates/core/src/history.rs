//! Asked-and-answered questions and the score folds computed over them.

use serde::Serialize;

/// Points available for every question.
pub const MAX_SCORE: u32 = 5;
/// Items scoring strictly below this are eligible for review (3/5, i.e. below 60%).
pub const REVIEW_THRESHOLD: u32 = 3;

/// An image produced for an explanation. May arrive after the explanation is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Illustration {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub question: String,
    pub answer: String,
    /// Absent until the evaluator (or its fallback) has scored the answer.
    pub awarded_score: Option<u32>,
    pub possible_score: u32,
    pub explanation: Option<String>,
    pub illustration_request: Option<String>,
    pub illustration: Option<Illustration>,
    /// Score of the first attempt, kept when a review re-answer replaces `awarded_score`.
    pub first_score: Option<u32>,
    pub review_attempts: u32,
    /// Id of the image request whose result may still be applied to this item.
    pub(crate) illustration_ticket: Option<u64>,
}

impl HistoryItem {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            awarded_score: None,
            possible_score: MAX_SCORE,
            explanation: None,
            illustration_request: None,
            illustration: None,
            first_score: None,
            review_attempts: 0,
            illustration_ticket: None,
        }
    }

    /// Identity of the item within a session: the question text, case-insensitive.
    pub fn key(&self) -> String {
        question_key(&self.question)
    }

    pub fn is_scored(&self) -> bool {
        self.awarded_score.is_some()
    }

    pub fn was_reviewed(&self) -> bool {
        self.review_attempts > 0
    }

    /// Records an evaluation. The first one also becomes the fresh score; later
    /// ones replace the current score, answer and explanation.
    pub(crate) fn record(
        &mut self,
        answer: String,
        score: u32,
        explanation: String,
        illustration_request: Option<String>,
    ) {
        if self.first_score.is_none() {
            self.first_score = Some(score);
        }
        self.answer = answer;
        self.awarded_score = Some(score);
        self.explanation = Some(explanation);
        self.illustration_request = illustration_request;
        self.illustration = None;
        self.illustration_ticket = None;
    }
}

pub fn question_key(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Points earned against points available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: u32,
    pub possible: u32,
}

impl Tally {
    fn add(mut self, score: u32, possible: u32) -> Self {
        self.total += score;
        self.possible += possible;
        self
    }

    pub fn percent(&self) -> Option<f32> {
        if self.possible == 0 {
            None
        } else {
            Some(self.total as f32 * 100.0 / self.possible as f32)
        }
    }
}

/// The three overlapping answer sets. Always rebuilt from the history, never
/// patched incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    /// First attempts of every scored item.
    pub fresh: Tally,
    /// Current scores of items re-answered in review.
    pub reviewed: Tally,
    /// Current scores of every scored item.
    pub combined: Tally,
}

impl Scoreboard {
    pub fn fold(history: &[HistoryItem]) -> Self {
        history.iter().fold(Self::default(), |board, item| {
            let Some(score) = item.awarded_score else {
                return board;
            };
            let first = item.first_score.unwrap_or(score);
            Self {
                fresh: board.fresh.add(first, item.possible_score),
                reviewed: if item.was_reviewed() {
                    board.reviewed.add(score, item.possible_score)
                } else {
                    board.reviewed
                },
                combined: board.combined.add(score, item.possible_score),
            }
        })
    }
}
