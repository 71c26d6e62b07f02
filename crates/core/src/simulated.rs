use crate::collaborators::{
    AnswerEvaluator, Audio, Evaluation, ImageSynthesizer, Introducer, Narrator, QuestionSource,
    Summarizer, Summary,
};
use crate::configuration::{Configuration, Language};
use crate::history::{HistoryItem, Illustration, MAX_SCORE, REVIEW_THRESHOLD, question_key};
use crate::topic::{DEFAULT_MATCH_THRESHOLD, KeywordList, topic_keywords};
use anyhow::Result;
use async_trait::async_trait;

struct Template {
    question: &'static str,
    keywords: &'static [&'static str],
}

const QUESTION_BANK: &[Template] = &[
    Template {
        question: "What is {topic}? Describe it in one or two sentences.",
        keywords: &["means", "process"],
    },
    Template {
        question: "Why is {topic} important?",
        keywords: &["because", "important"],
    },
    Template {
        question: "Give a real-world example of {topic}.",
        keywords: &["example"],
    },
    Template {
        question: "What are the main steps or parts of {topic}?",
        keywords: &["first", "then"],
    },
    Template {
        question: "What is a common misconception about {topic}?",
        keywords: &["actually", "wrong"],
    },
    Template {
        question: "How would you explain {topic} to a friend?",
        keywords: &["imagine", "like"],
    },
];

/// An offline tutor with a fixed question bank and keyword-based scoring.
///
/// It makes no network calls, so the whole quiz can run without an API key.
/// Questions and feedback are always in English; it produces no audio or images.
pub struct SimulatedTutor {
    threshold: i64,
}

impl Default for SimulatedTutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTutor {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn question_bank(topic: &str) -> Vec<String> {
        QUESTION_BANK
            .iter()
            .map(|t| t.question.replace("{topic}", topic))
            .collect()
    }

    /// Keywords expected in an answer: the topic's words plus the template's own.
    fn keywords_for(config: &Configuration, question: &str) -> KeywordList {
        let mut keywords = topic_keywords(&config.topic);
        let key = question_key(question);
        if let Some(template) = QUESTION_BANK
            .iter()
            .find(|t| question_key(&t.question.replace("{topic}", &config.topic)) == key)
        {
            keywords.extend(template.keywords.iter().map(|k| k.to_string()));
        }
        KeywordList::new(keywords)
    }
}

#[async_trait]
impl Introducer for SimulatedTutor {
    async fn introduce(&self, config: &Configuration) -> Result<String> {
        let source = match &config.document {
            Some(doc) => format!(" The questions are based on \"{}\".", doc.name),
            None => String::new(),
        };
        Ok(format!(
            "Welcome! This is a {} quiz about {}. You will get up to {} questions, each scored out of {}.{}",
            config.level.label(),
            config.topic,
            config.question_limit.min(QUESTION_BANK.len()),
            MAX_SCORE,
            source
        ))
    }
}

#[async_trait]
impl QuestionSource for SimulatedTutor {
    async fn next_question(
        &self,
        config: &Configuration,
        answered: &[HistoryItem],
    ) -> Result<Option<String>> {
        let asked: Vec<String> = answered.iter().map(HistoryItem::key).collect();
        Ok(Self::question_bank(&config.topic)
            .into_iter()
            .find(|q| !asked.contains(&question_key(q))))
    }
}

#[async_trait]
impl AnswerEvaluator for SimulatedTutor {
    async fn evaluate(
        &self,
        config: &Configuration,
        question: &str,
        answer: &str,
    ) -> Result<Evaluation> {
        let keywords = Self::keywords_for(config, question);
        let coverage = keywords.coverage(answer, self.threshold);
        let score = (coverage * MAX_SCORE as f32).round() as u32;

        let missing = keywords.find_missing(answer, self.threshold);
        let explanation = if missing.is_empty() {
            "Great answer, you covered everything I was looking for.".to_string()
        } else {
            format!(
                "A complete answer would also mention: {}.",
                missing.join(", ")
            )
        };
        let illustration_request = (score < REVIEW_THRESHOLD)
            .then(|| format!("A simple labelled diagram of {}", config.topic));

        Ok(Evaluation {
            score,
            explanation,
            illustration_request,
        })
    }
}

#[async_trait]
impl Summarizer for SimulatedTutor {
    async fn summarize(&self, config: &Configuration, history: &[HistoryItem]) -> Result<Summary> {
        let total: u32 = history.iter().filter_map(|item| item.awarded_score).sum();
        let possible: u32 = history.iter().map(|item| item.possible_score).sum();

        let mut suggestions: Vec<String> = history
            .iter()
            .filter(|item| item.awarded_score.unwrap_or(0) < REVIEW_THRESHOLD)
            .map(|item| format!("Revisit: {}", item.question))
            .take(5)
            .collect();
        for generic in [
            format!("Read a short introduction to {}.", config.topic),
            format!("Explain {} out loud to someone else.", config.topic),
            format!("Write down three examples of {}.", config.topic),
        ] {
            if suggestions.len() >= 3 {
                break;
            }
            suggestions.push(generic);
        }

        Ok(Summary {
            text: format!(
                "You answered {} questions about {} and scored {} out of {}.",
                history.len(),
                config.topic,
                total,
                possible
            ),
            suggestions,
        })
    }
}

#[async_trait]
impl ImageSynthesizer for SimulatedTutor {
    async fn illustrate(&self, _request: &str) -> Result<Option<Illustration>> {
        Ok(None)
    }
}

#[async_trait]
impl Narrator for SimulatedTutor {
    async fn narrate(&self, _text: &str, _language: Language) -> Result<Option<Audio>> {
        Ok(None)
    }
}
