use crate::collaborators::{
    AnswerEvaluator, Audio, Evaluation, ImageSynthesizer, Introducer, Narrator, QuestionSource,
    Summarizer, Summary,
};
use crate::configuration::{Configuration, Language};
use crate::history::{HistoryItem, Illustration, MAX_SCORE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Sample rate of the `pcm` format returned by the speech endpoint.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntroductionOut {
    introduction: String,
}

#[derive(Debug, Deserialize)]
struct QuestionOut {
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EvaluationOut {
    score: f64,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    illustration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryOut {
    summary: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

const INTRODUCTION_PROMPT: &str = r#"You are a friendly quiz master. Write a short introduction (3-4 sentences) for a quiz about "{topic}" for a {level} learner. Write it in {language}.
{document}
Respond STRICTLY as JSON: {"introduction": "<text>"}"#;

const QUESTION_PROMPT: &str = r#"You are running an adaptive quiz about "{topic}" for a {level} learner, in {language}.
Questions asked so far, with the learner's answers and scores out of {max_score}:
{history}
{document}
Ask ONE new open question that has not been asked yet. Adapt the difficulty to how the learner is doing. If the topic has been covered well enough, return an empty string instead of a question.

Respond STRICTLY as JSON: {"question": "<text or empty>"}"#;

const EVALUATION_PROMPT: &str = r#"You are grading a {level} learner's answer in a quiz about "{topic}". Write your feedback in {language}.
{document}
Question: "{question}"

Answer: "{answer}"

Give a score from 0 to {max_score}, a short explanation of what was right and what was missing, and optionally a one-sentence description of an image that would help illustrate the correct answer (or null).

Respond STRICTLY as JSON:
{"score": <0-{max_score}>, "explanation": "<text>", "illustration": "<text or null>"}"#;

const SUMMARY_PROMPT: &str = r#"A {level} learner finished a quiz about "{topic}". Here is every question, answer and score out of {max_score}:
{history}
{document}
Write a short encouraging summary of their performance in {language} and between 3 and 5 concrete suggestions for what to study next.

Respond STRICTLY as JSON: {"summary": "<text>", "suggestions": ["<text>", ...]}"#;

fn builtin_prompt(key: &str) -> Option<&'static str> {
    match key {
        "introduction" => Some(INTRODUCTION_PROMPT),
        "question" => Some(QUESTION_PROMPT),
        "evaluation" => Some(EVALUATION_PROMPT),
        "summary" => Some(SUMMARY_PROMPT),
        _ => None,
    }
}

/// Replaces every `{name}` placeholder in `template`.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

fn describe_history(history: &[HistoryItem]) -> String {
    if history.is_empty() {
        return "(none yet)".to_string();
    }
    history
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let score = item
                .awarded_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{}. Q: {} | A: {} | score: {}",
                i + 1,
                item.question,
                item.answer,
                score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_document(config: &Configuration) -> String {
    match &config.document {
        Some(doc) => format!(
            "Base the quiz on this reference material ({}):\n---\n{}\n---",
            doc.name, doc.content
        ),
        None => String::new(),
    }
}

pub fn parse_introduction(content: &str) -> Result<String> {
    let out: IntroductionOut = serde_json::from_str(content)
        .with_context(|| format!("Invalid introduction JSON: {content}"))?;
    Ok(out.introduction)
}

pub fn parse_question(content: &str) -> Result<Option<String>> {
    let out: QuestionOut = serde_json::from_str(content)
        .with_context(|| format!("Invalid question JSON: {content}"))?;
    Ok(out.question.filter(|q| !q.trim().is_empty()))
}

pub fn parse_evaluation(content: &str) -> Result<Evaluation> {
    let out: EvaluationOut = serde_json::from_str(content)
        .with_context(|| format!("Invalid evaluation JSON: {content}"))?;
    if !out.score.is_finite() {
        return Err(anyhow::anyhow!("Evaluation score is not a number: {content}"));
    }
    Ok(Evaluation {
        score: out.score.round().clamp(0.0, MAX_SCORE as f64) as u32,
        explanation: out.explanation,
        illustration_request: out.illustration,
    })
}

pub fn parse_summary(content: &str) -> Result<Summary> {
    let out: SummaryOut = serde_json::from_str(content)
        .with_context(|| format!("Invalid summary JSON: {content}"))?;
    Ok(Summary {
        text: out.summary,
        suggestions: out.suggestions,
    })
}

/// Talks to the OpenAI REST API for every generative service of a quiz.
pub struct OpenAiTutor {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    speech_model: String,
    voice: String,
    image_model: String,
    prompts: HashMap<String, String>,
}

impl OpenAiTutor {
    /// `prompts` overrides the built-in templates by key (`introduction`,
    /// `question`, `evaluation`, `summary`).
    pub fn new(api_key: String, chat_model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            chat_model,
            speech_model: "gpt-4o-mini-tts".to_string(),
            voice: "alloy".to_string(),
            image_model: "dall-e-3".to_string(),
            prompts,
        }
    }

    pub fn with_speech(mut self, model: String, voice: String) -> Self {
        self.speech_model = model;
        self.voice = voice;
        self
    }

    pub fn with_image_model(mut self, model: String) -> Self {
        self.image_model = model;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn prompt(&self, key: &str, config: &Configuration, extra: &[(&str, &str)]) -> Result<String> {
        let template = match self.prompts.get(key) {
            Some(template) => template.as_str(),
            None => builtin_prompt(key).with_context(|| format!("No prompt named '{key}'"))?,
        };
        let max_score = MAX_SCORE.to_string();
        let document = describe_document(config);
        let mut values: Vec<(&str, &str)> = vec![
            ("topic", config.topic.as_str()),
            ("level", config.level.label()),
            ("language", config.language.name()),
            ("max_score", max_score.as_str()),
            ("document", document.as_str()),
        ];
        values.extend_from_slice(extra);
        Ok(render(template, &values))
    }

    async fn chat(&self, prompt: String, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "response_format": { "type": "json_object" },
            "temperature": temperature
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmResponse>()
            .await?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        Ok(answer.clone())
    }
}

#[async_trait]
impl Introducer for OpenAiTutor {
    async fn introduce(&self, config: &Configuration) -> Result<String> {
        let prompt = self.prompt("introduction", config, &[])?;
        let content = self.chat(prompt, 0.7).await?;
        parse_introduction(&content)
    }
}

#[async_trait]
impl QuestionSource for OpenAiTutor {
    async fn next_question(
        &self,
        config: &Configuration,
        answered: &[HistoryItem],
    ) -> Result<Option<String>> {
        let history = describe_history(answered);
        let prompt = self.prompt("question", config, &[("history", history.as_str())])?;
        let content = self.chat(prompt, 0.7).await?;
        parse_question(&content)
    }
}

#[async_trait]
impl AnswerEvaluator for OpenAiTutor {
    async fn evaluate(
        &self,
        config: &Configuration,
        question: &str,
        answer: &str,
    ) -> Result<Evaluation> {
        let prompt = self.prompt(
            "evaluation",
            config,
            &[("question", question), ("answer", answer)],
        )?;
        // Low temperature for consistent grading.
        let content = self.chat(prompt, 0.1).await?;
        parse_evaluation(&content)
    }
}

#[async_trait]
impl Summarizer for OpenAiTutor {
    async fn summarize(&self, config: &Configuration, history: &[HistoryItem]) -> Result<Summary> {
        let history = describe_history(history);
        let prompt = self.prompt("summary", config, &[("history", history.as_str())])?;
        let content = self.chat(prompt, 0.5).await?;
        parse_summary(&content)
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiTutor {
    async fn illustrate(&self, request: &str) -> Result<Option<Illustration>> {
        let body = serde_json::json!({
            "model": self.image_model,
            "prompt": request,
            "n": 1,
            "size": "1024x1024",
            "response_format": "b64_json"
        });

        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ImageResponse>()
            .await?;

        let Some(encoded) = resp.data.into_iter().find_map(|d| d.b64_json) else {
            return Ok(None);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("Image payload is not valid base64")?;
        Ok(Some(Illustration {
            bytes,
            mime: "image/png".to_string(),
        }))
    }
}

#[async_trait]
impl Narrator for OpenAiTutor {
    async fn narrate(&self, text: &str, language: Language) -> Result<Option<Audio>> {
        let body = serde_json::json!({
            "model": self.speech_model,
            "input": text,
            "voice": self.voice,
            "instructions": format!("Speak clearly in {} ({}).", language.name(), language.hint()),
            "response_format": "pcm"
        });

        let bytes = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(Audio {
            pcm: bytes.to_vec(),
            sample_rate: SPEECH_SAMPLE_RATE,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{DocumentHandle, Level};
    use std::env;

    fn config() -> Configuration {
        Configuration::new("Photosynthesis", Level::HighSchool, Language::English)
    }

    #[test]
    fn test_render_fills_every_placeholder() {
        let text = render(
            "{topic} for {level}, {topic} again, {unknown}",
            &[("topic", "Light"), ("level", "high school")],
        );
        assert_eq!(text, "Light for high school, Light again, {unknown}");
    }

    #[test]
    fn test_prompt_prefers_loaded_templates() {
        let mut prompts = HashMap::new();
        prompts.insert("question".to_string(), "Ask about {topic}: {history}".to_string());
        let tutor = OpenAiTutor::new("key".into(), "gpt-4o".into(), prompts);

        let prompt = tutor
            .prompt("question", &config(), &[("history", "(none yet)")])
            .unwrap();
        assert_eq!(prompt, "Ask about Photosynthesis: (none yet)");

        let builtin = tutor.prompt("summary", &config(), &[]).unwrap();
        assert!(builtin.contains("Photosynthesis"));
        assert!(tutor.prompt("missing", &config(), &[]).is_err());
    }

    #[test]
    fn test_document_is_forwarded_into_prompts() {
        let tutor = OpenAiTutor::new("key".into(), "gpt-4o".into(), HashMap::new());
        let config = config().with_document(DocumentHandle {
            name: "notes.md".into(),
            content: "Chloroplasts capture light.".into(),
        });
        let prompt = tutor.prompt("introduction", &config, &[]).unwrap();
        assert!(prompt.contains("notes.md"));
        assert!(prompt.contains("Chloroplasts capture light."));
    }

    #[test]
    fn test_parse_evaluation_rounds_and_clamps() {
        let evaluation = parse_evaluation(
            r#"{"score": 3.6, "explanation": "Mostly right.", "illustration": null}"#,
        )
        .unwrap();
        assert_eq!(evaluation.score, 4);
        assert_eq!(evaluation.illustration_request, None);

        let high = parse_evaluation(r#"{"score": 11, "explanation": "?"}"#).unwrap();
        assert_eq!(high.score, MAX_SCORE);
        assert!(parse_evaluation("not json").is_err());
    }

    #[test]
    fn test_parse_question_treats_empty_as_done() {
        assert_eq!(parse_question(r#"{"question": ""}"#).unwrap(), None);
        assert_eq!(parse_question(r#"{}"#).unwrap(), None);
        assert_eq!(
            parse_question(r#"{"question": "What is a stoma?"}"#).unwrap(),
            Some("What is a stoma?".to_string())
        );
    }

    #[test]
    fn test_parse_summary() {
        let summary =
            parse_summary(r#"{"summary": "Good work.", "suggestions": ["a", "b", "c"]}"#).unwrap();
        assert_eq!(summary.text, "Good work.");
        assert_eq!(summary.suggestions.len(), 3);
    }

    #[test]
    fn test_describe_history_lists_scores() {
        let mut item = HistoryItem::new("What is light?", "");
        item.answer = "Energy".to_string();
        item.awarded_score = Some(2);
        assert_eq!(
            describe_history(&[item]),
            "1. Q: What is light? | A: Energy | score: 2"
        );
        assert_eq!(describe_history(&[]), "(none yet)");
    }

    // Makes a live call to the OpenAI API. Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_question_and_evaluation() {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let tutor = OpenAiTutor::new(api_key, "gpt-4o".to_string(), HashMap::new());

        let question = tutor
            .next_question(&config(), &[])
            .await
            .expect("question request failed")
            .expect("a first question");
        println!("Question: {question}");

        let evaluation = tutor
            .evaluate(&config(), &question, "I am not sure.")
            .await
            .expect("evaluation request failed");
        println!("Evaluation: {evaluation:?}");
        assert!(evaluation.score <= MAX_SCORE);
    }
}
