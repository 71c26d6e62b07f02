use anyhow::{Context, Result};
use quiz_core::history::Scoreboard;
use quiz_core::session_state::Session;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct ReportItem {
    pub question: String,
    pub answer: String,
    pub score: Option<u32>,
    pub first_score: Option<u32>,
    pub review_attempts: u32,
}

/// What a finished quiz leaves behind in the output directory.
#[derive(Debug, Serialize)]
pub struct Report {
    pub topic: String,
    pub level: String,
    pub language: String,
    pub scores: Scoreboard,
    pub summary: Option<String>,
    pub suggestions: Vec<String>,
    pub items: Vec<ReportItem>,
}

impl Report {
    pub fn from_session(session: &Session) -> Self {
        let (topic, level, language) = match &session.configuration {
            Some(config) => (
                config.topic.clone(),
                config.level.to_string(),
                config.language.to_string(),
            ),
            None => Default::default(),
        };
        Self {
            topic,
            level,
            language,
            scores: session.scores,
            summary: session.summary.as_ref().map(|s| s.text.clone()),
            suggestions: session
                .summary
                .as_ref()
                .map(|s| s.suggestions.clone())
                .unwrap_or_default(),
            items: session
                .history
                .iter()
                .map(|item| ReportItem {
                    question: item.question.clone(),
                    answer: item.answer.clone(),
                    score: item.awarded_score,
                    first_score: item.first_score,
                    review_attempts: item.review_attempts,
                })
                .collect(),
        }
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        let path = dir.join("report.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::configuration::{Configuration, Language, Level};
    use quiz_core::history::HistoryItem;
    use tempfile::tempdir;

    #[test]
    fn test_report_is_written_as_json() -> Result<()> {
        let mut session = Session::new(0);
        session.configuration = Some(Configuration::new(
            "Photosynthesis",
            Level::University,
            Language::French,
        ));
        let mut item = HistoryItem::new("What is light?", "Energy");
        item.awarded_score = Some(2);
        session.history.push(item);
        session.scores = Scoreboard::fold(&session.history);

        let dir = tempdir()?;
        let path = Report::from_session(&session).write(dir.path())?;
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;

        assert_eq!(json["topic"], "Photosynthesis");
        assert_eq!(json["language"], "French");
        assert_eq!(json["items"][0]["score"], 2);
        assert_eq!(json["scores"]["combined"]["possible"], 5);
        Ok(())
    }
}
