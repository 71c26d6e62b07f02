use crate::Update;
use crate::adapters::{AnswerEvaluatorAdapter, QuestionSourceAdapter, SummaryAdapter, bounded};
use crate::collaborators::{AudioSink, Collaborators, Summary};
use crate::configuration::{Configuration, ConfigurationError};
use crate::history::{HistoryItem, Illustration, REVIEW_THRESHOLD, Scoreboard, question_key};
use crate::narration::{NarrationChannel, NarrationState};
use crate::review::{merge_queue, prune_tail, select_for_review};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    Introducing,
    Questioning,
    Evaluating,
    Explaining,
    Summarizing,
    Summarized,
    Erred,
}

/// Which collaborator the controller is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Introduction,
    NextQuestion,
    Evaluation,
    Summary,
}

impl Pending {
    pub fn label(&self) -> &'static str {
        match self {
            Pending::Introduction => "preparing your introduction",
            Pending::NextQuestion => "generating next question",
            Pending::Evaluation => "evaluating your answer",
            Pending::Summary => "summarizing your session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input from the user. Nothing changed.
    Validation,
    /// Narration, image or introduction text missing. Degraded, not blocking.
    Enrichment,
    /// Scoring failed and was replaced by a zero score.
    Evaluation,
    /// Question source or summarizer failed. The session is in `Erred`.
    PhaseFetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Configure,
    AcknowledgeIntro,
    SubmitAnswer,
    Advance,
    StartReview,
    FinishReview,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Configure => "configure",
            Action::AcknowledgeIntro => "acknowledge introduction",
            Action::SubmitAnswer => "submit answer",
            Action::Advance => "advance",
            Action::StartReview => "start review",
            Action::FinishReview => "finish review",
        };
        f.write_str(name)
    }
}

/// What the host may offer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions {
    pub configure: bool,
    pub acknowledge_intro: bool,
    pub submit_answer: bool,
    pub advance: bool,
    pub start_review: bool,
    pub finish_review: bool,
    /// Always true.
    pub restart: bool,
}

impl Actions {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Configure => self.configure,
            Action::AcknowledgeIntro => self.acknowledge_intro,
            Action::SubmitAnswer => self.submit_answer,
            Action::Advance => self.advance,
            Action::StartReview => self.start_review,
            Action::FinishReview => self.finish_review,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(#[from] ConfigurationError),
    #[error("answer must not be empty")]
    AnswerEmpty,
    #[error("cannot {action} while {phase:?}")]
    Unavailable { action: Action, phase: Phase },
}

/// The root aggregate of one quiz. Only the `Controller` mutates it.
#[derive(Debug, Clone)]
pub struct Session {
    pub generation: u64,
    pub configuration: Option<Configuration>,
    pub phase: Phase,
    pub introduction: Option<String>,
    pub current_question: Option<String>,
    /// History index of the item whose explanation is showing.
    pub current_item: Option<usize>,
    pub history: Vec<HistoryItem>,
    pub review_queue: Vec<usize>,
    pub review_cursor: usize,
    pub reviewing: bool,
    /// Queue entries left when a review round was finished early.
    pub unresolved: Vec<usize>,
    pub scores: Scoreboard,
    pub summary: Option<Summary>,
    pub pending_narration: Option<String>,
    pub last_error: Option<SessionFailure>,
}

impl Session {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            configuration: None,
            phase: Phase::Configuring,
            introduction: None,
            current_question: None,
            current_item: None,
            history: vec![],
            review_queue: vec![],
            review_cursor: 0,
            reviewing: false,
            unresolved: vec![],
            scores: Scoreboard::default(),
            summary: None,
            pending_narration: None,
            last_error: None,
        }
    }

    pub fn current(&self) -> Option<&HistoryItem> {
        self.current_item.and_then(|index| self.history.get(index))
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Upper bound for question, evaluation and summary calls. `None` waits forever.
    pub call_timeout: Option<Duration>,
    pub narration: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            narration: true,
        }
    }
}

struct IllustrationOutcome {
    generation: u64,
    index: usize,
    ticket: u64,
    image: Option<Illustration>,
}

/// Drives a `Session` through its phases, one action at a time.
pub struct Controller {
    session: Session,
    collaborators: Collaborators,
    questions: QuestionSourceAdapter,
    evaluator: AnswerEvaluatorAdapter,
    summaries: SummaryAdapter,
    narration: NarrationChannel,
    narration_enabled: bool,
    call_timeout: Option<Duration>,
    enrichments: JoinSet<IllustrationOutcome>,
    next_ticket: u64,
    busy: Option<Pending>,
    updates: Option<mpsc::Sender<Update>>,
}

impl Controller {
    pub fn new(
        collaborators: Collaborators,
        sink: Arc<dyn AudioSink>,
        options: ControllerOptions,
    ) -> Self {
        let timeout = options.call_timeout;
        Self {
            session: Session::new(0),
            questions: QuestionSourceAdapter::new(collaborators.questions.clone(), timeout),
            evaluator: AnswerEvaluatorAdapter::new(collaborators.evaluator.clone(), timeout),
            summaries: SummaryAdapter::new(collaborators.summarizer.clone(), timeout),
            narration: NarrationChannel::new(collaborators.narrator.clone(), sink),
            narration_enabled: options.narration,
            call_timeout: timeout,
            collaborators,
            enrichments: JoinSet::new(),
            next_ticket: 0,
            busy: None,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::Sender<Update>) -> Self {
        self.narration = self.narration.with_updates(updates.clone());
        self.updates = Some(updates);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn busy(&self) -> Option<Pending> {
        self.busy
    }

    pub fn scores(&self) -> Scoreboard {
        self.session.scores
    }

    pub fn narration_state(&self) -> NarrationState {
        self.narration.state()
    }

    /// Items that qualify for review right now, computed from the current history.
    pub fn review_eligible(&self) -> Vec<usize> {
        select_for_review(&self.session.history, REVIEW_THRESHOLD)
    }

    pub fn actions(&self) -> Actions {
        let idle = self.busy.is_none();
        let session = &self.session;
        let phase = session.phase;
        Actions {
            configure: idle && phase == Phase::Configuring,
            acknowledge_intro: idle && phase == Phase::Introducing,
            submit_answer: idle
                && phase == Phase::Questioning
                && session.current_question.is_some(),
            advance: idle && phase == Phase::Explaining,
            start_review: idle && phase == Phase::Summarized && !self.review_eligible().is_empty(),
            finish_review: idle
                && session.reviewing
                && matches!(phase, Phase::Questioning | Phase::Explaining),
            restart: true,
        }
    }

    /// The call `action` would wait on if it were taken now, or `None` when it
    /// is unavailable or completes without one.
    pub fn upcoming(&self, action: Action) -> Option<Pending> {
        if !self.actions().allows(action) {
            return None;
        }
        let session = &self.session;
        let limit_reached = session
            .configuration
            .as_ref()
            .is_some_and(|config| session.history.len() >= config.question_limit);
        match action {
            Action::Configure => Some(Pending::Introduction),
            Action::AcknowledgeIntro if limit_reached => Some(Pending::Summary),
            Action::AcknowledgeIntro => Some(Pending::NextQuestion),
            Action::SubmitAnswer => Some(Pending::Evaluation),
            Action::Advance if session.reviewing => {
                let last = session.review_cursor + 1 >= session.review_queue.len();
                last.then_some(Pending::Summary)
            }
            Action::Advance if limit_reached => Some(Pending::Summary),
            Action::Advance => Some(Pending::NextQuestion),
            Action::StartReview => merge_queue(
                &session.unresolved,
                &self.review_eligible(),
                session.history.len(),
            )
            .is_empty()
            .then_some(Pending::Summary),
            Action::FinishReview => Some(Pending::Summary),
        }
    }

    pub async fn submit_configuration(
        &mut self,
        configuration: Configuration,
    ) -> Result<(), SessionError> {
        self.begin(Action::Configure)?;
        let configuration = match configuration.validate() {
            Ok(configuration) => configuration,
            Err(e) => {
                tracing::info!("Rejected configuration: {}", e);
                self.note(FailureKind::Validation, e.to_string());
                return Err(e.into());
            }
        };
        tracing::info!(
            "Starting quiz on '{}' ({}, {})",
            configuration.topic,
            configuration.level,
            configuration.language
        );
        self.session.configuration = Some(configuration.clone());
        self.enter(Phase::Introducing);

        self.set_busy(Some(Pending::Introduction));
        let introducer = self.collaborators.introducer.clone();
        let result = bounded(
            self.call_timeout,
            "introducer",
            introducer.introduce(&configuration),
        )
        .await;
        self.set_busy(None);

        match result {
            Ok(text) if !text.trim().is_empty() => {
                self.session.introduction = Some(text.trim().to_string());
            }
            Ok(_) => {
                tracing::warn!("Introduction came back empty, using a local one");
                self.note(
                    FailureKind::Enrichment,
                    "The introduction could not be generated.".to_string(),
                );
                self.session.introduction = Some(fallback_introduction(&configuration));
            }
            Err(e) => {
                self.fail(format!("Could not start the quiz: {e:#}"));
                return Ok(());
            }
        }
        if let Some(text) = self.session.introduction.clone() {
            self.commit_narration(text);
        }
        Ok(())
    }

    pub async fn acknowledge_intro(&mut self) -> Result<(), SessionError> {
        self.begin(Action::AcknowledgeIntro)?;
        self.fetch_next_question().await;
        Ok(())
    }

    pub async fn submit_answer(&mut self, answer: &str) -> Result<(), SessionError> {
        self.begin(Action::SubmitAnswer)?;
        let answer = answer.trim();
        if answer.is_empty() {
            self.note(FailureKind::Validation, SessionError::AnswerEmpty.to_string());
            return Err(SessionError::AnswerEmpty);
        }
        let Some(question) = self.session.current_question.clone() else {
            return Err(self.unavailable(Action::SubmitAnswer));
        };
        let Some(configuration) = self.session.configuration.clone() else {
            return Err(self.unavailable(Action::SubmitAnswer));
        };

        self.enter(Phase::Evaluating);
        self.set_busy(Some(Pending::Evaluation));
        let assessment = self.evaluator.assess(&configuration, &question, answer).await;
        self.set_busy(None);

        let index = self.upsert_item(&question);
        let item = &mut self.session.history[index];
        if self.session.reviewing {
            item.review_attempts += 1;
        }
        item.record(
            answer.to_string(),
            assessment.score,
            assessment.explanation.clone(),
            assessment.illustration_request.clone(),
        );
        self.session.scores = Scoreboard::fold(&self.session.history);
        self.session.current_item = Some(index);
        tracing::info!(
            "Scored {}/{} for question {} (running {}/{})",
            assessment.score,
            self.session.history[index].possible_score,
            index + 1,
            self.session.scores.combined.total,
            self.session.scores.combined.possible
        );

        if let Some(reason) = assessment.degraded {
            self.note(FailureKind::Evaluation, reason);
        }
        if let Some(request) = assessment.illustration_request {
            self.request_illustration(index, request);
        }
        // A no-op while only the cursor entry is rescored and queue entries
        // are unique. Keeps the unvisited tail eligible if that ever changes.
        if self.session.reviewing {
            let cursor = self.session.review_cursor;
            prune_tail(
                &mut self.session.review_queue,
                cursor,
                &self.session.history,
                REVIEW_THRESHOLD,
            );
        }

        self.enter(Phase::Explaining);
        self.commit_narration(assessment.explanation);
        Ok(())
    }

    /// Moves on from an explanation: the next review item, the next fresh
    /// question, or the summary when either runs out.
    pub async fn advance(&mut self) -> Result<(), SessionError> {
        self.begin(Action::Advance)?;
        self.session.current_question = None;
        self.session.current_item = None;

        if self.session.reviewing {
            self.session.review_cursor += 1;
            let cursor = self.session.review_cursor;
            match self.session.review_queue.get(cursor).copied() {
                Some(index) => self.ask_review_item(index),
                None => {
                    tracing::info!("Review queue exhausted");
                    self.leave_review(Vec::new());
                    self.summarize().await;
                }
            }
        } else {
            self.fetch_next_question().await;
        }
        Ok(())
    }

    pub async fn start_review(&mut self) -> Result<(), SessionError> {
        self.begin(Action::StartReview)?;
        let eligible = self.review_eligible();
        let queue = merge_queue(
            &self.session.unresolved,
            &eligible,
            self.session.history.len(),
        );
        tracing::info!("Starting review of {} item(s)", queue.len());

        self.session.unresolved.clear();
        self.session.review_queue = queue;
        self.session.review_cursor = 0;
        self.session.reviewing = true;
        self.session.summary = None;
        match self.session.review_queue.first().copied() {
            Some(index) => self.ask_review_item(index),
            None => {
                self.leave_review(Vec::new());
                self.summarize().await;
            }
        }
        Ok(())
    }

    /// Leaves review before the queue is exhausted. Unanswered entries are
    /// carried into the next review round.
    pub async fn finish_review(&mut self) -> Result<(), SessionError> {
        self.begin(Action::FinishReview)?;
        let answered = usize::from(self.session.phase == Phase::Explaining);
        let from = (self.session.review_cursor + answered).min(self.session.review_queue.len());
        let unresolved = self.session.review_queue[from..].to_vec();
        tracing::info!("Finishing review early, {} item(s) unresolved", unresolved.len());

        self.session.current_question = None;
        self.session.current_item = None;
        self.leave_review(unresolved);
        self.summarize().await;
        Ok(())
    }

    /// Discards the session. Anything still in flight for it is ignored.
    pub fn restart(&mut self) {
        let generation = self.session.generation + 1;
        tracing::info!("Restarting session (generation {})", generation);
        self.narration.cancel();
        self.enrichments.abort_all();
        self.enrichments = JoinSet::new();
        self.session = Session::new(generation);
        self.set_busy(None);
        self.announce(Update::Phase(Phase::Configuring));
    }

    pub fn set_narration(&mut self, enabled: bool) {
        self.narration_enabled = enabled;
        if !enabled {
            self.narration.cancel();
            self.session.pending_narration = None;
        }
    }

    /// Waits for the next image request to finish and applies it. Returns the
    /// history index that received an image. Never resolves while nothing is
    /// outstanding, so it can sit in a `tokio::select!`.
    pub async fn next_enrichment(&mut self) -> Option<usize> {
        if self.enrichments.is_empty() {
            std::future::pending::<()>().await;
        }
        match self.enrichments.join_next().await? {
            Ok(outcome) => self.apply_illustration(outcome),
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!("Illustration task failed: {:?}", e);
                }
                None
            }
        }
    }

    /// Applies every outstanding image request.
    pub async fn settle_enrichments(&mut self) {
        while let Some(result) = self.enrichments.join_next().await {
            match result {
                Ok(outcome) => {
                    self.apply_illustration(outcome);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("Illustration task failed: {:?}", e),
            }
        }
    }

    /// Waits for the current narration request to resolve.
    pub async fn settle_narration(&mut self) {
        self.narration.settle().await;
    }

    async fn fetch_next_question(&mut self) {
        let Some(configuration) = self.session.configuration.clone() else {
            self.fail("No configuration was submitted".to_string());
            return;
        };
        self.set_busy(Some(Pending::NextQuestion));
        let next = self
            .questions
            .next(&configuration, &self.session.history)
            .await;
        self.set_busy(None);

        match next {
            Ok(Some(question)) => {
                tracing::info!("Question {}: {}", self.session.history.len() + 1, question);
                self.session.current_question = Some(question.clone());
                self.enter(Phase::Questioning);
                self.commit_narration(question);
            }
            Ok(None) => {
                tracing::info!("Question source exhausted after {} item(s)", self.session.history.len());
                self.summarize().await;
            }
            Err(e) => self.fail(format!("Could not load the next question: {e:#}")),
        }
    }

    async fn summarize(&mut self) {
        let Some(configuration) = self.session.configuration.clone() else {
            self.fail("No configuration was submitted".to_string());
            return;
        };
        self.enter(Phase::Summarizing);
        self.set_busy(Some(Pending::Summary));
        let result = self
            .summaries
            .summarize(&configuration, &self.session.history)
            .await;
        self.set_busy(None);

        match result {
            Ok(summary) => {
                self.session.review_queue = self.review_eligible();
                self.session.review_cursor = 0;
                let text = summary.text.clone();
                self.session.summary = Some(summary);
                self.enter(Phase::Summarized);
                self.commit_narration(text);
            }
            Err(e) => self.fail(format!("Could not summarize the session: {e:#}")),
        }
    }

    fn ask_review_item(&mut self, index: usize) {
        let question = self.session.history[index].question.clone();
        tracing::info!(
            "Review {}/{}: {}",
            self.session.review_cursor + 1,
            self.session.review_queue.len(),
            question
        );
        self.session.current_question = Some(question.clone());
        self.enter(Phase::Questioning);
        self.commit_narration(question);
    }

    fn leave_review(&mut self, unresolved: Vec<usize>) {
        self.session.reviewing = false;
        self.session.review_queue.clear();
        self.session.review_cursor = 0;
        self.session.unresolved = unresolved;
    }

    /// Index of the item for `question`, creating it if this question was never answered.
    fn upsert_item(&mut self, question: &str) -> usize {
        if self.session.reviewing {
            if let Some(&index) = self.session.review_queue.get(self.session.review_cursor) {
                return index;
            }
        }
        let key = question_key(question);
        match self.session.history.iter().position(|item| item.key() == key) {
            Some(index) => index,
            None => {
                self.session
                    .history
                    .push(HistoryItem::new(question, String::new()));
                self.session.history.len() - 1
            }
        }
    }

    fn request_illustration(&mut self, index: usize, request: String) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let generation = self.session.generation;
        self.session.history[index].illustration_ticket = Some(ticket);
        tracing::debug!("Illustration request {} for item {}", ticket, index);

        let images = self.collaborators.images.clone();
        self.enrichments.spawn(async move {
            let image = match images.illustrate(&request).await {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Illustration request {} failed: {:?}", ticket, e);
                    None
                }
            };
            IllustrationOutcome {
                generation,
                index,
                ticket,
                image,
            }
        });
    }

    fn apply_illustration(&mut self, outcome: IllustrationOutcome) -> Option<usize> {
        if outcome.generation != self.session.generation {
            tracing::debug!(
                "Discarding illustration {} from generation {}",
                outcome.ticket,
                outcome.generation
            );
            return None;
        }
        let item = self.session.history.get_mut(outcome.index)?;
        if item.illustration_ticket != Some(outcome.ticket) {
            tracing::debug!("Discarding superseded illustration {}", outcome.ticket);
            return None;
        }
        item.illustration_ticket = None;
        let image = outcome.image?;
        item.illustration = Some(image);
        self.announce(Update::Illustrated {
            index: outcome.index,
        });
        Some(outcome.index)
    }

    /// Narration only starts once `text` is part of the session.
    fn commit_narration(&mut self, text: String) {
        self.session.pending_narration = Some(text);
        if !self.narration_enabled {
            self.session.pending_narration = None;
            return;
        }
        if let (Some(text), Some(configuration)) = (
            self.session.pending_narration.take(),
            self.session.configuration.as_ref(),
        ) {
            self.narration.speak(&text, configuration.language);
        }
    }

    fn begin(&mut self, action: Action) -> Result<(), SessionError> {
        if !self.actions().allows(action) {
            return Err(self.unavailable(action));
        }
        self.session.last_error = None;
        Ok(())
    }

    fn unavailable(&self, action: Action) -> SessionError {
        tracing::debug!("Rejected '{}' in {:?}", action, self.session.phase);
        SessionError::Unavailable {
            action,
            phase: self.session.phase,
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.session.phase != phase {
            tracing::info!("Phase {:?} -> {:?}", self.session.phase, phase);
            self.session.phase = phase;
            self.announce(Update::Phase(phase));
        }
    }

    fn fail(&mut self, message: String) {
        tracing::error!("{}", message);
        self.narration.cancel();
        self.session.pending_narration = None;
        self.session.current_question = None;
        self.enter(Phase::Erred);
        self.note(FailureKind::PhaseFetch, message);
    }

    fn note(&mut self, kind: FailureKind, message: String) {
        self.session.last_error = Some(SessionFailure { kind, message });
    }

    fn set_busy(&mut self, pending: Option<Pending>) {
        self.busy = pending;
        if let Some(pending) = pending {
            tracing::debug!("Waiting: {}", pending.label());
        }
        self.announce(Update::Busy(pending));
    }

    fn announce(&self, update: Update) {
        if let Some(tx) = &self.updates {
            if let Err(e) = tx.try_send(update) {
                tracing::warn!("Failed to send session update: {:?}", e);
            }
        }
    }
}

fn fallback_introduction(configuration: &Configuration) -> String {
    format!(
        "Welcome! This quiz covers {} at the {} level. Answer each question in your own words and you will get feedback after every answer.",
        configuration.topic, configuration.level
    )
}
