use anyhow::{Context, Result};
use clap::Parser;
use quiz_core::Update;
use quiz_core::collaborators::{AudioSink, Collaborators};
use quiz_core::configuration::{
    Configuration, DEFAULT_QUESTION_LIMIT, DocumentHandle, Language, Level,
};
use quiz_core::history::Tally;
use quiz_core::session_state::{Action, Controller, ControllerOptions, Phase, SessionError};
use quiz_core::simulated::SimulatedTutor;
use quiz_core::tutor_client::OpenAiTutor;
use quiz_service::commands::{Command, HELP};
use quiz_service::config::{Config, Provider};
use quiz_service::report::Report;
use quiz_service::{document, prompt_loader, sinks};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "An adaptive, narrated quiz in your terminal")]
struct Cli {
    /// The topic to be quizzed on. Asked for interactively when omitted.
    #[arg(long)]
    topic: Option<String>,
    /// Target level: elementary, middle-school, high-school, university or professional
    #[arg(long, default_value_t = Level::HighSchool)]
    level: Level,
    /// Language of questions, feedback and narration
    #[arg(long, default_value_t = Language::English)]
    language: Language,
    /// A UTF-8 text or markdown file to base the questions on
    #[arg(long)]
    document: Option<PathBuf>,
    /// Maximum number of fresh questions
    #[arg(long, default_value_t = DEFAULT_QUESTION_LIMIT)]
    questions: usize,
    /// Start with narration switched off
    #[arg(long)]
    no_narration: bool,
}

enum Flow {
    Continue,
    Quit,
}

/// Drives one controller from terminal input and prints what it shows.
struct Host {
    controller: Controller,
    level: Level,
    language: Language,
    document: Option<DocumentHandle>,
    question_limit: usize,
    last_topic: Option<String>,
    output_dir: PathBuf,
}

impl Host {
    async fn start(&mut self, topic: String) {
        let mut configuration = Configuration::new(topic.clone(), self.level, self.language)
            .with_question_limit(self.question_limit);
        if let Some(document) = &self.document {
            configuration = configuration.with_document(document.clone());
        }
        self.last_topic = Some(topic);
        self.announce(Action::Configure);
        let result = self.controller.submit_configuration(configuration).await;
        self.after(result);
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Quit => return Flow::Quit,
            Command::Help => println!("{HELP}"),
            Command::Score => self.print_scores(),
            Command::Unknown(line) => println!("Unknown command '{line}', type /help for a list."),
            Command::Voice(enabled) => {
                self.controller.set_narration(enabled);
                println!("Narration {}.", if enabled { "on" } else { "off" });
            }
            Command::Restart => {
                self.controller.restart();
                self.render();
            }
            Command::Next => {
                self.announce(Action::Advance);
                let result = self.controller.advance().await;
                self.after(result);
            }
            Command::Review => {
                self.announce(Action::StartReview);
                let result = self.controller.start_review().await;
                self.after(result);
            }
            Command::Finish => {
                self.announce(Action::FinishReview);
                let result = self.controller.finish_review().await;
                self.after(result);
            }
            Command::Text(text) => self.on_text(text).await,
        }
        Flow::Continue
    }

    async fn on_text(&mut self, text: String) {
        match self.controller.phase() {
            Phase::Configuring => {
                let topic = if text.is_empty() {
                    self.last_topic.clone()
                } else {
                    Some(text)
                };
                match topic {
                    Some(topic) => self.start(topic).await,
                    None => println!("Please type a topic."),
                }
            }
            Phase::Introducing => {
                self.announce(Action::AcknowledgeIntro);
                let result = self.controller.acknowledge_intro().await;
                self.after(result);
            }
            Phase::Questioning => {
                if !text.is_empty() {
                    self.announce(Action::SubmitAnswer);
                }
                let result = self.controller.submit_answer(&text).await;
                self.after(result);
            }
            Phase::Explaining if text.is_empty() => {
                self.announce(Action::Advance);
                let result = self.controller.advance().await;
                self.after(result);
            }
            Phase::Explaining => println!("Press Enter or type /next to continue."),
            Phase::Summarized => {
                println!("The quiz is over. Type /review, /restart or /quit.")
            }
            Phase::Erred => println!("Something went wrong. Type /restart to start over."),
            Phase::Evaluating | Phase::Summarizing => println!("Please wait..."),
        }
    }

    /// Shows which call the next action waits on, before it is awaited.
    fn announce(&self, action: Action) {
        if let Some(pending) = self.controller.upcoming(action) {
            println!("({}...)", pending.label());
        }
    }

    fn after(&mut self, result: Result<(), SessionError>) {
        match result {
            Ok(()) => self.render(),
            Err(SessionError::Unavailable { action, .. }) => {
                println!("You cannot {action} right now.")
            }
            Err(e) => println!("! {e}"),
        }
    }

    fn render(&self) {
        let session = self.controller.session();
        if let Some(failure) = &session.last_error {
            if session.phase != Phase::Erred {
                println!("! {}", failure.message);
            }
        }

        match session.phase {
            Phase::Configuring => match &self.last_topic {
                Some(topic) => println!("\nNew quiz. Type a topic (Enter to reuse '{topic}'):"),
                None => println!("\nWhat topic would you like to be quizzed on?"),
            },
            Phase::Introducing => {
                if let Some(intro) = &session.introduction {
                    println!("\n{intro}");
                }
                println!("\nPress Enter to begin.");
            }
            Phase::Questioning => {
                if let Some(question) = &session.current_question {
                    let label = if session.reviewing {
                        format!(
                            "Review {}/{}",
                            session.review_cursor + 1,
                            session.review_queue.len()
                        )
                    } else {
                        format!("Question {}", session.history.len() + 1)
                    };
                    println!("\n{label}: {question}");
                }
            }
            Phase::Explaining => {
                if let Some(item) = session.current() {
                    println!(
                        "\nScore: {}/{}",
                        item.awarded_score.unwrap_or(0),
                        item.possible_score
                    );
                    if let Some(explanation) = &item.explanation {
                        println!("{explanation}");
                    }
                }
                let finish = if self.controller.actions().finish_review {
                    ", /finish to stop reviewing"
                } else {
                    ""
                };
                println!("\n(Enter or /next to continue{finish})");
            }
            Phase::Summarized => {
                if let Some(summary) = &session.summary {
                    println!("\n{}", summary.text);
                    for suggestion in &summary.suggestions {
                        println!("  - {suggestion}");
                    }
                }
                self.print_scores();
                self.write_report();
                if self.controller.actions().start_review {
                    println!(
                        "\n{} question(s) can be reviewed. Type /review to try them again.",
                        self.controller.review_eligible().len()
                    );
                }
                println!("Type /restart for a new quiz or /quit to leave.");
            }
            Phase::Erred => {
                if let Some(failure) = &session.last_error {
                    println!("\n! {}", failure.message);
                }
                println!("Type /restart to start over.");
            }
            Phase::Evaluating | Phase::Summarizing => {}
        }
    }

    fn print_scores(&self) {
        let scores = self.controller.scores();
        let line = |name: &str, tally: Tally| match tally.percent() {
            Some(percent) => println!(
                "  {name:<9} {}/{} ({percent:.0}%)",
                tally.total, tally.possible
            ),
            None => println!("  {name:<9} -"),
        };
        println!("\nScores:");
        line("fresh", scores.fresh);
        line("reviewed", scores.reviewed);
        line("combined", scores.combined);
    }

    fn write_report(&self) {
        match Report::from_session(self.controller.session()).write(&self.output_dir) {
            Ok(path) => tracing::info!("Report written to {}", path.display()),
            Err(e) => tracing::warn!("Failed to write report: {:?}", e),
        }
    }

    fn on_update(&self, update: Update) {
        match update {
            Update::Illustrated { index } => {
                let session = self.controller.session();
                let Some(illustration) = session
                    .history
                    .get(index)
                    .and_then(|item| item.illustration.as_ref())
                else {
                    return;
                };
                match sinks::save_illustration(&self.output_dir, index, illustration) {
                    Ok(path) => println!(
                        "(An illustration for question {} is ready: {})",
                        index + 1,
                        path.display()
                    ),
                    Err(e) => tracing::warn!("Failed to save illustration: {:?}", e),
                }
            }
            Update::Busy(Some(pending)) => tracing::debug!("Busy: {}", pending.label()),
            other => tracing::debug!("Session update: {:?}", other),
        }
    }
}

#[cfg(feature = "speaker")]
fn speaker_sink() -> Option<Arc<dyn AudioSink>> {
    match sinks::SpeakerSink::open() {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            tracing::warn!("No speaker available, writing narration to files: {:?}", e);
            None
        }
    }
}

#[cfg(not(feature = "speaker"))]
fn speaker_sink() -> Option<Arc<dyn AudioSink>> {
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded successfully. Starting quiz service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    let document = args
        .document
        .as_deref()
        .map(document::load_document)
        .transpose()
        .context("Failed to load reference document")?;

    // --- 4. Initialize Collaborators ---
    let collaborators = match config.provider {
        Provider::OpenAI => {
            let prompts = prompt_loader::load_prompt_overrides(&config.prompts_dir)
                .context("Failed to load LLM prompts")?;
            tracing::info!("Loaded {} prompt override(s).", prompts.len());
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY must be set for openai provider")?;
            let tutor = OpenAiTutor::new(api_key, config.chat_model.clone(), prompts)
                .with_speech(config.tts_model.clone(), config.tts_voice.clone())
                .with_image_model(config.image_model.clone());
            Collaborators::uniform(Arc::new(tutor))
        }
        Provider::Simulated => {
            tracing::info!("Using the simulated tutor; no network calls will be made.");
            Collaborators::uniform(Arc::new(SimulatedTutor::new()))
        }
    };

    // --- 5. Session Setup ---
    let sink: Arc<dyn AudioSink> = match speaker_sink() {
        Some(sink) => sink,
        None => Arc::new(sinks::WavFileSink::new(&config.output_dir)?),
    };
    let (update_tx, mut update_rx) = tokio::sync::mpsc::channel::<Update>(64);
    let controller = Controller::new(
        collaborators,
        sink,
        ControllerOptions {
            call_timeout: config.call_timeout,
            narration: config.narration && !args.no_narration,
        },
    )
    .with_updates(update_tx);

    let mut host = Host {
        controller,
        level: args.level,
        language: args.language,
        document,
        question_limit: args.questions,
        last_topic: None,
        output_dir: config.output_dir.clone(),
    };

    println!("Type /help for commands.");
    match args.topic {
        Some(topic) => host.start(topic).await,
        None => host.render(),
    }

    // --- 6. Main Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    tracing::info!("Input closed, shutting down.");
                    break;
                };
                if let Flow::Quit = host.handle(Command::parse(&line)).await {
                    break;
                }
            }
            index = host.controller.next_enrichment() => {
                tracing::debug!("Enrichment applied to {:?}", index);
            }
            Some(update) = update_rx.recv() => host.on_update(update),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down.");
                break;
            }
        }
    }

    if !host.controller.session().history.is_empty() {
        host.write_report();
    }
    Ok(())
}
