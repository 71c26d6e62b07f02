use quiz_core::Update;
use quiz_core::collaborators::{Collaborators, NullSink};
use quiz_core::configuration::{Configuration, Language, Level};
use quiz_core::history::MAX_SCORE;
use quiz_core::session_state::{Controller, ControllerOptions, Phase, SessionError};
use quiz_core::simulated::SimulatedTutor;
use std::sync::Arc;
use tokio::sync::mpsc;

const GOOD_DEFINITION: &str = "Photosynthesis means the process plants use to make sugar.";
const GOOD_IMPORTANCE: &str = "Photosynthesis is important because it feeds the food chain.";

fn controller() -> Controller {
    Controller::new(
        Collaborators::uniform(Arc::new(SimulatedTutor::new())),
        Arc::new(NullSink),
        ControllerOptions::default(),
    )
}

fn configuration() -> Configuration {
    Configuration::new("  Photosynthesis ", Level::HighSchool, Language::English)
        .with_question_limit(2)
}

#[tokio::test]
async fn test_full_quiz_with_review_round() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut controller = controller().with_updates(tx);

    controller
        .submit_configuration(configuration())
        .await
        .expect("configuration accepted");
    assert_eq!(controller.phase(), Phase::Introducing);
    let introduction = controller.session().introduction.clone().expect("intro");
    assert!(introduction.contains("Photosynthesis"));

    controller.acknowledge_intro().await.expect("ack");
    assert_eq!(controller.phase(), Phase::Questioning);
    controller.submit_answer(GOOD_DEFINITION).await.expect("answer 1");
    assert_eq!(controller.phase(), Phase::Explaining);
    assert_eq!(controller.session().history[0].awarded_score, Some(MAX_SCORE));

    controller.advance().await.expect("advance 1");
    assert_eq!(
        controller.session().current_question.as_deref(),
        Some("Why is Photosynthesis important?")
    );
    controller.submit_answer("xyz").await.expect("answer 2");
    assert_eq!(controller.session().history[1].awarded_score, Some(0));
    controller.settle_enrichments().await;
    assert!(controller.session().history[1].illustration.is_none());

    // Question limit reached.
    controller.advance().await.expect("advance 2");
    assert_eq!(controller.phase(), Phase::Summarized);
    let summary = controller.session().summary.clone().expect("summary");
    assert!(summary.suggestions.len() >= 3);
    assert_eq!(controller.scores().combined.total, MAX_SCORE);
    assert_eq!(controller.review_eligible(), vec![1]);

    controller.start_review().await.expect("review");
    assert_eq!(controller.phase(), Phase::Questioning);
    assert_eq!(
        controller.session().current_question.as_deref(),
        Some("Why is Photosynthesis important?")
    );
    controller.submit_answer(GOOD_IMPORTANCE).await.expect("re-answer");
    controller.advance().await.expect("leave review");

    assert_eq!(controller.phase(), Phase::Summarized);
    let scores = controller.scores();
    assert_eq!(scores.fresh.total, MAX_SCORE);
    assert_eq!(scores.fresh.possible, 2 * MAX_SCORE);
    assert_eq!(scores.reviewed.total, MAX_SCORE);
    assert_eq!(scores.combined.total, 2 * MAX_SCORE);
    assert!(controller.review_eligible().is_empty());
    assert!(!controller.actions().start_review);

    let mut phases = Vec::new();
    while let Ok(update) = rx.try_recv() {
        if let Update::Phase(phase) = update {
            phases.push(phase);
        }
    }
    assert_eq!(phases.first(), Some(&Phase::Introducing));
    assert_eq!(phases.last(), Some(&Phase::Summarized));
    assert!(phases.contains(&Phase::Evaluating));
}

#[tokio::test]
async fn test_actions_out_of_order_are_rejected() {
    let mut controller = controller();

    let err = controller.advance().await.expect_err("nothing to advance");
    assert!(matches!(err, SessionError::Unavailable { .. }));
    assert_eq!(controller.phase(), Phase::Configuring);

    controller
        .submit_configuration(configuration())
        .await
        .expect("configuration accepted");
    let err = controller
        .submit_answer(GOOD_DEFINITION)
        .await
        .expect_err("intro not acknowledged");
    assert!(matches!(err, SessionError::Unavailable { .. }));
    assert_eq!(controller.phase(), Phase::Introducing);
}

#[tokio::test]
async fn test_restart_mid_quiz_starts_over() {
    let mut controller = controller();
    controller
        .submit_configuration(configuration())
        .await
        .expect("configuration accepted");
    controller.acknowledge_intro().await.expect("ack");
    controller.submit_answer("xyz").await.expect("answer");

    controller.restart();
    assert_eq!(controller.phase(), Phase::Configuring);
    assert!(controller.session().history.is_empty());
    assert_eq!(controller.scores().combined.possible, 0);
    assert!(controller.session().generation > 0);

    controller
        .submit_configuration(configuration())
        .await
        .expect("configuration accepted again");
    assert_eq!(controller.phase(), Phase::Introducing);
}
