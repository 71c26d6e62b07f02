//! The single audio narration channel of a session.
//!
//! At most one utterance is live. Every `speak` bumps a request token and
//! aborts the previous request; a result that arrives for an older token is
//! dropped before it reaches the sink.

use crate::Update;
use crate::collaborators::{Audio, AudioSink, Narrator};
use crate::configuration::Language;
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationState {
    Idle,
    /// A request is with the narrator.
    Pending,
    /// The sink has the clip. Back to `Idle` once its duration has passed.
    Playing,
    /// The narrator failed or had no audio. Not an error for the session.
    Silent,
}

struct Shared {
    token: u64,
    state: NarrationState,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn announce(updates: &Option<mpsc::Sender<Update>>, state: NarrationState) {
    if let Some(tx) = updates {
        if let Err(e) = tx.try_send(Update::Narration(state)) {
            tracing::warn!("Failed to announce narration state: {:?}", e);
        }
    }
}

/// Hands a narrator result to the sink if `token` is still the latest request.
/// Returns the new state, or `None` when the result was superseded.
fn deliver(
    shared: &Mutex<Shared>,
    sink: &dyn AudioSink,
    token: u64,
    result: Result<Option<Audio>>,
) -> Option<NarrationState> {
    let mut shared = lock(shared);
    if shared.token != token {
        tracing::debug!(
            "Discarding narration {} superseded by {}",
            token,
            shared.token
        );
        return None;
    }
    // Played under the lock so a concurrent supersede stops it afterwards.
    shared.state = match result {
        Ok(Some(audio)) if !audio.pcm.is_empty() => {
            sink.play(audio);
            NarrationState::Playing
        }
        Ok(_) => {
            tracing::debug!("Narrator returned no audio for request {}", token);
            NarrationState::Silent
        }
        Err(e) => {
            tracing::warn!("Narration request {} failed: {:?}", token, e);
            NarrationState::Silent
        }
    };
    Some(shared.state)
}

/// Returns to `Idle` once the clip has had time to play, unless it was superseded.
async fn finish_playback(
    shared: Arc<Mutex<Shared>>,
    updates: Option<mpsc::Sender<Update>>,
    token: u64,
    length: Duration,
) {
    tokio::time::sleep(length).await;
    let finished = {
        let mut shared = lock(&shared);
        let current = shared.token == token && shared.state == NarrationState::Playing;
        if current {
            shared.state = NarrationState::Idle;
        }
        current
    };
    if finished {
        tracing::debug!("Narration {} finished playing", token);
        announce(&updates, NarrationState::Idle);
    }
}

pub struct NarrationChannel {
    narrator: Arc<dyn Narrator>,
    sink: Arc<dyn AudioSink>,
    shared: Arc<Mutex<Shared>>,
    in_flight: Option<JoinHandle<()>>,
    updates: Option<mpsc::Sender<Update>>,
}

impl NarrationChannel {
    pub fn new(narrator: Arc<dyn Narrator>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            narrator,
            sink,
            shared: Arc::new(Mutex::new(Shared {
                token: 0,
                state: NarrationState::Idle,
            })),
            in_flight: None,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::Sender<Update>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn state(&self) -> NarrationState {
        lock(&self.shared).state
    }

    /// Token of the most recent request.
    pub fn token(&self) -> u64 {
        lock(&self.shared).token
    }

    /// Supersedes whatever is pending or playing and narrates `text`.
    /// Blank text is ignored and leaves the current utterance alone.
    pub fn speak(&mut self, text: &str, language: Language) -> Option<u64> {
        if text.trim().is_empty() {
            return None;
        }
        let token = self.supersede(NarrationState::Pending);
        tracing::debug!("Narration request {} ({} chars)", token, text.len());

        let narrator = self.narrator.clone();
        let sink = self.sink.clone();
        let shared = self.shared.clone();
        let updates = self.updates.clone();
        let text = text.to_string();

        self.in_flight = Some(tokio::spawn(async move {
            let result = narrator.narrate(&text, language).await;
            let length = result
                .as_ref()
                .ok()
                .and_then(|audio| audio.as_ref())
                .map(Audio::duration);

            let Some(state) = deliver(&shared, sink.as_ref(), token, result) else {
                return;
            };
            announce(&updates, state);
            if let (NarrationState::Playing, Some(length)) = (state, length) {
                tokio::spawn(finish_playback(shared, updates, token, length));
            }
        }));
        Some(token)
    }

    /// Stops playback and invalidates any request in flight.
    pub fn cancel(&mut self) {
        if self.in_flight.is_some() || self.state() != NarrationState::Idle {
            tracing::debug!("Cancelling narration");
        }
        self.supersede(NarrationState::Idle);
    }

    /// Waits until the current request (if any) has been resolved. Playback
    /// itself is not awaited.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Narration task failed: {:?}", e);
                }
            }
        }
    }

    fn supersede(&mut self, next: NarrationState) -> u64 {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        let token = {
            let mut shared = lock(&self.shared);
            shared.token += 1;
            shared.state = next;
            shared.token
        };
        self.sink.stop();
        announce(&self.updates, next);
        token
    }
}

impl Drop for NarrationChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockNarrator;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<Vec<u8>>>,
        stops: Mutex<usize>,
    }

    impl AudioSink for RecordingSink {
        fn play(&self, audio: Audio) {
            self.played.lock().unwrap().push(audio.pcm);
        }

        fn stop(&self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    /// Narrates the text as its own bytes; "slow" waits until released.
    struct GatedNarrator {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl Narrator for GatedNarrator {
        async fn narrate(&self, text: &str, _language: Language) -> Result<Option<Audio>> {
            if text == "slow" {
                self.gate.notified().await;
            }
            // One sample per second, so clips are still playing when asserted.
            Ok(Some(Audio {
                pcm: text.as_bytes().to_vec(),
                sample_rate: 1,
            }))
        }
    }

    #[tokio::test]
    async fn test_blank_text_is_a_noop() {
        let mut narrator = MockNarrator::new();
        narrator.expect_narrate().never();
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(Arc::new(narrator), sink.clone());

        assert_eq!(channel.speak("  \n", Language::English), None);
        assert_eq!(channel.state(), NarrationState::Idle);
        assert_eq!(*sink.stops.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_latest_request_is_heard() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(
            Arc::new(GatedNarrator { gate: gate.clone() }),
            sink.clone(),
        );

        let first = channel.speak("slow", Language::English).expect("token");
        let second = channel.speak("fast", Language::English).expect("token");
        assert!(second > first);

        channel.settle().await;
        gate.notify_waiters();
        tokio::task::yield_now().await;

        assert_eq!(*sink.played.lock().unwrap(), vec![b"fast".to_vec()]);
        assert_eq!(channel.state(), NarrationState::Playing);
    }

    #[tokio::test]
    async fn test_failure_ends_silently() {
        let mut narrator = MockNarrator::new();
        narrator
            .expect_narrate()
            .returning(|_, _| Err(anyhow::anyhow!("tts down")))
            .once();
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(Arc::new(narrator), sink.clone());

        channel.speak("What is light?", Language::English);
        channel.settle().await;

        assert_eq!(channel.state(), NarrationState::Silent);
        assert!(sink.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_discards_pending_result() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(
            Arc::new(GatedNarrator { gate: gate.clone() }),
            sink.clone(),
        );

        channel.speak("slow", Language::English);
        channel.cancel();
        gate.notify_waiters();
        channel.settle().await;

        assert_eq!(channel.state(), NarrationState::Idle);
        assert!(sink.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_result_is_not_delivered() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(
            Arc::new(GatedNarrator { gate: gate.clone() }),
            sink.clone(),
        );

        let first = channel.speak("slow", Language::English).expect("token");
        let second = channel.speak("slow", Language::English).expect("token");
        let late = Audio {
            pcm: b"late".to_vec(),
            sample_rate: 24_000,
        };

        assert_eq!(deliver(&channel.shared, sink.as_ref(), first, Ok(Some(late))), None);
        assert!(sink.played.lock().unwrap().is_empty());
        assert_eq!(channel.state(), NarrationState::Pending);
        assert_eq!(channel.token(), second);
    }

    #[tokio::test]
    async fn test_playing_returns_to_idle() {
        let mut narrator = MockNarrator::new();
        narrator.expect_narrate().returning(|_, _| {
            Ok(Some(Audio {
                pcm: vec![0; 480],
                sample_rate: 24_000,
            }))
        });
        let sink = Arc::new(RecordingSink::default());
        let (tx, mut rx) = mpsc::channel(16);
        let mut channel =
            NarrationChannel::new(Arc::new(narrator), sink.clone()).with_updates(tx);

        channel.speak("What is light?", Language::English);
        channel.settle().await;
        assert_eq!(sink.played.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(channel.state(), NarrationState::Idle);

        let mut seen = vec![];
        while let Ok(update) = rx.try_recv() {
            seen.push(update);
        }
        assert_eq!(
            seen,
            vec![
                Update::Narration(NarrationState::Pending),
                Update::Narration(NarrationState::Playing),
                Update::Narration(NarrationState::Idle),
            ]
        );
    }

    #[tokio::test]
    async fn test_finished_clip_keeps_newer_request() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::default());
        let mut channel = NarrationChannel::new(
            Arc::new(GatedNarrator { gate: gate.clone() }),
            sink.clone(),
        );
        let token = channel.speak("fast", Language::English).expect("token");
        channel.settle().await;
        assert_eq!(channel.state(), NarrationState::Playing);

        channel.speak("slow", Language::English);
        tokio::spawn(finish_playback(
            channel.shared.clone(),
            None,
            token,
            Duration::ZERO,
        ))
        .await
        .unwrap();
        assert_eq!(channel.state(), NarrationState::Pending);
    }
}
