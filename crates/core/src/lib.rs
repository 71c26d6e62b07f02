pub mod adapters;
pub mod collaborators;
pub mod configuration;
pub mod history;
pub mod narration;
pub mod review;
pub mod session_state;
pub mod simulated;
pub mod topic;
pub mod tutor_client;

use narration::NarrationState;
use session_state::{Pending, Phase};

/// Notifications the controller pushes to its host.
///
/// The host renders from `Controller::session()`; these only tell it when
/// something changed, including changes that happen between user actions
/// (an illustration arriving, narration starting).
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Phase(Phase),
    /// `None` when the controller stops waiting.
    Busy(Option<Pending>),
    Illustrated { index: usize },
    Narration(NarrationState),
}
