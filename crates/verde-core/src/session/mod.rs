//! Session domain module.
//!
//! # Module Structure
//!
//! - `state`: Conversation states and phases
//! - `message`: History entries and phase triggers
//! - `model`: The `Session` record and its Phase-2 activation

mod message;
mod model;
mod state;

pub use message::{HistoryEntry, PhaseTrigger};
pub use model::{PHASE2_BANNER, RERUN_BANNER, Session};
pub use state::{ConversationState, Phase};
