//! Application layer for Verde.
//!
//! Coordinates the domain, infrastructure and interaction layers into the
//! conversation flow.
//!
//! # Module Structure
//!
//! - `machine`: Conversation state machine, one call per turn
//! - `phase_gate`: Phase-2 activation predicate and transition
//! - `synchronizer`: Watcher-side consumer of knowledge-directory events
//! - `prediction`: In-process prediction and versioning
//! - `registry`: Sessions keyed by caller id
//! - `orchestrator`: User-turn entry point and side effects
//! - `app`: Bootstrap from a knowledge directory

pub mod app;
pub mod machine;
pub mod orchestrator;
pub mod phase_gate;
pub mod prediction;
pub mod registry;
pub mod synchronizer;

pub use app::{Collaborators, VerdeApp};
pub use machine::{ConversationMachine, GREETING, TurnOutcome, TurnRequest, infer_state};
pub use orchestrator::{Orchestrator, TurnResponse};
pub use phase_gate::{GateOutcome, PhaseGate};
pub use prediction::{MetricsSource, PredictionReport, PredictionService};
pub use registry::{SessionRegistry, SharedSession};
pub use synchronizer::PhaseGateSynchronizer;
