//! Turn-taking coordination between the user, the microphone, the server and
//! the speaker.

pub mod scheduler;
pub mod signal;
pub mod state;
pub mod turn;

pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use signal::{CoordinatorEvent, Flow, KeywordKind, Signal, TurnEvent, UserAction};
pub use state::{SessionFlags, TurnState};
pub use turn::{Collaborators, TurnCoordinator};
