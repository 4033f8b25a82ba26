pub mod runner;
pub mod session;
pub mod summary;

pub use runner::{map_key, run_experiment, run_trial, HostEvent, KeyReader, TrialOutcome};
pub use session::{TrialPlan, TrialSession};
pub use summary::{Participant, TrialRecord, TrialSummary};
