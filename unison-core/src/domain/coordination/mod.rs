pub mod clock;
pub mod config;
pub mod phase;
pub mod proposal;
pub mod queue;
pub mod round;
pub mod selection;

pub use clock::{RoundClock, RoundSchedule};
pub use config::RoundTimingConfig;
pub use phase::RoundPhase;
pub use proposal::{build_proposal, Proposal, ProposalBody, ProposalMode, ProposalRequest};
pub use queue::{LookaheadQueue, QueueSlot, QueueSnapshot, ResolvedRound};
pub use round::{AcceptOutcome, Round};
pub use selection::{canonical_candidates, select, Selection};
