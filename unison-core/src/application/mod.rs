//! Application layer: the components of a peer, each driven by the runtime in `unison-service`.

pub mod catalog_source;
pub mod composer;
pub mod coordinator;
pub mod divergence;
pub mod proposal_builder;
pub mod retention;

pub use catalog_source::{CatalogFile, CatalogSource, FileCatalogSource, StaticCatalogSource};
pub use composer::{ActiveWindow, ComposerConfig, ComposerTick, StreamComposer};
pub use coordinator::{CoordinatorAction, CoordinatorConfig, RoundCoordinator};
pub use divergence::{playback_report, DivergenceService};
pub use proposal_builder::ProposalBuilder;
pub use retention::{CleanupReport, PinRetentionManager};
