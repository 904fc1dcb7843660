//! Issue-generation pipeline: drafts on disk, generation from workflow
//! tasks, and publishing through the GitHub CLI.

pub mod drafts;
pub mod generator;
pub mod publisher;

pub use drafts::DraftStore;
pub use generator::generate_drafts;
pub use publisher::GhCliPublisher;
