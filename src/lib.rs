//! Nightly publishing pipeline: reads a numbered content catalog, decides which
//! slots are due and pushes them to a video platform and a microblogging platform.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod google;
pub mod model;
pub mod orchestrator;
pub mod signer;
pub mod social;
pub mod video;
