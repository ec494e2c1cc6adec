//! modqueue: automated content-moderation queue coordinator
//!
//! Two coupled subsystems drive the moderation pipeline:
//! - a process supervisor that starts, health-gates, and tears down the
//!   fleet of analysis services plus a daily processing scheduler
//! - a per-collection vector similarity index used to flag duplicate and
//!   near-duplicate submissions
//!
//! Credentials, the content platform, LLM inference, the document store,
//! and the review dashboard are external collaborators reached through the
//! interfaces in [`config`], [`embedding`], and [`store`].

pub mod config;
pub mod embedding;
pub mod index;
pub mod store;
pub mod supervisor;
pub mod types;

pub use config::Config;
pub use types::*;
