//! # Précis
//!
//! Progressive article summaries in the terminal.
//!
//! ## Features
//!
//! - **Article extraction**: finds the main body of arbitrary pages and strips comments, sidebars and chrome
//! - **Four levels**: brief, short, medium and detailed summaries that never repeat each other
//! - **Quality scores**: fluff and novelty percentages with traffic-light bars
//! - **Session cache**: re-opening a page costs no second model call

pub mod agent;
pub mod config;
pub mod extractor;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod scraper;
pub mod storage;
pub mod summary;
pub mod ui;

pub use config::Config;
pub use orchestrator::Orchestrator;
pub use storage::{KeyStore, SessionCache};
pub use summary::{DetailLevel, SummaryResult};
