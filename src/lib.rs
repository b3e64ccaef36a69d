//! frontkit - Library for building static front-end sites
//!
//! This library provides functionality to:
//! - Run named build targets made of ordered, dependent stages
//! - Render pages, compile stylesheets and bundle scripts into a distribution tree
//! - Watch sources and serve the distribution tree with live reload

pub mod build;
pub mod cli;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod server;
pub mod transform;
pub mod watch;
