//! Build pipeline module for frontkit
//!
//! Provides the stage model and the sequential pipeline that turns the
//! source tree into the distribution tree.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: Find source files using glob patterns
//! - **Planning**: Order stages by their declared dependencies
//! - **Execution**: Run each stage's transform and report the outcome
//!
//! # Example
//!
//! ```ignore
//! use frontkit::build::{BuildContext, Pipeline};
//! use frontkit::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root);
//! let plan = frontkit::orchestrator::default_plan(&context);
//!
//! let result = Pipeline::new(context).run(&plan)?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod discovery;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod stage;

pub use context::*;
pub use discovery::*;
pub use pipeline::*;
pub use result::*;
pub use stage::*;
