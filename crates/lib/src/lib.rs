//! packwright-lib: Core pipeline for packwright
//!
//! This crate builds distributable artifacts from a single project
//! definition:
//! - `project`: reads the project descriptor into a `ProjectRecord`
//! - `resolve`: resolves dependencies and writes the lockfile
//! - `registry`: discovers builders, built-in and externally registered
//! - `builder`: the builder contract and the built-in variants
//! - `sandbox`: isolated, disposable build environments
//! - `pipeline`: sequences all of the above for one run

pub mod builder;
pub mod config;
pub mod consts;
pub mod pipeline;
pub mod project;
pub mod registry;
pub mod resolve;
pub mod sandbox;
pub mod util;
