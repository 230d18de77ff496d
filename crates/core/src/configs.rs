//! Build file configuration
//!
//! Serde models for `dovetail.yml` / `dovetail.toml` and their conversion
//! into the [`Task`](crate::model::Task) model.

pub mod build;

pub use build::{
    parse_build_config, schema_json, BuildFileConfig, BuildFileFormat, Command, PredicateConfig,
    TaskConfig,
};
