//! Deployment layouts, binary validation, and configuration for afscell.
//!
//! This crate is the static half of provisioning: it maps a deployment
//! variant (`transarc`, `source`, `ubuntu`) and a realm variant to the
//! absolute locations of every binary and configuration file the run will
//! touch, checks that those binaries are actually present, and parses the
//! optional TOML configuration file that overrides paths and tunables.

pub mod config;
pub mod layout;
pub mod prereq;

pub use config::{
    parse_config_file, parse_config_str, CacheSection, ConfigError, FileOverrides,
    ProvisionConfig, RunSection, SessionSection, SupervisorSection,
};
pub use layout::{
    Binary, BinaryPath, BinaryTable, ConfigFiles, DeploymentLayout, LayoutVariant, RealmVariant,
};
pub use prereq::{check_binaries, format_missing, validate_cache_dir, MissingBinary};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0}")]
    MissingBinaries(String),
    #[error("cache directory '{}' exists and is not a directory", .0.display())]
    CacheDirIsFile(PathBuf),
}
