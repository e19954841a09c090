//! Storage backends and configuration for fitscore.
//!
//! Provides [`InMemoryStore`], which implements every collaborator trait of
//! `fitscore-core`, the JSON [`Dataset`] file it is loaded from and saved to,
//! and the layered [`FitscoreConfig`] with an engine factory.

pub mod config;
pub mod dataset;
pub mod error;
pub mod memory;

pub use config::{create_engine, load_config, load_config_from, FitscoreConfig};
pub use dataset::{ClassRoster, Dataset};
pub use error::StoreError;
pub use memory::InMemoryStore;
