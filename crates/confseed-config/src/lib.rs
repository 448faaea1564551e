#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! File-backed configuration for confseed.
//!
//! Layout: `model.rs` (typed document and conversion into engine inputs), `defaults.rs` (serde
//! defaults), `loader.rs` (YAML/JSON config and data files), `validate.rs` (structural checks).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{DocumentFormat, load_config, load_data_file, parse_config};
pub use model::{
    CommandConfig, Config, DefaultsConfig, DeleteConfig, FilterConfig, KindConfig, MatchConfig,
    ModeDefaults, ModeValue, OperationConfig, PermissionConfig, ProcessConfig,
};
pub use validate::validate;
