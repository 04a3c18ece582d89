pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::perf::PerfConfig;
#[cfg(feature = "cli")]
pub use crate::config::{CliConfig, Command};
pub use crate::config::LocalStorage;

pub use crate::adapters::gcs::GcsClient;
pub use crate::core::download::{
    download_objects, parallel_download, DownloadParams, COMPOSED_PREFIX, MAX_OBJECTS_PER_COMPOSE,
};
pub use crate::core::fast_list::ListingController;
pub use crate::domain::model::{ListPage, ListRequest, ListingReport, ObjectEntry};
pub use crate::domain::ports::{ObjectStore, Storage};
pub use crate::utils::error::{DatafluxError, Result};
