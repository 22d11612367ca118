pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig, Command};

pub use config::AppConfig;
pub use core::{chat::ChatService, pipeline::DocumentPipeline};
pub use domain::model::{AcademicDocument, DocumentRequest};
pub use utils::error::{Result, ScholarError};
