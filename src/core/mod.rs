pub mod assembly;
pub mod chat;
pub mod export;
pub mod pipeline;
pub mod pipeline_sequence;
pub mod prompts;
pub mod stages;

pub use crate::domain::model::{AcademicDocument, DocumentRequest, ProgressEvent};
pub use crate::domain::ports::{ContentFetcher, LanguageModel, SearchEngine, Storage};
pub use crate::utils::error::Result;
