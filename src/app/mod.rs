// Application layer: the in-memory job registry and the HTTP API that drives the document pipeline.

pub mod jobs;
pub mod server;

pub use jobs::{JobRecord, JobRegistry, JobStatus};
pub use server::{router, serve, AppState};
