//! ledgeriolib: потоковый импорт SAF-T, оборотно-сальдовая ведомость и
//! сверка, в виде отменяемых фоновых задач.

pub mod accumulator;
pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod task;
pub mod traits;
pub mod validator;

pub mod formats {
    pub mod saft;
}

pub use config::EngineConfig;
pub use engine::{BatchResult, ImportEngine, ImportResult};
pub use error::{LedgerError, ParseError, Result};
pub use task::{Scheduler, TaskHandle, TaskOutcome, TaskState};
pub use traits::{DocumentSource, FileSource, MemorySource};
