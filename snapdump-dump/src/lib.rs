pub mod default_executor;
pub mod diskspace;
pub mod error;
pub mod guard;
pub mod lock;
pub mod metadata;
pub mod orchestrator;
pub mod plan;
pub mod probe;
pub mod queue;
pub mod session;
pub mod settings;
pub mod signal;
pub mod worker;

pub use error::{DumpError, DumpResult};
