pub mod config;
pub mod error;
pub mod jsonl;
pub mod memory;
pub mod pricing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::TraceConfig;
    pub use crate::error::TraceError;
    pub use crate::jsonl::{read_events, JsonlTraceStore};
    pub use crate::memory::MemoryTraceStore;
    pub use crate::pricing::{ModelPrice, PricingTable};
}
