// Declare the modules to re-export
pub mod connections;
pub mod core;
pub mod forecast;
pub mod ingestors;
pub mod loggers;
pub mod readings;

// Re-export everything
pub use crate::connections::*;
pub use crate::core::engine::*;
pub use crate::core::replay::*;
pub use crate::core::synthetic::*;
pub use crate::forecast::*;
pub use crate::ingestors::live_ws::*;
pub use crate::loggers::logfile::*;
pub use crate::readings::*;
