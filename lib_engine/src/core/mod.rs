// Engine internals: mode state machine, synthetic source, replay cursor.
pub mod engine;
pub mod replay;
pub mod synthetic;
