// Shared logging setup for the workspace binaries.
pub mod logfile;
