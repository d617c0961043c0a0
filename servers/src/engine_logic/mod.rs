pub mod config;
pub mod model;
pub mod state;
pub mod ticker;
pub mod forecaster;
pub mod downstream;
