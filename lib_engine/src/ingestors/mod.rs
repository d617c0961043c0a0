// Upstream data sources feeding the acquisition engine.
pub mod live_ws;
