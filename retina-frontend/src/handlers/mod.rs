pub mod app;
pub mod metrics;
pub mod predict;

pub use app::{health_check, index, ping, IndexTemplate};
pub use predict::predict;
