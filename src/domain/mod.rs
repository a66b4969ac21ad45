pub mod error;
pub mod gate;
pub mod ids;
pub mod instantiate;
pub mod lifecycle;
pub mod models;
pub mod progress;
pub mod resync;
pub mod schedule;
