pub mod bootstrap;
pub mod commands;
pub mod routine_engine;
