pub mod check;
pub mod config;
pub mod monitors;
pub mod prune;
pub mod record;
