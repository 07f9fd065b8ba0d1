/// Loading configurations and programs from files.
pub mod loader_files;

/// Whole-chip runs and their reports.
pub mod simulator_runs;
