/// Control flow and run-one-round completion.
pub mod control_flow;

/// Memory and PIM-resource hazards between in-flight instructions.
pub mod hazards;

/// Register reads observe the latest write.
pub mod register_bypass;

/// Issue scenarios with exact cycle counts.
pub mod scenarios;

/// At most one instruction leaves the issue stage per edge.
pub mod single_conflict;
