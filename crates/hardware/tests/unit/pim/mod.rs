/// Bit-serial batches of one macro.
pub mod macro_batches;

/// PIM units driven through a full core.
pub mod pim_units;
