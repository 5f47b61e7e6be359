//! Process-wide sizing knobs.

/// Upper bound on the number of [`crate::Looper`]s the process-wide
/// registry tracks at once. [`crate::Looper::prepare`] fails once this
/// many Loopers are alive. Override by building a
/// [`crate::LooperRegistry`] directly with a different capacity instead
/// of going through the global registry.
pub const MAX_NUM_LOOPERS: usize = 32;
