/// Widest date window `enumerate` accepts. A month view spans at most six
/// week rows.
pub const MAX_WINDOW_DAYS: i64 = 42;

/// Latest hour the envelope may end on.
pub const MAX_ENVELOPE_HOUR: u32 = 24;

/// Upper bound on hours in a single booking attempt.
pub const MAX_SELECTION_HOURS: usize = 64;

/// Spaces a single snapshot may carry.
pub const MAX_SPACES: usize = 256;
