// Signal timing (milliseconds)
pub const DEFAULT_GREEN_MS: u64 = 10_000;
pub const DEFAULT_YELLOW_MS: u64 = 2_000;

// Time a car spends crossing (milliseconds)
pub const DEFAULT_DWELL_MS: u64 = 500;

// Random plans
pub const DEFAULT_RANDOM_SEED: u64 = 1;
