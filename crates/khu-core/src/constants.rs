//! Consensus-fixed protocol constants. All monetary values in sats (1 KHU = 10^8 sats).

pub const COIN: i64 = 100_000_000;

/// Upper bound on any single monetary quantity. Exceeding it is a fatal
/// block-level error, never a silent wrap.
pub const MAX_MONEY: i64 = 21_000_000_000 * COIN;

/// Blocks between STAKE and the earliest UNSTAKE of the same note (3 days).
pub const MATURITY: u32 = 4_320;

/// Minimum block gap between two daily-yield passes (1 day).
pub const YIELD_INTERVAL: u32 = 1_440;

pub const BLOCKS_PER_DAY: u32 = 1_440;
pub const BLOCKS_PER_YEAR: u32 = 525_600;

/// DAO treasury accrual period.
pub const TREASURY_CYCLE: u32 = 172_800;

/// Daily 2%-annualised treasury divisor: 200 bp / 365 / 10000 = 1 / 182500.
pub const TREASURY_DIVISOR: i64 = 182_500;

/// DOMC governance cycle length.
pub const DOMC_CYCLE_LENGTH: u32 = 172_800;
/// Commit phase opens at `cycle_start + DOMC_COMMIT_OFFSET`.
pub const DOMC_COMMIT_OFFSET: u32 = 132_480;
/// Reveal phase opens at `cycle_start + DOMC_REVEAL_OFFSET`.
pub const DOMC_REVEAL_OFFSET: u32 = 152_640;

/// Yield rate bounds, in basis points (1500 = 15.00%).
pub const R_MIN: u16 = 0;
pub const R_MAX_ABS: u16 = 5_000;
pub const R_DEFAULT: u16 = 1_500;
pub const R_MAX_DYNAMIC_INIT: u16 = 4_000;
pub const R_MAX_DYNAMIC_FLOOR: u16 = 700;
/// `R_max_dynamic` loses this many basis points per elapsed year since activation.
pub const R_MAX_DYNAMIC_DECAY_PER_YEAR: u16 = 100;

pub const BPS_PRECISION: i64 = 10_000;
pub const DAYS_PER_YEAR: i64 = 365;

/// State commitments finalize when `signed / total >= 3 / 5` (60%).
pub const QUORUM_THRESHOLD_NUM: usize = 3;
pub const QUORUM_THRESHOLD_DEN: usize = 5;

/// Maximum reorg depth once the chain carries KHU state.
pub const FINALITY_DEPTH: u32 = 12;

/// Sapling memo length carried by every ZKHU note.
pub const MEMO_SIZE: usize = 512;
