//! # khu-yield
//! Daily yield accrual and DAO treasury budget for the KHU protocol.
//!
//! Both passes are integer-exact, deterministic functions of persisted
//! data, which is what makes their undo paths journal-free.

pub mod engine;
pub mod treasury;

pub use engine::{apply_daily_yield, daily_note_yield, is_yield_due, undo_daily_yield};
pub use treasury::{accrue_treasury, is_treasury_boundary, treasury_budget, undo_treasury};
