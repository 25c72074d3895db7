//! Simple interest accrual.
//!
//! **Unit convention:** `rate` is the number of loan-asset base units that
//! accrue over one full year. It is *not* a percentage or basis points, and it
//! is not multiplied by the principal. A loan with `interest_rate = 365`
//! accrues exactly 1 unit per day regardless of its principal.

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Interest accrued after `elapsed` seconds: `floor(rate * elapsed / SECONDS_PER_YEAR)`.
///
/// Computed in `u128`, so it cannot overflow.
pub fn accrued(elapsed: u64, rate: u64) -> u128 {
    (rate as u128 * elapsed as u128) / SECONDS_PER_YEAR as u128
}
