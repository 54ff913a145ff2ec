//! Numerical root finding for cash-flow schedules.
//!
//! The IRR has no closed form for more than two flows, so the rate is
//! found by bisection over a fixed bracket. All constants are part of the
//! contract: results must be reproducible run to run.

/// Lower bound of the rate search bracket (just above total loss).
pub const RATE_LOWER_BOUND: f64 = -0.99;
/// Upper bound of the rate search bracket (1000% annual).
pub const RATE_UPPER_BOUND: f64 = 10.0;
/// Absolute tolerance on the located rate.
pub const RATE_TOLERANCE: f64 = 1e-9;
/// Iteration cap; bisection over the bracket converges well inside this.
pub const MAX_ITERATIONS: usize = 200;

/// Net present value of a schedule of `(years_from_start, amount)` flows
/// at the given annual rate.
pub fn net_present_value(schedule: &[(f64, f64)], rate: f64) -> f64 {
    if rate <= -1.0 {
        return f64::INFINITY;
    }
    schedule
        .iter()
        .map(|&(t, amount)| amount * (1.0 + rate).powf(-t))
        .sum()
}

/// Locate a root of `f` in `[lo, hi]` by bisection.
///
/// Returns `None` when `f(lo)` and `f(hi)` do not bracket a sign change,
/// or when the interval fails to shrink below `tol` within `max_iter`
/// iterations.
pub fn bisect<F>(f: F, lo: f64, hi: f64, tol: f64, max_iter: usize) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let f_lo = f(lo);
    let f_hi = f(hi);

    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    let mut lo = lo;
    let mut hi = hi;
    let mut f_lo = f_lo;

    for _ in 0..max_iter {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);

        if f_mid == 0.0 || 0.5 * (hi - lo) < tol {
            return Some(mid);
        }

        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    None
}

/// Internal rate of return of a schedule of `(years_from_start, amount)`
/// flows: the rate at which the net present value is zero.
///
/// `None` means no solution exists in the bracket, which is an expected
/// outcome for schedules whose flows all share a sign.
pub fn solve_irr(schedule: &[(f64, f64)]) -> Option<f64> {
    bisect(
        |rate| net_present_value(schedule, rate),
        RATE_LOWER_BOUND,
        RATE_UPPER_BOUND,
        RATE_TOLERANCE,
        MAX_ITERATIONS,
    )
}
