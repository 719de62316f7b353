//! Sweep amount calculation.
//!
//! Computes how many cents to move out of checking, given a protective
//! buffer, a sweep percentage, and a daily cap that accounts for what has
//! already been swept today. Pure arithmetic, no I/O.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The calculator's single failure mode: a numeric argument that cannot
/// describe a real sweep (negative cents, or a percentage outside [0, 100]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

// ---------------------------------------------------------------------------
// Inputs and output
// ---------------------------------------------------------------------------

/// Fully-resolved inputs for one sweep computation. All amounts are in
/// cents. Callers merge config defaults into any fields the request left
/// unset before constructing this.
#[derive(Debug, Clone, Copy)]
pub struct SweepParams {
    pub checking_balance_cents: i64,
    /// Minimum balance that must remain in checking.
    pub buffer_cents: i64,
    /// Fraction of the excess to sweep, expressed in [0, 100].
    pub sweep_percent: f64,
    /// Maximum cumulative cents sweepable per calendar day.
    pub daily_cap_cents: i64,
    /// Cents already swept today, counted against the cap.
    pub already_swept_today_cents: i64,
}

/// A computed transfer amount. Never negative, never above the remaining
/// daily cap, never above the percentage of excess over the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepAmount {
    pub amount_cents: i64,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Compute the sweep amount for the given parameters.
///
/// Steps:
///   1. excess = max(0, balance - buffer)
///   2. proposed = floor(excess * percent / 100)
///   3. remaining = max(0, cap - already_swept)
///   4. amount = min(proposed, remaining)
///
/// Fractional cents are truncated toward zero so a sweep can never move
/// more than the percentage allows. Returns `InvalidInput` when any cents
/// field is negative or the percentage is outside [0, 100]; a negative
/// `already_swept_today_cents` is rejected rather than clamped.
pub fn compute_sweep(params: &SweepParams) -> Result<SweepAmount, SweepError> {
    validate(params)?;

    let excess = (params.checking_balance_cents - params.buffer_cents).max(0);
    let proposed = (excess as f64 * params.sweep_percent / 100.0).floor() as i64;
    let remaining_cap = (params.daily_cap_cents - params.already_swept_today_cents).max(0);
    let amount_cents = proposed.min(remaining_cap);

    debug!(
        balance = params.checking_balance_cents,
        buffer = params.buffer_cents,
        percent = params.sweep_percent,
        excess,
        proposed,
        remaining_cap,
        amount = amount_cents,
        "Sweep amount computed"
    );

    Ok(SweepAmount { amount_cents })
}

fn validate(params: &SweepParams) -> Result<(), SweepError> {
    let negatives = [
        ("checking_balance_cents", params.checking_balance_cents),
        ("buffer_cents", params.buffer_cents),
        ("daily_cap_cents", params.daily_cap_cents),
        ("already_swept_today_cents", params.already_swept_today_cents),
    ];
    for (name, value) in negatives {
        if value < 0 {
            return Err(SweepError::InvalidInput(format!(
                "{name} must be non-negative, got {value}"
            )));
        }
    }

    // NaN and infinities fail this check as well.
    if !(params.sweep_percent >= 0.0 && params.sweep_percent <= 100.0) {
        return Err(SweepError::InvalidInput(format!(
            "sweep_percent must be within [0, 100], got {}",
            params.sweep_percent
        )));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
