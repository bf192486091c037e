use escrow_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::position::LenderPosition;

/// One computed share of a distributed pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub lender: Address,
    pub amount: Amount,
}

/// Split `pool` across `positions` in proportion to `contributed`.
///
/// For each position in order, `share = pool * contributed / total` with
/// integer (floor) division. The truncation remainder is added to the last
/// position, so the payouts always sum to exactly `pool`. Products are
/// computed at 256-bit width; large pools never overflow.
///
/// A zero pool yields zero payouts for every position. A positive pool
/// needs at least one position with a non-zero contribution.
pub fn distribute_proportionally(
    pool: Amount,
    positions: &[LenderPosition],
) -> Result<Vec<Payout>, LedgerError> {
    if positions.is_empty() {
        return if pool == 0 {
            Ok(Vec::new())
        } else {
            Err(LedgerError::EmptyLedger { pool })
        };
    }

    let total = positions.iter().try_fold(0u128, |acc, p| {
        acc.checked_add(p.contributed).ok_or(LedgerError::Overflow {
            current: acc,
            added: p.contributed,
        })
    })?;

    if total == 0 {
        if pool == 0 {
            return Ok(positions
                .iter()
                .map(|p| Payout {
                    lender: p.lender,
                    amount: 0,
                })
                .collect());
        }
        return Err(LedgerError::NoContributions { pool });
    }

    let mut payouts = Vec::with_capacity(positions.len());
    let mut assigned: Amount = 0;
    for position in positions {
        // contributed <= total, so the share never exceeds the pool.
        let amount = mul_div_floor(pool, position.contributed, total).ok_or(
            LedgerError::Overflow {
                current: pool,
                added: position.contributed,
            },
        )?;
        assigned += amount;
        payouts.push(Payout {
            lender: position.lender,
            amount,
        });
    }

    if let Some(last) = payouts.last_mut() {
        last.amount += pool - assigned;
    }

    Ok(payouts)
}

/// `floor(a * b / d)` computed without intermediate overflow.
///
/// Returns `None` when `d` is zero or the quotient does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }

    let (hi, lo) = widening_mul(a, b);
    if hi >= d {
        return None;
    }

    // Restoring long division of the 256-bit (hi, lo) by d. `rem < d` holds
    // at the top of every iteration.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Some(quotient)
}

/// Full 256-bit product of two `u128` values as `(high, low)` halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;

    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    let mid = (lo_lo >> 64) + (lo_hi & MASK) + (hi_lo & MASK);
    let low = (lo_lo & MASK) | (mid << 64);
    let high = hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (mid >> 64);
    (high, low)
}
