/// Value in base units (the custody platform's smallest denomination).
pub type Amount = u128;

/// Base units per whole ether.
pub const WEI_PER_ETHER: Amount = 1_000_000_000_000_000_000;

/// `n` whole ether in base units.
///
/// Saturates at `Amount::MAX` rather than wrapping.
pub const fn ether(n: u128) -> Amount {
    n.saturating_mul(WEI_PER_ETHER)
}

/// Render an amount as decimal ether, trimming trailing zeros.
///
/// `format_amount(ether(6))` is `"6"`, `format_amount(1)` is
/// `"0.000000000000000001"`.
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / WEI_PER_ETHER;
    let frac = amount % WEI_PER_ETHER;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ether_scales_by_ten_to_the_eighteenth() {
        assert_eq!(ether(6), 6_000_000_000_000_000_000);
        assert_eq!(ether(0), 0);
        assert_eq!(ether(u128::MAX), u128::MAX);
    }

    #[test]
    fn format_trims_fraction() {
        assert_eq!(format_amount(ether(6)), "6");
        assert_eq!(format_amount(ether(3) / 2), "1.5");
        assert_eq!(format_amount(1), "0.000000000000000001");
        assert_eq!(format_amount(0), "0");
    }
}
