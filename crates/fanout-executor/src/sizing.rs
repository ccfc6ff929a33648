//! Order size calculation.
//!
//! Converts a requested quantity plus the account's available maximum and the
//! instrument lot size into the final order size. Results are always positive
//! multiples of the lot size and are never rounded up.

use fanout_core::{QuantitySpec, Size};
use rust_decimal::Decimal;

use crate::error::{ExecutorError, ExecutorResult};

/// Round `value` down to a multiple of `lot_size`. Idempotent.
pub fn round_to_lot_size(value: Size, lot_size: Size) -> Size {
    value.round_to_lot(lot_size)
}

/// Resolve the order size for one account.
///
/// - 100% floors the available maximum directly, leaving no dust.
/// - Other percentages floor `max * pct / 100` to the lot.
/// - Absolute sizes floor to the lot without looking at the maximum.
///
/// A result of zero or less is a [`ExecutorError::Validation`] naming both the
/// computed size and the available maximum.
pub fn resolve_size(
    max_available: Size,
    requested: &QuantitySpec,
    lot_size: Size,
) -> ExecutorResult<Size> {
    if !lot_size.is_positive() {
        return Err(ExecutorError::Validation(format!(
            "lot size must be positive, got {lot_size}"
        )));
    }

    let size = match requested {
        QuantitySpec::Percentage(_) if requested.is_full() => {
            round_to_lot_size(max_available, lot_size)
        }
        QuantitySpec::Percentage(pct) => {
            let fraction = *pct / Decimal::ONE_HUNDRED;
            round_to_lot_size(max_available * fraction, lot_size)
        }
        QuantitySpec::Absolute(size) => round_to_lot_size(*size, lot_size),
    };

    if !size.is_positive() {
        return Err(ExecutorError::Validation(format!(
            "computed size {} for {requested} is not positive (available max {}, lot size {})",
            size.to_wire(),
            max_available.to_wire(),
            lot_size.to_wire()
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn size(v: Decimal) -> Size {
        Size::new(v)
    }

    fn pct(v: Decimal) -> QuantitySpec {
        QuantitySpec::Percentage(v)
    }

    #[test]
    fn test_full_request_floors_max_without_dust() {
        let result = resolve_size(size(dec!(1.23456789)), &pct(dec!(100)), size(dec!(0.0001)))
            .unwrap();
        assert_eq!(result.to_wire(), "1.2345");
        assert!(result.is_multiple_of(size(dec!(0.0001))));
    }

    #[test]
    fn test_half_request() {
        let result = resolve_size(size(dec!(10)), &pct(dec!(50)), size(dec!(1))).unwrap();
        assert_eq!(result.to_wire(), "5");
    }

    #[test]
    fn test_percentage_rounds_down() {
        // 7 * 0.33 = 2.31 -> 2.3
        let result = resolve_size(size(dec!(7)), &pct(dec!(33)), size(dec!(0.1))).unwrap();
        assert_eq!(result.to_wire(), "2.3");
    }

    #[test]
    fn test_absolute_ignores_max() {
        let qty = QuantitySpec::Absolute(size(dec!(0.123456)));
        let result = resolve_size(size(dec!(0)), &qty, size(dec!(0.001))).unwrap();
        assert_eq!(result.to_wire(), "0.123");
    }

    #[test]
    fn test_absolute_below_lot_rejected() {
        let qty = QuantitySpec::Absolute(size(dec!(0.0004)));
        let err = resolve_size(size(dec!(100)), &qty, size(dec!(0.001))).unwrap_err();
        assert!(matches!(err, ExecutorError::Validation(_)));
    }

    #[test]
    fn test_percentage_below_lot_rejected_with_values() {
        let err = resolve_size(size(dec!(0.5)), &pct(dec!(10)), size(dec!(1))).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ExecutorError::Validation(_)));
        assert!(msg.contains("computed size 0"));
        assert!(msg.contains("available max 0.5"));
    }

    #[test]
    fn test_zero_available_rejected() {
        assert!(resolve_size(size(dec!(0)), &pct(dec!(100)), size(dec!(0.01))).is_err());
    }

    #[test]
    fn test_non_positive_lot_rejected() {
        assert!(resolve_size(size(dec!(10)), &pct(dec!(100)), size(dec!(0))).is_err());
    }

    #[test]
    fn test_round_to_lot_size_idempotent_and_never_up() {
        let lots = [dec!(1), dec!(0.1), dec!(0.01), dec!(0.0001), dec!(0.00000001), dec!(0.5)];
        let values = [dec!(0), dec!(0.99999999), dec!(1.23456789), dec!(42), dec!(1234.5678)];
        for lot in lots {
            for value in values {
                let once = round_to_lot_size(size(value), size(lot));
                let twice = round_to_lot_size(once, size(lot));
                assert_eq!(once, twice, "value {value} lot {lot}");
                assert!(once.inner() <= value, "value {value} lot {lot}");
                assert!(once.is_multiple_of(size(lot)));
            }
        }
    }
}
