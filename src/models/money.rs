//! 金額の表現範囲
//!
//! DB の列は NUMERIC(19, 2)。範囲外や小数3桁以上の値は保存時に丸め・溢れが起きるため、
//! 予算チェックより前に拒否する。

use rust_decimal::Decimal;

/// 小数部の最大桁数
pub const AMOUNT_SCALE: u32 = 2;

/// 9,999,999,999,999,999.99
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999_999, AMOUNT_SCALE)
}

/// 保存可能な正の金額か検証し、不可なら理由を返す
pub fn check_amount(amount: Decimal) -> Result<Decimal, &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Amount must be positive");
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err("Amount must have at most 2 decimal places");
    }
    if amount > max_amount() {
        return Err("Amount is too large");
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_check_amount_accepts_cents() {
        assert_eq!(check_amount(dec("12.34")), Ok(dec("12.34")));
        assert_eq!(check_amount(dec("0.01")), Ok(dec("0.01")));
        // 末尾の 0 は桁数に数えない
        assert_eq!(check_amount(dec("10.500")), Ok(dec("10.500")));
    }

    #[test]
    fn test_check_amount_rejects_unstorable_values() {
        assert!(check_amount(Decimal::ZERO).is_err());
        assert!(check_amount(dec("-1")).is_err());
        assert!(check_amount(dec("0.001")).is_err());
        assert!(check_amount(dec("9.996")).is_err());
        assert!(check_amount(max_amount()).is_ok());
        assert!(check_amount(max_amount() + dec("0.01")).is_err());
    }
}
