//! garde 用のカスタムルール

use rust_decimal::Decimal;

use crate::models::money::check_amount;

/// 空白のみの文字列を拒否
pub fn not_blank(value: &str, _: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

/// 保存できない金額（0 以下、小数3桁以上、範囲外）を拒否
pub fn storable_amount(value: &Decimal, _: &()) -> garde::Result {
    check_amount(*value).map(|_| ()).map_err(garde::Error::new)
}
