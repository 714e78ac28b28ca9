use askama::Result;
use rust_decimal::Decimal;

/// Shop currency with thousands grouping: `KES 12,500.00`.
pub fn money(value: &Decimal) -> Result<String> {
    Ok(format_money(*value))
}

pub fn format_money(value: Decimal) -> String {
    let fixed = format!("{:.2}", value.abs().round_dp(2));
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    format!("KES {}{}.{}", sign, grouped, cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_money(Decimal::new(125000050, 2)), "KES 1,250,000.50");
        assert_eq!(format_money(Decimal::new(999, 0)), "KES 999.00");
        assert_eq!(format_money(Decimal::new(-150000, 2)), "KES -1,500.00");
        assert_eq!(format_money(Decimal::ZERO), "KES 0.00");
    }
}
