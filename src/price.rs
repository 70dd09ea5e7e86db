//! Price string parsing
//!
//! Scraped prices carry a currency prefix ("CA $ 39.90"). The amount after the
//! prefix is parsed as a fixed-point decimal and normalised to cents.

use crate::error::PriceParseError;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Currency prefix the scraper emits in front of every price
pub const PRICE_PREFIX: &str = "CA $";

/// Number of fractional digits kept for every stored price
pub const PRICE_SCALE: u32 = 2;

/// Parse a raw scraped price such as `"CA $ 39.90"` into a decimal amount.
///
/// Whitespace around the prefix and the amount is ignored. Amounts with more
/// than two fractional digits are rounded half away from zero.
pub fn parse_price(raw: &str) -> Result<Decimal, PriceParseError> {
    let amount = raw
        .trim()
        .strip_prefix(PRICE_PREFIX)
        .ok_or_else(|| PriceParseError::MissingPrefix(raw.to_string()))?
        .trim();

    let value =
        Decimal::from_str(amount).map_err(|_| PriceParseError::InvalidAmount(raw.to_string()))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(PriceParseError::Negative(raw.to_string()));
    }

    Ok(normalize_price(value))
}

/// Round to cents and fix the scale so equal prices have equal text forms
pub fn normalize_price(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}
