//! 18-decimal fixed-point conversion
//!
//! Oracle prices travel on-chain as `uint256` scaled by 10^18 (ether units).

use ethers::types::U256;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Number of decimals used by oracle payloads
pub const PRICE_DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("fixed-point value {0} exceeds decimal range")]
    OutOfRange(U256),
    #[error("negative price {0} cannot be encoded")]
    Negative(Decimal),
}

fn unit() -> U256 {
    U256::exp10(PRICE_DECIMALS as usize)
}

/// Decode an 18-decimal payload into a decimal price
pub fn from_wei(raw: U256) -> Result<Decimal, FixedPointError> {
    let unit = unit();
    let whole = raw / unit;
    // < 10^18, always fits an i64
    let fraction = (raw % unit).low_u64() as i64;

    if whole > U256::from(u128::MAX) {
        return Err(FixedPointError::OutOfRange(raw));
    }
    let whole = Decimal::from_u128(whole.as_u128()).ok_or(FixedPointError::OutOfRange(raw))?;

    whole
        .checked_add(Decimal::new(fraction, PRICE_DECIMALS))
        .map(|d| d.normalize())
        .ok_or(FixedPointError::OutOfRange(raw))
}

/// Encode a decimal price as an 18-decimal payload (`parseEther`)
pub fn to_wei(price: Decimal) -> Result<U256, FixedPointError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(FixedPointError::Negative(price));
    }
    let price = price.round_dp(PRICE_DECIMALS);
    let mantissa = price.mantissa().unsigned_abs();
    let pad = PRICE_DECIMALS - price.scale();
    Ok(U256::from(mantissa) * U256::exp10(pad as usize))
}
