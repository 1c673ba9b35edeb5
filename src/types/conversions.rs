use ethers::types::{Address, H256, U256};
use std::str::FromStr;

// Addresses are persisted lowercase so lookups never depend on checksum casing
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub fn hash_to_string(hash: H256) -> String {
    format!("{:?}", hash)
}

pub fn string_to_hash(s: &str) -> Result<H256, ConversionError> {
    H256::from_str(s.trim()).map_err(|e| ConversionError::InvalidHash(e.to_string()))
}

/// Renders an amount as a base-10 string, the form NUMERIC(78,0) columns accept.
pub fn u256_to_dec_string(value: U256) -> String {
    value.to_string()
}

/// Parses a NUMERIC(78,0) rendered as text back into an amount.
///
/// Postgres may render integral numerics with a trailing `.0`-style scale when
/// an aggregate widens the type, so a zero fractional part is tolerated.
pub fn dec_string_to_u256(s: &str) -> Result<U256, ConversionError> {
    let trimmed = s.trim();
    let integral = match trimmed.split_once('.') {
        Some((int, frac)) if frac.chars().all(|c| c == '0') => int,
        Some(_) => return Err(ConversionError::InvalidAmount(trimmed.to_string())),
        None => trimmed,
    };
    if integral.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(integral).map_err(|_| ConversionError::InvalidAmount(trimmed.to_string()))
}

/// Opaque paging token for a position in an ordered history.
pub fn encode_cursor(ordinal: i64) -> String {
    hex::encode(ordinal.to_be_bytes())
}

pub fn decode_cursor(cursor: &str) -> Result<i64, ConversionError> {
    let bytes = hex::decode(cursor.trim())
        .map_err(|_| ConversionError::InvalidCursor(cursor.to_string()))?;
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ConversionError::InvalidCursor(cursor.to_string()))?;
    Ok(i64::from_be_bytes(raw))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}
