use tiny_keccak::{Hasher, Keccak};

use crate::error::Error;

/// Parse a `0x`-prefixed 20-byte hex address. Checksum case is not enforced.
pub fn parse_address(address: &str) -> Result<[u8; 20], Error> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidAddress(address.to_string()))?;
    if hex_part.len() != 40 {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    let bytes = hex::decode(hex_part).map_err(|_| Error::InvalidAddress(address.to_string()))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn is_valid_address(address: &str) -> bool {
    parse_address(address).is_ok()
}

/// Normalize an address to its EIP-55 checksummed form.
pub fn checksum_address(address: &str) -> Result<String, Error> {
    parse_address(address).map(|bytes| eip55_checksum(&bytes))
}

/// EIP-55 mixed-case checksum encoding.
pub fn eip55_checksum(addr: &[u8; 20]) -> String {
    let hex_addr = hex::encode(addr);
    let hash = keccak256(hex_addr.as_bytes());

    let mut result = String::with_capacity(42);
    result.push_str("0x");
    for (i, c) in hex_addr.chars().enumerate() {
        let hash_nibble = if i % 2 == 0 {
            (hash[i / 2] >> 4) & 0x0f
        } else {
            hash[i / 2] & 0x0f
        };
        if hash_nibble >= 8 {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }
    result
}

/// 4-byte function selector of a canonical signature such as `transfer(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
