//! Just enough Solidity ABI encoding for the Ethernauts calls:
//! `uint256` arguments and return values, and a single `string` argument.

use anyhow::{bail, Result};
use num_bigint::BigUint;

use super::rpc::keccak256;

const WORD: usize = 32;

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Left-pad an unsigned integer to a 32-byte word.
pub fn encode_uint256(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Encode a lone dynamic `string` argument: head offset, length, padded bytes.
pub fn encode_string(value: &str) -> Vec<u8> {
    let data = value.as_bytes();
    let padded_len = data.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(2 * WORD + padded_len);
    out.extend_from_slice(&encode_uint256(WORD as u64));
    out.extend_from_slice(&encode_uint256(data.len() as u64));
    out.extend_from_slice(data);
    out.resize(2 * WORD + padded_len, 0);
    out
}

/// Decode a single `uint256` return value.
pub fn decode_uint256(data: &[u8]) -> Result<BigUint> {
    if data.len() != WORD {
        bail!("expected a 32-byte uint256 word, got {} bytes", data.len());
    }
    Ok(BigUint::from_bytes_be(data))
}

/// `0x`-prefixed calldata for `signature` followed by pre-encoded arguments.
pub fn calldata(signature: &str, args: &[u8]) -> String {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(args);
    format!("0x{}", hex::encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn uint256_is_left_padded() {
        let word = encode_uint256(0x0102);
        assert!(word[..30].iter().all(|b| *b == 0));
        assert_eq!(&word[30..], &[0x01, 0x02]);
    }

    #[test]
    fn string_is_offset_length_and_padded_data() {
        let encoded = encode_string("ipfs://x/");
        assert_eq!(encoded.len(), 96);
        assert_eq!(encoded[31], 0x20);
        assert_eq!(encoded[63], 9);
        assert_eq!(&encoded[64..73], b"ipfs://x/");
        assert!(encoded[73..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_string_has_no_data_words() {
        let encoded = encode_string("");
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[63], 0);
    }

    #[test]
    fn decode_uint256_rejects_short_input() {
        assert!(decode_uint256(&[0u8; 31]).is_err());
        let mut word = [0u8; 32];
        word[31] = 7;
        assert_eq!(decode_uint256(&word).unwrap(), BigUint::from(7u32));
    }

    #[test]
    fn calldata_prefixes_selector() {
        let data = calldata("getRandomNumberForBatch(uint256)", &encode_uint256(3));
        assert!(data.starts_with("0x"));
        assert_eq!(data.len(), 2 + 2 * (4 + 32));
        assert!(data.ends_with("03"));
    }
}
