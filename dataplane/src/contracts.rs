//! Contract ABIs and call encoding
//!
//! Constant-product factory/pair interfaces plus the ERC20 metadata reads
//! used by the scanner.

use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;
use serde_json::json;

use crate::{DataplaneError, ReserveSnapshot, Result};

/// Uniswap V2 `Swap` event signature
pub const UNISWAP_V2_SWAP_SIGNATURE: &str = "Swap(address,uint256,uint256,uint256,uint256,address)";

/// Topic hash of an event signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Uniswap V2 style factory ABI (index-based pair enumeration)
pub static PAIR_FACTORY_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "inputs": [],
            "name": "allPairsLength",
            "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
            "name": "allPairs",
            "outputs": [{"internalType": "address", "name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        }
    ]))
    .expect("Valid pair factory ABI")
});

/// Uniswap V2 style pair ABI
pub static PAIR_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "inputs": [],
            "name": "getReserves",
            "outputs": [
                {"internalType": "uint112", "name": "reserve0", "type": "uint112"},
                {"internalType": "uint112", "name": "reserve1", "type": "uint112"},
                {"internalType": "uint32", "name": "blockTimestampLast", "type": "uint32"}
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token0",
            "outputs": [{"internalType": "address", "name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "token1",
            "outputs": [{"internalType": "address", "name": "", "type": "address"}],
            "stateMutability": "view",
            "type": "function"
        }
    ]))
    .expect("Valid pair ABI")
});

/// ERC20 metadata ABI
pub static ERC20_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "constant": true,
            "inputs": [],
            "name": "decimals",
            "outputs": [{"name": "", "type": "uint8"}],
            "type": "function"
        },
        {
            "constant": true,
            "inputs": [],
            "name": "symbol",
            "outputs": [{"name": "", "type": "string"}],
            "type": "function"
        }
    ]))
    .expect("Valid ERC20 ABI")
});

/// ABI manager for encoding/decoding contract calls
pub struct AbiManager;

impl AbiManager {
    /// Encode a function call
    pub fn encode_function_call(abi: &Abi, function_name: &str, params: &[Token]) -> Result<Bytes> {
        let function = abi.function(function_name).map_err(|e| {
            DataplaneError::internal(format!("Function {} not found in ABI: {}", function_name, e))
        })?;

        let encoded = function
            .encode_input(params)
            .map_err(|e| DataplaneError::internal(format!("Failed to encode function call: {}", e)))?;

        Ok(Bytes::from(encoded))
    }

    /// Decode function output
    pub fn decode_function_output(abi: &Abi, function_name: &str, output: &[u8]) -> Result<Vec<Token>> {
        let function = abi.function(function_name).map_err(|e| {
            DataplaneError::internal(format!("Function {} not found in ABI: {}", function_name, e))
        })?;

        function
            .decode_output(output)
            .map_err(|e| DataplaneError::read_failure(function_name, e))
    }

    pub fn encode_all_pairs_length_call() -> Result<Bytes> {
        Self::encode_function_call(&PAIR_FACTORY_ABI, "allPairsLength", &[])
    }

    pub fn decode_all_pairs_length_output(output: &[u8]) -> Result<u64> {
        let value = Self::single_uint(&PAIR_FACTORY_ABI, "allPairsLength", output)?;
        if value > U256::from(u64::MAX) {
            return Err(DataplaneError::read_failure("allPairsLength", "pair count overflows u64"));
        }
        Ok(value.as_u64())
    }

    pub fn encode_all_pairs_call(index: u64) -> Result<Bytes> {
        Self::encode_function_call(&PAIR_FACTORY_ABI, "allPairs", &[Token::Uint(U256::from(index))])
    }

    pub fn decode_all_pairs_output(output: &[u8]) -> Result<Address> {
        Self::single_address(&PAIR_FACTORY_ABI, "allPairs", output)
    }

    pub fn encode_token0_call() -> Result<Bytes> {
        Self::encode_function_call(&PAIR_ABI, "token0", &[])
    }

    pub fn encode_token1_call() -> Result<Bytes> {
        Self::encode_function_call(&PAIR_ABI, "token1", &[])
    }

    /// Decode `token0()` / `token1()` output
    pub fn decode_token_output(function_name: &str, output: &[u8]) -> Result<Address> {
        Self::single_address(&PAIR_ABI, function_name, output)
    }

    pub fn encode_get_reserves_call() -> Result<Bytes> {
        Self::encode_function_call(&PAIR_ABI, "getReserves", &[])
    }

    /// Decode `getReserves()` output
    pub fn decode_get_reserves_output(output: &[u8]) -> Result<ReserveSnapshot> {
        let tokens = Self::decode_function_output(&PAIR_ABI, "getReserves", output)?;

        match tokens.as_slice() {
            [Token::Uint(reserve0), Token::Uint(reserve1), Token::Uint(timestamp)] => Ok(ReserveSnapshot {
                reserve0: *reserve0,
                reserve1: *reserve1,
                block_timestamp_last: timestamp.low_u32(),
            }),
            _ => Err(DataplaneError::read_failure("getReserves", "unexpected output layout")),
        }
    }

    pub fn encode_erc20_decimals_call() -> Result<Bytes> {
        Self::encode_function_call(&ERC20_ABI, "decimals", &[])
    }

    pub fn decode_erc20_decimals_output(output: &[u8]) -> Result<u8> {
        let value = Self::single_uint(&ERC20_ABI, "decimals", output)?;
        if value > U256::from(u8::MAX) {
            return Err(DataplaneError::read_failure("decimals", "decimals overflow u8"));
        }
        Ok(value.low_u32() as u8)
    }

    fn single_uint(abi: &Abi, function_name: &str, output: &[u8]) -> Result<U256> {
        let tokens = Self::decode_function_output(abi, function_name, output)?;
        match tokens.as_slice() {
            [Token::Uint(value)] => Ok(*value),
            _ => Err(DataplaneError::read_failure(function_name, "expected a single uint")),
        }
    }

    fn single_address(abi: &Abi, function_name: &str, output: &[u8]) -> Result<Address> {
        let tokens = Self::decode_function_output(abi, function_name, output)?;
        match tokens.as_slice() {
            [Token::Address(value)] => Ok(*value),
            _ => Err(DataplaneError::read_failure(function_name, "expected a single address")),
        }
    }
}
