//! Canned contract state shared by every mock endpoint of one chain

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};

use crate::contracts::AbiManager;

/// Contract responses keyed by `(to, calldata)`
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    responses: Arc<Mutex<HashMap<(Address, Vec<u8>), Vec<u8>>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for an `eth_call`; `None` means the call reverts
    pub fn respond(&self, to: Address, data: &[u8]) -> Option<Bytes> {
        self.responses
            .lock()
            .unwrap()
            .get(&(to, data.to_vec()))
            .cloned()
            .map(Bytes::from)
    }

    /// Set a raw response
    pub fn set_response(&self, to: Address, calldata: Bytes, output: Vec<u8>) {
        self.responses.lock().unwrap().insert((to, calldata.to_vec()), output);
    }

    /// Make a call revert
    pub fn clear_response(&self, to: Address, calldata: Bytes) {
        self.responses.lock().unwrap().remove(&(to, calldata.to_vec()));
    }

    /// Register a pair with its tokens and reserves
    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address, reserve0: U256, reserve1: U256) {
        self.set_response(
            pair,
            AbiManager::encode_token0_call().unwrap(),
            encode(&[Token::Address(token0)]),
        );
        self.set_response(
            pair,
            AbiManager::encode_token1_call().unwrap(),
            encode(&[Token::Address(token1)]),
        );
        self.set_reserves(pair, reserve0, reserve1);
    }

    /// Update a pair's `getReserves()` answer
    pub fn set_reserves(&self, pair: Address, reserve0: U256, reserve1: U256) {
        self.set_response(
            pair,
            AbiManager::encode_get_reserves_call().unwrap(),
            encode(&[
                Token::Uint(reserve0),
                Token::Uint(reserve1),
                Token::Uint(U256::from(1_700_000_000u64)),
            ]),
        );
    }

    /// Make `getReserves()` revert for a pair
    pub fn revert_reserves(&self, pair: Address) {
        self.clear_response(pair, AbiManager::encode_get_reserves_call().unwrap());
    }

    /// Register a factory enumerating `pairs` in order
    pub fn add_factory(&self, factory: Address, pairs: &[Address]) {
        self.set_response(
            factory,
            AbiManager::encode_all_pairs_length_call().unwrap(),
            encode(&[Token::Uint(U256::from(pairs.len()))]),
        );
        for (index, pair) in pairs.iter().enumerate() {
            self.set_response(
                factory,
                AbiManager::encode_all_pairs_call(index as u64).unwrap(),
                encode(&[Token::Address(*pair)]),
            );
        }
    }

    /// Register ERC20 decimals
    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.set_response(
            token,
            AbiManager::encode_erc20_decimals_call().unwrap(),
            encode(&[Token::Uint(U256::from(decimals))]),
        );
    }
}
