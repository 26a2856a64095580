// src/decoder.rs
//
// Fixed-offset extraction of the one event each action cares about. The
// indexed layouts are known ahead of time, so no ABI decoding happens here.
use ethers::types::{Address, H256, U256};

use crate::types::{DecodedEvent, EventShape, RawLog, Receipt, TokenTransferred};

const WORD: usize = 32;

/// Decode the first log emitted by `expected_emitter` as `shape`.
///
/// Logs from any other emitter never qualify. Only the first qualifying log is
/// read; if it does not fit `shape` the result is `Unrecognized`.
pub fn decode(receipt: &Receipt, expected_emitter: Address, shape: EventShape) -> DecodedEvent {
    receipt
        .logs
        .iter()
        .find(|log| qualifies(log, expected_emitter))
        .and_then(|log| match shape {
            EventShape::Creation => decode_creation(log),
            EventShape::Transfer => decode_transfer(log),
        })
        .unwrap_or(DecodedEvent::Unrecognized)
}

/// Last resort when no creation event was found: the first log emitted by a
/// contract other than `factory` (and not the zero address) is taken to be the
/// freshly created token.
pub fn fallback_created_address(receipt: &Receipt, factory: Address) -> Option<Address> {
    receipt
        .logs
        .iter()
        .map(|log| log.address)
        .find(|address| *address != factory && !address.is_zero())
}

fn qualifies(log: &RawLog, expected_emitter: Address) -> bool {
    log.address == expected_emitter && !log.topics.is_empty()
}

fn decode_creation(log: &RawLog) -> Option<DecodedEvent> {
    let token_address = match log.topics.get(1) {
        Some(topic) => address_from_topic(topic),
        // Non-indexed layout: the address sits in the low 20 bytes of the first data word.
        None => address_from_word(log.data.get(..WORD)?),
    };
    Some(DecodedEvent::TokenCreated { token_address })
}

fn decode_transfer(log: &RawLog) -> Option<DecodedEvent> {
    if log.topics.len() < 4 || log.data.len() < 2 * WORD {
        return None;
    }
    Some(DecodedEvent::TokenTransferred(TokenTransferred {
        caller: address_from_topic(&log.topics[1]),
        token_address: address_from_topic(&log.topics[2]),
        to: address_from_topic(&log.topics[3]),
        amount: U256::from_big_endian(&log.data[..WORD]),
        timestamp: U256::from_big_endian(&log.data[WORD..2 * WORD]),
    }))
}

fn address_from_topic(topic: &H256) -> Address {
    address_from_word(topic.as_bytes())
}

fn address_from_word(word: &[u8]) -> Address {
    Address::from_slice(&word[WORD - 20..WORD])
}
