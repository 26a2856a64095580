// src/gas.rs
use ethers::types::U256;

use crate::types::{ActionKind, GasEnvelope, GasEstimate};

/// Margin added on top of every bundler estimate, in percent.
pub const GAS_MARGIN_PERCENT: u64 = 30;

/// Limits used when the bundler leaves a field out (or reports zero).
pub fn floor(kind: ActionKind) -> GasEnvelope {
    let (call, verification, pre_verification) = match kind {
        ActionKind::Deploy => (500_000u64, 1_000_000u64, 800_000u64),
        ActionKind::Mint => (400_000, 200_000, 100_000),
        ActionKind::Transfer => (400_000, 1_000_000, 800_000),
        ActionKind::Record => (200_000, 1_000_000, 800_000),
    };
    GasEnvelope {
        call_gas_limit: U256::from(call),
        verification_gas_limit: U256::from(verification),
        pre_verification_gas: U256::from(pre_verification),
    }
}

/// Bundler estimates run low on this rollup under load, so every estimated
/// field gets a fixed margin and missing fields fall back to per-action floors.
pub fn adjust(estimate: &GasEstimate, kind: ActionKind) -> GasEnvelope {
    let floors = floor(kind);
    GasEnvelope {
        call_gas_limit: adjust_field(estimate.call_gas_limit, floors.call_gas_limit),
        verification_gas_limit: adjust_field(
            estimate.verification_gas_limit,
            floors.verification_gas_limit,
        ),
        pre_verification_gas: adjust_field(
            estimate.pre_verification_gas,
            floors.pre_verification_gas,
        ),
    }
}

fn adjust_field(estimate: Option<U256>, floor: U256) -> U256 {
    match estimate {
        Some(value) if !value.is_zero() => with_margin(value),
        _ => floor,
    }
}

fn with_margin(value: U256) -> U256 {
    let margin = value.saturating_mul(U256::from(GAS_MARGIN_PERCENT)) / U256::from(100u64);
    value.saturating_add(margin)
}
