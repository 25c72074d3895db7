//! Events emitted by the lending program.
//! Relayers consume `MessageDispatched`; indexers reconstruct loan history
//! from the lifecycle events, each tagged with chain and loan id.

use anchor_lang::prelude::*;

/// Borrower side: collateral escrowed and a request sent to `destination_chain`.
#[event]
pub struct LoanRequestSubmitted {
    pub chain_id: u64,
    pub request_nonce: u64,
    pub borrower: Pubkey,
    pub destination_chain: u64,
    pub principal: u64,
    pub collateral_mint: Pubkey,
    pub collateral_amount: u64,
    pub timestamp: i64,
}

/// Origin side: a delivered request was given a loan id.
#[event]
pub struct LoanRequested {
    pub chain_id: u64,
    pub origin_chain: u64,
    pub loan_id: u64,
    pub borrower: Pubkey,
    pub borrower_chain: u64,
    pub principal: u64,
    pub duration: u64,
    pub interest_rate: u64,
    pub timestamp: i64,
}

#[event]
pub struct LoanFunded {
    pub chain_id: u64,
    pub origin_chain: u64,
    pub loan_id: u64,
    pub lender: Pubkey,
    pub amount: u64,
    pub start_time: i64,
    /// True when applied from a delivered message rather than a local call.
    pub remote: bool,
    pub timestamp: i64,
}

#[event]
pub struct LoanRepaid {
    pub chain_id: u64,
    pub origin_chain: u64,
    pub loan_id: u64,
    pub borrower: Pubkey,
    pub repayment: u64,
    pub remote: bool,
    pub timestamp: i64,
}

#[event]
pub struct CollateralClaimed {
    pub chain_id: u64,
    pub origin_chain: u64,
    pub loan_id: u64,
    pub lender: Pubkey,
    pub collateral_amount: u64,
    pub remote: bool,
    pub timestamp: i64,
}

#[event]
pub struct MessageDispatched {
    pub sequence: u64,
    pub source_chain: u64,
    pub destination_chain: u64,
    /// Lending program on the destination chain (opaque; 32 bytes).
    pub destination_address: [u8; 32],
    pub payload: Vec<u8>,
    pub fee_mint: Pubkey,
    pub fee_amount: u64,
    pub gas_limit: u64,
    pub timestamp: i64,
}

#[event]
pub struct MessageReceived {
    pub chain_id: u64,
    pub source_chain: u64,
    pub sender_address: [u8; 32],
    pub tag: u8,
    pub timestamp: i64,
}

#[event]
pub struct RelayerFeesCollected {
    pub relayer: Pubkey,
    pub fee_mint: Pubkey,
    pub amount: u64,
    pub timestamp: i64,
}
