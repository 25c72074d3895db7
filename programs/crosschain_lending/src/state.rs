//! Program state accounts for cross-chain lending.
//!
//! Each deployment holds its own copy of the loans it originated or is a
//! counterparty for. The two copies of a loan are reconciled only by
//! message delivery; nothing here is shared across chains.

use anchor_lang::prelude::*;

pub const CONFIG_SEED: &[u8] = b"config";
pub const COUNTER_SEED: &[u8] = b"loan_counter";
pub const LOAN_SEED: &[u8] = b"loan";
pub const REQUEST_SEED: &[u8] = b"request";
pub const ESCROW_SEED: &[u8] = b"escrow";

/// Compute budget reserved on the destination chain for every outbound message.
pub const DESTINATION_GAS_LIMIT: u64 = 200_000;

/// Global program config. Single instance per deployment.
#[account]
#[derive(Default)]
pub struct Config {
    /// Authority that can update the message fee.
    pub admin: Pubkey,
    /// Gateway authority: delivers inbound messages and collects relay fees.
    pub relayer: Pubkey,
    /// Identity of the chain this deployment runs on.
    pub chain_id: u64,
    /// Asset in which relay fees are paid.
    pub fee_mint: Pubkey,
    /// Fee escrowed from the caller for each outbound message (0 = free).
    pub message_fee: u64,
    /// Fees escrowed and authorized for the relayer but not yet collected.
    pub accrued_fees: u64,
    /// Sequence assigned to the next outbound message.
    pub outbound_sequence: u64,
    /// Nonce assigned to the next local loan request.
    pub next_request_nonce: u64,
    pub bump: u8,
}

impl Config {
    pub const LEN: usize = 32 + 32 + 8 + 32 + 8 + 8 + 8 + 8 + 1;
}

/// Monotonic loan-id counter for one origin chain.
#[account]
#[derive(Default)]
pub struct LoanCounter {
    pub origin_chain: u64,
    /// Next id to hand out. Starts at 1; id 0 marks an absent loan.
    pub next_loan_id: u64,
    pub bump: u8,
}

impl LoanCounter {
    pub const LEN: usize = 8 + 8 + 1;
    pub const FIRST_LOAN_ID: u64 = 1;

    /// Returns the next unused id and advances the counter.
    pub fn allocate(&mut self) -> Result<u64> {
        let id = self.next_loan_id.max(Self::FIRST_LOAN_ID);
        self.next_loan_id = id
            .checked_add(1)
            .ok_or(crate::errors::LendingError::MathOverflow)?;
        Ok(id)
    }
}

/// Lifecycle of one side's copy of a loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanState {
    /// No record under this key; the ledger returned a zeroed loan.
    Absent,
    Requested,
    Funded,
    /// Repaid or defaulted. Terminal.
    Settled,
}

/// One side's record of a loan, keyed by `(origin_chain, id)`.
#[account]
#[derive(Default, Debug, PartialEq, Eq)]
pub struct Loan {
    /// Allocated by the origin chain; 0 only for absent records.
    pub id: u64,
    /// Chain that allocated `id` (the chain that received the request).
    pub origin_chain: u64,
    pub borrower: Pubkey,
    /// `Pubkey::default()` until funded.
    pub lender: Pubkey,
    /// Principal.
    pub amount: u64,
    /// Loan term in seconds.
    pub duration: u64,
    /// Asset units accrued per year, not a percentage. See `interest`.
    pub interest_rate: u64,
    /// Set at funding; 0 before.
    pub start_time: i64,
    /// Pledged asset. Also used as the funding and repayment asset.
    pub collateral_mint: Pubkey,
    pub collateral_amount: u64,
    /// Cleared on repayment or collateral claim; never set again.
    pub is_active: bool,
    /// Chain holding the other copy of this loan.
    pub counterparty_chain: u64,
    /// Lending program address on the counterparty chain.
    pub counterparty_address: [u8; 32],
    /// Borrower-side request this loan was opened for.
    pub request_nonce: u64,
    pub bump: u8,
}

impl Loan {
    pub const LEN: usize = 8 + 8 + 32 + 32 + 8 + 8 + 8 + 8 + 32 + 8 + 1 + 8 + 32 + 8 + 1;

    pub fn state(&self) -> LoanState {
        if self.id == 0 {
            LoanState::Absent
        } else if !self.is_active {
            LoanState::Settled
        } else if self.lender == Pubkey::default() {
            LoanState::Requested
        } else {
            LoanState::Funded
        }
    }

    /// Timestamp after which the lender may claim collateral.
    pub fn maturity(&self) -> Option<i64> {
        i64::try_from(self.duration)
            .ok()
            .and_then(|duration| self.start_time.checked_add(duration))
    }
}

/// Borrower-side record of a request sent to another chain. Holds the terms
/// until the origin chain reports the allocated loan id through funding.
#[account]
#[derive(Default, Debug, PartialEq, Eq)]
pub struct LoanRequest {
    pub nonce: u64,
    pub borrower: Pubkey,
    pub destination_chain: u64,
    pub destination_address: [u8; 32],
    pub principal: u64,
    pub duration: u64,
    pub interest_rate: u64,
    pub collateral_mint: Pubkey,
    pub collateral_amount: u64,
    /// Loan id on the destination chain once funded; 0 while unlinked.
    pub loan_id: u64,
    pub requested_at: i64,
    pub bump: u8,
}

impl LoanRequest {
    pub const LEN: usize = 8 + 32 + 8 + 32 + 8 + 8 + 8 + 32 + 8 + 8 + 8 + 1;

    pub fn is_linked(&self) -> bool {
        self.loan_id != 0
    }
}
