//! In-memory collaborators and a two-chain network for exercising the
//! protocol without a validator.

use std::collections::{BTreeMap, HashMap, VecDeque};

use anchor_lang::error::Error;
use anchor_lang::prelude::*;
use anchor_lang::system_program;
use anchor_spl::token::spl_token;
use anchor_spl::token::spl_token::solana_program::program_pack::Pack;
use anchor_spl::token::spl_token::state::{Account as SplTokenAccount, AccountState};

use crate::custody::AssetCustodian;
use crate::errors::LendingError;
use crate::gateway::{CrossChainGateway, MessageFee, Route};
use crate::ledger::{LoanKey, LoanLedger};
use crate::machine::{Env, LendingMachine, RequestParams};
use crate::state::{Loan, LoanRequest};

pub const DAY: i64 = 24 * 60 * 60;

/// Name of the program error, or the debug form of a runtime error.
pub fn error_name(err: Error) -> String {
    match err {
        Error::AnchorError(e) => e.error_name.clone(),
        Error::ProgramError(e) => format!("{:?}", e.program_error),
    }
}

/// Backing storage for a hand-built `AccountInfo`.
pub struct RawAccount {
    pub key: Pubkey,
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
    pub is_signer: bool,
}

impl RawAccount {
    pub fn new(key: Pubkey, owner: Pubkey, data: Vec<u8>) -> Self {
        Self {
            key,
            owner,
            lamports: 0,
            data,
            is_signer: false,
        }
    }

    /// A system-owned address with no data.
    pub fn wallet(key: Pubkey) -> Self {
        Self::new(key, system_program::ID, Vec::new())
    }

    pub fn signer(mut self) -> Self {
        self.is_signer = true;
        self
    }

    pub fn with_lamports(mut self, lamports: u64) -> Self {
        self.lamports = lamports;
        self
    }

    pub fn info(&mut self) -> AccountInfo<'_> {
        AccountInfo::new(
            &self.key,
            self.is_signer,
            true,
            &mut self.lamports,
            &mut self.data,
            &self.owner,
            false,
            0,
        )
    }
}

/// An initialized SPL token account owned by the token program.
pub fn token_account(key: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) -> RawAccount {
    let state = SplTokenAccount {
        mint,
        owner,
        amount,
        state: AccountState::Initialized,
        ..SplTokenAccount::default()
    };
    let mut data = vec![0; SplTokenAccount::LEN];
    SplTokenAccount::pack(state, &mut data).unwrap();
    RawAccount::new(key, spl_token::ID, data)
}

#[derive(Default)]
pub struct MemoryLedger {
    loans: BTreeMap<LoanKey, Loan>,
    counters: BTreeMap<u64, u64>,
    requests: BTreeMap<u64, LoanRequest>,
}

impl LoanLedger for MemoryLedger {
    fn allocate(&mut self, origin_chain: u64) -> Result<u64> {
        let next = self.counters.entry(origin_chain).or_insert(1);
        let id = *next;
        *next += 1;
        Ok(id)
    }

    fn get(&self, key: LoanKey) -> Result<Loan> {
        Ok(self.loans.get(&key).cloned().unwrap_or_default())
    }

    fn put(&mut self, key: LoanKey, loan: &Loan) -> Result<()> {
        self.loans.insert(key, loan.clone());
        Ok(())
    }

    fn request(&self, nonce: u64) -> Result<Option<LoanRequest>> {
        Ok(self.requests.get(&nonce).cloned())
    }

    fn put_request(&mut self, record: &LoanRequest) -> Result<()> {
        self.requests.insert(record.nonce, record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCustody {
    balances: HashMap<(Pubkey, Pubkey), u64>,
    vaults: HashMap<Pubkey, u64>,
}

impl MemoryCustody {
    pub fn credit(&mut self, asset: Pubkey, holder: Pubkey, amount: u64) {
        *self.balances.entry((asset, holder)).or_default() += amount;
    }

    pub fn fund_vault(&mut self, asset: Pubkey, amount: u64) {
        *self.vaults.entry(asset).or_default() += amount;
    }
}

impl AssetCustodian for MemoryCustody {
    fn escrow(&mut self, asset: Pubkey, from: Pubkey, amount: u64) -> Result<()> {
        let balance = self.balances.entry((asset, from)).or_default();
        require!(*balance >= amount, LendingError::AssetTransferFailure);
        *balance -= amount;
        *self.vaults.entry(asset).or_default() += amount;
        Ok(())
    }

    fn release(&mut self, asset: Pubkey, to: Pubkey, amount: u64) -> Result<()> {
        let vault = self.vaults.entry(asset).or_default();
        require!(*vault >= amount, LendingError::AssetTransferFailure);
        *vault -= amount;
        *self.balances.entry((asset, to)).or_default() += amount;
        Ok(())
    }
}

pub struct Dispatched {
    pub destination: Route,
    pub payload: Vec<u8>,
    pub fee: MessageFee,
}

#[derive(Default)]
pub struct MemoryGateway {
    outbox: VecDeque<Dispatched>,
    accrued_fees: u64,
}

impl CrossChainGateway for MemoryGateway {
    fn dispatch(&mut self, destination: Route, payload: Vec<u8>, fee: MessageFee) -> Result<()> {
        self.accrued_fees += fee.amount;
        self.outbox.push_back(Dispatched {
            destination,
            payload,
            fee,
        });
        Ok(())
    }
}

/// One deployment with its own clock, ledger, vaults and outbox.
pub struct Chain {
    pub id: u64,
    pub address: [u8; 32],
    pub now: i64,
    fee: MessageFee,
    next_nonce: u64,
    ledger: MemoryLedger,
    custody: MemoryCustody,
    gateway: MemoryGateway,
}

impl Chain {
    fn new(id: u64, fee: MessageFee) -> Self {
        Self {
            id,
            address: [id as u8; 32],
            now: 1_700_000_000,
            fee,
            next_nonce: 0,
            ledger: MemoryLedger::default(),
            custody: MemoryCustody::default(),
            gateway: MemoryGateway::default(),
        }
    }

    fn env(&self) -> Env {
        Env {
            chain_id: self.id,
            now: self.now,
            fee: self.fee,
        }
    }

    pub fn advance(&mut self, seconds: i64) {
        self.now += seconds;
    }

    pub fn request(
        &mut self,
        borrower: Pubkey,
        destination: &Chain,
        params: RequestParams,
    ) -> Result<LoanRequest> {
        let route = Route {
            chain_id: destination.id,
            address: destination.address,
        };
        self.request_to(borrower, route, params)
    }

    pub fn request_to(
        &mut self,
        borrower: Pubkey,
        destination: Route,
        params: RequestParams,
    ) -> Result<LoanRequest> {
        let env = self.env();
        let record = LendingMachine::new(env, &mut self.custody, &mut self.gateway).request(
            borrower,
            self.next_nonce,
            destination,
            params,
        )?;
        self.next_nonce += 1;
        self.ledger.put_request(&record)?;
        Ok(record)
    }

    pub fn fund(&mut self, key: LoanKey, lender: Pubkey) -> Result<()> {
        let env = self.env();
        let mut loan = self.ledger.get(key)?;
        LendingMachine::new(env, &mut self.custody, &mut self.gateway).fund(&mut loan, lender)?;
        self.ledger.put(key, &loan)
    }

    pub fn repay(&mut self, key: LoanKey, caller: Pubkey) -> Result<u64> {
        let env = self.env();
        let mut loan = self.ledger.get(key)?;
        let repayment = LendingMachine::new(env, &mut self.custody, &mut self.gateway)
            .repay(&mut loan, caller)?;
        self.ledger.put(key, &loan)?;
        Ok(repayment)
    }

    pub fn claim(&mut self, key: LoanKey, caller: Pubkey) -> Result<()> {
        let env = self.env();
        let mut loan = self.ledger.get(key)?;
        LendingMachine::new(env, &mut self.custody, &mut self.gateway).claim(&mut loan, caller)?;
        self.ledger.put(key, &loan)
    }

    pub fn receive(
        &mut self,
        source_chain: u64,
        sender: [u8; 32],
        payload: &[u8],
    ) -> Result<LoanKey> {
        let env = self.env();
        LendingMachine::new(env, &mut self.custody, &mut self.gateway).receive(
            &mut self.ledger,
            source_chain,
            sender,
            payload,
        )
    }

    pub fn loan(&self, key: LoanKey) -> Loan {
        self.ledger.get(key).unwrap()
    }

    pub fn balance(&self, asset: Pubkey, holder: Pubkey) -> u64 {
        self.custody
            .balances
            .get(&(asset, holder))
            .copied()
            .unwrap_or_default()
    }

    pub fn escrowed(&self, asset: Pubkey) -> u64 {
        self.custody.vaults.get(&asset).copied().unwrap_or_default()
    }

    pub fn outbox_len(&self) -> usize {
        self.gateway.outbox.len()
    }

    pub fn peek_outbox(&self, index: usize) -> Vec<u8> {
        self.gateway.outbox[index].payload.clone()
    }

    pub fn accrued_fees(&self) -> u64 {
        self.gateway.accrued_fees
    }

    fn take_outbound(&mut self, destination: u64) -> Dispatched {
        let message = self.gateway.outbox.pop_front().unwrap();
        assert_eq!(message.destination.chain_id, destination);
        message
    }
}

/// A borrower chain and a lender chain sharing one asset identity.
pub struct Network {
    pub borrower_chain: Chain,
    pub lender_chain: Chain,
    pub borrower: Pubkey,
    pub lender: Pubkey,
    pub asset: Pubkey,
    pub fee_asset: Pubkey,
    pub fee: u64,
}

impl Network {
    pub const STARTING_BALANCE: u64 = 1_000_000;
    /// Pooled liquidity each chain's vault starts with.
    pub const LIQUIDITY: u64 = 10_000_000;

    pub fn new() -> Self {
        let asset = Pubkey::new_unique();
        let fee_asset = Pubkey::new_unique();
        let fee = 5;
        let message_fee = MessageFee {
            asset: fee_asset,
            amount: fee,
        };
        let borrower = Pubkey::new_unique();
        let lender = Pubkey::new_unique();

        let mut borrower_chain = Chain::new(1, message_fee);
        borrower_chain
            .custody
            .credit(asset, borrower, Self::STARTING_BALANCE);
        borrower_chain
            .custody
            .credit(fee_asset, borrower, Self::STARTING_BALANCE);
        borrower_chain.custody.fund_vault(asset, Self::LIQUIDITY);

        let mut lender_chain = Chain::new(2, message_fee);
        lender_chain
            .custody
            .credit(asset, lender, Self::STARTING_BALANCE);
        lender_chain
            .custody
            .credit(fee_asset, lender, Self::STARTING_BALANCE);
        lender_chain.custody.fund_vault(asset, Self::LIQUIDITY);

        Self {
            borrower_chain,
            lender_chain,
            borrower,
            lender,
            asset,
            fee_asset,
            fee,
        }
    }

    /// Deliver the oldest message the borrower chain sent.
    pub fn deliver_to_lender(&mut self) -> Result<LoanKey> {
        let message = self.borrower_chain.take_outbound(self.lender_chain.id);
        let (source, sender) = (self.borrower_chain.id, self.borrower_chain.address);
        self.lender_chain.receive(source, sender, &message.payload)
    }

    /// Deliver the oldest message the lender chain sent.
    pub fn deliver_to_borrower(&mut self) -> Result<LoanKey> {
        let message = self.lender_chain.take_outbound(self.borrower_chain.id);
        let (source, sender) = (self.lender_chain.id, self.lender_chain.address);
        self.borrower_chain.receive(source, sender, &message.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ledger_reads_zeroed_loan_for_unknown_key() {
        let ledger = MemoryLedger::default();
        assert_eq!(ledger.get(LoanKey::new(1, 1)).unwrap(), Loan::default());
    }

    #[test]
    fn memory_ledger_counters_are_per_origin_chain() {
        let mut ledger = MemoryLedger::default();
        assert_eq!(ledger.allocate(1).unwrap(), 1);
        assert_eq!(ledger.allocate(1).unwrap(), 2);
        assert_eq!(ledger.allocate(2).unwrap(), 1);
    }

    #[test]
    fn memory_custody_rejects_overdraw() {
        let mut custody = MemoryCustody::default();
        let asset = Pubkey::new_unique();
        let holder = Pubkey::new_unique();
        custody.credit(asset, holder, 10);

        let err = custody.escrow(asset, holder, 11).unwrap_err();
        assert_eq!(error_name(err), "AssetTransferFailure");
        custody.escrow(asset, holder, 10).unwrap();
        let err = custody.release(asset, holder, 11).unwrap_err();
        assert_eq!(error_name(err), "AssetTransferFailure");
    }
}
