//! Loan storage keyed by `(origin_chain, loan_id)`.
//!
//! Unknown keys read back as a zeroed [`Loan`] (state `Absent`), so callers see
//! "never existed" and "settled" through [`Loan::state`] rather than through a
//! missing record.

use anchor_lang::prelude::*;
use anchor_lang::system_program::{self, Allocate, Assign, CreateAccount, Transfer};

use crate::errors::LendingError;
use crate::state::{Loan, LoanCounter, LoanRequest, LOAN_SEED, REQUEST_SEED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoanKey {
    pub origin_chain: u64,
    pub loan_id: u64,
}

impl LoanKey {
    pub fn new(origin_chain: u64, loan_id: u64) -> Self {
        Self {
            origin_chain,
            loan_id,
        }
    }
}

pub trait LoanLedger {
    /// Next unused id for `origin_chain`; advances that chain's counter.
    fn allocate(&mut self, origin_chain: u64) -> Result<u64>;
    /// Zeroed loan when the key was never written.
    fn get(&self, key: LoanKey) -> Result<Loan>;
    fn put(&mut self, key: LoanKey, loan: &Loan) -> Result<()>;
    fn request(&self, nonce: u64) -> Result<Option<LoanRequest>>;
    fn put_request(&mut self, record: &LoanRequest) -> Result<()>;
}

pub fn loan_address(program_id: &Pubkey, key: LoanKey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            LOAN_SEED,
            &key.origin_chain.to_le_bytes(),
            &key.loan_id.to_le_bytes(),
        ],
        program_id,
    )
}

pub fn request_address(program_id: &Pubkey, nonce: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[REQUEST_SEED, &nonce.to_le_bytes()], program_id)
}

/// Reads a loan PDA, or a zeroed loan if the account was never created.
pub fn read_loan(account: &AccountInfo, program_id: &Pubkey) -> Result<Loan> {
    if account.data_is_empty() {
        return Ok(Loan::default());
    }
    require_keys_eq!(*account.owner, *program_id, LendingError::LoanAccountMismatch);
    let data = account.try_borrow_data()?;
    let loan = Loan::try_deserialize(&mut &data[..])?;
    Ok(loan)
}

/// How a PDA is brought to rent exemption before its first write. An address
/// that already holds lamports cannot go through `create_account`, so it is
/// topped up, allocated and assigned instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AccountFunding {
    Create { lamports: u64 },
    TopUp { lamports: u64 },
}

impl AccountFunding {
    fn plan(current: u64, required: u64) -> Self {
        if current == 0 {
            Self::Create { lamports: required }
        } else {
            Self::TopUp {
                lamports: required.saturating_sub(current),
            }
        }
    }
}

/// Ledger over the accounts supplied to `receive_message`: the local loan
/// counter, one loan PDA and optionally one request PDA. The loan PDA is
/// created on first write, paid for by the relayer.
pub struct AccountLedger<'a, 'info> {
    program_id: &'a Pubkey,
    counter: &'a mut LoanCounter,
    loan: AccountInfo<'info>,
    request: Option<AccountInfo<'info>>,
    payer: AccountInfo<'info>,
    system_program: AccountInfo<'info>,
}

impl<'a, 'info> AccountLedger<'a, 'info> {
    pub fn new(
        program_id: &'a Pubkey,
        counter: &'a mut LoanCounter,
        loan: AccountInfo<'info>,
        request: Option<AccountInfo<'info>>,
        payer: AccountInfo<'info>,
        system_program: AccountInfo<'info>,
    ) -> Self {
        Self {
            program_id,
            counter,
            loan,
            request,
            payer,
            system_program,
        }
    }

    fn loan_bump(&self, key: LoanKey) -> Result<u8> {
        let (address, bump) = loan_address(self.program_id, key);
        require_keys_eq!(address, *self.loan.key, LendingError::LoanAccountMismatch);
        Ok(bump)
    }

    fn create_loan_account(&self, key: LoanKey, bump: u8) -> Result<()> {
        let space = 8 + Loan::LEN;
        let required = Rent::get()?.minimum_balance(space);
        let origin = key.origin_chain.to_le_bytes();
        let id = key.loan_id.to_le_bytes();
        let seeds: &[&[u8]] = &[LOAN_SEED, &origin, &id, &[bump]];
        let signer = &[seeds];

        match AccountFunding::plan(self.loan.lamports(), required) {
            AccountFunding::Create { lamports } => system_program::create_account(
                CpiContext::new_with_signer(
                    self.system_program.clone(),
                    CreateAccount {
                        from: self.payer.clone(),
                        to: self.loan.clone(),
                    },
                    signer,
                ),
                lamports,
                space as u64,
                self.program_id,
            ),
            AccountFunding::TopUp { lamports } => {
                if lamports > 0 {
                    system_program::transfer(
                        CpiContext::new(
                            self.system_program.clone(),
                            Transfer {
                                from: self.payer.clone(),
                                to: self.loan.clone(),
                            },
                        ),
                        lamports,
                    )?;
                }
                system_program::allocate(
                    CpiContext::new_with_signer(
                        self.system_program.clone(),
                        Allocate {
                            account_to_allocate: self.loan.clone(),
                        },
                        signer,
                    ),
                    space as u64,
                )?;
                system_program::assign(
                    CpiContext::new_with_signer(
                        self.system_program.clone(),
                        Assign {
                            account_to_assign: self.loan.clone(),
                        },
                        signer,
                    ),
                    self.program_id,
                )
            }
        }
    }

    fn request_account(&self, nonce: u64) -> Result<Option<&AccountInfo<'info>>> {
        let Some(account) = self.request.as_ref() else {
            return Ok(None);
        };
        let (address, _) = request_address(self.program_id, nonce);
        require_keys_eq!(address, *account.key, LendingError::LoanAccountMismatch);
        Ok(Some(account))
    }
}

impl<'a, 'info> LoanLedger for AccountLedger<'a, 'info> {
    fn allocate(&mut self, origin_chain: u64) -> Result<u64> {
        require!(
            self.counter.origin_chain == origin_chain,
            LendingError::LoanAccountMismatch
        );
        self.counter.allocate()
    }

    fn get(&self, key: LoanKey) -> Result<Loan> {
        self.loan_bump(key)?;
        read_loan(&self.loan, self.program_id)
    }

    fn put(&mut self, key: LoanKey, loan: &Loan) -> Result<()> {
        let bump = self.loan_bump(key)?;
        if self.loan.data_is_empty() {
            self.create_loan_account(key, bump)?;
        }
        let mut record = loan.clone();
        record.bump = bump;
        let mut data = self.loan.try_borrow_mut_data()?;
        let mut writer: &mut [u8] = &mut data;
        record.try_serialize(&mut writer)
    }

    fn request(&self, nonce: u64) -> Result<Option<LoanRequest>> {
        let Some(account) = self.request_account(nonce)? else {
            return Ok(None);
        };
        if account.data_is_empty() {
            return Ok(None);
        }
        require_keys_eq!(*account.owner, *self.program_id, LendingError::LoanAccountMismatch);
        let data = account.try_borrow_data()?;
        let record = LoanRequest::try_deserialize(&mut &data[..])?;
        Ok(Some(record))
    }

    fn put_request(&mut self, record: &LoanRequest) -> Result<()> {
        let account = self
            .request_account(record.nonce)?
            .ok_or(LendingError::UnknownRequest)?;
        require!(!account.data_is_empty(), LendingError::UnknownRequest);
        let mut data = account.try_borrow_mut_data()?;
        let mut writer: &mut [u8] = &mut data;
        record.try_serialize(&mut writer)
    }
}
