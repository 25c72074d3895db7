//! Loan lifecycle: Requested -> Funded -> Settled (repaid or defaulted).
//!
//! Every transition is a local action on one chain paired with a remote
//! effect applied when the counterparty chain delivers the mirrored message.
//! Local actions mutate local state before the message is delivered and never
//! wait for it. Remote effects re-check their preconditions against the local
//! copy, which may lag or disagree.
//!
//! Transitions work on a copy of the loan and commit it only when custody and
//! dispatch succeed, so a failed call leaves the record untouched.

use anchor_lang::prelude::*;

use crate::custody::AssetCustodian;
use crate::errors::LendingError;
use crate::events::{
    CollateralClaimed, LoanFunded, LoanRepaid, LoanRequestSubmitted, LoanRequested,
    MessageReceived,
};
use crate::gateway::{CrossChainGateway, MessageFee, Route};
use crate::interest;
use crate::ledger::{LoanKey, LoanLedger};
use crate::message::{
    ClaimCollateralPayload, FundLoanPayload, LendingMessage, LoanTerms, RepayLoanPayload,
};
use crate::state::{Loan, LoanRequest, LoanState};

/// Per-transaction context: where we are, when, and what a message costs.
#[derive(Clone, Copy, Debug)]
pub struct Env {
    pub chain_id: u64,
    pub now: i64,
    pub fee: MessageFee,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestParams {
    pub principal: u64,
    pub duration: u64,
    pub interest_rate: u64,
    pub collateral_mint: Pubkey,
    pub collateral_amount: u64,
}

pub struct LendingMachine<'m, C, G> {
    env: Env,
    custodian: &'m mut C,
    gateway: &'m mut G,
}

impl<'m, C: AssetCustodian, G: CrossChainGateway> LendingMachine<'m, C, G> {
    pub fn new(env: Env, custodian: &'m mut C, gateway: &'m mut G) -> Self {
        Self {
            env,
            custodian,
            gateway,
        }
    }

    /// Escrow collateral and ask `destination` to open a loan. The loan id is
    /// allocated there; locally only the request record is kept.
    pub fn request(
        &mut self,
        borrower: Pubkey,
        nonce: u64,
        destination: Route,
        params: RequestParams,
    ) -> Result<LoanRequest> {
        self.check_route(&destination)?;
        require!(
            params.principal > 0 && params.collateral_amount > 0,
            LendingError::ZeroAmount
        );

        self.custodian
            .escrow(params.collateral_mint, borrower, params.collateral_amount)?;
        let message = LendingMessage::RequestLoan(LoanTerms {
            borrower,
            principal: params.principal,
            duration: params.duration,
            interest_rate: params.interest_rate,
            collateral_mint: params.collateral_mint,
            collateral_amount: params.collateral_amount,
            request_nonce: nonce,
        });
        self.send(borrower, destination, &message)?;

        emit!(LoanRequestSubmitted {
            chain_id: self.env.chain_id,
            request_nonce: nonce,
            borrower,
            destination_chain: destination.chain_id,
            principal: params.principal,
            collateral_mint: params.collateral_mint,
            collateral_amount: params.collateral_amount,
            timestamp: self.env.now,
        });

        Ok(LoanRequest {
            nonce,
            borrower,
            destination_chain: destination.chain_id,
            destination_address: destination.address,
            principal: params.principal,
            duration: params.duration,
            interest_rate: params.interest_rate,
            collateral_mint: params.collateral_mint,
            collateral_amount: params.collateral_amount,
            loan_id: 0,
            requested_at: self.env.now,
            bump: 0,
        })
    }

    /// Lender funds a requested loan on its origin chain.
    pub fn fund(&mut self, loan: &mut Loan, lender: Pubkey) -> Result<()> {
        require!(
            loan.state() == LoanState::Requested,
            LendingError::InvalidLoanState
        );
        let destination = self.borrower_chain(loan);
        self.check_route(&destination)?;

        let mut next = loan.clone();
        next.lender = lender;
        next.start_time = self.env.now;
        // Funding reuses the collateral asset identity.
        self.custodian
            .escrow(next.collateral_mint, lender, next.amount)?;
        let message = LendingMessage::FundLoan(FundLoanPayload {
            loan_id: next.id,
            lender,
            request_nonce: next.request_nonce,
        });
        self.send(lender, destination, &message)?;

        emit!(LoanFunded {
            chain_id: self.env.chain_id,
            origin_chain: next.origin_chain,
            loan_id: next.id,
            lender,
            amount: next.amount,
            start_time: next.start_time,
            remote: false,
            timestamp: self.env.now,
        });
        *loan = next;
        Ok(())
    }

    /// Borrower repays principal plus accrued interest. Returns the repayment.
    pub fn repay(&mut self, loan: &mut Loan, caller: Pubkey) -> Result<u64> {
        require!(
            loan.state() == LoanState::Funded,
            LendingError::InvalidLoanState
        );
        require_keys_eq!(caller, loan.borrower, LendingError::UnauthorizedCaller);
        let destination = self.lender_chain(loan);
        self.check_route(&destination)?;

        let repayment = repayment_due(loan, self.env.now)?;
        let mut next = loan.clone();
        self.custodian
            .escrow(next.collateral_mint, caller, repayment)?;
        next.is_active = false;
        let message = LendingMessage::RepayLoan(RepayLoanPayload {
            loan_id: next.id,
            repayment,
        });
        self.send(caller, destination, &message)?;

        emit!(LoanRepaid {
            chain_id: self.env.chain_id,
            origin_chain: next.origin_chain,
            loan_id: next.id,
            borrower: caller,
            repayment,
            remote: false,
            timestamp: self.env.now,
        });
        *loan = next;
        Ok(repayment)
    }

    /// Lender claims collateral once `now > start_time + duration`.
    pub fn claim(&mut self, loan: &mut Loan, caller: Pubkey) -> Result<()> {
        require!(
            loan.state() == LoanState::Funded,
            LendingError::InvalidLoanState
        );
        require_keys_eq!(caller, loan.lender, LendingError::UnauthorizedCaller);
        let maturity = loan.maturity().ok_or(LendingError::MathOverflow)?;
        require!(self.env.now > maturity, LendingError::LoanNotDefaulted);
        let destination = self.borrower_chain(loan);
        self.check_route(&destination)?;

        let mut next = loan.clone();
        next.is_active = false;
        let message = LendingMessage::ClaimCollateral(ClaimCollateralPayload { loan_id: next.id });
        self.send(caller, destination, &message)?;

        emit!(CollateralClaimed {
            chain_id: self.env.chain_id,
            origin_chain: next.origin_chain,
            loan_id: next.id,
            lender: caller,
            collateral_amount: next.collateral_amount,
            remote: false,
            timestamp: self.env.now,
        });
        *loan = next;
        Ok(())
    }

    /// Inbound entry point for authenticated deliveries. Decodes the tag and
    /// applies the matching remote effect. Returns the key of the loan touched.
    pub fn receive<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        sender: [u8; 32],
        payload: &[u8],
    ) -> Result<LoanKey> {
        require!(
            source_chain != self.env.chain_id,
            LendingError::InvalidDestination
        );
        let message = LendingMessage::decode(payload)?;
        emit!(MessageReceived {
            chain_id: self.env.chain_id,
            source_chain,
            sender_address: sender,
            tag: message.tag() as u8,
            timestamp: self.env.now,
        });

        match message {
            LendingMessage::RequestLoan(terms) => {
                self.open_loan(ledger, source_chain, sender, terms)
            }
            LendingMessage::FundLoan(payload) => {
                self.apply_funding(ledger, source_chain, sender, payload)
            }
            LendingMessage::RepayLoan(payload) => {
                self.apply_repayment(ledger, source_chain, payload)
            }
            LendingMessage::ClaimCollateral(payload) => {
                self.apply_claim(ledger, source_chain, payload)
            }
        }
    }

    fn open_loan<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        sender: [u8; 32],
        terms: LoanTerms,
    ) -> Result<LoanKey> {
        require!(
            terms.principal > 0 && terms.collateral_amount > 0,
            LendingError::ZeroAmount
        );
        let id = ledger.allocate(self.env.chain_id)?;
        let key = LoanKey::new(self.env.chain_id, id);
        let loan = Loan {
            id,
            origin_chain: self.env.chain_id,
            borrower: terms.borrower,
            lender: Pubkey::default(),
            amount: terms.principal,
            duration: terms.duration,
            interest_rate: terms.interest_rate,
            start_time: 0,
            collateral_mint: terms.collateral_mint,
            collateral_amount: terms.collateral_amount,
            is_active: true,
            counterparty_chain: source_chain,
            counterparty_address: sender,
            request_nonce: terms.request_nonce,
            bump: 0,
        };
        ledger.put(key, &loan)?;

        emit!(LoanRequested {
            chain_id: self.env.chain_id,
            origin_chain: key.origin_chain,
            loan_id: id,
            borrower: loan.borrower,
            borrower_chain: source_chain,
            principal: loan.amount,
            duration: loan.duration,
            interest_rate: loan.interest_rate,
            timestamp: self.env.now,
        });
        Ok(key)
    }

    fn apply_funding<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        sender: [u8; 32],
        payload: FundLoanPayload,
    ) -> Result<LoanKey> {
        let key = LoanKey::new(source_chain, payload.loan_id);
        let mut loan = ledger.get(key)?;
        if loan.state() == LoanState::Absent {
            loan = self.mirror_request(ledger, source_chain, sender, &payload)?;
        }
        require!(
            loan.state() == LoanState::Requested,
            LendingError::InvalidLoanState
        );

        loan.lender = payload.lender;
        loan.start_time = self.env.now;
        self.custodian
            .release(loan.collateral_mint, loan.borrower, loan.amount)?;
        ledger.put(key, &loan)?;

        emit!(LoanFunded {
            chain_id: self.env.chain_id,
            origin_chain: key.origin_chain,
            loan_id: key.loan_id,
            lender: loan.lender,
            amount: loan.amount,
            start_time: loan.start_time,
            remote: true,
            timestamp: self.env.now,
        });
        Ok(key)
    }

    /// Builds the borrower-side copy of a loan from the request it answers and
    /// links that request so it cannot back a second loan.
    fn mirror_request<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        sender: [u8; 32],
        payload: &FundLoanPayload,
    ) -> Result<Loan> {
        let mut request = ledger
            .request(payload.request_nonce)?
            .ok_or(LendingError::UnknownRequest)?;
        require!(
            !request.is_linked() && request.destination_chain == source_chain,
            LendingError::UnknownRequest
        );
        request.loan_id = payload.loan_id;
        ledger.put_request(&request)?;

        Ok(Loan {
            id: payload.loan_id,
            origin_chain: source_chain,
            borrower: request.borrower,
            lender: Pubkey::default(),
            amount: request.principal,
            duration: request.duration,
            interest_rate: request.interest_rate,
            start_time: 0,
            collateral_mint: request.collateral_mint,
            collateral_amount: request.collateral_amount,
            is_active: true,
            counterparty_chain: source_chain,
            counterparty_address: sender,
            request_nonce: request.nonce,
            bump: 0,
        })
    }

    fn apply_repayment<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        payload: RepayLoanPayload,
    ) -> Result<LoanKey> {
        // Repayments travel toward the origin chain, so the key is local.
        let key = LoanKey::new(self.env.chain_id, payload.loan_id);
        let mut loan = ledger.get(key)?;
        require!(
            loan.state() == LoanState::Funded,
            LendingError::InvalidLoanState
        );
        require!(
            loan.counterparty_chain == source_chain,
            LendingError::UnauthorizedCaller
        );

        loan.is_active = false;
        self.custodian
            .release(loan.collateral_mint, loan.lender, payload.repayment)?;
        self.custodian
            .release(loan.collateral_mint, loan.borrower, loan.collateral_amount)?;
        ledger.put(key, &loan)?;

        emit!(LoanRepaid {
            chain_id: self.env.chain_id,
            origin_chain: key.origin_chain,
            loan_id: key.loan_id,
            borrower: loan.borrower,
            repayment: payload.repayment,
            remote: true,
            timestamp: self.env.now,
        });
        Ok(key)
    }

    fn apply_claim<L: LoanLedger>(
        &mut self,
        ledger: &mut L,
        source_chain: u64,
        payload: ClaimCollateralPayload,
    ) -> Result<LoanKey> {
        let key = LoanKey::new(source_chain, payload.loan_id);
        let mut loan = ledger.get(key)?;
        require!(
            loan.state() == LoanState::Funded,
            LendingError::InvalidLoanState
        );

        loan.is_active = false;
        self.custodian
            .release(loan.collateral_mint, loan.lender, loan.collateral_amount)?;
        ledger.put(key, &loan)?;

        emit!(CollateralClaimed {
            chain_id: self.env.chain_id,
            origin_chain: key.origin_chain,
            loan_id: key.loan_id,
            lender: loan.lender,
            collateral_amount: loan.collateral_amount,
            remote: true,
            timestamp: self.env.now,
        });
        Ok(key)
    }

    /// Pull the relay fee from `payer`, then hand the message to the gateway.
    fn send(&mut self, payer: Pubkey, destination: Route, message: &LendingMessage) -> Result<()> {
        let payload = message.encode()?;
        let fee = self.env.fee;
        self.custodian.escrow(fee.asset, payer, fee.amount)?;
        self.gateway.dispatch(destination, payload, fee)
    }

    fn check_route(&self, route: &Route) -> Result<()> {
        require!(
            route.chain_id != self.env.chain_id && route.address != [0u8; 32],
            LendingError::InvalidDestination
        );
        Ok(())
    }

    /// Chain holding the borrower's side. A mirror copy already lives there,
    /// which `check_route` then rejects as local.
    fn borrower_chain(&self, loan: &Loan) -> Route {
        let chain_id = if loan.origin_chain == self.env.chain_id {
            loan.counterparty_chain
        } else {
            self.env.chain_id
        };
        Route {
            chain_id,
            address: loan.counterparty_address,
        }
    }

    /// The lender's chain is always the origin chain.
    fn lender_chain(&self, loan: &Loan) -> Route {
        Route {
            chain_id: loan.origin_chain,
            address: loan.counterparty_address,
        }
    }
}

/// Principal plus interest accrued since funding.
pub fn repayment_due(loan: &Loan, now: i64) -> Result<u64> {
    let elapsed = u64::try_from(now.saturating_sub(loan.start_time)).unwrap_or(0);
    let interest = interest::accrued(elapsed, loan.interest_rate);
    u64::try_from(loan.amount as u128 + interest).map_err(|_| error!(LendingError::MathOverflow))
}
