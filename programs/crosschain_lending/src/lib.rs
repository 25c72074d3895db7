//! # Cross-Chain Lending Program
//!
//! Collateralized loans between a borrower and a lender who may sit on
//! different chains. Each chain runs its own deployment and keeps its own copy
//! of every loan it touches; the copies are kept consistent only by relayed
//! messages. There is no shared ledger, no two-phase commit and no rollback of
//! a remote effect once a local action has succeeded.
//!
//! ## Lifecycle
//! - `request_loan` (borrower chain): escrow collateral, send `RequestLoan`.
//! - `receive_message` on the lender chain allocates the loan id.
//! - `fund_loan` (lender chain): escrow principal, send `FundLoan`; delivery
//!   pays the principal to the borrower.
//! - `repay_loan` (borrower chain) or `claim_collateral` (lender chain, after
//!   maturity) settles the loan; delivery releases repayment and collateral.
//!
//! ## Known protocol risks
//! - A message that is never delivered leaves the two copies diverged.
//! - Duplicate deliveries are rejected only where state preconditions catch
//!   them; a duplicate `RequestLoan` opens a second loan.
//! - The sender address of a delivery is not checked against loan fields.
//! - Funding and repayment move the collateral asset, not a separate
//!   principal asset.
//! - The borrower chain starts its copy of a funded loan when `FundLoan` is
//!   delivered, so repayment there accrues interest from delivery time and
//!   undercharges by the relay delay relative to the lender's copy.

pub mod custody;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod interest;
pub mod ledger;
pub mod machine;
pub mod message;
pub mod state;

#[cfg(test)]
mod testing;

use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use custody::{AssetCustodian, TokenCustody};
use errors::LendingError;
use events::RelayerFeesCollected;
use gateway::{EventGateway, MessageFee, Route};
use ledger::AccountLedger;
use machine::{Env, LendingMachine, RequestParams};
use state::{
    Config, Loan, LoanCounter, LoanRequest, CONFIG_SEED, COUNTER_SEED, ESCROW_SEED, LOAN_SEED,
    REQUEST_SEED,
};

declare_id!("Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS");

fn env_for(config: &Config, now: i64) -> Env {
    Env {
        chain_id: config.chain_id,
        now,
        fee: MessageFee {
            asset: config.fee_mint,
            amount: config.message_fee,
        },
    }
}

#[program]
pub mod crosschain_lending {
    use super::*;

    /// Initialize this deployment: chain identity, relayer authority, relay fee,
    /// and the loan-id counter for loans originated here.
    pub fn initialize_config(
        ctx: Context<InitializeConfig>,
        chain_id: u64,
        message_fee: u64,
    ) -> Result<()> {
        let config = &mut ctx.accounts.config;
        config.admin = ctx.accounts.admin.key();
        config.relayer = ctx.accounts.relayer.key();
        config.chain_id = chain_id;
        config.fee_mint = ctx.accounts.fee_mint.key();
        config.message_fee = message_fee;
        config.accrued_fees = 0;
        config.outbound_sequence = 0;
        config.next_request_nonce = 0;
        config.bump = ctx.bumps.config;

        let counter = &mut ctx.accounts.loan_counter;
        counter.origin_chain = chain_id;
        counter.next_loan_id = LoanCounter::FIRST_LOAN_ID;
        counter.bump = ctx.bumps.loan_counter;

        msg!("lending config initialized for chain {}", chain_id);
        Ok(())
    }

    /// Create the escrow vault for one mint. Vaults are pooled across loans.
    pub fn initialize_escrow(_ctx: Context<InitializeEscrow>) -> Result<()> {
        Ok(())
    }

    /// Update the per-message relay fee. Admin-only.
    pub fn set_message_fee(ctx: Context<SetMessageFee>, message_fee: u64) -> Result<()> {
        ctx.accounts.config.message_fee = message_fee;
        Ok(())
    }

    /// Escrow collateral and send the loan terms to `destination_chain`.
    /// Remaining accounts: borrower collateral and fee token accounts, and the
    /// escrow vaults for both mints.
    pub fn request_loan<'info>(
        ctx: Context<'_, '_, '_, 'info, RequestLoan<'info>>,
        destination_chain: u64,
        destination_address: [u8; 32],
        principal: u64,
        duration: u64,
        interest_rate: u64,
        collateral_amount: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let borrower = accounts.borrower.key();
        let nonce = accounts.config.next_request_nonce;
        let env = env_for(&accounts.config, now);

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            Some(accounts.borrower.to_account_info()),
            ctx.remaining_accounts,
        );
        let mut gateway = EventGateway::new(&mut accounts.config, now);
        let record = LendingMachine::new(env, &mut custody, &mut gateway).request(
            borrower,
            nonce,
            Route {
                chain_id: destination_chain,
                address: destination_address,
            },
            RequestParams {
                principal,
                duration,
                interest_rate,
                collateral_mint: accounts.collateral_mint.key(),
                collateral_amount,
            },
        )?;

        accounts.config.next_request_nonce = nonce
            .checked_add(1)
            .ok_or(LendingError::MathOverflow)?;
        let loan_request = &mut accounts.loan_request;
        loan_request.set_inner(LoanRequest {
            bump: ctx.bumps.loan_request,
            ..record
        });

        msg!("loan request {} sent to chain {}", nonce, destination_chain);
        Ok(())
    }

    /// Fund a requested loan held on this (origin) chain. Remaining accounts:
    /// lender token accounts and escrow vaults for the loan and fee mints.
    pub fn fund_loan<'info>(
        ctx: Context<'_, '_, '_, 'info, LoanAction<'info>>,
        origin_chain: u64,
        loan_id: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let lender = accounts.caller.key();
        let env = env_for(&accounts.config, now);

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            Some(accounts.caller.to_account_info()),
            ctx.remaining_accounts,
        );
        let mut gateway = EventGateway::new(&mut accounts.config, now);
        LendingMachine::new(env, &mut custody, &mut gateway).fund(&mut accounts.loan, lender)?;

        msg!("loan {}:{} funded by {}", origin_chain, loan_id, lender);
        Ok(())
    }

    /// Repay a funded loan from the borrower's chain.
    pub fn repay_loan<'info>(
        ctx: Context<'_, '_, '_, 'info, LoanAction<'info>>,
        origin_chain: u64,
        loan_id: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let borrower = accounts.caller.key();
        let env = env_for(&accounts.config, now);

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            Some(accounts.caller.to_account_info()),
            ctx.remaining_accounts,
        );
        let mut gateway = EventGateway::new(&mut accounts.config, now);
        let repayment = LendingMachine::new(env, &mut custody, &mut gateway)
            .repay(&mut accounts.loan, borrower)?;

        msg!("loan {}:{} repaid with {}", origin_chain, loan_id, repayment);
        Ok(())
    }

    /// Claim collateral of a defaulted loan on its origin chain.
    pub fn claim_collateral<'info>(
        ctx: Context<'_, '_, '_, 'info, LoanAction<'info>>,
        origin_chain: u64,
        loan_id: u64,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let lender = accounts.caller.key();
        let env = env_for(&accounts.config, now);

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            Some(accounts.caller.to_account_info()),
            ctx.remaining_accounts,
        );
        let mut gateway = EventGateway::new(&mut accounts.config, now);
        LendingMachine::new(env, &mut custody, &mut gateway).claim(&mut accounts.loan, lender)?;

        msg!("loan {}:{} collateral claimed", origin_chain, loan_id);
        Ok(())
    }

    /// Apply a relayed message from `source_chain`. Only the configured relayer
    /// may deliver. The relayer derives `loan` (and `loan_request` for funding
    /// deliveries) from the payload; for requests it uses the counter's next id.
    /// Remaining accounts: escrow vault and recipient token accounts.
    pub fn receive_message<'info>(
        ctx: Context<'_, '_, '_, 'info, ReceiveMessage<'info>>,
        source_chain: u64,
        sender_address: [u8; 32],
        payload: Vec<u8>,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let env = env_for(&accounts.config, now);

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            None,
            ctx.remaining_accounts,
        );
        let mut ledger = AccountLedger::new(
            ctx.program_id,
            &mut accounts.loan_counter,
            accounts.loan.to_account_info(),
            accounts
                .loan_request
                .as_ref()
                .map(|request| request.to_account_info()),
            accounts.relayer.to_account_info(),
            accounts.system_program.to_account_info(),
        );
        let mut gateway = EventGateway::new(&mut accounts.config, now);
        let key = LendingMachine::new(env, &mut custody, &mut gateway).receive(
            &mut ledger,
            source_chain,
            sender_address,
            &payload,
        )?;

        msg!(
            "delivered from chain {} applied to loan {}:{}",
            source_chain,
            key.origin_chain,
            key.loan_id
        );
        Ok(())
    }

    /// Read a loan. Unknown keys return a zeroed loan (`LoanState::Absent`).
    pub fn get_loan(ctx: Context<GetLoan>, _origin_chain: u64, _loan_id: u64) -> Result<Loan> {
        ledger::read_loan(&ctx.accounts.loan.to_account_info(), ctx.program_id)
    }

    /// Pay all accrued relay fees to the relayer.
    pub fn collect_relayer_fees<'info>(
        ctx: Context<'_, '_, '_, 'info, CollectRelayerFees<'info>>,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let accounts = &mut *ctx.accounts;
        let amount = accounts.config.accrued_fees;
        let fee_mint = accounts.config.fee_mint;
        let relayer = accounts.relayer.key();

        let mut custody = TokenCustody::new(
            ctx.program_id,
            accounts.token_program.to_account_info(),
            accounts.config.to_account_info(),
            accounts.config.bump,
            None,
            ctx.remaining_accounts,
        );
        custody.release(fee_mint, relayer, amount)?;
        accounts.config.accrued_fees = 0;

        emit!(RelayerFeesCollected {
            relayer,
            fee_mint,
            amount,
            timestamp: now,
        });
        Ok(())
    }
}

// --- Account structs and validation ---

#[derive(Accounts)]
#[instruction(chain_id: u64)]
pub struct InitializeConfig<'info> {
    #[account(
        init,
        payer = admin,
        space = 8 + Config::LEN,
        seeds = [CONFIG_SEED],
        bump
    )]
    pub config: Account<'info, Config>,

    #[account(
        init,
        payer = admin,
        space = 8 + LoanCounter::LEN,
        seeds = [COUNTER_SEED, &chain_id.to_le_bytes()],
        bump
    )]
    pub loan_counter: Account<'info, LoanCounter>,

    #[account(mut)]
    pub admin: Signer<'info>,

    /// Gateway authority that delivers inbound messages.
    /// CHECK: only its key is recorded
    pub relayer: UncheckedAccount<'info>,

    pub fee_mint: Account<'info, Mint>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct InitializeEscrow<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    pub mint: Account<'info, Mint>,

    #[account(
        init,
        payer = payer,
        seeds = [ESCROW_SEED, mint.key().as_ref()],
        bump,
        token::mint = mint,
        token::authority = config
    )]
    pub escrow_vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct SetMessageFee<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ LendingError::UnauthorizedAdmin
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

#[derive(Accounts)]
pub struct RequestLoan<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    /// Seeded by the nonce this request will take.
    #[account(
        init,
        payer = borrower,
        space = 8 + LoanRequest::LEN,
        seeds = [REQUEST_SEED, &config.next_request_nonce.to_le_bytes()],
        bump
    )]
    pub loan_request: Account<'info, LoanRequest>,

    #[account(mut)]
    pub borrower: Signer<'info>,

    pub collateral_mint: Account<'info, Mint>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

/// Shared by fund, repay and claim: one loan, one signing caller.
#[derive(Accounts)]
#[instruction(origin_chain: u64, loan_id: u64)]
pub struct LoanAction<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    #[account(
        mut,
        seeds = [LOAN_SEED, &origin_chain.to_le_bytes(), &loan_id.to_le_bytes()],
        bump = loan.bump
    )]
    pub loan: Account<'info, Loan>,

    #[account(mut)]
    pub caller: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ReceiveMessage<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = relayer @ LendingError::UnauthorizedRelayer
    )]
    pub config: Account<'info, Config>,

    #[account(
        mut,
        seeds = [COUNTER_SEED, &config.chain_id.to_le_bytes()],
        bump = loan_counter.bump
    )]
    pub loan_counter: Account<'info, LoanCounter>,

    /// CHECK: checked against the PDA of the decoded loan key and created on
    /// first write by the ledger.
    #[account(mut)]
    pub loan: UncheckedAccount<'info>,

    /// CHECK: checked against the PDA of the request nonce in funding
    /// deliveries. Not needed for other messages.
    #[account(mut)]
    pub loan_request: Option<UncheckedAccount<'info>>,

    #[account(mut)]
    pub relayer: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(origin_chain: u64, loan_id: u64)]
pub struct GetLoan<'info> {
    /// CHECK: address pinned by seeds; may not exist yet.
    #[account(seeds = [LOAN_SEED, &origin_chain.to_le_bytes(), &loan_id.to_le_bytes()], bump)]
    pub loan: UncheckedAccount<'info>,
}

#[derive(Accounts)]
pub struct CollectRelayerFees<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = relayer @ LendingError::UnauthorizedRelayer
    )]
    pub config: Account<'info, Config>,

    pub relayer: Signer<'info>,

    pub token_program: Program<'info, Token>,
}
