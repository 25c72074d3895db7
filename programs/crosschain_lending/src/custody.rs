//! Asset custody: moving token balances between holders and the program's
//! per-mint escrow vaults.

use anchor_lang::prelude::*;
use anchor_spl::token::{self, TokenAccount, Transfer};

use crate::errors::LendingError;
use crate::state::{CONFIG_SEED, ESCROW_SEED};

pub trait AssetCustodian {
    /// Pull `amount` of `asset` from `from` into escrow.
    fn escrow(&mut self, asset: Pubkey, from: Pubkey, amount: u64) -> Result<()>;
    /// Pay `amount` of `asset` out of escrow to `to`.
    fn release(&mut self, asset: Pubkey, to: Pubkey, amount: u64) -> Result<()>;
}

pub fn escrow_address(program_id: &Pubkey, mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[ESCROW_SEED, mint.as_ref()], program_id)
}

/// SPL-token custodian over the token accounts passed to an instruction.
///
/// Holder accounts are matched by owner and mint, vaults by PDA address.
/// Vaults are owned by the config PDA, which signs every release.
pub struct TokenCustody<'a, 'info> {
    program_id: &'a Pubkey,
    token_program: AccountInfo<'info>,
    config: AccountInfo<'info>,
    config_bump: u8,
    signer: Option<AccountInfo<'info>>,
    accounts: &'a [AccountInfo<'info>],
}

impl<'a, 'info> TokenCustody<'a, 'info> {
    pub fn new(
        program_id: &'a Pubkey,
        token_program: AccountInfo<'info>,
        config: AccountInfo<'info>,
        config_bump: u8,
        signer: Option<AccountInfo<'info>>,
        accounts: &'a [AccountInfo<'info>],
    ) -> Self {
        Self {
            program_id,
            token_program,
            config,
            config_bump,
            signer,
            accounts,
        }
    }

    fn vault(&self, asset: &Pubkey) -> Result<(AccountInfo<'info>, u64)> {
        let (address, _) = escrow_address(self.program_id, asset);
        let account = self
            .accounts
            .iter()
            .find(|account| *account.key == address)
            .ok_or(LendingError::MissingTokenAccount)?;
        let state = read_token_account(account)?.ok_or(LendingError::MissingTokenAccount)?;
        Ok((account.clone(), state.amount))
    }

    fn holder(&self, asset: &Pubkey, owner: &Pubkey) -> Result<(AccountInfo<'info>, u64)> {
        let (vault, _) = escrow_address(self.program_id, asset);
        for account in self.accounts.iter().filter(|account| *account.key != vault) {
            if let Some(state) = read_token_account(account)? {
                if state.mint == *asset && state.owner == *owner {
                    return Ok((account.clone(), state.amount));
                }
            }
        }
        err!(LendingError::MissingTokenAccount)
    }
}

fn read_token_account(account: &AccountInfo) -> Result<Option<TokenAccount>> {
    if *account.owner != token::ID || account.data_is_empty() {
        return Ok(None);
    }
    let data = account.try_borrow_data()?;
    let state = TokenAccount::try_deserialize(&mut &data[..]).ok();
    Ok(state)
}

impl<'a, 'info> AssetCustodian for TokenCustody<'a, 'info> {
    fn escrow(&mut self, asset: Pubkey, from: Pubkey, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let authority = self
            .signer
            .clone()
            .filter(|signer| signer.is_signer && *signer.key == from)
            .ok_or(LendingError::UnauthorizedCaller)?;
        let (source, balance) = self.holder(&asset, &from)?;
        let (vault, _) = self.vault(&asset)?;
        require!(balance >= amount, LendingError::AssetTransferFailure);

        let cpi_accounts = Transfer {
            from: source,
            to: vault,
            authority,
        };
        token::transfer(
            CpiContext::new(self.token_program.clone(), cpi_accounts),
            amount,
        )
    }

    fn release(&mut self, asset: Pubkey, to: Pubkey, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let (vault, balance) = self.vault(&asset)?;
        require!(balance >= amount, LendingError::AssetTransferFailure);
        let (destination, _) = self.holder(&asset, &to)?;

        let bump = [self.config_bump];
        let seeds: &[&[u8]] = &[CONFIG_SEED, &bump];
        let signer = &[seeds];
        let cpi_accounts = Transfer {
            from: vault,
            to: destination,
            authority: self.config.clone(),
        };
        token::transfer(
            CpiContext::new_with_signer(self.token_program.clone(), cpi_accounts, signer),
            amount,
        )
    }
}
