//! Program errors. The first block mirrors the protocol taxonomy; the rest
//! are program-level failures.

use anchor_lang::prelude::*;

#[error_code]
pub enum LendingError {
    #[msg("Destination chain is the local chain or destination address is null")]
    InvalidDestination,

    #[msg("Loan is not in a state that allows this transition")]
    InvalidLoanState,

    #[msg("Loan term has not elapsed")]
    LoanNotDefaulted,

    #[msg("Caller is not the borrower or lender required for this operation")]
    UnauthorizedCaller,

    #[msg("Inbound message tag unrecognized or payload malformed")]
    DecodeError,

    #[msg("Insufficient token balance for transfer")]
    AssetTransferFailure,

    #[msg("Outbound message could not be encoded")]
    EncodeError,

    #[msg("Arithmetic overflow")]
    MathOverflow,

    #[msg("Principal and collateral must be greater than zero")]
    ZeroAmount,

    #[msg("Unauthorized: admin required")]
    UnauthorizedAdmin,

    #[msg("Unauthorized: relayer required")]
    UnauthorizedRelayer,

    #[msg("No unlinked loan request matches this funding message")]
    UnknownRequest,

    #[msg("Account does not match the derived loan or request address")]
    LoanAccountMismatch,

    #[msg("Required token account was not supplied")]
    MissingTokenAccount,
}
