//! Outbound side of the cross-chain transport.
//!
//! Dispatch is fire-and-forget: a message is sequenced and published as a
//! [`MessageDispatched`] event for relayers to pick up. Nothing waits for the
//! destination chain to apply it.

use anchor_lang::prelude::*;

use crate::errors::LendingError;
use crate::events::MessageDispatched;
use crate::state::{Config, DESTINATION_GAS_LIMIT};

/// Destination of an outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub chain_id: u64,
    /// Lending program address on the destination chain.
    pub address: [u8; 32],
}

/// Relay fee attached to an outbound message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageFee {
    pub asset: Pubkey,
    pub amount: u64,
}

pub trait CrossChainGateway {
    /// Hand `payload` to the transport. The fee has already been escrowed from
    /// the caller; dispatch authorizes the relayer to spend it.
    fn dispatch(&mut self, destination: Route, payload: Vec<u8>, fee: MessageFee) -> Result<()>;
}

pub struct EventGateway<'a> {
    config: &'a mut Config,
    now: i64,
}

impl<'a> EventGateway<'a> {
    pub fn new(config: &'a mut Config, now: i64) -> Self {
        Self { config, now }
    }
}

impl<'a> CrossChainGateway for EventGateway<'a> {
    fn dispatch(&mut self, destination: Route, payload: Vec<u8>, fee: MessageFee) -> Result<()> {
        let sequence = self.config.outbound_sequence;
        self.config.outbound_sequence = sequence.checked_add(1).ok_or(LendingError::MathOverflow)?;
        self.config.accrued_fees = self
            .config
            .accrued_fees
            .checked_add(fee.amount)
            .ok_or(LendingError::MathOverflow)?;

        msg!(
            "dispatch seq={} dst_chain={} bytes={}",
            sequence,
            destination.chain_id,
            payload.len()
        );
        emit!(MessageDispatched {
            sequence,
            source_chain: self.config.chain_id,
            destination_chain: destination.chain_id,
            destination_address: destination.address,
            payload,
            fee_mint: fee.asset,
            fee_amount: fee.amount,
            gas_limit: DESTINATION_GAS_LIMIT,
            timestamp: self.now,
        });
        Ok(())
    }
}
