//! Wire format for lending messages exchanged between deployments.
//!
//! A message is one tag byte followed by the borsh encoding of the payload
//! fixed for that tag. The codec checks shape only; field semantics are
//! validated by the state machine.

use anchor_lang::prelude::*;

use crate::errors::LendingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    RequestLoan = 1,
    FundLoan = 2,
    RepayLoan = 3,
    ClaimCollateral = 4,
}

impl TryFrom<u8> for MessageTag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::RequestLoan),
            2 => Ok(Self::FundLoan),
            3 => Ok(Self::RepayLoan),
            4 => Ok(Self::ClaimCollateral),
            _ => err!(LendingError::DecodeError),
        }
    }
}

/// Terms sent from the borrower's chain to the chain that will own the loan.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoanTerms {
    pub borrower: Pubkey,
    pub principal: u64,
    pub duration: u64,
    pub interest_rate: u64,
    pub collateral_mint: Pubkey,
    pub collateral_amount: u64,
    /// Borrower-side request this loan answers; echoed back on funding.
    pub request_nonce: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct FundLoanPayload {
    pub loan_id: u64,
    pub lender: Pubkey,
    pub request_nonce: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RepayLoanPayload {
    pub loan_id: u64,
    pub repayment: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClaimCollateralPayload {
    pub loan_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LendingMessage {
    RequestLoan(LoanTerms),
    FundLoan(FundLoanPayload),
    RepayLoan(RepayLoanPayload),
    ClaimCollateral(ClaimCollateralPayload),
}

impl LendingMessage {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::RequestLoan(_) => MessageTag::RequestLoan,
            Self::FundLoan(_) => MessageTag::FundLoan,
            Self::RepayLoan(_) => MessageTag::RepayLoan,
            Self::ClaimCollateral(_) => MessageTag::ClaimCollateral,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.tag() as u8];
        let written = match self {
            Self::RequestLoan(payload) => payload.serialize(&mut out),
            Self::FundLoan(payload) => payload.serialize(&mut out),
            Self::RepayLoan(payload) => payload.serialize(&mut out),
            Self::ClaimCollateral(payload) => payload.serialize(&mut out),
        };
        written.map_err(|_| error!(LendingError::EncodeError))?;
        Ok(out)
    }

    /// Reads the tag first, then the payload shape that tag fixes. Unknown
    /// tags, short payloads and trailing bytes are all rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (tag, body) = bytes.split_first().ok_or(LendingError::DecodeError)?;
        let message = match MessageTag::try_from(*tag)? {
            MessageTag::RequestLoan => Self::RequestLoan(decode_payload(body)?),
            MessageTag::FundLoan => Self::FundLoan(decode_payload(body)?),
            MessageTag::RepayLoan => Self::RepayLoan(decode_payload(body)?),
            MessageTag::ClaimCollateral => Self::ClaimCollateral(decode_payload(body)?),
        };
        Ok(message)
    }
}

fn decode_payload<T: AnchorDeserialize>(body: &[u8]) -> Result<T> {
    T::try_from_slice(body).map_err(|_| error!(LendingError::DecodeError))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::error_name;

    fn terms() -> LoanTerms {
        LoanTerms {
            borrower: Pubkey::new_unique(),
            principal: 1_000,
            duration: 30 * 86_400,
            interest_rate: 365,
            collateral_mint: Pubkey::new_unique(),
            collateral_amount: 2_000,
            request_nonce: 7,
        }
    }

    #[test]
    fn tag_byte_leads_the_envelope() {
        let encoded = LendingMessage::ClaimCollateral(ClaimCollateralPayload { loan_id: 9 })
            .encode()
            .unwrap();
        assert_eq!(encoded[0], MessageTag::ClaimCollateral as u8);
        assert_eq!(&encoded[1..], &9u64.to_le_bytes());
    }

    #[test]
    fn request_survives_the_wire() {
        let message = LendingMessage::RequestLoan(terms());
        let decoded = LendingMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn repay_payload_layout_is_fixed() {
        let message = LendingMessage::RepayLoan(RepayLoanPayload {
            loan_id: 3,
            repayment: 1_030,
        });
        let encoded = message.encode().unwrap();
        assert_eq!(encoded.len(), 1 + 8 + 8);
        assert_eq!(LendingMessage::decode(&encoded).unwrap(), message);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut encoded = LendingMessage::ClaimCollateral(ClaimCollateralPayload { loan_id: 1 })
            .encode()
            .unwrap();
        encoded[0] = 0xff;
        let err = LendingMessage::decode(&encoded).unwrap_err();
        assert_eq!(error_name(err), "DecodeError");
    }

    #[test]
    fn empty_message_is_rejected() {
        let err = LendingMessage::decode(&[]).unwrap_err();
        assert_eq!(error_name(err), "DecodeError");
    }

    #[test]
    fn payload_shape_is_bound_to_tag() {
        // A claim payload under the funding tag is too short.
        let mut encoded = LendingMessage::ClaimCollateral(ClaimCollateralPayload { loan_id: 1 })
            .encode()
            .unwrap();
        encoded[0] = MessageTag::FundLoan as u8;
        let err = LendingMessage::decode(&encoded).unwrap_err();
        assert_eq!(error_name(err), "DecodeError");
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = LendingMessage::ClaimCollateral(ClaimCollateralPayload { loan_id: 1 })
            .encode()
            .unwrap();
        encoded.push(0);
        let err = LendingMessage::decode(&encoded).unwrap_err();
        assert_eq!(error_name(err), "DecodeError");
    }
}
