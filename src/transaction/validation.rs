/// Intake checks for event payloads, separated from the type definitions
use crate::error::{LedgerError, Result};
use crate::transaction::types::LedgerEvent;

/// Upper bound on one serialized event payload.
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

impl LedgerEvent {
    /// Stateless validation run before an event enters the pending buffer.
    ///
    /// Nothing here consults the chain: ownership, batch existence and
    /// transfer state belong to the caller's domain model.
    pub fn validate(&self) -> Result<()> {
        if let LedgerEvent::Genesis { .. } = self {
            return Err(LedgerError::InvalidEvent(
                "GENESIS is written by the ledger itself".to_string(),
            ));
        }

        if let Some(code) = self.batch_code() {
            if code.trim().is_empty() {
                return Err(LedgerError::InvalidEvent(format!(
                    "{} requires a batch code",
                    self.kind()
                )));
            }
        }

        match self {
            LedgerEvent::UserRegistered {
                user_id,
                farmtrace_id,
                ..
            } => {
                require("userId", user_id)?;
                require("farmtraceId", farmtrace_id)?;
            }
            LedgerEvent::BatchCreated {
                quantity_kg,
                base_price_per_kg,
                farmer_id,
                ..
            } => {
                require("farmerId", farmer_id)?;
                non_negative("quantityKg", *quantity_kg)?;
                non_negative("basePricePerKg", *base_price_per_kg)?;
            }
            LedgerEvent::TransferInitiated {
                transfer_id,
                otp_hash,
                ..
            } => {
                require("transferId", transfer_id)?;
                if otp_hash.len() != 64 || !otp_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(LedgerError::InvalidEvent(
                        "otpHash must be a 64 character hex digest".to_string(),
                    ));
                }
            }
            LedgerEvent::TransferAccepted { transfer_id, .. }
            | LedgerEvent::PickupConfirmed { transfer_id, .. }
            | LedgerEvent::DropoffConfirmed { transfer_id, .. } => {
                require("transferId", transfer_id)?;
            }
            LedgerEvent::AuctionPriceSet {
                base_price_per_kg,
                auction_price_per_kg,
                price_difference,
                ..
            } => {
                non_negative("basePricePerKg", *base_price_per_kg)?;
                non_negative("auctionPricePerKg", *auction_price_per_kg)?;
                if !price_difference.is_finite() {
                    return Err(LedgerError::InvalidEvent(
                        "priceDifference must be finite".to_string(),
                    ));
                }
            }
            LedgerEvent::RetailPriceSet {
                base_price_per_kg,
                auction_price_per_kg,
                retail_price_per_kg,
                ..
            } => {
                non_negative("basePricePerKg", *base_price_per_kg)?;
                if let Some(auction) = auction_price_per_kg {
                    non_negative("auctionPricePerKg", *auction)?;
                }
                non_negative("retailPricePerKg", *retail_price_per_kg)?;
            }
            LedgerEvent::Genesis { .. } => {}
        }

        // Prevent oversized payloads from bloating every later save
        let serialized = serde_json::to_vec(self)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(LedgerError::InvalidEvent(format!(
                "{} payload is {} bytes, maximum is {}",
                self.kind(),
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }

        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidEvent(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::InvalidEvent(format!(
            "{} must be a finite, non-negative number (got {})",
            field, value
        )));
    }
    Ok(())
}
