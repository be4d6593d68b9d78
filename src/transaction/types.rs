/// Transaction types for the FarmTrace ledger
use super::canonical::{CanonicalEncode, CanonicalHasher};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current time at the precision the ledger records (milliseconds).
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// One recorded supply-chain event.
///
/// `tx_id` and `recorded_at` are assigned once at intake and never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(flatten)]
    pub event: LedgerEvent,
    pub tx_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    /// Wrap an event payload with a fresh random id and the intake timestamp.
    pub fn new(event: LedgerEvent) -> Self {
        Self {
            event,
            tx_id: hex::encode(rand::random::<[u8; 16]>()),
            recorded_at: now_utc(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn batch_code(&self) -> Option<&str> {
        self.event.batch_code()
    }
}

impl CanonicalEncode for Transaction {
    fn encode(&self, h: &mut CanonicalHasher) {
        h.str(&self.tx_id);
        h.timestamp(&self.recorded_at);
        self.event.encode(h);
    }
}

/// Event payloads. Serialized flat next to the transaction envelope with a
/// `type` tag and camelCase field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    Genesis {
        message: String,
        created_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserRegistered {
        user_id: String,
        farmtrace_id: String,
        name: String,
        role: String,
        village: Option<String>,
        state: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BatchCreated {
        batch_id: String,
        batch_code: String,
        crop: String,
        quantity_kg: f64,
        base_price_per_kg: f64,
        origin_village: Option<String>,
        origin_state: Option<String>,
        farmer_id: String,
        farmer_farmtrace_id: String,
        farmer_name: String,
    },
    #[serde(rename_all = "camelCase")]
    TransferInitiated {
        transfer_id: String,
        batch_code: String,
        batch_id: String,
        from_owner_id: String,
        from_owner_name: String,
        from_owner_role: String,
        to_owner_id: String,
        to_owner_name: String,
        to_owner_role: String,
        transporter_id: Option<String>,
        transporter_name: Option<String>,
        pickup_location: Option<String>,
        dropoff_location: Option<String>,
        /// SHA-256 hex of the handover OTP. The OTP itself is never recorded.
        otp_hash: String,
    },
    #[serde(rename_all = "camelCase")]
    TransferAccepted {
        transfer_id: String,
        batch_code: String,
        new_owner_id: String,
        new_owner_name: String,
        new_owner_role: String,
        new_status: String,
    },
    #[serde(rename_all = "camelCase")]
    PickupConfirmed {
        transfer_id: String,
        batch_code: String,
        transporter_id: String,
        transporter_name: String,
        pickup_location: Option<String>,
        pickup_time: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    DropoffConfirmed {
        transfer_id: String,
        batch_code: String,
        transporter_id: String,
        transporter_name: String,
        dropoff_location: Option<String>,
        dropoff_time: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    AuctionPriceSet {
        batch_code: String,
        batch_id: String,
        crop: String,
        base_price_per_kg: f64,
        auction_price_per_kg: f64,
        price_difference: f64,
        /// Two-decimal percentage, kept as text so it digests exactly as shown.
        percentage_change: String,
        apmc_agent_id: String,
        apmc_agent_name: String,
    },
    #[serde(rename_all = "camelCase")]
    RetailPriceSet {
        batch_code: String,
        batch_id: String,
        base_price_per_kg: f64,
        auction_price_per_kg: Option<f64>,
        retail_price_per_kg: f64,
        retailer_id: String,
        retailer_name: String,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Genesis { .. } => EventKind::Genesis,
            LedgerEvent::UserRegistered { .. } => EventKind::UserRegistered,
            LedgerEvent::BatchCreated { .. } => EventKind::BatchCreated,
            LedgerEvent::TransferInitiated { .. } => EventKind::TransferInitiated,
            LedgerEvent::TransferAccepted { .. } => EventKind::TransferAccepted,
            LedgerEvent::PickupConfirmed { .. } => EventKind::PickupConfirmed,
            LedgerEvent::DropoffConfirmed { .. } => EventKind::DropoffConfirmed,
            LedgerEvent::AuctionPriceSet { .. } => EventKind::AuctionPriceSet,
            LedgerEvent::RetailPriceSet { .. } => EventKind::RetailPriceSet,
        }
    }

    /// The batch this event refers to, if any.
    pub fn batch_code(&self) -> Option<&str> {
        match self {
            LedgerEvent::Genesis { .. } | LedgerEvent::UserRegistered { .. } => None,
            LedgerEvent::BatchCreated { batch_code, .. }
            | LedgerEvent::TransferInitiated { batch_code, .. }
            | LedgerEvent::TransferAccepted { batch_code, .. }
            | LedgerEvent::PickupConfirmed { batch_code, .. }
            | LedgerEvent::DropoffConfirmed { batch_code, .. }
            | LedgerEvent::AuctionPriceSet { batch_code, .. }
            | LedgerEvent::RetailPriceSet { batch_code, .. } => Some(batch_code),
        }
    }
}

impl CanonicalEncode for LedgerEvent {
    fn encode(&self, h: &mut CanonicalHasher) {
        h.str(self.kind().as_str());
        match self {
            LedgerEvent::Genesis {
                message,
                created_at,
            } => {
                h.str(message);
                h.timestamp(created_at);
            }
            LedgerEvent::UserRegistered {
                user_id,
                farmtrace_id,
                name,
                role,
                village,
                state,
            } => {
                h.str(user_id);
                h.str(farmtrace_id);
                h.str(name);
                h.str(role);
                h.opt_str(village.as_deref());
                h.opt_str(state.as_deref());
            }
            LedgerEvent::BatchCreated {
                batch_id,
                batch_code,
                crop,
                quantity_kg,
                base_price_per_kg,
                origin_village,
                origin_state,
                farmer_id,
                farmer_farmtrace_id,
                farmer_name,
            } => {
                h.str(batch_id);
                h.str(batch_code);
                h.str(crop);
                h.f64(*quantity_kg);
                h.f64(*base_price_per_kg);
                h.opt_str(origin_village.as_deref());
                h.opt_str(origin_state.as_deref());
                h.str(farmer_id);
                h.str(farmer_farmtrace_id);
                h.str(farmer_name);
            }
            LedgerEvent::TransferInitiated {
                transfer_id,
                batch_code,
                batch_id,
                from_owner_id,
                from_owner_name,
                from_owner_role,
                to_owner_id,
                to_owner_name,
                to_owner_role,
                transporter_id,
                transporter_name,
                pickup_location,
                dropoff_location,
                otp_hash,
            } => {
                h.str(transfer_id);
                h.str(batch_code);
                h.str(batch_id);
                h.str(from_owner_id);
                h.str(from_owner_name);
                h.str(from_owner_role);
                h.str(to_owner_id);
                h.str(to_owner_name);
                h.str(to_owner_role);
                h.opt_str(transporter_id.as_deref());
                h.opt_str(transporter_name.as_deref());
                h.opt_str(pickup_location.as_deref());
                h.opt_str(dropoff_location.as_deref());
                h.str(otp_hash);
            }
            LedgerEvent::TransferAccepted {
                transfer_id,
                batch_code,
                new_owner_id,
                new_owner_name,
                new_owner_role,
                new_status,
            } => {
                h.str(transfer_id);
                h.str(batch_code);
                h.str(new_owner_id);
                h.str(new_owner_name);
                h.str(new_owner_role);
                h.str(new_status);
            }
            LedgerEvent::PickupConfirmed {
                transfer_id,
                batch_code,
                transporter_id,
                transporter_name,
                pickup_location,
                pickup_time,
            } => {
                h.str(transfer_id);
                h.str(batch_code);
                h.str(transporter_id);
                h.str(transporter_name);
                h.opt_str(pickup_location.as_deref());
                h.opt_timestamp(pickup_time.as_ref());
            }
            LedgerEvent::DropoffConfirmed {
                transfer_id,
                batch_code,
                transporter_id,
                transporter_name,
                dropoff_location,
                dropoff_time,
            } => {
                h.str(transfer_id);
                h.str(batch_code);
                h.str(transporter_id);
                h.str(transporter_name);
                h.opt_str(dropoff_location.as_deref());
                h.opt_timestamp(dropoff_time.as_ref());
            }
            LedgerEvent::AuctionPriceSet {
                batch_code,
                batch_id,
                crop,
                base_price_per_kg,
                auction_price_per_kg,
                price_difference,
                percentage_change,
                apmc_agent_id,
                apmc_agent_name,
            } => {
                h.str(batch_code);
                h.str(batch_id);
                h.str(crop);
                h.f64(*base_price_per_kg);
                h.f64(*auction_price_per_kg);
                h.f64(*price_difference);
                h.str(percentage_change);
                h.str(apmc_agent_id);
                h.str(apmc_agent_name);
            }
            LedgerEvent::RetailPriceSet {
                batch_code,
                batch_id,
                base_price_per_kg,
                auction_price_per_kg,
                retail_price_per_kg,
                retailer_id,
                retailer_name,
            } => {
                h.str(batch_code);
                h.str(batch_id);
                h.f64(*base_price_per_kg);
                h.opt_f64(*auction_price_per_kg);
                h.f64(*retail_price_per_kg);
                h.str(retailer_id);
                h.str(retailer_name);
            }
        }
    }
}

/// The fixed vocabulary of event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Genesis,
    UserRegistered,
    BatchCreated,
    TransferInitiated,
    TransferAccepted,
    PickupConfirmed,
    DropoffConfirmed,
    AuctionPriceSet,
    RetailPriceSet,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Genesis,
        EventKind::UserRegistered,
        EventKind::BatchCreated,
        EventKind::TransferInitiated,
        EventKind::TransferAccepted,
        EventKind::PickupConfirmed,
        EventKind::DropoffConfirmed,
        EventKind::AuctionPriceSet,
        EventKind::RetailPriceSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Genesis => "GENESIS",
            EventKind::UserRegistered => "USER_REGISTERED",
            EventKind::BatchCreated => "BATCH_CREATED",
            EventKind::TransferInitiated => "TRANSFER_INITIATED",
            EventKind::TransferAccepted => "TRANSFER_ACCEPTED",
            EventKind::PickupConfirmed => "PICKUP_CONFIRMED",
            EventKind::DropoffConfirmed => "DROPOFF_CONFIRMED",
            EventKind::AuctionPriceSet => "AUCTION_PRICE_SET",
            EventKind::RetailPriceSet => "RETAIL_PRICE_SET",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}
