//! Typed recording surface for the supply-chain workflows.
//!
//! Each `record_*` call builds one event from domain snapshots, appends it
//! and seals it into its own block before returning. Sealing runs the
//! proof-of-work search on the calling thread and then writes the whole
//! chain to the store, so these calls block. Async callers should go through
//! `tokio::task::spawn_blocking`.

use crate::blockchain::{AnnotatedTransaction, ChainStats, HashedBlock, Ledger, Verification};
use crate::error::Result;
use crate::transaction::{EventKind, LedgerEvent, Transaction};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Handle shared by the recorder, the API and the CLI. One per process.
pub type SharedLedger = Arc<RwLock<Ledger>>;

pub fn share(ledger: Ledger) -> SharedLedger {
    Arc::new(RwLock::new(ledger))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub farmtrace_id: String,
    pub name: String,
    pub role: String,
    pub village: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub id: String,
    pub batch_code: String,
    pub crop: String,
    pub quantity_kg: f64,
    pub base_price_per_kg: f64,
    pub auction_price_per_kg: Option<f64>,
    pub origin_village: Option<String>,
    pub origin_state: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSnapshot {
    pub id: String,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    /// Plain handover code. Only its digest reaches the chain.
    pub otp: String,
    pub pickup_time: Option<DateTime<Utc>>,
    pub dropoff_time: Option<DateTime<Utc>>,
}

/// SHA-256 hex of a handover OTP.
pub fn hash_otp(otp: &str) -> String {
    hex::encode(Sha256::digest(otp.as_bytes()))
}

/// Change from `base` to `new` as a percentage with two decimals. A zero
/// base yields `"0.00"`.
pub fn percentage_change(base: f64, new: f64) -> String {
    if base == 0.0 {
        return "0.00".to_string();
    }
    format!("{:.2}", (new - base) / base * 100.0)
}

#[derive(Clone)]
pub struct Recorder {
    ledger: SharedLedger,
}

impl Recorder {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Validate, append and seal a single event.
    ///
    /// A call that returns `Err` leaves nothing of its event behind: if the
    /// seal or the save fails the transaction is taken back out of the
    /// pending buffer, so a later seal can never carry it.
    pub fn record(&self, event: LedgerEvent) -> Result<Transaction> {
        let mut ledger = self.ledger.write();
        let tx = ledger.add_transaction(event)?;
        if let Err(e) = ledger.mine_pending() {
            ledger.discard_pending(&tx.tx_id);
            tracing::warn!(tx_id = %tx.tx_id, kind = %tx.kind(), error = %e, "recorder.discarded");
            return Err(e);
        }
        tracing::debug!(tx_id = %tx.tx_id, kind = %tx.kind(), "recorder.recorded");
        Ok(tx)
    }

    pub fn record_user_registered(&self, user: &UserProfile) -> Result<Transaction> {
        self.record(LedgerEvent::UserRegistered {
            user_id: user.id.clone(),
            farmtrace_id: user.farmtrace_id.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            village: user.village.clone(),
            state: user.state.clone(),
        })
    }

    pub fn record_batch_created(
        &self,
        batch: &BatchSnapshot,
        farmer: &UserProfile,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::BatchCreated {
            batch_id: batch.id.clone(),
            batch_code: batch.batch_code.clone(),
            crop: batch.crop.clone(),
            quantity_kg: batch.quantity_kg,
            base_price_per_kg: batch.base_price_per_kg,
            origin_village: batch.origin_village.clone(),
            origin_state: batch.origin_state.clone(),
            farmer_id: farmer.id.clone(),
            farmer_farmtrace_id: farmer.farmtrace_id.clone(),
            farmer_name: farmer.name.clone(),
        })
    }

    pub fn record_transfer_initiated(
        &self,
        transfer: &TransferSnapshot,
        batch: &BatchSnapshot,
        from: &UserProfile,
        to: &UserProfile,
        transporter: Option<&UserProfile>,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::TransferInitiated {
            transfer_id: transfer.id.clone(),
            batch_code: batch.batch_code.clone(),
            batch_id: batch.id.clone(),
            from_owner_id: from.farmtrace_id.clone(),
            from_owner_name: from.name.clone(),
            from_owner_role: from.role.clone(),
            to_owner_id: to.farmtrace_id.clone(),
            to_owner_name: to.name.clone(),
            to_owner_role: to.role.clone(),
            transporter_id: transporter.map(|t| t.farmtrace_id.clone()),
            transporter_name: transporter.map(|t| t.name.clone()),
            pickup_location: transfer.pickup_location.clone(),
            dropoff_location: transfer.dropoff_location.clone(),
            otp_hash: hash_otp(&transfer.otp),
        })
    }

    /// `batch.status` is recorded as the status the batch moved to.
    pub fn record_transfer_accepted(
        &self,
        transfer: &TransferSnapshot,
        batch: &BatchSnapshot,
        new_owner: &UserProfile,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::TransferAccepted {
            transfer_id: transfer.id.clone(),
            batch_code: batch.batch_code.clone(),
            new_owner_id: new_owner.farmtrace_id.clone(),
            new_owner_name: new_owner.name.clone(),
            new_owner_role: new_owner.role.clone(),
            new_status: batch.status.clone(),
        })
    }

    pub fn record_pickup_confirmed(
        &self,
        transfer: &TransferSnapshot,
        batch: &BatchSnapshot,
        transporter: &UserProfile,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::PickupConfirmed {
            transfer_id: transfer.id.clone(),
            batch_code: batch.batch_code.clone(),
            transporter_id: transporter.farmtrace_id.clone(),
            transporter_name: transporter.name.clone(),
            pickup_location: transfer.pickup_location.clone(),
            pickup_time: transfer.pickup_time,
        })
    }

    pub fn record_dropoff_confirmed(
        &self,
        transfer: &TransferSnapshot,
        batch: &BatchSnapshot,
        transporter: &UserProfile,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::DropoffConfirmed {
            transfer_id: transfer.id.clone(),
            batch_code: batch.batch_code.clone(),
            transporter_id: transporter.farmtrace_id.clone(),
            transporter_name: transporter.name.clone(),
            dropoff_location: transfer.dropoff_location.clone(),
            dropoff_time: transfer.dropoff_time,
        })
    }

    pub fn record_auction_price_set(
        &self,
        batch: &BatchSnapshot,
        agent: &UserProfile,
        auction_price_per_kg: f64,
    ) -> Result<Transaction> {
        let base = batch.base_price_per_kg;
        self.record(LedgerEvent::AuctionPriceSet {
            batch_code: batch.batch_code.clone(),
            batch_id: batch.id.clone(),
            crop: batch.crop.clone(),
            base_price_per_kg: base,
            auction_price_per_kg,
            price_difference: auction_price_per_kg - base,
            percentage_change: percentage_change(base, auction_price_per_kg),
            apmc_agent_id: agent.farmtrace_id.clone(),
            apmc_agent_name: agent.name.clone(),
        })
    }

    pub fn record_retail_price_set(
        &self,
        batch: &BatchSnapshot,
        retailer: &UserProfile,
        retail_price_per_kg: f64,
    ) -> Result<Transaction> {
        self.record(LedgerEvent::RetailPriceSet {
            batch_code: batch.batch_code.clone(),
            batch_id: batch.id.clone(),
            base_price_per_kg: batch.base_price_per_kg,
            auction_price_per_kg: batch.auction_price_per_kg,
            retail_price_per_kg,
            retailer_id: retailer.farmtrace_id.clone(),
            retailer_name: retailer.name.clone(),
        })
    }

    pub fn batch_history(&self, batch_code: &str) -> Vec<AnnotatedTransaction> {
        self.ledger.read().transactions_for_batch(batch_code)
    }

    pub fn transactions_by_type(&self, kind: EventKind) -> Vec<AnnotatedTransaction> {
        self.ledger.read().transactions_by_type(kind)
    }

    pub fn stats(&self) -> ChainStats {
        self.ledger.read().stats()
    }

    pub fn verify(&self) -> Verification {
        self.ledger.read().verify()
    }

    /// Owned copy of the sealed chain.
    pub fn full_chain(&self) -> Vec<HashedBlock> {
        self.ledger.read().full_chain().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::persistence::{InMemoryPersistence, Persistence};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn recorder() -> Recorder {
        Recorder::new(share(Ledger::in_memory(1).unwrap()))
    }

    fn user(id: &str, role: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            farmtrace_id: format!("FT-{}", id),
            name: format!("User {}", id),
            role: role.to_string(),
            village: Some("Bassi".to_string()),
            state: Some("Rajasthan".to_string()),
        }
    }

    fn batch() -> BatchSnapshot {
        BatchSnapshot {
            id: "b-1".to_string(),
            batch_code: "BT-0001".to_string(),
            crop: "Mustard".to_string(),
            quantity_kg: 1200.0,
            base_price_per_kg: 40.0,
            auction_price_per_kg: None,
            origin_village: Some("Bassi".to_string()),
            origin_state: Some("Rajasthan".to_string()),
            status: "CREATED".to_string(),
        }
    }

    fn transfer() -> TransferSnapshot {
        TransferSnapshot {
            id: "t-1".to_string(),
            pickup_location: Some("Bassi".to_string()),
            dropoff_location: Some("Muhana Mandi".to_string()),
            otp: "482913".to_string(),
            pickup_time: None,
            dropoff_time: None,
        }
    }

    #[test]
    fn test_percentage_change_formatting() {
        assert_eq!(percentage_change(40.0, 46.0), "15.00");
        assert_eq!(percentage_change(30.0, 20.0), "-33.33");
        assert_eq!(percentage_change(0.0, 12.0), "0.00");
    }

    #[test]
    fn test_each_record_seals_one_block() {
        let rec = recorder();
        let farmer = user("u-1", "FARMER");
        rec.record_user_registered(&farmer).unwrap();
        let tx = rec.record_batch_created(&batch(), &farmer).unwrap();

        let chain = rec.full_chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[2].transactions, vec![tx]);
        assert_eq!(rec.stats().pending_transactions, 0);
        assert!(rec.verify().is_valid);
    }

    #[test]
    fn test_transfer_records_otp_digest_only() {
        let rec = recorder();
        let tx = rec
            .record_transfer_initiated(
                &transfer(),
                &batch(),
                &user("u-1", "FARMER"),
                &user("u-2", "WHOLESALER"),
                Some(&user("u-3", "TRANSPORTER")),
            )
            .unwrap();

        match &tx.event {
            LedgerEvent::TransferInitiated {
                otp_hash,
                transporter_name,
                ..
            } => {
                assert_eq!(otp_hash, &hash_otp("482913"));
                assert_ne!(otp_hash, "482913");
                assert_eq!(transporter_name.as_deref(), Some("User u-3"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        let json = serde_json::to_string(&rec.full_chain()).unwrap();
        assert!(!json.contains("\"482913\""));
    }

    #[test]
    fn test_auction_price_derivations() {
        let rec = recorder();
        let tx = rec
            .record_auction_price_set(&batch(), &user("u-4", "APMC_AGENT"), 46.0)
            .unwrap();
        match tx.event {
            LedgerEvent::AuctionPriceSet {
                price_difference,
                percentage_change,
                ..
            } => {
                assert_eq!(price_difference, 6.0);
                assert_eq!(percentage_change, "15.00");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_batch_history_spans_lifecycle() {
        let rec = recorder();
        let farmer = user("u-1", "FARMER");
        let carrier = user("u-3", "TRANSPORTER");
        let mut b = batch();

        rec.record_batch_created(&b, &farmer).unwrap();
        rec.record_pickup_confirmed(&transfer(), &b, &carrier).unwrap();
        rec.record_dropoff_confirmed(&transfer(), &b, &carrier).unwrap();
        b.auction_price_per_kg = Some(46.0);
        rec.record_retail_price_set(&b, &user("u-5", "RETAILER"), 55.0)
            .unwrap();

        let kinds: Vec<EventKind> = rec
            .batch_history("BT-0001")
            .iter()
            .map(|a| a.transaction.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::BatchCreated,
                EventKind::PickupConfirmed,
                EventKind::DropoffConfirmed,
                EventKind::RetailPriceSet,
            ]
        );
        assert_eq!(rec.transactions_by_type(EventKind::RetailPriceSet).len(), 1);
    }

    #[test]
    fn test_invalid_event_never_reaches_pending() {
        let rec = recorder();
        let mut b = batch();
        b.quantity_kg = f64::NAN;
        let err = rec.record_batch_created(&b, &user("u-1", "FARMER"));
        assert!(matches!(err, Err(LedgerError::InvalidEvent(_))));
        assert_eq!(rec.stats().pending_transactions, 0);
        assert_eq!(rec.full_chain().len(), 1);
    }

    #[test]
    fn test_counterparties_recorded_by_farmtrace_id() {
        let rec = recorder();
        let farmer = user("u-1", "FARMER");
        let agent = user("u-2", "APMC_AGENT");
        let transporter = user("u-3", "TRANSPORTER");
        let retailer = user("u-4", "RETAILER");
        let mut b = batch();
        rec.record_batch_created(&b, &farmer).unwrap();

        let initiated = rec
            .record_transfer_initiated(&transfer(), &b, &farmer, &agent, Some(&transporter))
            .unwrap();
        match initiated.event {
            LedgerEvent::TransferInitiated {
                from_owner_id,
                to_owner_id,
                transporter_id,
                ..
            } => {
                assert_eq!(from_owner_id, "FT-u-1");
                assert_eq!(to_owner_id, "FT-u-2");
                assert_eq!(transporter_id.as_deref(), Some("FT-u-3"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        match rec.record_pickup_confirmed(&transfer(), &b, &transporter).unwrap().event {
            LedgerEvent::PickupConfirmed { transporter_id, .. } => {
                assert_eq!(transporter_id, "FT-u-3")
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rec.record_dropoff_confirmed(&transfer(), &b, &transporter).unwrap().event {
            LedgerEvent::DropoffConfirmed { transporter_id, .. } => {
                assert_eq!(transporter_id, "FT-u-3")
            }
            other => panic!("unexpected event {:?}", other),
        }

        b.status = "WITH_APMC".to_string();
        match rec.record_transfer_accepted(&transfer(), &b, &agent).unwrap().event {
            LedgerEvent::TransferAccepted { new_owner_id, .. } => assert_eq!(new_owner_id, "FT-u-2"),
            other => panic!("unexpected event {:?}", other),
        }
        match rec.record_auction_price_set(&b, &agent, 46.0).unwrap().event {
            LedgerEvent::AuctionPriceSet { apmc_agent_id, .. } => {
                assert_eq!(apmc_agent_id, "FT-u-2")
            }
            other => panic!("unexpected event {:?}", other),
        }
        b.auction_price_per_kg = Some(46.0);
        match rec.record_retail_price_set(&b, &retailer, 55.0).unwrap().event {
            LedgerEvent::RetailPriceSet { retailer_id, .. } => assert_eq!(retailer_id, "FT-u-4"),
            other => panic!("unexpected event {:?}", other),
        }

        // Internal row ids stay on the user, farmer and batch references.
        match &rec.batch_history("BT-0001")[0].transaction.event {
            LedgerEvent::BatchCreated {
                farmer_id,
                farmer_farmtrace_id,
                batch_id,
                ..
            } => {
                assert_eq!(farmer_id, "u-1");
                assert_eq!(farmer_farmtrace_id, "FT-u-1");
                assert_eq!(batch_id, "b-1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    /// In-memory store whose saves fail while `failing` is set.
    struct FailingStore {
        inner: InMemoryPersistence,
        failing: Arc<AtomicBool>,
    }

    impl Persistence for FailingStore {
        fn load_chain(&self) -> Result<Option<Vec<HashedBlock>>> {
            self.inner.load_chain()
        }

        fn save_chain(&self, chain: &[HashedBlock]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LedgerError::PersistenceFailure("disk full".to_string()));
            }
            self.inner.save_chain(chain)
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_failed_record_is_not_sealed_by_next_call() {
        let failing = Arc::new(AtomicBool::new(false));
        let store = FailingStore {
            inner: InMemoryPersistence::new(),
            failing: failing.clone(),
        };
        let rec = Recorder::new(share(Ledger::open(1, Box::new(store)).unwrap()));
        let farmer = user("u-1", "FARMER");

        failing.store(true, Ordering::SeqCst);
        let mut lost = batch();
        lost.batch_code = "BT-FAILED".to_string();
        let err = rec.record_batch_created(&lost, &farmer);
        assert!(matches!(err, Err(LedgerError::PersistenceFailure(_))));
        assert_eq!(rec.stats().pending_transactions, 0);
        assert_eq!(rec.full_chain().len(), 1);

        failing.store(false, Ordering::SeqCst);
        rec.record_batch_created(&batch(), &farmer).unwrap();
        assert!(rec.batch_history("BT-FAILED").is_empty());
        assert_eq!(rec.batch_history("BT-0001").len(), 1);
        assert_eq!(rec.full_chain()[1].transactions.len(), 1);
        assert!(rec.verify().is_valid);
    }
}
