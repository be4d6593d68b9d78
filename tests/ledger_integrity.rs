//! Integration tests for sealing, tamper detection and durable storage

use farmtrace_ledger::blockchain::{HashedBlock, GENESIS_PREVIOUS_HASH};
use farmtrace_ledger::config::{Config, StorageBackend};
use farmtrace_ledger::persistence::{Database, InMemoryPersistence, JsonFileStore, Persistence};
use farmtrace_ledger::{EventKind, Ledger, LedgerError, LedgerEvent, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn batch_created(code: &str) -> LedgerEvent {
    LedgerEvent::BatchCreated {
        batch_id: format!("id-{}", code),
        batch_code: code.to_string(),
        crop: "Wheat".to_string(),
        quantity_kg: 500.0,
        base_price_per_kg: 24.75,
        origin_village: Some("Kotputli".to_string()),
        origin_state: Some("Rajasthan".to_string()),
        farmer_id: "u-1".to_string(),
        farmer_farmtrace_id: "FT-FAR-0001".to_string(),
        farmer_name: "Mohan Lal".to_string(),
    }
}

/// Store that rejects saves while `failing` is set.
struct FlakyStore {
    inner: InMemoryPersistence,
    failing: Arc<AtomicBool>,
}

impl Persistence for FlakyStore {
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
        "flaky".to_string()
    }
}

#[test]
fn test_fresh_ledger_seals_batch_after_genesis() -> Result<()> {
    let mut ledger = Ledger::in_memory(2)?;
    assert_eq!(ledger.len(), 1);

    let genesis = ledger.full_chain()[0].clone();
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
    assert_eq!(genesis.transactions[0].kind(), EventKind::Genesis);

    let tx = ledger.add_transaction(batch_created("BT-0001"))?;
    let block = ledger.mine_pending()?.expect("a block is sealed");

    assert_eq!(ledger.len(), 2);
    assert_eq!(block.index, 1);
    assert_eq!(block.previous_hash, genesis.hash);
    assert!(block.hash.starts_with("00"));
    assert_eq!(block.transactions, vec![tx]);
    assert!(ledger.pending().is_empty());
    assert!(ledger.is_valid());
    Ok(())
}

#[test]
fn test_flipped_hash_character_is_detected() -> Result<()> {
    let store = InMemoryPersistence::new();
    let mut ledger = Ledger::open(1, Box::new(store.clone()))?;
    ledger.add_transaction(batch_created("BT-0001"))?;
    ledger.mine_pending()?;

    let mut document: serde_json::Value =
        serde_json::from_str(&store.document().expect("document saved"))?;
    let hash = document["chain"][1]["hash"]
        .as_str()
        .expect("hash is a string")
        .to_string();
    let flipped = if hash.ends_with('a') { 'b' } else { 'a' };
    let tampered = format!("{}{}", &hash[..hash.len() - 1], flipped);
    document["chain"][1]["hash"] = serde_json::Value::from(tampered);
    store.replace_document(document.to_string());

    let reopened = Ledger::open(1, Box::new(store))?;
    assert!(!reopened.is_valid());
    assert!(!reopened.stats().is_valid);
    assert!(matches!(
        reopened.validate(),
        Err(LedgerError::IntegrityViolation { index: 1, .. })
    ));
    Ok(())
}

#[test]
fn test_tampered_payload_is_kept_but_reported() -> Result<()> {
    let store = InMemoryPersistence::new();
    let mut ledger = Ledger::open(1, Box::new(store.clone()))?;
    ledger.add_transaction(batch_created("BT-0001"))?;
    ledger.mine_pending()?;

    let mut document: serde_json::Value =
        serde_json::from_str(&store.document().expect("document saved"))?;
    document["chain"][1]["transactions"][0]["crop"] = serde_json::Value::from("Saffron");
    store.replace_document(document.to_string());

    let reopened = Ledger::open(1, Box::new(store))?;
    assert_eq!(reopened.len(), 2);
    assert!(!reopened.is_valid());

    // The altered record is still visible to auditors.
    let history = reopened.transactions_for_batch("BT-0001");
    assert_eq!(history.len(), 1);
    match &history[0].transaction.event {
        LedgerEvent::BatchCreated { crop, .. } => assert_eq!(crop, "Saffron"),
        other => panic!("unexpected event {:?}", other),
    }
    Ok(())
}

#[test]
fn test_unknown_batch_has_no_history() -> Result<()> {
    let mut ledger = Ledger::in_memory(1)?;
    ledger.add_transaction(batch_created("BT-0001"))?;
    ledger.mine_pending()?;
    assert!(ledger.transactions_for_batch("BT-9999").is_empty());
    Ok(())
}

#[test]
fn test_json_store_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nested").join("chain.json");

    let original = {
        let mut ledger = Ledger::open(1, Box::new(JsonFileStore::new(&path)))?;
        ledger.add_transaction(batch_created("BT-0001"))?;
        ledger.add_transaction(batch_created("BT-0002"))?;
        ledger.mine_pending()?;
        ledger.add_transaction(batch_created("BT-0001"))?;
        ledger.mine_pending()?;
        ledger.full_chain().to_vec()
    };

    let reopened = Ledger::open(1, Box::new(JsonFileStore::new(&path)))?;
    assert_eq!(reopened.full_chain(), original.as_slice());
    assert!(reopened.is_valid());
    assert_eq!(reopened.transactions_for_batch("BT-0001").len(), 2);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["totalBlocks"], 3);
    assert_eq!(raw["totalTransactions"], 4);
    assert!(raw["lastUpdated"].is_string());
    Ok(())
}

#[test]
fn test_sqlite_store_round_trip_via_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = Config::default();
    config.ledger.difficulty = 1;
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.path = temp_dir.path().join("ledger.db");

    let sealed_hash = {
        let mut ledger = Ledger::from_config(&config)?;
        ledger.add_transaction(batch_created("BT-0007"))?;
        ledger.mine_pending()?.expect("sealed").hash
    };

    let reopened = Ledger::open(1, Box::new(Database::open(&config.storage.path)?))?;
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.full_chain()[1].hash, sealed_hash);
    assert!(reopened.is_valid());
    Ok(())
}

#[test]
fn test_failed_save_rolls_back_and_keeps_pending() -> Result<()> {
    let failing = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: InMemoryPersistence::new(),
        failing: failing.clone(),
    };
    let mut ledger = Ledger::open(1, Box::new(store))?;

    failing.store(true, Ordering::SeqCst);
    let tx = ledger.add_transaction(batch_created("BT-0001"))?;
    let err = ledger.mine_pending().unwrap_err();
    assert!(matches!(err, LedgerError::PersistenceFailure(_)));
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.pending(), &[tx.clone()]);

    failing.store(false, Ordering::SeqCst);
    let block = ledger.mine_pending()?.expect("retry seals the block");
    assert_eq!(block.index, 1);
    assert_eq!(block.transactions, vec![tx]);
    assert!(ledger.pending().is_empty());
    assert!(ledger.is_valid());
    Ok(())
}

#[test]
fn test_corrupt_file_is_not_replaced() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("chain.json");
    std::fs::write(&path, "{\"chain\": [ this is not json")?;

    let result = Ledger::open(1, Box::new(JsonFileStore::new(&path)));
    assert!(matches!(result, Err(LedgerError::LoadCorruption(_))));

    // The damaged record is left for an operator to inspect.
    assert_eq!(
        std::fs::read_to_string(&path)?,
        "{\"chain\": [ this is not json"
    );
    Ok(())
}

#[test]
fn test_mining_with_nothing_pending_is_a_no_op() -> Result<()> {
    let mut ledger = Ledger::in_memory(1)?;
    assert!(ledger.mine_pending()?.is_none());
    assert_eq!(ledger.len(), 1);
    Ok(())
}

#[test]
fn test_non_finite_price_never_reaches_the_store() -> Result<()> {
    let store = InMemoryPersistence::new();
    let mut ledger = Ledger::open(1, Box::new(store.clone()))?;

    let result = ledger.add_transaction(LedgerEvent::RetailPriceSet {
        batch_code: "BT-0001".to_string(),
        batch_id: "id-BT-0001".to_string(),
        base_price_per_kg: f64::NAN,
        auction_price_per_kg: None,
        retail_price_per_kg: 31.0,
        retailer_id: "FT-RET-0001".to_string(),
        retailer_name: "Kiran Stores".to_string(),
    });
    assert!(matches!(result, Err(LedgerError::InvalidEvent(_))));
    assert!(ledger.pending().is_empty());

    ledger.add_transaction(batch_created("BT-0001"))?;
    ledger.mine_pending()?;

    let reopened = Ledger::open(1, Box::new(store))?;
    assert_eq!(reopened.len(), 2);
    assert!(reopened.is_valid());
    assert!(reopened.transactions_by_type(EventKind::RetailPriceSet).is_empty());
    Ok(())
}
