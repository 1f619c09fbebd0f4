//! Reload behavior of DevAccountService against a shared store

use std::sync::Arc;

use sarafu_api::config::DevConfig;
use sarafu_api::dev::{AddressHasher, DevAccountService, DevAccountServiceBuilder, LoadPolicy};
use sarafu_api::{AccountService, Error, KeyValueStore, MemoryStore};

/// Memory store that can refuse reads or writes to selected keys
#[derive(Debug, Default)]
struct FailingStore {
    inner: MemoryStore,
    unreadable: bool,
    reject_keys_containing: Option<&'static str>,
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        if let Some(fragment) = self.reject_keys_containing {
            if String::from_utf8_lossy(key).contains(fragment) {
                return Err(Error::store("disk full"));
            }
        }
        self.inner.put(key, value)
    }

    fn dump(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        if self.unreadable {
            return Err(Error::store("down"));
        }
        self.inner.dump(prefix)
    }
}

fn builder(store: &Arc<MemoryStore>) -> DevAccountServiceBuilder {
    let store: Arc<dyn KeyValueStore> = store.clone();
    DevAccountService::builder().with_store(store)
}

#[tokio::test]
async fn test_state_survives_reload() {
    let store = Arc::new(MemoryStore::new());
    let svc = builder(&store)
        .with_auto_voucher("SRF", 500)
        .build()
        .unwrap();

    let alice = svc.create_account().await.unwrap();
    let bob = svc.create_account().await.unwrap();
    let srf = svc.fetch_vouchers(&bob.public_key).await.unwrap()[0]
        .contract_address
        .clone();
    svc.token_transfer("75", &bob.public_key, &alice.public_key, &srf)
        .await
        .unwrap();
    svc.request_alias(&alice.public_key, "alice").await.unwrap();
    svc.request_alias(&bob.public_key, "alice").await.unwrap();
    svc.request_alias(&bob.public_key, "+254712345678")
        .await
        .unwrap();
    let pool = svc.register_pool("Market Pool", "MKT").unwrap();
    let before = svc.fetch_transactions(&bob.public_key).await.unwrap();
    drop(svc);

    // auto vouchers already in the store are tolerated
    let svc = builder(&store)
        .with_auto_voucher("SRF", 500)
        .build()
        .unwrap();

    assert_eq!(svc.check_balance(&alice.public_key).await.unwrap().balance, "75");
    let bob_balance = svc.check_balance(&bob.public_key).await.unwrap();
    assert_eq!(bob_balance.balance, "425");
    assert_eq!(bob_balance.nonce.as_u64(), Some(1));

    assert_eq!(
        svc.check_alias_address("alice.sarafu.local")
            .await
            .unwrap()
            .address,
        alice.public_key
    );
    assert_eq!(
        svc.check_alias_address("alicex.sarafu.local")
            .await
            .unwrap()
            .address,
        bob.public_key
    );
    assert_eq!(
        svc.check_alias_address("+254712345678")
            .await
            .unwrap()
            .address,
        bob.public_key
    );

    let after = svc.fetch_transactions(&bob.public_key).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(svc.account(&alice.public_key).unwrap().txs.len(), 3);
    assert_eq!(
        svc.account_by_tracking_id(&bob.tracking_id).unwrap().address,
        bob.public_key
    );

    assert_eq!(svc.voucher_data(&srf).await.unwrap().token_symbol, "SRF");
    let top = svc.fetch_top_pools().await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].pool_contract_address, pool.address);
    assert!(matches!(
        svc.register_pool("Market Pool", "MKT"),
        Err(Error::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_records_use_prefixed_keys() {
    let store = Arc::new(MemoryStore::new());
    let svc = builder(&store).with_prefix("dev:").build().unwrap();
    let acc = svc.create_account().await.unwrap();
    svc.request_alias(&acc.public_key, "bob").await.unwrap();

    let account_key = format!("dev:account_{}", acc.public_key);
    let raw = store.get(account_key.as_bytes()).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(value["address"], acc.public_key.as_str());
    assert_eq!(value["alias"], "bob.sarafu.local");

    let raw = store.get(b"dev:alias_bob.sarafu.local").unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(value, serde_json::json!(acc.public_key));

    // a different prefix sees none of it
    let other = builder(&store).build().unwrap();
    assert!(other
        .track_account_status(&acc.public_key)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_malformed_record_load_policy() {
    let store = Arc::new(MemoryStore::new());
    {
        let svc = builder(&store).build().unwrap();
        svc.create_account().await.unwrap();
    }
    store.put(b"__tx_0xbroken", b"not json").unwrap();

    let err = builder(&store).build().unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { ref key, .. } if key == "__tx_0xbroken"));

    let svc = builder(&store)
        .with_load_policy(LoadPolicy::Skip)
        .build()
        .unwrap();
    assert!(svc.transaction("0xbroken").is_none());
}

#[tokio::test]
async fn test_builder_from_config() {
    let store = Arc::new(MemoryStore::new());
    store.put(b"emu_account_0x01", b"{").unwrap();
    let config = DevConfig {
        store_prefix: b"emu_".to_vec(),
        auto_create: true,
        auto_vouchers: vec![("CTY".to_string(), 20)],
        skip_malformed: true,
    };

    let store_dyn: Arc<dyn KeyValueStore> = store.clone();
    let svc = DevAccountServiceBuilder::from_config(&config)
        .with_store(store_dyn)
        .build()
        .unwrap();
    let acc = svc.create_account().await.unwrap();
    assert_eq!(svc.check_balance(&acc.public_key).await.unwrap().balance, "20");
    assert!(store
        .get(format!("emu_account_{}", acc.public_key).as_bytes())
        .unwrap()
        .is_some());
}

#[derive(Debug)]
struct PlainHasher;

impl AddressHasher for PlainHasher {
    fn address_for(&self, symbol: &str) -> String {
        format!("0x{}", symbol.to_lowercase())
    }
}

#[tokio::test]
async fn test_custom_address_hasher() {
    let svc = DevAccountService::builder()
        .with_hasher(Arc::new(PlainHasher))
        .build()
        .unwrap();
    let voucher = svc.add_voucher("SRF").unwrap();
    assert_eq!(voucher.address, "0xsrf");
    let pool = svc.register_pool("Pool", "PL").unwrap();
    assert_eq!(pool.address, "0xpl");
}

#[test]
fn test_build_fails_when_store_unreadable() {
    let store: Arc<dyn KeyValueStore> = Arc::new(FailingStore {
        unreadable: true,
        ..FailingStore::default()
    });
    let err = DevAccountService::builder()
        .with_store(store)
        .with_load_policy(LoadPolicy::Skip)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Store(ref msg) if msg == "down"));
}

#[tokio::test]
async fn test_failed_write_reaches_caller() {
    let store: Arc<dyn KeyValueStore> = Arc::new(FailingStore {
        reject_keys_containing: Some("alias_"),
        ..FailingStore::default()
    });
    let svc = DevAccountService::builder()
        .with_store(store)
        .build()
        .unwrap();
    let acc = svc.create_account().await.unwrap();

    let err = svc.request_alias(&acc.public_key, "carol").await.unwrap_err();
    assert!(matches!(err, Error::Store(ref msg) if msg == "disk full"));
    let err = svc
        .request_alias(&acc.public_key, "+254712345678")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    assert!(svc.aliases().is_empty());
    assert!(svc
        .check_alias_address("carol.sarafu.local")
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(svc.account(&acc.public_key).unwrap().alias, None);
}

#[cfg(feature = "sled")]
#[tokio::test]
async fn test_state_survives_sled_reopen() {
    use sarafu_api::SledStore;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("dev.sled");

    let (alice, bob, srf) = {
        let store: Arc<dyn KeyValueStore> = Arc::new(SledStore::open(&path).unwrap());
        let svc = DevAccountService::builder()
            .with_store(store)
            .with_auto_voucher("SRF", 500)
            .build()
            .unwrap();
        let alice = svc.create_account().await.unwrap().public_key;
        let bob = svc.create_account().await.unwrap().public_key;
        let srf = svc.fetch_vouchers(&bob).await.unwrap()[0]
            .contract_address
            .clone();
        svc.token_transfer("120", &bob, &alice, &srf).await.unwrap();
        svc.request_alias(&alice, "alice").await.unwrap();
        (alice, bob, srf)
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(SledStore::open(&path).unwrap());
    let svc = DevAccountService::builder()
        .with_store(store)
        .with_auto_voucher("SRF", 500)
        .build()
        .unwrap();

    assert_eq!(svc.check_balance(&alice).await.unwrap().balance, "120");
    assert_eq!(svc.check_balance(&bob).await.unwrap().balance, "380");
    assert_eq!(svc.fetch_transactions(&bob).await.unwrap().len(), 2);
    assert_eq!(svc.voucher_data(&srf).await.unwrap().token_symbol, "SRF");
    assert_eq!(
        svc.check_alias_address("alice.sarafu.local")
            .await
            .unwrap()
            .address,
        alice
    );
}
