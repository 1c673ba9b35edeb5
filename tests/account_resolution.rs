//! Integration tests for account resolution across the three tiers.
//!
//! Tests cover:
//! - Stub synthesis for unknown addresses (with and without enrichment)
//! - Cache hits that never reach the store or the node
//! - Fail-closed known-address checks
//! - Store-before-cache ordering on writes
//! - Transaction paging

mod common;

use chain_state_repository::types::conversions::encode_cursor;
use chain_state_repository::types::{Account, AccountType};
use chain_state_repository::{AccountCache, RepositoryError, Tier};
use common::*;
use ethers::types::{Address, H256};
use std::sync::atomic::Ordering;

const UNKNOWN: &str = "0x1111111111111111111111111111111111111111";
const CONTRACT: &str = "0x2222222222222222222222222222222222222222";

#[tokio::test]
async fn test_unknown_address_resolves_to_wallet_stub() {
    let h = harness();
    let resolved = h.repository.account(&addr(UNKNOWN)).await.unwrap();

    assert_eq!(resolved.value, Account::stub(addr(UNKNOWN)));
    assert_eq!(resolved.value.account_type, AccountType::Wallet);
    assert!(!resolved.degraded);
    assert_eq!(h.store.enrichment_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.node.calls(), 0, "account resolution never asks the node");
}

#[tokio::test]
async fn test_failed_enrichment_still_returns_stub() {
    let h = harness();
    h.store.fail_enrichment.store(true, Ordering::SeqCst);

    let resolved = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(resolved.value.account_type, AccountType::Wallet);
    assert_eq!(resolved.value.contract_tx, None);
    assert!(resolved.degraded, "best-effort stub must be flagged");
}

#[tokio::test]
async fn test_degraded_stub_is_not_cached() {
    let h = harness();
    h.store.fail_enrichment.store(true, Ordering::SeqCst);
    let first = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert!(first.degraded);
    assert_eq!(h.cache.pushes.load(Ordering::SeqCst), 0);

    // the contract index recovers and knows the address
    h.store.fail_enrichment.store(false, Ordering::SeqCst);
    let tx = H256::repeat_byte(0x77);
    h.store.insert_contract(addr(CONTRACT), tx);

    let second = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert_eq!(second.source, Tier::Store);
    assert!(!second.degraded);
    assert!(second.value.is_contract());
    assert_eq!(second.value.contract_tx, Some(tx));
}

#[tokio::test]
async fn test_contract_evidence_classifies_stub() {
    let h = harness();
    let tx = H256::repeat_byte(0x99);
    h.store.insert_contract(addr(CONTRACT), tx);

    let resolved = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert!(resolved.value.is_contract());
    assert_eq!(resolved.value.contract_tx, Some(tx));
    assert!(!resolved.degraded);
}

#[tokio::test]
async fn test_second_lookup_served_from_cache() {
    let h = harness();
    let first = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(first.source, Tier::Store);
    let store_calls = h.store.calls();

    let second = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(second.source, Tier::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(h.store.calls(), store_calls, "cache hit must not touch the store");
    assert_eq!(h.node.calls(), 0);
}

#[tokio::test]
async fn test_stub_is_stable_across_eviction() {
    let h = harness();
    let first = h.repository.account(&addr(UNKNOWN)).await.unwrap();

    h.cache.evict(&addr(UNKNOWN));
    let second = h.repository.account(&addr(UNKNOWN)).await.unwrap();

    assert_eq!(second.source, Tier::Store);
    assert_eq!(first.value.address, second.value.address);
    assert_eq!(first.value.account_type, second.value.account_type);
}

#[tokio::test]
async fn test_stored_account_returned_as_is() {
    let h = harness();
    let mut stored = Account::stub(addr(UNKNOWN));
    stored.last_activity = Some(1_700_000_000);
    h.store
        .accounts
        .lock()
        .unwrap()
        .insert(stored.address, stored.clone());

    let resolved = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(resolved.value, stored);
    assert_eq!(
        h.store.enrichment_calls.load(Ordering::SeqCst),
        0,
        "stored records are not enriched"
    );
}

#[tokio::test]
async fn test_cache_failure_falls_through_to_store() {
    let h = harness();
    h.cache.fail.store(true, Ordering::SeqCst);

    let resolved = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(resolved.value.address, addr(UNKNOWN));
    assert_eq!(h.store.account_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hung_cache_is_treated_as_miss() {
    let h = harness();
    h.cache.hang.store(true, Ordering::SeqCst);

    let resolved = h.repository.account(&addr(UNKNOWN)).await.unwrap();
    assert_eq!(resolved.source, Tier::Store);
}

#[tokio::test]
async fn test_store_failure_on_primary_read_surfaces() {
    let h = harness();
    h.store.fail_reads.store(true, Ordering::SeqCst);

    let err = h.repository.account(&addr(UNKNOWN)).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::TierUnavailable {
            tier: Tier::Store,
            ..
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_empty_address_rejected_before_any_tier() {
    let h = harness();
    let err = h.repository.account(&Address::zero()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    assert_eq!(h.store.calls(), 0);
    assert_eq!(h.cache.pulls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_account_is_known_fails_closed() {
    let h = harness();
    h.store.fail_reads.store(true, Ordering::SeqCst);
    assert!(!h.repository.account_is_known(&addr(UNKNOWN)).await);
}

#[tokio::test]
async fn test_account_is_known_backfills_cache() {
    let h = harness();
    h.store
        .accounts
        .lock()
        .unwrap()
        .insert(addr(UNKNOWN), Account::stub(addr(UNKNOWN)));

    assert!(h.repository.account_is_known(&addr(UNKNOWN)).await);
    let store_calls = h.store.calls();

    // served by the cache flag even while the store is down
    h.store.fail_reads.store(true, Ordering::SeqCst);
    assert!(h.repository.account_is_known(&addr(UNKNOWN)).await);
    assert_eq!(h.store.calls(), store_calls);
}

#[tokio::test]
async fn test_failed_add_account_leaves_address_unknown() {
    let h = harness();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let err = h
        .repository
        .add_account(&Account::stub(addr(UNKNOWN)))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::TierUnavailable { .. }));
    assert_eq!(h.cache.pushes.load(Ordering::SeqCst), 0, "cache untouched");

    h.store.fail_writes.store(false, Ordering::SeqCst);
    assert!(!h.repository.account_is_known(&addr(UNKNOWN)).await);
}

#[tokio::test]
async fn test_add_account_marks_known() {
    let h = harness();
    h.repository
        .add_account(&Account::stub(addr(UNKNOWN)))
        .await
        .unwrap();

    assert!(
        h.cache.inner.is_known(&addr(UNKNOWN)),
        "known flag pushed after the store write"
    );
    assert!(h.repository.account_is_known(&addr(UNKNOWN)).await);
    assert_eq!(h.repository.accounts_active().await.unwrap(), 1);
}

#[tokio::test]
async fn test_contract_never_reverts_to_wallet() {
    let h = harness();
    let contract = Account::contract(addr(CONTRACT), H256::repeat_byte(0x42));
    h.repository.add_account(&contract).await.unwrap();
    let cached = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert!(cached.value.is_contract());

    // a later wallet view of the same address must not downgrade either tier
    h.repository
        .add_account(&Account::stub(addr(CONTRACT)))
        .await
        .unwrap();

    let resolved = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert_eq!(resolved.source, Tier::Cache);
    assert!(resolved.value.is_contract());

    h.cache.evict(&addr(CONTRACT));
    let resolved = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert_eq!(resolved.source, Tier::Store);
    assert!(resolved.value.is_contract());
}

#[tokio::test]
async fn test_add_account_caches_stored_view() {
    let h = harness();
    let contract = Account::contract(addr(CONTRACT), H256::repeat_byte(0x42));
    h.repository.add_account(&contract).await.unwrap();

    // nothing was cached before the write; the cache now holds what the store holds
    let cached = h.cache.inner.get_account(&addr(CONTRACT)).unwrap();
    assert!(cached.is_contract());

    // a wallet view written while the store already has the contract
    h.cache.evict(&addr(CONTRACT));
    h.repository
        .add_account(&Account::stub(addr(CONTRACT)))
        .await
        .unwrap();
    let cached = h.cache.inner.get_account(&addr(CONTRACT)).unwrap();
    assert!(cached.is_contract());
    assert_eq!(cached.contract_tx, Some(H256::repeat_byte(0x42)));
}

#[tokio::test]
async fn test_stale_write_back_cannot_demote_cached_contract() {
    let h = harness();
    let contract = Account::contract(addr(CONTRACT), H256::repeat_byte(0x42));
    h.repository.add_account(&contract).await.unwrap();

    // a reader that resolved the address before the write pushes its older copy
    h.cache
        .push_account(&Account::stub(addr(CONTRACT)))
        .await
        .unwrap();

    let resolved = h.repository.account(&addr(CONTRACT)).await.unwrap();
    assert_eq!(resolved.source, Tier::Cache);
    assert!(resolved.value.is_contract());
}

#[tokio::test]
async fn test_balance_and_nonce_come_from_node() {
    let h = harness();
    let account = Account::stub(addr(UNKNOWN));

    let balance = h.repository.account_balance(&account).await.unwrap();
    let nonce = h.repository.account_nonce(&account).await.unwrap();
    assert_eq!(balance, h.node.balance);
    assert_eq!(nonce, h.node.nonce);
    assert_eq!(h.node.calls(), 2);

    // live values are never cached
    h.repository.account_balance(&account).await.unwrap();
    assert_eq!(h.node.calls(), 3);
}

#[tokio::test]
async fn test_hung_node_hits_deadline() {
    let h = harness();
    h.node.hang.store(true, Ordering::SeqCst);

    let err = h
        .repository
        .account_balance(&Account::stub(addr(UNKNOWN)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::DeadlineExceeded {
            tier: Tier::Node,
            op: "account_balance",
            ..
        }
    ));
}

#[tokio::test]
async fn test_mark_activity_moves_forward_only() {
    let h = harness();
    let account = Account::stub(addr(UNKNOWN));
    h.repository
        .account_mark_activity(&account, 2_000)
        .await
        .unwrap();
    h.repository
        .account_mark_activity(&account, 1_000)
        .await
        .unwrap();

    let stored = h.store.accounts.lock().unwrap().get(&addr(UNKNOWN)).cloned();
    assert_eq!(stored.unwrap().last_activity, Some(2_000));
}

#[tokio::test]
async fn test_transactions_page_newest_first() {
    let h = harness();
    let account = Account::stub(addr(UNKNOWN));
    for n in 1..=5u64 {
        h.store
            .insert_transaction(account.address, n as i64 * 100_000, H256::from_low_u64_be(n));
    }

    let page = h
        .repository
        .account_transactions(&account, None, 2)
        .await
        .unwrap();
    assert_eq!(
        page.hashes,
        vec![H256::from_low_u64_be(5), H256::from_low_u64_be(4)]
    );
    assert_eq!(page.total, 5);
    assert!(page.has_more);

    let next = h
        .repository
        .account_transactions(&account, page.cursor.as_deref(), 2)
        .await
        .unwrap();
    assert_eq!(
        next.hashes,
        vec![H256::from_low_u64_be(3), H256::from_low_u64_be(2)]
    );

    let oldest = h
        .repository
        .account_transactions(&account, None, -1)
        .await
        .unwrap();
    assert_eq!(oldest.hashes, vec![H256::from_low_u64_be(1)]);
}

#[tokio::test]
async fn test_transactions_page_size_is_clamped() {
    let h = harness();
    let account = Account::stub(addr(UNKNOWN));
    for n in 1..=30u64 {
        h.store
            .insert_transaction(account.address, n as i64, H256::from_low_u64_be(n));
    }

    let page = h
        .repository
        .account_transactions(&account, None, 1_000)
        .await
        .unwrap();
    assert_eq!(page.hashes.len(), 10);
    assert!(page.has_more);
}

#[tokio::test]
async fn test_transactions_reject_bad_arguments() {
    let h = harness();
    let account = Account::stub(addr(UNKNOWN));

    let err = h
        .repository
        .account_transactions(&account, None, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArgument(_)));

    let err = h
        .repository
        .account_transactions(&account, Some("not-a-cursor"), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArgument(_)));

    // a well-formed cursor past the end is just an empty page
    let page = h
        .repository
        .account_transactions(&account, Some(&encode_cursor(1)), 5)
        .await
        .unwrap();
    assert!(page.hashes.is_empty());
    assert_eq!(h.store.calls(), 1);
}
