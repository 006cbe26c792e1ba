//! Storage contract tests against a live Redis.
//!
//! Ignored by default. Run with a disposable server:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1/15 cargo test --test redis_contract -- --ignored --test-threads=1
//! ```
//!
//! The tests delete the `cardkeys` and `admins` keys of the selected database.

use std::sync::Arc;

use cardkey_portal::models::card_key::NewCardKey;
use cardkey_portal::storage::{RedisStorage, Storage};

fn new_key(email: &str) -> NewCardKey {
    NewCardKey {
        tenant_url: "http://tenant".to_string(),
        access_token: format!("token-for-{email}"),
        email: email.to_string(),
        balance_url: None,
        expiry_date: "2025-01-01".to_string(),
        query_params: "q=1".to_string(),
    }
}

async fn setup() -> Arc<RedisStorage> {
    let url = std::env::var("REDIS_URL").expect("REDIS_URL must point at a disposable Redis");

    let client = redis::Client::open(url.as_str()).unwrap();
    let mut con = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("DEL")
        .arg("cardkeys")
        .arg("admins")
        .query_async::<()>(&mut con)
        .await
        .unwrap();

    Arc::new(RedisStorage::open(&url).unwrap())
}

#[tokio::test]
#[ignore = "needs REDIS_URL"]
async fn test_redis_card_key_lifecycle() {
    let storage = setup().await;
    storage.ping().await.unwrap();

    let tokens = storage
        .batch_add_card_keys(vec![new_key("a@x"), new_key("b@x"), new_key("c@x")])
        .await
        .unwrap();
    assert_eq!(tokens.len(), 3);
    for token in &tokens {
        assert!(storage.get_card_key_by_token(token).await.unwrap().is_some());
    }

    let token = &tokens[0];
    assert!(storage.mark_card_key_as_used(token).await.unwrap());
    let first = storage.get_card_key_by_token(token).await.unwrap().unwrap().used_at;
    assert!(!storage.mark_card_key_as_used(token).await.unwrap());
    let second = storage.get_card_key_by_token(token).await.unwrap().unwrap().used_at;
    assert_eq!(first, second);

    assert!(storage.restore_card_key(token).await.unwrap());
    assert!(!storage.restore_card_key(token).await.unwrap());

    let stats = storage.get_stats().await.unwrap();
    assert_eq!((stats.total, stats.used, stats.unused), (3, 0, 3));

    let id = storage.get_card_key_by_token(&tokens[1]).await.unwrap().unwrap().id;
    assert!(storage.delete_card_key(id).await.unwrap());
    assert!(storage.get_card_key_by_id(id).await.unwrap().is_none());
    assert_eq!(storage.get_all_card_keys().await.unwrap().len(), 2);

    storage.add_admin("admin", "h1").await.unwrap();
    assert!(storage.add_admin("admin", "h2").await.is_err());
    assert!(storage.update_admin_password("admin", "h3").await.unwrap());
    let admin = storage.get_admin_by_username("admin").await.unwrap().unwrap();
    assert_eq!(admin.password_hash, "h3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs REDIS_URL"]
async fn test_redis_concurrent_writes_are_not_lost() {
    let storage = setup().await;
    let news: Vec<NewCardKey> = (0..6).map(|i| new_key(&format!("u{i}@x"))).collect();
    let tokens = storage.batch_add_card_keys(news).await.unwrap();

    // Different keys race on the same Redis value; the WATCH retry keeps every update.
    let handles: Vec<_> = tokens
        .iter()
        .cloned()
        .map(|token| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.mark_card_key_as_used(&token).await.unwrap() })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(storage.get_stats().await.unwrap().used, 6);

    // Same key: exactly one redemption wins.
    let token = tokens[0].clone();
    storage.restore_card_key(&token).await.unwrap();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let storage = storage.clone();
            let token = token.clone();
            tokio::spawn(async move { storage.mark_card_key_as_used(&token).await.unwrap() })
        })
        .collect();
    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
