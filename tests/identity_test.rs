// SPDX-License-Identifier: MIT
// Unique-name allocation against a live agent table.

use std::sync::Arc;

use ai_mail::identity::{ensure_unique_name, is_valid_name, sanitize_name};
use ai_mail::storage::Storage;

const MID: &str = "machine-a";

async fn setup() -> (tempfile::TempDir, Arc<Storage>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    (dir, storage)
}

async fn register(storage: &Storage, name: &str, machine_id: &str) {
    storage
        .upsert_agent(name, machine_id, &serde_json::json!({ "pid": 1 }))
        .await
        .unwrap();
}

#[tokio::test]
async fn first_registration_keeps_the_base_name() {
    let (_dir, storage) = setup().await;
    let name = ensure_unique_name(&storage, "claude-desktop", MID).await.unwrap();
    assert_eq!(name, "claude-desktop");
}

#[tokio::test]
async fn collisions_allocate_increasing_suffixes() {
    let (_dir, storage) = setup().await;

    register(&storage, "claude-desktop", MID).await;
    let second = ensure_unique_name(&storage, "claude-desktop", MID).await.unwrap();
    assert_eq!(second, "claude-desktop-2");

    register(&storage, &second, MID).await;
    let third = ensure_unique_name(&storage, "claude-desktop", MID).await.unwrap();
    assert_eq!(third, "claude-desktop-3");

    // Gaps are filled deterministically: freeing -2 makes it next again.
    sqlx::query("DELETE FROM agents WHERE name = 'claude-desktop-2'")
        .execute(&storage.pool())
        .await
        .unwrap();
    let next = ensure_unique_name(&storage, "claude-desktop", MID).await.unwrap();
    assert_eq!(next, "claude-desktop-2");
}

#[tokio::test]
async fn uniqueness_is_scoped_to_the_machine_id() {
    let (_dir, storage) = setup().await;

    register(&storage, "claude-desktop", MID).await;
    // A different host's table entry does not collide.
    let name = ensure_unique_name(&storage, "claude-desktop", "machine-b")
        .await
        .unwrap();
    assert_eq!(name, "claude-desktop");
}

#[tokio::test]
async fn allocated_names_satisfy_the_grammar() {
    let (_dir, storage) = setup().await;

    let base = sanitize_name("Claude Desktop").unwrap();
    register(&storage, &base, MID).await;
    let name = ensure_unique_name(&storage, &base, MID).await.unwrap();
    assert_eq!(name, "claude-desktop-2");
    assert!(is_valid_name(&name));
}

#[tokio::test]
async fn recipient_lookup_spans_machines() {
    let (_dir, storage) = setup().await;

    register(&storage, "worker", "machine-b").await;
    // Single-host scope: name lookup alone decides recipient existence.
    assert!(storage.find_agent_by_name("worker").await.unwrap().is_some());
    assert!(storage.find_agent("worker", MID).await.unwrap().is_none());
}
