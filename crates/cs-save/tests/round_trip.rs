//! Snapshot round trips through real files.
//!
//! Covers:
//! - Rendering and output preservation at every level
//! - Deferred linking when callers register after the load
//! - Compact vs pretty files
//! - Header-only reads

use std::sync::Arc;

use cs_core::{BoxError, Caller, CallerRegistry, Response};
use cs_save::{
    SNAPSHOT_TAG, SnapshotError, read_header, read_responses, write_responses,
    write_responses_compact,
};
use serde_json::{Value, json};

// ============================================================================
// Helpers
// ============================================================================

fn append_bang(value: &Value) -> Result<String, BoxError> {
    let text = value.as_str().ok_or("expected text")?;
    Ok(format!("{text}!"))
}

fn split_words(value: &Value) -> Result<Value, BoxError> {
    let text = value.as_str().ok_or("expected text")?;
    Ok(json!(text.split_whitespace().collect::<Vec<_>>()))
}

/// Build a chain of `depth` hops from `seed`, registering callers in `registry`.
async fn build_chain(registry: &mut CallerRegistry, seed: &str, depth: usize) -> Arc<Response> {
    let bang = registry.register(Caller::programmatic(append_bang)).unwrap();
    let mut current = bang.run(seed).await.unwrap();
    for _ in 1..depth {
        current = bang.run(&current).await.unwrap();
    }
    current
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_round_trip_preserves_every_level() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.json");

    let mut writer_registry = CallerRegistry::new();
    let original = build_chain(&mut writer_registry, "hello", 4).await;
    write_responses(&path, std::slice::from_ref(&original)).unwrap();

    // A fresh session that never registered the callers
    let mut registry = CallerRegistry::new();
    let restored = read_responses(&path, &mut registry).unwrap();
    assert_eq!(restored.len(), 1);
    let copy = &restored[0];

    assert_eq!(
        copy.expanded().collect::<Vec<_>>(),
        original.expanded().collect::<Vec<_>>()
    );
    for (a, b) in copy.chain().zip(original.chain()) {
        assert_eq!(a.output(), b.output());
        assert_eq!(a.level(), b.level());
        assert_eq!(a.generator(), b.generator());
    }
    assert_eq!(copy.root_input(), &json!("hello"));
    assert_eq!(copy.output(), &json!("hello!!!!"));
    assert!(copy.chain().all(|r| !r.is_resolved()));
}

#[tokio::test]
async fn test_late_registration_relinks_and_allows_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.json");

    let mut writer_registry = CallerRegistry::new();
    let original = build_chain(&mut writer_registry, "go", 3).await;
    write_responses(&path, &[original]).unwrap();

    let mut registry = CallerRegistry::new();
    let restored = read_responses(&path, &mut registry).unwrap();
    let copy = Arc::clone(&restored[0]);
    assert!(copy.rerun("again").await.is_err());

    let bang = registry.register(Caller::programmatic(append_bang)).unwrap();
    for node in copy.chain() {
        assert!(Arc::ptr_eq(&node.caller().unwrap(), &bang));
    }
    let rerun = copy.rerun("again").await.unwrap();
    assert_eq!(rerun.output(), &json!("again!"));
}

#[tokio::test]
async fn test_multiple_responses_and_compact_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many.json");

    let mut registry = CallerRegistry::new();
    let words = registry.register(Caller::programmatic(split_words)).unwrap();
    let a = words.run("quality price").await.unwrap();
    let b = words.run("design").await.unwrap();
    write_responses_compact(&path, &[a, b]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains('\n'));

    let restored = read_responses(&path, &mut registry).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0].output(), &json!(["quality", "price"]));
    assert!(Arc::ptr_eq(&restored[1].caller().unwrap(), &words));

    let header = read_header(&path).unwrap();
    assert_eq!(header.tag, SNAPSHOT_TAG);
    assert_eq!(header.count, 2);
    assert!(header.written_at().is_some());
}

#[test]
fn test_foreign_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.json");
    std::fs::write(&path, r#"{"_header": "other", "responses": []}"#).unwrap();

    assert!(matches!(
        read_responses(&path, &mut CallerRegistry::new()),
        Err(SnapshotError::InvalidFormat(_))
    ));
    assert!(matches!(read_header(&path), Err(SnapshotError::InvalidFormat(_))));
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        read_responses(&path, &mut CallerRegistry::new()),
        Err(SnapshotError::Serialization(_))
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_failure_surfaces_as_io_error() {
    let echo = Arc::new(Caller::identity());
    let response = Response::import("payload", &echo, "seed");
    assert!(matches!(
        write_responses("/dev/full", std::slice::from_ref(&response)),
        Err(SnapshotError::Io(_))
    ));
    assert!(matches!(
        write_responses_compact("/dev/full", &[response]),
        Err(SnapshotError::Io(_))
    ));
}

#[tokio::test]
async fn test_object_seed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("object_seed.json");

    let mut registry = CallerRegistry::new();
    let echo = registry.register(Caller::identity()).unwrap();
    let seed = json!({"input": "review text", "source": "web"});
    let first = echo.run(seed.clone()).await.unwrap();
    let second = echo.run(&first).await.unwrap();
    write_responses(&path, &[second]).unwrap();

    let restored = read_responses(&path, &mut registry).unwrap();
    let copy = &restored[0];
    assert_eq!(copy.level(), 2);
    assert_eq!(copy.root_input(), &seed);
    assert_eq!(copy.output(), &seed);
    assert!(copy.parent().unwrap().is_root());
}
