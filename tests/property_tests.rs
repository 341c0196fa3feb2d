//! Property-based tests for naming, patches and tree flattening.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use forgepipe::core::naming::{branch_name, create_ref, update_ref};
use forgepipe::core::types::Sha;
use forgepipe::engine::json_patch::{apply, PatchOperation};
use forgepipe::engine::{Pipeline, TreeOptions};
use forgepipe::forge::mock::MockForge;

/// Strategy for generating branch names, optionally already qualified.
fn ref_like() -> impl Strategy<Value = String> {
    let segment = "[a-z0-9][a-z0-9._-]{0,11}";
    (
        prop::sample::select(vec!["", "heads/", "refs/heads/"]),
        prop::collection::vec(segment, 1..4),
    )
        .prop_filter("bare names must not look qualified", |(prefix, segments)| {
            !(prefix.is_empty() && segments[0] == "refs")
        })
        .prop_map(|(prefix, segments)| format!("{}{}", prefix, segments.join("/")))
}

/// Strategy for generating hex object ids.
fn hex_id() -> impl Strategy<Value = String> {
    "[0-9a-fA-F]{40}"
}

/// Strategy for generating flat JSON objects.
fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..6).prop_map(|entries| {
        let map: Map<String, Value> = entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
        Value::Object(map)
    })
}

#[derive(Debug, Clone)]
enum Intent {
    Write,
    Delete,
    Rename,
}

fn intent() -> impl Strategy<Value = Intent> {
    prop_oneof![Just(Intent::Write), Just(Intent::Delete), Just(Intent::Rename)]
}

proptest! {
    #[test]
    fn create_ref_is_idempotent(name in ref_like()) {
        let once = create_ref(&name);
        prop_assert_eq!(create_ref(&once), once.clone());
        prop_assert!(once.starts_with("refs/heads/"));
    }

    #[test]
    fn update_ref_is_idempotent(name in ref_like()) {
        let once = update_ref(&name);
        prop_assert_eq!(update_ref(&once), once.clone());
        prop_assert!(once.starts_with("heads/"));
        prop_assert!(!once.starts_with("refs/"));
    }

    #[test]
    fn forms_agree_on_branch_name(name in ref_like()) {
        let bare = branch_name(&name).to_string();
        let created = create_ref(&name);
        let updated = update_ref(&name);
        prop_assert_eq!(branch_name(&created), bare.as_str());
        prop_assert_eq!(branch_name(&updated), bare.as_str());
        prop_assert_eq!(create_ref(&update_ref(&name)), create_ref(&name));
    }

    #[test]
    fn sha_ignores_case(id in hex_id()) {
        let mixed = Sha::new(id.clone()).unwrap();
        let lower = Sha::new(id.to_ascii_lowercase()).unwrap();
        prop_assert_eq!(mixed, lower);
    }

    #[test]
    fn failed_patch_leaves_document_untouched(doc in json_object(), key in "[a-z]{1,6}") {
        let original = doc.clone();
        let mut target = doc;
        let operations = vec![
            PatchOperation::Add { path: format!("/{}", key), value: json!("added") },
            PatchOperation::Test { path: format!("/{}", key), value: json!("not added") },
        ];

        prop_assert!(apply(&mut target, &operations).is_err());
        prop_assert_eq!(target, original);
    }

    #[test]
    fn add_then_remove_restores_missing_key(doc in json_object(), key in "[A-Z]{1,6}") {
        // Uppercase keys never collide with generated lowercase ones
        let original = doc.clone();
        let mut target = doc;
        let pointer = format!("/{}", key);
        let operations = vec![
            PatchOperation::Add { path: pointer.clone(), value: json!(1) },
            PatchOperation::Remove { path: pointer },
        ];

        prop_assert!(apply(&mut target, &operations).is_ok());
        prop_assert_eq!(target, original);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn at_most_two_entries_per_declared_path(
        declared in prop::collection::btree_map("[a-z]{1,8}", intent(), 1..8)
    ) {
        let forge = MockForge::new();
        let seeded: Vec<(String, String)> = declared
            .keys()
            .map(|name| (format!("{}.txt", name), format!("content of {}", name)))
            .collect();
        let files: Vec<(&str, &str)> = seeded
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect();
        forge.commit_files("main", &files, "seed");

        let mut options = TreeOptions::new();
        let mut targets = BTreeSet::new();
        for (name, intent) in &declared {
            let path = format!("{}.txt", name);
            options = match intent {
                Intent::Write => options.write_text(path, "new"),
                Intent::Delete => options.delete(path),
                Intent::Rename => {
                    let target = format!("moved/{}.txt", name);
                    targets.insert(target.clone());
                    options.rename(path, target)
                }
            };
        }

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let step = pipeline.create_tree(options);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let history = runtime.block_on(pipeline.run()).unwrap();
        let entries = &history.get(step).unwrap().entries;

        prop_assert!(entries.len() <= 2 * declared.len());
        for entry in entries {
            let declared_path = entry
                .path
                .strip_suffix(".txt")
                .map(|name| declared.contains_key(name))
                .unwrap_or(false);
            prop_assert!(declared_path || targets.contains(&entry.path));
        }
        for (name, intent) in &declared {
            let path = format!("{}.txt", name);
            let count = entries.iter().filter(|e| e.path == path).count();
            prop_assert_eq!(count, 1);
            if let Intent::Rename = intent {
                let moved = entries.iter().filter(|e| e.path == format!("moved/{}.txt", name)).count();
                prop_assert_eq!(moved, 1);
            }
        }
    }
}
