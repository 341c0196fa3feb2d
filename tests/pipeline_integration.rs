//! Integration tests for pipeline execution.
//!
//! These tests drive whole pipelines through the public API against
//! MockForge and check both the result history and the remote state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use forgepipe::core::types::FileMode;
use forgepipe::engine::{
    BranchAction, BranchOptions, CommitOptions, Deferred, PatchOperation, Pipeline, PipelineError,
    PrOptions, PrQuery, ResultHistory, StepOutput, TreeOptions,
};
use forgepipe::forge::mock::{FailOn, MockForge, MockOperation};
use forgepipe::forge::{Forge, ForgeError};
use serde_json::json;

/// Tree with hello.txt, commit of it, branch `feat` pointing at the commit.
fn hello_pipeline(forge: &MockForge) -> Pipeline {
    let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
    let tree = pipeline.create_tree(TreeOptions::new().write_text("hello.txt", "Hi"));
    let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
        Ok(CommitOptions::new("add hello", h.get(tree)?.sha.clone()).parent_ref("main"))
    }));
    pipeline.create_or_update_branch(Deferred::from_fn(move |h: &ResultHistory| {
        Ok(BranchOptions::new("feat", h.get(commit)?.sha.clone()))
    }));
    pipeline
}

fn ref_writes(forge: &MockForge) -> Vec<MockOperation> {
    forge
        .operations()
        .into_iter()
        .filter(|op| {
            matches!(
                op,
                MockOperation::CreateRef { .. } | MockOperation::UpdateRef { .. }
            )
        })
        .collect()
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn absent_branch_is_created() {
        let forge = MockForge::new();

        let history = hello_pipeline(&forge).run().await.unwrap();

        assert_eq!(history.len(), 3);
        assert!(matches!(history.at(0), Some(StepOutput::Tree(_))));
        assert!(matches!(history.at(1), Some(StepOutput::Commit(_))));
        match history.at(2) {
            Some(StepOutput::Branch(branch)) => {
                assert_eq!(branch.action, BranchAction::Created);
                assert_eq!(branch.ref_name, "refs/heads/feat");
                assert!(branch.rederived_from.is_none());
            }
            other => panic!("expected branch output, got {:?}", other),
        }

        assert_eq!(forge.file_at("feat", "hello.txt").unwrap(), b"Hi");
        assert!(matches!(
            ref_writes(&forge).as_slice(),
            [MockOperation::CreateRef { ref_name, .. }] if ref_name == "refs/heads/feat"
        ));
    }

    #[tokio::test]
    async fn existing_branch_is_updated_on_its_tip() {
        let forge = MockForge::new();
        let old_tip = forge.commit_files("feat", &[("feat.txt", "work")], "feature work");

        let history = hello_pipeline(&forge).run().await.unwrap();

        assert_eq!(history.len(), 3);
        let branch = match history.at(2) {
            Some(StepOutput::Branch(branch)) => branch.clone(),
            other => panic!("expected branch output, got {:?}", other),
        };
        assert_eq!(branch.action, BranchAction::Updated);
        assert!(matches!(
            ref_writes(&forge).as_slice(),
            [MockOperation::UpdateRef { ref_name, force: false, .. }] if ref_name == "heads/feat"
        ));

        let tip = forge.branch_tip("feat").unwrap();
        assert_eq!(tip, branch.sha);
        let commit = forge.commit(&tip).unwrap();
        assert_eq!(commit.parents, vec![old_tip]);
        assert_eq!(commit.message, "add hello");

        // Both the branch's own work and the rebuilt tree are present
        assert_eq!(forge.file_at("feat", "feat.txt").unwrap(), b"work");
        assert_eq!(forge.file_at("feat", "hello.txt").unwrap(), b"Hi");
    }

    #[tokio::test]
    async fn step_one_commit_keeps_its_own_parent() {
        let forge = MockForge::new();
        let main_tip = forge.branch_tip("main").unwrap();
        let old_tip = forge.commit_files("feat", &[("feat.txt", "work")], "feature work");

        let history = hello_pipeline(&forge).run().await.unwrap();

        let step_one = match history.at(1) {
            Some(StepOutput::Commit(commit)) => commit.clone(),
            other => panic!("expected commit output, got {:?}", other),
        };
        assert_eq!(step_one.parents, vec![main_tip]);

        let branch = match history.at(2) {
            Some(StepOutput::Branch(branch)) => branch.clone(),
            other => panic!("expected branch output, got {:?}", other),
        };
        assert_eq!(branch.rederived_from.as_ref(), Some(&step_one.sha));
        assert_ne!(branch.sha, step_one.sha);
        assert_eq!(forge.commit(&branch.sha).unwrap().parents, vec![old_tip]);
    }

    #[tokio::test]
    async fn edit_on_existing_branch_sees_branch_content() {
        let forge = MockForge::new();
        forge.commit_files("main", &[("a.txt", "main\n")], "seed");
        forge.commit_files("feat", &[("a.txt", "feat\n")], "feature work");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(
            TreeOptions::new().edit_text("a.txt", |text, _| Ok(format!("{}+\n", text))),
        );
        let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(CommitOptions::new("append", h.get(tree)?.sha.clone()).on_default_branch())
        }));
        let branch = pipeline.create_or_update_branch(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(BranchOptions::new("feat", h.get(commit)?.sha.clone()))
        }));

        let history = pipeline.run().await.unwrap();

        assert!(history.get(branch).unwrap().rederived_from.is_some());
        assert_eq!(forge.file_at("feat", "a.txt").unwrap(), b"feat\n+\n");
        assert_eq!(forge.file_at("main", "a.txt").unwrap(), b"main\n");
    }

    #[tokio::test]
    async fn json_patch_on_existing_branch_sees_branch_content() {
        let forge = MockForge::new();
        forge.commit_files("main", &[("package.json", "{\"version\": \"1.0.0\"}")], "seed");
        forge.commit_files(
            "feat",
            &[("package.json", "{\"name\": \"feat\", \"version\": \"1.5.0\"}")],
            "feature work",
        );

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().json_patch(
            "package.json",
            vec![PatchOperation::Replace {
                path: "/version".into(),
                value: json!("2.0.0"),
            }],
        ));
        let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(CommitOptions::new("bump", h.get(tree)?.sha.clone()).on_default_branch())
        }));
        pipeline.create_or_update_branch(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(BranchOptions::new("feat", h.get(commit)?.sha.clone()))
        }));

        pipeline.run().await.unwrap();

        let package = String::from_utf8(forge.file_at("feat", "package.json").unwrap()).unwrap();
        assert_eq!(package, "{\n  \"name\": \"feat\",\n  \"version\": \"2.0.0\"\n}\n");
    }

    #[tokio::test]
    async fn commit_already_on_tip_is_not_rederived() {
        let forge = MockForge::new();
        forge.commit_files("feat", &[("feat.txt", "work")], "feature work");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(
            TreeOptions::new()
                .base_ref("feat")
                .write_text("hello.txt", "Hi"),
        );
        let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            let tree = h.get(tree)?;
            Ok(CommitOptions::new("add hello", tree.sha.clone()).parent_ref(tree.base_ref.clone()))
        }));
        let branch = pipeline.create_or_update_branch(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(BranchOptions::new("feat", h.get(commit)?.sha.clone()))
        }));

        let history = pipeline.run().await.unwrap();
        let output = history.get(branch).unwrap();
        assert!(output.rederived_from.is_none());
        assert_eq!(&output.sha, &history.get(commit).unwrap().sha);
    }

    #[tokio::test]
    async fn full_flow_opens_pull_request() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().write_text("hello.txt", "Hi"));
        let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(CommitOptions::new("add hello", h.get(tree)?.sha.clone()).on_default_branch())
        }));
        let pr = pipeline.create_or_update_pr(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(PrOptions::new("feat", "Add hello").head_sha(h.get(commit)?.sha.clone()))
        }));

        let history = pipeline.run().await.unwrap();
        let output = history.get(pr).unwrap();
        let opened = output.pull_request.as_ref().unwrap();
        assert_eq!(opened.head, "feat");
        assert_eq!(opened.base, "main");
        assert_eq!(
            output.branch.as_ref().map(|b| b.action),
            Some(BranchAction::Created)
        );
    }
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn literal_options_ignore_history() {
        let forge = MockForge::new();
        let main_tip = forge.branch_tip("main").unwrap();

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.create_tree(TreeOptions::new().write_text("a.txt", "A"));
        let branch = pipeline.create_branch(BranchOptions::new("copy", main_tip.clone()));

        let history = pipeline.run().await.unwrap();
        assert_eq!(history.get(branch).unwrap().sha, main_tip);
    }

    #[tokio::test]
    async fn computed_options_run_once_and_see_only_earlier_steps() {
        let forge = MockForge::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().write_text("a.txt", "A"));
        pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(h.len(), 1);
            Ok(CommitOptions::new("a", h.get(tree)?.sha.clone()).on_default_branch())
        }));
        pipeline.create_tree(TreeOptions::new().write_text("b.txt", "B"));

        let history = pipeline.run().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_options_can_query_forge() {
        let forge = MockForge::new();
        let handle: Arc<MockForge> = Arc::new(forge.clone());

        let mut pipeline = Pipeline::new(handle.clone());
        let branch = pipeline.create_branch(Deferred::from_async(move |_history| async move {
            let main = handle.get_branch("main").await?;
            Ok::<_, PipelineError>(BranchOptions::new("snapshot", main.commit_sha))
        }));

        let history = pipeline.run().await.unwrap();
        assert_eq!(
            Some(history.get(branch).unwrap().sha.clone()),
            forge.branch_tip("main")
        );
    }
}

mod tree_intents {
    use super::*;

    #[tokio::test]
    async fn rename_moves_blob_and_deletes_old_path() {
        let forge = MockForge::new();
        forge.commit_files("main", &[("a.txt", "alpha")], "seed");
        let (_, original) = forge.entry_at("main", "a.txt").unwrap();

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().rename("a.txt", "b.txt"));
        let history = pipeline.run().await.unwrap();

        let mut entries = history.get(tree).unwrap().entries.clone();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.txt");
        assert_eq!(entries[0].sha, None);
        assert_eq!(entries[0].mode, FileMode::File);
        assert_eq!(entries[1].path, "b.txt");
        assert_eq!(entries[1].sha, Some(original));
        assert_eq!(entries[1].mode, FileMode::File);
    }

    #[tokio::test]
    async fn deleting_absent_path_emits_one_entry() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().delete("never-existed.txt"));
        let history = pipeline.run().await.unwrap();

        let entries = &history.get(tree).unwrap().entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "never-existed.txt");
        assert!(entries[0].is_deletion());
    }

    #[tokio::test]
    async fn noop_edit_reuploads_identical_content() {
        let forge = MockForge::new();
        forge.commit_files("main", &[("README.md", "# Title\n")], "seed");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().edit_text("README.md", |text, _| Ok(text)));
        let history = pipeline.run().await.unwrap();

        let entry = &history.get(tree).unwrap().entries[0];
        let sha = entry.sha.clone().unwrap();
        assert_eq!(forge.blob(&sha).unwrap(), b"# Title\n");
    }

    #[tokio::test]
    async fn json_patch_edits_existing_manifest() {
        let forge = MockForge::new();
        forge.commit_files(
            "main",
            &[("package.json", r#"{"name":"demo","version":"1.0.0"}"#)],
            "seed",
        );

        let patch: Vec<PatchOperation> = serde_json::from_value(json!([
            { "op": "replace", "path": "/version", "value": "2.0.0" },
            { "op": "add", "path": "/private", "value": true }
        ]))
        .unwrap();

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().json_patch("package.json", patch));
        let commit = pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(CommitOptions::new("bump", h.get(tree)?.sha.clone()).parent_ref("main"))
        }));
        pipeline.update_branch(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(BranchOptions::new("main", h.get(commit)?.sha.clone()))
        }));
        pipeline.run().await.unwrap();

        let text = String::from_utf8(forge.file_at("main", "package.json").unwrap()).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({ "name": "demo", "version": "2.0.0", "private": true })
        );
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["name", "version", "private"]);
    }

    #[tokio::test]
    async fn subdirectory_mounts_tree_from_earlier_step() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let lib = pipeline.create_tree(TreeOptions::new().write_text("lib.rs", "pub fn f() {}\n"));
        let tree = pipeline.create_tree(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(TreeOptions::new().subdirectory("vendor/lib", h.get(lib)?.sha.clone()))
        }));
        let history = pipeline.run().await.unwrap();

        let lib_sha = history.get(lib).unwrap().sha.clone();
        let output = history.get(tree).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].path, "vendor/lib");
        assert_eq!(output.entries[0].mode, FileMode::Subdirectory);
        assert_eq!(output.entries[0].sha, Some(lib_sha));
        assert_eq!(
            forge.mode_in_tree(&output.sha, "vendor/lib/lib.rs"),
            Some(FileMode::File)
        );

        let uploads = forge
            .operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::CreateBlob { .. }))
            .count();
        assert_eq!(uploads, 1);
    }

    #[tokio::test]
    async fn rename_onto_declared_path_fails_before_network() {
        let forge = MockForge::new();
        forge.commit_files("main", &[("a.txt", "alpha")], "seed");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.create_tree(
            TreeOptions::new()
                .rename("a.txt", "b.txt")
                .write_text("b.txt", "beta"),
        );
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.step, 0);
        assert!(matches!(err.source, PipelineError::Build(_)));
        assert!(forge.operations().is_empty());
    }

    #[tokio::test]
    async fn executable_and_symlink_modes() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(
            TreeOptions::new()
                .executable("bin/run", b"#!/bin/sh\n".to_vec())
                .symlink("latest", "bin/run"),
        );
        let history = pipeline.run().await.unwrap();

        let tree_sha = history.get(tree).unwrap().sha.clone();
        assert_eq!(
            forge.mode_in_tree(&tree_sha, "bin/run"),
            Some(FileMode::Executable)
        );
        assert_eq!(
            forge.mode_in_tree(&tree_sha, "latest"),
            Some(FileMode::Symlink)
        );
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn failure_reports_completed_prefix() {
        let forge = MockForge::new().fail_on(FailOn::CreateCommit(ForgeError::RateLimited));

        let err = hello_pipeline(&forge).run().await.unwrap_err();

        assert_eq!(err.step, 1);
        assert_eq!(err.completed.len(), 1);
        assert!(matches!(
            err.source,
            PipelineError::Forge(ForgeError::RateLimited)
        ));
        // No branch write was attempted after the failure
        assert!(ref_writes(&forge).is_empty());
        assert_eq!(forge.branch_tip("feat"), None);
    }

    #[tokio::test]
    async fn undefined_parent_ref_fails_before_network() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let tree = pipeline.create_tree(TreeOptions::new().write_text("a.txt", "A"));
        pipeline.create_commit(Deferred::from_fn(move |h: &ResultHistory| {
            Ok(CommitOptions::new("orphan", h.get(tree)?.sha.clone()))
        }));

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.step, 1);
        assert!(matches!(&err.source, PipelineError::Build(msg) if msg == "parent ref is undefined"));
        assert!(!forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CreateCommit { .. })));
    }

    #[tokio::test]
    async fn create_branch_on_existing_ref_fails() {
        let forge = MockForge::new();
        let tip = forge.branch_tip("main").unwrap();

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.create_branch(BranchOptions::new("main", tip));
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.step, 0);
        assert!(err.completed.is_empty());
    }
}

mod pull_requests {
    use super::*;

    #[tokio::test]
    async fn existing_pr_conflict_is_swallowed() {
        let forge = MockForge::new();
        forge.commit_files("feat", &[("f.txt", "f")], "work");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        let first = pipeline.maybe_create_pr(PrOptions::new("feat", "First"));
        let second = pipeline.maybe_create_pr(PrOptions::new("feat", "Second"));
        let found = pipeline.find_pr(PrQuery::head("feat"));

        let history = pipeline.run().await.unwrap();
        assert!(history.get(first).unwrap().pull_request.is_some());
        assert!(history.get(second).unwrap().pull_request.is_none());
        assert_eq!(
            history
                .get(found)
                .unwrap()
                .pull_request
                .as_ref()
                .map(|pr| pr.title.as_str()),
            Some("First")
        );
        assert_eq!(forge.pr_count(), 1);
    }

    #[tokio::test]
    async fn plain_create_pr_surfaces_conflict() {
        let forge = MockForge::new();
        forge.commit_files("feat", &[("f.txt", "f")], "work");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.create_pr(PrOptions::new("feat", "First"));
        pipeline.create_pr(PrOptions::new("feat", "Again"));

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.step, 1);
        assert!(matches!(
            err.source,
            PipelineError::Forge(ForgeError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_pr_by_head() {
        let forge = MockForge::new();
        forge.commit_files("feat", &[("f.txt", "f")], "work");

        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.create_pr(PrOptions::new("feat", "Draft title"));
        let updated = pipeline.update_pr(PrOptions::new("feat", "Final title").body("Ready"));

        let history = pipeline.run().await.unwrap();
        let pr = history.get(updated).unwrap().pull_request.clone().unwrap();
        assert_eq!(pr.title, "Final title");
        assert_eq!(pr.body.as_deref(), Some("Ready"));
    }

    #[tokio::test]
    async fn update_pr_without_open_pr_fails() {
        let forge = MockForge::new();
        let mut pipeline = Pipeline::new(Arc::new(forge.clone()));
        pipeline.update_pr(PrOptions::new("nowhere", "Title"));

        let err = pipeline.run().await.unwrap_err();
        assert!(err.source.is_not_found());
    }
}
