//! Tests that common bypass attempts against the tool sandbox are rejected:
//! path traversal out of the workspace root, invoking a tool that was never
//! registered, and a tool that never returns within its timeout.

use agent_orchestrator::prelude::*;
use agent_orchestrator::tools::{resolve_sandboxed, ToolManager};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

fn workspace_root() -> PathBuf {
    PathBuf::from("/workspace/session-sandbox")
}

#[test]
fn parent_dir_traversal_is_rejected() {
    let root = workspace_root();
    assert!(resolve_sandboxed(&root, "../../../etc/passwd").is_err());
    assert!(resolve_sandboxed(&root, "../escape.txt").is_err());
}

#[test]
fn traversal_hidden_inside_a_longer_relative_path_is_still_rejected() {
    let root = workspace_root();
    // Looks like it stays under a subdirectory, but the embedded `..`
    // sequences walk back out past the root before landing outside it.
    let err = resolve_sandboxed(&root, "notes/../../../etc/shadow").unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
}

#[test]
fn traversal_that_merely_returns_to_the_root_is_allowed() {
    let root = workspace_root();
    // `a/../b` normalizes to `b`, which still resolves inside the root.
    let resolved = resolve_sandboxed(&root, "a/../b.txt").unwrap();
    assert_eq!(resolved, root.join("b.txt"));
}

#[test]
fn plain_nested_paths_resolve_under_the_root() {
    let root = workspace_root();
    let resolved = resolve_sandboxed(&root, "reports/q1/summary.md").unwrap();
    assert!(resolved.starts_with(&root));
}

#[tokio::test]
async fn calling_an_unregistered_tool_name_is_rejected_not_silently_ignored() {
    let manager = ToolManager::new(Duration::from_secs(1));
    let ctx = SessionContext::new(SessionId::new("sandbox-1").unwrap(), workspace_root(), 4096);
    let err = manager
        .call("shell_exec", json!({"cmd": "rm -rf /"}), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(_)));
    assert_eq!(err.kind(), "tool_not_found");
}

#[tokio::test]
async fn a_tool_that_never_returns_is_cut_off_by_the_manager_timeout() {
    let mut manager = ToolManager::new(Duration::from_millis(30));
    manager.register(
        tool("stall", "Never completes").build(|_args| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({"ok": true}))
        }),
    );

    let ctx = SessionContext::new(SessionId::new("sandbox-2").unwrap(), workspace_root(), 4096);
    let err = manager.call("stall", json!({}), &ctx).await.unwrap_err();
    assert!(matches!(err, Error::ToolTimeout(_)));
    assert_eq!(err.kind(), "tool_timeout");
}

#[tokio::test]
async fn a_tool_that_attempts_traversal_internally_is_blocked_by_resolve_sandboxed() {
    let root = workspace_root();
    let mut manager = ToolManager::new(Duration::from_secs(1));
    manager.register(
        tool("read_file", "Read a file from the workspace")
            .param("path", "string")
            .build(move |args| {
                let root = root.clone();
                async move {
                    let requested = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
                    let resolved = resolve_sandboxed(&root, requested)?;
                    Ok(json!({"resolved": resolved.to_string_lossy()}))
                }
            }),
    );

    let ctx = SessionContext::new(SessionId::new("sandbox-3").unwrap(), workspace_root(), 4096);
    let err = manager
        .call("read_file", json!({"path": "../../../../etc/passwd"}), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
}
