//! Ensures all workspace crates inherit the workspace version and that
//! workspace members match the crates on disk.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path).unwrap();
    text.parse().unwrap()
}

fn workspace_members() -> Vec<String> {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn all_crates_use_workspace_version() {
    let root = workspace_root();

    for member in workspace_members() {
        let doc = read_toml(&root.join(&member).join("Cargo.toml"));
        let inherits = doc["package"]["version"]
            .as_table()
            .and_then(|t| t.get("workspace"))
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn workspace_members_exist() {
    let root = workspace_root();
    let members = workspace_members();
    assert!(members.contains(&"crates/upkeep-core".to_string()));

    for member in members {
        assert!(
            root.join(&member).join("Cargo.toml").is_file(),
            "{member} is listed as a workspace member but has no Cargo.toml"
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let doc = read_toml(&workspace_root().join("Cargo.toml"));
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));
}
