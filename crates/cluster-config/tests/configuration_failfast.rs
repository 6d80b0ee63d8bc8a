use std::fs;
use std::path::PathBuf;

use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;

use cluster_config::{
    ClusterConfig, ConfigError, ConfigRegistry, MapTrackerConfig, RaftConfig, Section,
};

struct Workspace {
    _dir: TempDir,
    path: PathBuf,
    registry: ConfigRegistry,
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("service.json");
    let mut registry = ConfigRegistry::standard();
    registry.populate_defaults().expect("defaults");
    registry.save(&path, false).expect("save defaults");
    Workspace {
        _dir: dir,
        path,
        registry,
    }
}

fn rewrite(path: &PathBuf, edit: impl FnOnce(&mut Value)) {
    let text = fs::read_to_string(path).expect("read config");
    let mut document: Value = serde_json::from_str(&text).expect("parse config");
    edit(&mut document);
    fs::write(path, serde_json::to_vec(&document).expect("encode")).expect("write config");
}

#[rstest]
fn saved_defaults_load_back(workspace: Workspace) {
    let mut loaded = ConfigRegistry::standard();
    loaded.load(&workspace.path).expect("load");
    assert_eq!(
        loaded.get::<ClusterConfig>().expect("cluster"),
        workspace.registry.get::<ClusterConfig>().expect("cluster")
    );
}

#[rstest]
fn missing_file_is_reported_as_not_found(workspace: Workspace) {
    let mut registry = ConfigRegistry::standard();
    let missing = workspace.path.with_file_name("absent.json");
    let error = registry.load(&missing).expect_err("load must fail");
    assert!(matches!(error, ConfigError::NotFound { .. }));
}

#[rstest]
fn malformed_json_is_reported(workspace: Workspace) {
    fs::write(&workspace.path, b"{ not json").expect("write garbage");
    let mut registry = ConfigRegistry::standard();
    let error = registry.load(&workspace.path).expect_err("load must fail");
    assert!(matches!(error, ConfigError::Malformed { .. }));
}

#[rstest]
fn invalid_section_applies_nothing(workspace: Workspace) {
    let Workspace { path, _dir, .. } = workspace;
    let mut registry = ConfigRegistry::standard();
    registry.load(&path).expect("initial load");
    let original_cluster = registry.get::<ClusterConfig>().expect("cluster").clone();
    let original_raft = registry.get::<RaftConfig>().expect("raft").clone();

    rewrite(&path, |document| {
        document["cluster"]["id"] = Value::from("replaced-id");
        document["pin_tracker"]["maptracker"]["concurrent_pins"] = Value::from(0);
    });

    let error = registry.load(&path).expect_err("load must fail");
    match error {
        ConfigError::Invalid { key, .. } => {
            assert_eq!(key.section, Section::PinTracker);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        registry.get::<ClusterConfig>().expect("cluster"),
        &original_cluster
    );
    assert_eq!(registry.get::<RaftConfig>().expect("raft"), &original_raft);
    assert_eq!(
        registry
            .get::<MapTrackerConfig>()
            .expect("tracker")
            .concurrent_pins,
        10
    );
}

#[rstest]
fn missing_section_is_reported(workspace: Workspace) {
    rewrite(&workspace.path, |document| {
        if let Some(object) = document.as_object_mut() {
            object.remove("sharder");
        }
    });
    let mut registry = ConfigRegistry::standard();
    let error = registry.load(&workspace.path).expect_err("load must fail");
    assert!(matches!(error, ConfigError::MissingSection { .. }));
    assert!(matches!(
        registry.get::<ClusterConfig>(),
        Err(ConfigError::Unpopulated { .. })
    ));
}
