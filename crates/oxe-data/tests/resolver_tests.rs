use std::fs;

use oxe_data::{
    format_mixture, resolve, ActionEncoding, DatasetSchema, MixSource, MixtureConfig, MixtureError,
    ResolveOptions, SkippedDataset, StaticRegistry, RT_X_MIX,
};

fn eef(name: &str) -> (String, DatasetSchema) {
    (
        name.to_string(),
        DatasetSchema::new(ActionEncoding::EefPos)
            .with_image_keys(["cam0", "cam1", "cam2", "wrist0"])
            .with_depth_keys(["depth0", "depth1", "depth2", "wrist_depth"])
            .with_state_keys(["eef_state", "gripper_state"]),
    )
}

fn registry() -> StaticRegistry {
    [
        eef("a"),
        eef("b"),
        (
            "bimanual".to_string(),
            DatasetSchema::new(ActionEncoding::JointPosBimanual).with_image_keys(["top"]),
        ),
    ]
    .into_iter()
    .collect()
}

#[test]
fn duplicates_keep_first_occurrence() {
    let mix = [("a", 1.0), ("b", 2.0), ("a", 3.0)];
    let resolved = resolve(&mix, "/data", &registry(), &ResolveOptions::default()).unwrap();

    let names: Vec<&str> = resolved.datasets.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(resolved.weights, vec![1.0, 2.0]);
    assert_eq!(
        resolved.skipped,
        vec![SkippedDataset::Duplicate {
            name: "a".to_string(),
            weight: 3.0
        }]
    );
}

#[test]
fn duplicates_survive_without_dedup() {
    let mix = [("a", 1.0), ("a", 3.0)];
    let options = ResolveOptions {
        deduplicate: false,
        ..ResolveOptions::default()
    };
    let resolved = resolve(&mix, "/data", &registry(), &options).unwrap();
    assert_eq!(resolved.weights, vec![1.0, 3.0]);
    assert!(resolved.skipped.is_empty());
}

#[test]
fn cameras_are_trimmed_per_request() {
    let options = ResolveOptions {
        n_wrist_cameras: 1,
        ..ResolveOptions::default()
    };
    let resolved = resolve(&[("a", 1.0)], "/data", &registry(), &options).unwrap();
    let a = &resolved.datasets[0];
    assert_eq!(
        a.image_obs_keys,
        vec![Some("cam0".to_string()), Some("wrist0".to_string())]
    );
    assert_eq!(
        a.depth_obs_keys,
        Some(vec![Some("depth0".to_string()), Some("wrist_depth".to_string())])
    );
    assert_eq!(a.data_dir, "/data");
}

#[test]
fn depth_and_proprio_can_be_dropped() {
    let options = ResolveOptions {
        load_depth: false,
        load_proprio: false,
        ..ResolveOptions::default()
    };
    let resolved = resolve(&[("b", 1.0)], "/data", &registry(), &options).unwrap();
    let b = &resolved.datasets[0];
    assert_eq!(b.depth_obs_keys, None);
    assert_eq!(b.state_obs_keys, None);

    let json = serde_json::to_value(b).unwrap();
    assert!(json.get("depth_obs_keys").is_none());
    assert_eq!(json["action_encoding"], "eef_pos");
}

#[test]
fn unsupported_actions_are_skipped_in_lockstep() {
    let mix = [("a", 1.0), ("bimanual", 5.0), ("b", 2.0)];
    let resolved = resolve(&mix, "/data", &registry(), &ResolveOptions::default()).unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved.weights, vec![1.0, 2.0]);
    assert!(matches!(
        &resolved.skipped[..],
        [SkippedDataset::UnsupportedAction { name, action_encoding: ActionEncoding::JointPosBimanual }]
            if name == "bimanual"
    ));
}

#[test]
fn unknown_dataset_is_fatal() {
    let err = resolve(&[("a", 1.0), ("missing", 1.0)], "/data", &registry(), &ResolveOptions::default())
        .unwrap_err();
    assert!(matches!(err, MixtureError::UnknownDataset(name) if name == "missing"));
}

#[test]
fn named_mix_against_partial_registry_names_the_gap() {
    let err = resolve(RT_X_MIX, "/data", &registry(), &ResolveOptions::default()).unwrap_err();
    assert!(matches!(err, MixtureError::UnknownDataset(name) if name == "fractal20220817_data"));
}

#[test]
fn config_file_resolves_registry_next_to_it() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("registry.json"),
        serde_json::to_string(&registry()).unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("mix.toml"),
        r#"
data_dir = "gs://bucket"
registry = "registry.json"

[[mix]]
name = "b"
weight = 2.0

[[mix]]
name = "bimanual"
weight = 1.0

[options]
n_third_person_cameras = 2
"#,
    )
    .unwrap();

    let config = MixtureConfig::from_path(dir.path().join("mix.toml")).unwrap();
    assert_eq!(config.registry, dir.path().join("registry.json"));
    assert!(matches!(config.mix, MixSource::Explicit(ref entries) if entries.len() == 2));

    let resolved = config.resolve().unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved.datasets[0].data_dir, "gs://bucket");
    assert_eq!(resolved.datasets[0].image_obs_keys.len(), 2);
    assert!(format_mixture(&resolved).contains("# b: ===="));
}

#[test]
fn config_with_unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.yaml");
    fs::write(&path, "mix: rtx").unwrap();
    assert!(matches!(
        MixtureConfig::from_path(&path),
        Err(MixtureError::Format(_))
    ));
}

#[test]
fn missing_config_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        MixtureConfig::from_path(dir.path().join("absent.toml")),
        Err(MixtureError::Io(_))
    ));
}
