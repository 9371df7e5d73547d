// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use camera_preview::Config;
use camera_preview::backends::camera::{LensFacing, Resolution};
use camera_preview::constants;
use camera_preview::render::RendererKind;

fn scratch_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("camera-preview-config-{}-{}", name, std::process::id()))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.renderer, RendererKind::DirectTexture);
    assert_eq!(config.lens_facing, LensFacing::Back);
    assert_eq!(
        config.target_resolution,
        Resolution::new(constants::TARGET_WIDTH, constants::TARGET_HEIGHT)
    );
    assert!(!config.snapshots.enabled, "Snapshots should be opt-in");
    assert_eq!(config.snapshots.limit, constants::snapshot::DEFAULT_LIMIT);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_json_round_trip() {
    let mut config = Config::default();
    config.renderer = RendererKind::OffscreenComposite;
    config.lens_facing = LensFacing::Front;
    config.snapshots.enabled = true;
    config.snapshots.limit = 2;

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"offscreen\""));
    assert!(json.contains("\"front\""));

    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_json_uses_defaults() {
    let parsed: Config = serde_json::from_str(r#"{ "renderer": "planar" }"#).unwrap();
    assert_eq!(parsed.renderer, RendererKind::PlanarColor);
    assert_eq!(parsed.snapshots, Config::default().snapshots);
}

#[test]
fn test_save_and_load() {
    let path = scratch_file("save");
    let mut config = Config::default();
    config.aspect_ratio = 3.0 / 4.0;

    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), config);

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let path = scratch_file("invalid");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "aspect_ratio": -1.0 }"#).unwrap();

    assert!(Config::load(&path).is_err());
    assert_eq!(Config::load_or_default(Some(&path)), Config::default());

    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn test_missing_file_is_default() {
    let path = scratch_file("missing");
    assert_eq!(Config::load_or_default(Some(&path)), Config::default());
    assert_eq!(Config::load_or_default(None), Config::default());
}
