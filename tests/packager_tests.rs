//! End-to-end packaging tests with stubbed network access

use stagepack::checksum::sha256_hex;
use stagepack::fetcher::ChunkCallback;
use stagepack::{
    ArchiveTree, AssetCatalog, AssetDescriptor, AssetFetcher, DesktopManifest, IntegrityStore,
    PackError, PackResult, Packager, PackagerState, PackagingOptions, ProgressEvent,
    ProgressRecorder, Project, Target, Transport,
};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in files {
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        writer.start_file(*path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

struct MapTransport {
    bodies: HashMap<String, Vec<u8>>,
}

impl Transport for MapTransport {
    fn get(&self, url: &str, on_chunk: &mut ChunkCallback<'_>) -> PackResult<Vec<u8>> {
        let key = url.split('?').next().unwrap_or(url);
        let body = self
            .bodies
            .get(key)
            .cloned()
            .ok_or_else(|| PackError::Config(format!("404 {}", url)))?;
        on_chunk(body.len() as u64 / 2, Some(body.len() as u64));
        on_chunk(body.len() as u64, Some(body.len() as u64));
        Ok(body)
    }
}

fn fixture_fetcher() -> AssetFetcher {
    let win = zip_of(&[
        ("nwjs-v1-win-x64/nw.exe", "MZ"),
        ("nwjs-v1-win-x64/credits.html", "credits"),
    ]);
    let mac = zip_of(&[
        ("nwjs-v1-osx-x64/credits.html", "credits"),
        ("nwjs-v1-osx-x64/nwjs.app/Contents/MacOS/nwjs", "macho"),
    ]);

    let catalog = AssetCatalog::new("test")
        .with_asset(
            AssetDescriptor::new("scaffolding", "https://x/scaffolding.js")
                .with_cache_buster(true),
        )
        .with_asset(AssetDescriptor::new("addons", "https://x/addons.js"))
        .with_asset(
            AssetDescriptor::new("nwjs-win64", "https://x/win.zip").with_sha256(sha256_hex(&win)),
        )
        .with_asset(AssetDescriptor::new("nwjs-mac", "https://x/mac.zip"));

    let mut bodies = HashMap::new();
    bodies.insert(
        "https://x/scaffolding.js".to_string(),
        b"var Scaffolding = {}; // </script>".to_vec(),
    );
    bodies.insert("https://x/addons.js".to_string(), b"var ScaffoldingAddons = {};".to_vec());
    bodies.insert("https://x/win.zip".to_string(), win);
    bodies.insert("https://x/mac.zip".to_string(), mac);

    let store = IntegrityStore::memory(&catalog);
    AssetFetcher::new(catalog, store, Arc::new(MapTransport { bodies }))
}

fn sb3() -> Project {
    Project::sb3(zip_of(&[
        ("project.json", "{\"targets\":[]}"),
        ("abc.svg", "<svg/>"),
    ]))
}

fn entry_text(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> String {
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("missing {}", name))
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[test]
fn test_html_target() {
    let options = PackagingOptions::new(Target::Html).with_project_title("My Game.sb3");
    let mut packager = Packager::new(options, fixture_fetcher());
    let recorder = Arc::new(ProgressRecorder::new());
    packager.subscribe(recorder.clone());

    let output = packager.package(&sb3()).unwrap();

    assert_eq!(output.filename, "My Game.html");
    assert_eq!(output.mime, "text/html");
    let html = String::from_utf8(output.bytes).unwrap();
    assert!(html.contains("<title>My Game</title>"));
    assert!(html.contains("var Scaffolding = {}; // </scri'+'pt>"));
    assert!(html.contains("data:application/octet-stream;base64,"));
    assert!(!html.contains("ScaffoldingAddons = {}"));

    assert_eq!(packager.state(), PackagerState::Done);
    assert_eq!(
        recorder.stages(),
        vec![
            PackagerState::LoadingScaffolding,
            PackagerState::Embedding,
            PackagerState::Done
        ]
    );
    let overall = recorder.overall_progress();
    assert_eq!(overall.last(), Some(&1.0));
    assert!(overall.windows(2).all(|w| w[0] < w[1]));
    assert!(overall[..overall.len() - 1].iter().all(|v| *v <= 0.9));
}

#[test]
fn test_zip_target_splits_sb3() {
    let options = PackagingOptions::new(Target::Zip)
        .with_window_title("Game")
        .with_gamepad(true);
    let mut packager = Packager::new(options, fixture_fetcher());

    let output = packager.package(&sb3()).unwrap();
    assert_eq!(output.filename, "Game.zip");
    assert_eq!(output.mime, "application/zip");

    let mut archive = ZipArchive::new(Cursor::new(output.bytes.as_slice())).unwrap();
    assert_eq!(entry_text(&mut archive, "assets/project.json"), "{\"targets\":[]}");
    assert_eq!(entry_text(&mut archive, "assets/abc.svg"), "<svg/>");
    assert!(archive.by_name("project.zip").is_err());

    let html = entry_text(&mut archive, "index.html");
    assert!(html.contains("<script src=\"script.js\"></script>"));
    assert!(html.contains("./assets/project.json"));

    let script = entry_text(&mut archive, "script.js");
    assert!(script.contains("var Scaffolding"));
    assert!(script.contains("var ScaffoldingAddons"));
}

#[test]
fn test_zip_one_asset_target() {
    let project = sb3();
    let options = PackagingOptions::new(Target::ZipOneAsset);
    let mut packager = Packager::new(options, fixture_fetcher());

    let output = packager.package(&project).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(output.bytes.as_slice())).unwrap();

    let mut stored = Vec::new();
    archive
        .by_name("project.zip")
        .unwrap()
        .read_to_end(&mut stored)
        .unwrap();
    assert_eq!(stored, project.data);
    assert!(archive.by_name("assets/project.json").is_err());
    assert!(entry_text(&mut archive, "index.html").contains("./project.zip"));
}

#[test]
fn test_blob_project_uses_project_zip() {
    let options = PackagingOptions::new(Target::Zip);
    let mut packager = Packager::new(options, fixture_fetcher());

    let output = packager.package(&Project::blob(b"opaque".to_vec())).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(output.bytes.as_slice())).unwrap();
    assert_eq!(entry_text(&mut archive, "project.zip"), "opaque");
}

#[test]
fn test_windows_target() {
    let options = PackagingOptions::new(Target::NwjsWin64)
        .with_package_name("my-game")
        .with_window_title("My Game")
        .with_stage_size(640, 480);
    let mut packager = Packager::new(options, fixture_fetcher());
    let recorder = Arc::new(ProgressRecorder::new());
    packager.subscribe(recorder.clone());

    let output = packager.package(&sb3()).unwrap();
    assert_eq!(output.filename, "My Game.zip");

    let tree = ArchiveTree::load_from(output.bytes).unwrap();
    assert!(tree.contains("my-game/my-game.exe"));
    assert!(tree.contains("my-game/credits.html"));
    assert!(tree.contains("my-game/index.html"));
    assert!(tree.contains("my-game/script.js"));
    assert!(tree.contains("my-game/assets/project.json"));
    assert!(tree.contains("my-game/icon.png"));

    let json = String::from_utf8(tree.read("my-game/package.json").unwrap().unwrap()).unwrap();
    let manifest = DesktopManifest::parse(&json).unwrap();
    assert_eq!(manifest.name, "my-game");
    assert_eq!((manifest.window.width, manifest.window.height), (640, 480));

    assert_eq!(
        recorder.stages(),
        vec![
            PackagerState::LoadingScaffolding,
            PackagerState::AssemblingArchive,
            PackagerState::TransformingLayout,
            PackagerState::Serializing,
            PackagerState::Done
        ]
    );
    let archive = recorder.archive_progress();
    assert_eq!(archive.last(), Some(&1.0));
    let overall = recorder.overall_progress();
    assert!(overall.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(overall.last(), Some(&1.0));
}

#[test]
fn test_mac_target() {
    let options = PackagingOptions::new(Target::NwjsMac).with_package_name("game");
    let mut packager = Packager::new(options, fixture_fetcher());

    let output = packager.package(&Project::blob(b"p".to_vec())).unwrap();
    let tree = ArchiveTree::load_from(output.bytes).unwrap();

    let mount = "game/game.app/Contents/Resources/app.nw/";
    assert!(tree.contains(&format!("{}project.zip", mount)));
    assert!(tree.contains(&format!("{}package.json", mount)));
    assert!(tree.contains("game/game.app/Contents/Resources/app.icns"));
    assert!(tree.contains("game/game.app/Contents/MacOS/nwjs"));
    assert!(!tree.contains("game/project.zip"));
}

#[test]
fn test_fetch_events_precede_assembly() {
    let options = PackagingOptions::new(Target::NwjsWin64).with_gamepad(true);
    let mut packager = Packager::new(options, fixture_fetcher());
    let recorder = Arc::new(ProgressRecorder::new());
    packager.subscribe(recorder.clone());

    packager.package(&sb3()).unwrap();

    let events = recorder.events();
    let assembling = events
        .iter()
        .position(|e| {
            *e == ProgressEvent::Stage {
                state: PackagerState::AssemblingArchive,
            }
        })
        .unwrap();
    for asset in ["scaffolding", "addons", "nwjs-win64"] {
        let done = events
            .iter()
            .position(|e| {
                matches!(e, ProgressEvent::AssetFetch { asset: a, progress }
                    if a == asset && *progress == 1.0)
            })
            .unwrap();
        assert!(done < assembling, "{} finished after assembly started", asset);
    }
}

#[test]
fn test_failure_moves_to_failed_and_blocks_reuse() {
    let catalog = AssetCatalog::new("empty");
    let store = IntegrityStore::disabled(&catalog);
    let fetcher = AssetFetcher::new(
        catalog,
        store,
        Arc::new(MapTransport {
            bodies: HashMap::new(),
        }),
    );
    let mut packager = Packager::new(PackagingOptions::default(), fetcher);
    let recorder = Arc::new(ProgressRecorder::new());
    packager.subscribe(recorder.clone());

    assert!(matches!(
        packager.package(&sb3()),
        Err(PackError::InvalidAssetRequest(_))
    ));
    assert_eq!(packager.state(), PackagerState::Failed);
    assert_eq!(recorder.stages().last(), Some(&PackagerState::Failed));

    assert!(matches!(packager.package(&sb3()), Err(PackError::Config(_))));
}

#[test]
fn test_packager_runs_once() {
    let mut packager = Packager::new(PackagingOptions::default(), fixture_fetcher());
    packager.package(&sb3()).unwrap();
    assert!(matches!(packager.package(&sb3()), Err(PackError::Config(_))));
}

#[test]
fn test_custom_icon_used_for_desktop() {
    let temp = TempDir::new().unwrap();
    let icon_path = temp.path().join("logo.png");
    let default = stagepack::AppIcon::default_icon().unwrap();
    std::fs::write(&icon_path, &default.data).unwrap();

    let options = PackagingOptions::new(Target::NwjsWin64)
        .with_package_name("g")
        .with_icon(&icon_path);
    let mut packager = Packager::new(options, fixture_fetcher());
    let output = packager.package(&sb3()).unwrap();

    let tree = ArchiveTree::load_from(output.bytes).unwrap();
    assert_eq!(tree.read("g/logo.png").unwrap().unwrap(), default.data);
    let json = String::from_utf8(tree.read("g/package.json").unwrap().unwrap()).unwrap();
    assert_eq!(DesktopManifest::parse(&json).unwrap().window.icon, "logo.png");
}

#[test]
fn test_output_written_to_directory() {
    let temp = TempDir::new().unwrap();
    let mut packager = Packager::new(
        PackagingOptions::default().with_window_title("Out"),
        fixture_fetcher(),
    );
    let output = packager.package(&sb3()).unwrap();

    let path = output.write_to(temp.path()).unwrap();
    assert_eq!(path, temp.path().join("Out.html"));
    assert_eq!(std::fs::read(path).unwrap(), output.bytes);
}
