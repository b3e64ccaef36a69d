//! End-to-end tests for the build targets and watch mode
//!
//! Each test lays out a small site under a temp directory, runs targets
//! through the [`Orchestrator`], and inspects the distribution tree.
//!
//! External programs (font converter, script bundler) are replaced with
//! `cat`, so the tests that need them only run on unix.

use frontkit::build::{BuildContext, Pipeline};
use frontkit::config::{default_config, SiteConfig};
use frontkit::events::{DevEvent, EventBus};
use frontkit::orchestrator::{Orchestrator, OrchestratorError, TargetName, TargetState};
use frontkit::watch::Watcher;
use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

fn write(root: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Configuration with `cat` standing in for the external tools.
fn test_config() -> SiteConfig {
    let mut config = default_config();
    config.scripts.command = vec!["cat".to_string(), "{input}".to_string()];
    config.scripts.minify_command = vec!["cat".to_string(), "{input}".to_string()];
    config.fonts.command = vec!["cat".to_string()];
    config
}

/// A site exercising every stage except fonts.
fn site() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    write(root, "src/html/components/header.html", "<header>{{ page }}</header>");
    write(
        root,
        "src/html/pages/index.html",
        "{% set team = \"../../json/team.json\" | json %}<html><body>{% include \"header.html\" %}\
         <ul>{% for m in team %}<li>{{ m.name }}</li>{% endfor %}</ul></body></html>",
    );
    write(root, "src/html/pages/about/index.html", "<html><body>{% include \"header.html\" %}</body></html>");
    write(root, "src/json/team.json", r#"[{"name": "Ada"}, {"name": "Linus"}]"#);

    write(root, "src/scss/style.scss", "@import \"vars\";\n@import \"blocks/header\";\nbody { margin: 0; }\n");
    write(root, "src/scss/_vars.scss", ":root { --brand: #123456; }\n");
    write(root, "src/scss/blocks/_header.scss", ".header { color: var(--brand); }\n");

    write(root, "src/js/script.js", "console.log(\"hi\");\n");
    write(root, "src/libs/swiper/swiper.min.js", "/* swiper */");
    write(root, "src/img/svg/logo.svg", "<svg xmlns=\"http://www.w3.org/2000/svg\"/>");

    let mut photo = RgbaImage::new(16, 16);
    for (x, y, px) in photo.enumerate_pixels_mut() {
        *px = Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255]);
    }
    fs::create_dir_all(root.join("src/img/pictures")).unwrap();
    photo.save(root.join("src/img/pictures/photo.png")).unwrap();

    temp
}

fn orchestrator(root: &Path, config: SiteConfig) -> Orchestrator {
    Orchestrator::new(BuildContext::new(config, root.to_path_buf()))
}

/// SHA256 of every file under `dir`, keyed by relative path.
fn digest_tree(dir: &Path) -> BTreeMap<PathBuf, String> {
    let pattern = format!("{}/**/*", dir.display());
    glob::glob(&pattern)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| {
            let hash = format!("{:x}", Sha256::digest(fs::read(&p).unwrap()));
            (p.strip_prefix(dir).unwrap().to_path_buf(), hash)
        })
        .collect()
}

// ============================================================================
// build
// ============================================================================

#[cfg(unix)]
#[test]
fn test_build_writes_distribution_tree() {
    let temp = site();
    let result = orchestrator(temp.path(), test_config()).run_target(TargetName::Build).unwrap();
    assert_eq!(result.failed_count(), 0);

    let dist = temp.path().join("dist");
    for expected in [
        "index.html",
        "about/index.html",
        "assets/css/style.css",
        "assets/css/style.min.css",
        "assets/js/script.js",
        "assets/js/script.min.js",
        "assets/libs/swiper/swiper.min.js",
        "assets/img/pictures/photo.png",
        "assets/img/svg/logo.svg",
    ] {
        assert!(dist.join(expected).is_file(), "missing {}", expected);
    }

    let index = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(index.contains("<header>index.html</header>"));
    assert!(index.contains("<li>Ada</li><li>Linus</li>"));
    assert!(!dist.join("components").exists());

    let css = fs::read_to_string(dist.join("assets/css/style.css")).unwrap();
    assert!(css.contains("--brand"));
    assert!(css.contains(".header"));
    assert!(!css.contains("@import"));
}

#[cfg(unix)]
#[test]
fn test_every_minified_file_has_a_readable_sibling() {
    let temp = site();
    orchestrator(temp.path(), test_config()).run_target(TargetName::Build).unwrap();

    let dist = temp.path().join("dist");
    for (rel, _) in digest_tree(&dist) {
        let name = rel.file_name().unwrap().to_string_lossy().into_owned();
        // Vendored libraries ship their own minified builds.
        if rel.starts_with("assets/libs") || !name.contains(".min.") {
            continue;
        }
        let sibling = dist.join(rel.with_file_name(name.replacen(".min.", ".", 1)));
        assert!(sibling.is_file(), "{} has no readable sibling", rel.display());
    }
}

#[cfg(unix)]
#[test]
fn test_build_is_idempotent() {
    let temp = site();
    let orchestrator = orchestrator(temp.path(), test_config());

    orchestrator.run_target(TargetName::Build).unwrap();
    let first = digest_tree(&temp.path().join("dist"));
    orchestrator.run_target(TargetName::Build).unwrap();
    let second = digest_tree(&temp.path().join("dist"));

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[cfg(unix)]
#[test]
fn test_build_removes_stale_outputs() {
    let temp = site();
    write(temp.path(), "dist/old-page.html", "stale");
    write(temp.path(), "dist/assets/css/removed.css", "stale");

    orchestrator(temp.path(), test_config()).run_target(TargetName::Build).unwrap();

    assert!(!temp.path().join("dist/old-page.html").exists());
    assert!(!temp.path().join("dist/assets/css/removed.css").exists());
    assert!(temp.path().join("dist/index.html").exists());
}

#[test]
fn test_build_stops_at_first_failing_stage() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/scss/style.scss", "@import \"missing\";\n");
    write(temp.path(), "src/libs/a.js", "a");

    let orchestrator = orchestrator(temp.path(), test_config());
    let err = orchestrator.run_target(TargetName::Build).unwrap_err();

    match err {
        OrchestratorError::Failed { target, summary } => {
            assert_eq!(target, TargetName::Build);
            assert!(summary.contains("styles"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(orchestrator.state(TargetName::Build), TargetState::Failed);
    assert!(!temp.path().join("dist/assets/libs/a.js").exists());
}

#[test]
fn test_build_refuses_to_delete_source_tree() {
    let temp = site();
    let mut config = test_config();
    config.project.dist = PathBuf::from(".");

    let err = orchestrator(temp.path(), config).run_target(TargetName::Build).unwrap_err();
    assert!(matches!(err, OrchestratorError::Failed { .. }));
    assert!(temp.path().join("src/scss/style.scss").exists());
}

// ============================================================================
// fonts / images
// ============================================================================

#[cfg(unix)]
#[test]
fn test_each_font_becomes_exactly_one_woff2() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/fonts/Inter-Regular.ttf", b"\x00\x01\x00\x00regular");
    write(temp.path(), "src/fonts/Inter-Bold.ttf", b"\x00\x01\x00\x00bold");

    orchestrator(temp.path(), test_config()).run_target(TargetName::Fonts).unwrap();

    let fonts = digest_tree(&temp.path().join("dist/fonts"));
    let names: Vec<_> = fonts.keys().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["Inter-Bold.woff2", "Inter-Regular.woff2"]);
    assert_eq!(fs::read(temp.path().join("dist/fonts/Inter-Bold.woff2")).unwrap(), b"\x00\x01\x00\x00bold");
}

#[test]
fn test_images_with_no_rasters_succeeds() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/img/svg/icon.svg", "<svg/>");
    let mut config = test_config();
    config.images.optimize = true;

    let result = orchestrator(temp.path(), config).run_target(TargetName::Images).unwrap();
    assert_eq!(result.failed_count(), 0);
    assert!(temp.path().join("dist/assets/img/svg/icon.svg").exists());
    assert!(!temp.path().join("dist/assets/img/pictures").exists());
}

#[test]
fn test_repeated_image_runs_are_identical() {
    let temp = site();
    let mut photo = RgbaImage::new(24, 24);
    for (x, y, px) in photo.enumerate_pixels_mut() {
        *px = Rgba([(x * 10) as u8, (y * 10) as u8, ((x ^ y) * 8) as u8, 255]);
    }
    image::DynamicImage::ImageRgba8(photo)
        .to_rgb8()
        .save(temp.path().join("src/img/pictures/photo.jpg"))
        .unwrap();
    let mut config = test_config();
    config.images.optimize = true;
    let orchestrator = orchestrator(temp.path(), config);

    orchestrator.run_target(TargetName::Images).unwrap();
    let first = digest_tree(&temp.path().join("dist/assets/img"));
    orchestrator.run_target(TargetName::Images).unwrap();
    orchestrator.run_target(TargetName::Images).unwrap();
    let third = digest_tree(&temp.path().join("dist/assets/img"));

    assert!(first.contains_key(Path::new("pictures/photo.jpg")));
    assert_eq!(first, third);
}

#[test]
fn test_optimize_never_grows_images() {
    let temp = site();
    let original = fs::metadata(temp.path().join("src/img/pictures/photo.png")).unwrap().len();
    let mut config = test_config();
    config.images.optimize = true;

    orchestrator(temp.path(), config).run_target(TargetName::Images).unwrap();

    let optimized = fs::metadata(temp.path().join("dist/assets/img/pictures/photo.png")).unwrap().len();
    assert!(optimized <= original);
}

#[test]
fn test_dry_run_writes_nothing() {
    let temp = site();
    let context = BuildContext::new(test_config(), temp.path().to_path_buf()).with_dry_run(true);

    let result = Orchestrator::new(context).run_target(TargetName::Build).unwrap();
    assert_eq!(result.skipped_count(), 8);
    assert!(!temp.path().join("dist").exists());
}

// ============================================================================
// watch
// ============================================================================

fn watcher_with(root: &Path, config: SiteConfig, bus: &EventBus) -> Watcher {
    let orchestrator = orchestrator(root, config);
    let pipeline = Pipeline::new(orchestrator.context().clone()).with_events(bus.clone());
    Watcher::new(pipeline, orchestrator.plan().clone(), orchestrator.rules().to_vec())
}

fn watcher(root: &Path, bus: &EventBus) -> Watcher {
    watcher_with(root, test_config(), bus)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DevEvent>) -> Vec<DevEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_markup_change_rebuilds_only_markup() {
    let temp = site();
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut watcher = watcher(temp.path(), &bus);

    write(temp.path(), "src/html/components/header.html", "<header class=\"new\">{{ page }}</header>");
    let results = watcher.handle_changes(&[temp.path().join("src/html/components/header.html")]);

    let stages: Vec<_> = results.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(stages, vec!["markup"]);
    assert_eq!(drain(&mut rx), vec![DevEvent::Rebuilt { stage: "markup".to_string() }]);

    let index = fs::read_to_string(temp.path().join("dist/index.html")).unwrap();
    assert!(index.contains("<header class=\"new\">"));
    assert!(!temp.path().join("dist/assets/css/style.css").exists());
}

#[test]
fn test_two_partials_edited_together_rebuild_styles_once() {
    let temp = site();
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut watcher = watcher(temp.path(), &bus);

    write(temp.path(), "src/scss/_vars.scss", ":root { --brand: #654321; }\n");
    write(temp.path(), "src/scss/blocks/_header.scss", ".header { padding: 4px; }\n");
    let results = watcher.handle_changes(&[
        temp.path().join("src/scss/_vars.scss"),
        temp.path().join("src/scss/blocks/_header.scss"),
    ]);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].stage, "styles");
    assert_eq!(drain(&mut rx), vec![DevEvent::Rebuilt { stage: "styles".to_string() }]);

    let css = fs::read_to_string(temp.path().join("dist/assets/css/style.css")).unwrap();
    assert!(css.contains("#654321"));
    assert!(css.contains("4px"));
}

#[test]
fn test_failed_rebuild_is_published_and_recovers() {
    let temp = site();
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut watcher = watcher(temp.path(), &bus);
    let entry = temp.path().join("src/scss/style.scss");

    write(temp.path(), "src/scss/style.scss", "@import \"gone\";\n");
    let failed = watcher.handle_changes(std::slice::from_ref(&entry));
    assert!(failed[0].status.is_failure());
    assert!(matches!(drain(&mut rx).as_slice(), [DevEvent::BuildFailed { stage, .. }] if stage == "styles"));

    write(temp.path(), "src/scss/style.scss", "body { margin: 0; }\n");
    let fixed = watcher.handle_changes(std::slice::from_ref(&entry));
    assert!(!fixed[0].status.is_failure());
    assert_eq!(drain(&mut rx), vec![DevEvent::Rebuilt { stage: "styles".to_string() }]);
}

#[test]
fn test_watch_follows_configured_style_entry() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/styles/main.scss", "@import \"blocks/card\";\n");
    write(temp.path(), "src/styles/blocks/_card.scss", ".card { color: red; }\n");
    let mut config = test_config();
    config.styles.entry = "styles/main.scss".to_string();

    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut watcher = watcher_with(temp.path(), config, &bus);

    write(temp.path(), "src/styles/blocks/_card.scss", ".card { color: blue; }\n");
    let results = watcher.handle_changes(&[temp.path().join("src/styles/blocks/_card.scss")]);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].stage, "styles");
    assert_eq!(drain(&mut rx), vec![DevEvent::Rebuilt { stage: "styles".to_string() }]);
    let css = fs::read_to_string(temp.path().join("dist/assets/css/main.min.css")).unwrap();
    assert!(css.contains(".card{color:#00f}"));
}
