//! End-to-end: catalog on disk → genome → orchestrator → real files.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use kiln_adapters::{Genome, LocalFilesystem, ModuleCatalog, RecordingRunner};
use kiln_core::application::{Orchestrator, RunOptions};
use serde_json::Value;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn seed_catalog(root: &Path) {
    write(
        root,
        "modules/nextjs/module.toml",
        r#"
[module]
id = "nextjs"
category = "framework"
provides = ["foundation", "framework@15.0"]

[blueprint]
name = "Next.js"

[[blueprint.actions]]
type = "CREATE_FILE"
path = "package.json"
content = "{\n  \"name\": \"{{ project.nameKebab }}\"\n}\n"

[[blueprint.actions]]
type = "CREATE_FILE"
path = "next.config.mjs"
content = "const nextConfig = {\n  reactStrictMode: true,\n};\n\nexport default nextConfig;\n"

[[blueprint.actions]]
type = "CREATE_FILE"
path = "src/app/globals.css"
content = "@tailwind base;\n"
"#,
    );
    write(
        root,
        "modules/sentry/module.toml",
        r#"
[module]
id = "sentry"
category = "tooling"

[[requires]]
name = "framework"
version = "^15"

[[blueprint.actions]]
type = "INSTALL_PACKAGES"
packages = ["@sentry/nextjs@^8"]

[[blueprint.actions]]
type = "WRAP_CONFIG"
path = "next.config.mjs"
wrapper = "withSentryConfig"
import = { from = "@sentry/nextjs", named = ["withSentryConfig"] }
options = { silent = true }

[[blueprint.actions]]
type = "CREATE_FILE"
path = "src/app/globals.css"
content = ".sentry-feedback { display: none; }\n"
conflict = { strategy = "merge", mergeStrategy = "css" }

[[blueprint.actions]]
type = "RUN_COMMAND"
command = "npx @sentry/wizard"
args = ["--quiet"]
"#,
    );
    write(
        root,
        "kiln.toml",
        "[project]\nname = \"Demo Site\"\nroot = \"out\"\n\n[[modules]]\nid = \"sentry\"\n\n[[modules]]\nid = \"nextjs\"\n",
    );
}

#[test]
fn genome_run_writes_real_files() {
    let dir = TempDir::new().unwrap();
    seed_catalog(dir.path());

    let catalog = Arc::new(ModuleCatalog::open(dir.path().join("modules")).unwrap());
    let loaded = Genome::load(dir.path().join("kiln.toml")).unwrap();
    let modules = loaded.genome.select(&catalog).unwrap();
    let project = loaded.project(None);

    let runner = RecordingRunner::new();
    let report = Orchestrator::new(Arc::new(LocalFilesystem::new()), catalog, Arc::new(runner.clone()))
        .run(&modules, &project)
        .unwrap();
    assert!(report.success, "{report:#?}");

    let out = dir.path().join("out");
    let package: Value =
        serde_json::from_str(&fs::read_to_string(out.join("package.json")).unwrap()).unwrap();
    assert_eq!(package["name"], "demo-site");
    assert_eq!(package["dependencies"]["@sentry/nextjs"], "^8");

    let config = fs::read_to_string(out.join("next.config.mjs")).unwrap();
    assert!(config.starts_with("import { withSentryConfig } from \"@sentry/nextjs\";\n"));
    assert!(config.contains("export default withSentryConfig(nextConfig, {\n  silent: true,\n});"));

    let css = fs::read_to_string(out.join("src/app/globals.css")).unwrap();
    assert!(css.starts_with("@tailwind base;\n"));
    assert!(css.contains(".sentry-feedback"));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].cwd, out);
    assert_eq!(calls[0].args, ["@sentry/wizard", "--quiet"]);
}

#[test]
fn dry_run_leaves_disk_untouched() {
    let dir = TempDir::new().unwrap();
    seed_catalog(dir.path());

    let catalog = Arc::new(ModuleCatalog::open(dir.path().join("modules")).unwrap());
    let loaded = Genome::load(dir.path().join("kiln.toml")).unwrap();
    let modules = loaded.genome.select(&catalog).unwrap();

    let report = Orchestrator::new(Arc::new(LocalFilesystem::new()), catalog, Arc::new(RecordingRunner::new()))
        .with_options(RunOptions {
            dry_run: true,
            ..Default::default()
        })
        .run(&modules, &loaded.project(None))
        .unwrap();

    assert!(report.success);
    assert!(report.files().count() >= 3);
    assert!(!dir.path().join("out").exists());
}

#[test]
fn rerun_changes_nothing() {
    let dir = TempDir::new().unwrap();
    seed_catalog(dir.path());
    // Drop the non-idempotent pieces: plain creates and commands.
    write(
        dir.path(),
        "modules/sentry/module.toml",
        r#"
[module]
id = "sentry"

[[blueprint.actions]]
type = "INSTALL_PACKAGES"
packages = ["@sentry/nextjs@^8"]

[[blueprint.actions]]
type = "WRAP_CONFIG"
path = "next.config.mjs"
wrapper = "withSentryConfig"
import = { from = "@sentry/nextjs", named = ["withSentryConfig"] }
"#,
    );
    let out = dir.path().join("out");
    write(&out, "package.json", "{\n  \"name\": \"demo\"\n}\n");
    write(&out, "next.config.mjs", "export default { reactStrictMode: true };\n");

    let catalog = Arc::new(ModuleCatalog::open(dir.path().join("modules")).unwrap());
    let loaded = Genome::load(dir.path().join("kiln.toml")).unwrap();
    let sentry_only: Vec<_> = loaded
        .genome
        .select(&catalog)
        .unwrap()
        .into_iter()
        .filter(|m| m.id.as_str() == "sentry")
        .collect();

    let orchestrator = Orchestrator::new(Arc::new(LocalFilesystem::new()), catalog, Arc::new(RecordingRunner::new()));
    let first = orchestrator.run(&sentry_only, &loaded.project(None)).unwrap();
    assert!(first.success, "{first:#?}");
    let config = fs::read_to_string(out.join("next.config.mjs")).unwrap();

    let second = orchestrator.run(&sentry_only, &loaded.project(None)).unwrap();
    assert!(second.success);
    assert_eq!(second.files().count(), 0);
    assert_eq!(fs::read_to_string(out.join("next.config.mjs")).unwrap(), config);
}
