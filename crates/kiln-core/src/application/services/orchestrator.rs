//! Orchestrator: resolve the module selection, then run each blueprint.
//!
//! ```text
//!   modules ─► DependencyResolver ─► execution order
//!                                        │
//!            ┌───────────────────────────┘
//!            ▼
//!   for each module:  load blueprint ─► interpret ─► flush (per-module scope)
//!                                              │
//!                                              └─► ModuleReport
//! ```
//!
//! Resolution problems are fatal and touch nothing. After that, a failing
//! module is reported and not flushed; the loop carries on unless asked to
//! halt, a command escalated with `abortRun`, or the run was cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    application::{
        ApplicationError,
        modifiers::ModifierRegistry,
        ports::{BlueprintStore, CommandRunner, Filesystem},
        services::{
            interpreter::{
                BlueprintInterpreter, CancellationToken, ExecutionResult, FileChange,
                InterpreterOptions,
            },
            vfs::VirtualFileSystem,
        },
    },
    domain::{
        DependencyResolver, Module, ModuleId, ProjectSettings, ResolutionIssue, ResolverOptions,
        TemplateContext,
    },
    error::{KilnError, KilnResult},
};

/// Where staged writes live between modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VfsScope {
    /// A fresh VFS per module, flushed when the module succeeds.
    #[default]
    PerModule,
    /// One VFS for the whole run, flushed once at the end unless the run
    /// was cancelled.
    Shared,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub halt_on_failure: bool,
    pub vfs_scope: VfsScope,
    pub module_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
    pub resolver: ResolverOptions,
}

/// Serializable form of a `KilnError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<&KilnError> for ErrorReport {
    fn from(error: &KilnError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            suggestions: error.suggestions(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub module_id: ModuleId,
    pub success: bool,
    pub files: Vec<FileChange>,
    pub errors: Vec<ErrorReport>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub execution_order: Vec<ModuleId>,
    pub resolution_warnings: Vec<ResolutionIssue>,
    pub modules: Vec<ModuleReport>,
    pub success: bool,
}

impl RunReport {
    pub fn failed_modules(&self) -> impl Iterator<Item = &ModuleReport> {
        self.modules.iter().filter(|m| !m.success)
    }

    /// Every file touched by a successful module.
    pub fn files(&self) -> impl Iterator<Item = &FileChange> {
        self.modules
            .iter()
            .filter(|m| m.success)
            .flat_map(|m| m.files.iter())
    }

    /// Modules that were selected but never ran because the run halted.
    pub fn skipped(&self) -> &[ModuleId] {
        &self.execution_order[self.modules.len().min(self.execution_order.len())..]
    }
}

pub struct Orchestrator {
    fs: Arc<dyn Filesystem>,
    store: Arc<dyn BlueprintStore>,
    runner: Arc<dyn CommandRunner>,
    registry: Arc<ModifierRegistry>,
    options: RunOptions,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        store: Arc<dyn BlueprintStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            fs,
            store,
            runner,
            registry: Arc::new(ModifierRegistry::with_builtins()),
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ModifierRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn registry(&self) -> &ModifierRegistry {
        &self.registry
    }

    /// Resolve only; no blueprint is loaded.
    pub fn plan(&self, modules: &[Module]) -> KilnResult<(Vec<Module>, Vec<ResolutionIssue>)> {
        let resolution = DependencyResolver::new(self.options.resolver.clone()).resolve(modules);
        if !resolution.is_success() {
            return Err(KilnError::Resolution {
                issues: resolution.errors,
            });
        }
        Ok((resolution.execution_order, resolution.warnings))
    }

    #[instrument(skip_all, fields(project = %project.name, modules = modules.len(), dry_run = self.options.dry_run))]
    pub fn run(&self, modules: &[Module], project: &ProjectSettings) -> KilnResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let (order, resolution_warnings) = self.plan(modules)?;
        for warning in &resolution_warnings {
            warn!(code = warning.code.as_str(), "{}", warning.message);
        }
        info!(
            %run_id,
            order = ?order.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            "Resolved execution order"
        );

        let interpreter = BlueprintInterpreter::new(self.registry.clone(), self.runner.clone())
            .with_options(InterpreterOptions {
                dry_run: self.options.dry_run,
                timeout: self.options.module_timeout,
                command_timeout: self.options.command_timeout,
            })
            .with_cancellation(self.cancel.clone());

        let root = PathBuf::from(&project.root);
        let mut shared = VirtualFileSystem::new(&root, self.fs.clone());
        let mut reports = Vec::with_capacity(order.len());

        for module in &order {
            if self.cancel.is_cancelled() {
                reports.push(failed_report(module, ApplicationError::Cancelled.into(), 0));
                break;
            }

            let started = Instant::now();
            let mut scoped;
            let vfs = match self.options.vfs_scope {
                VfsScope::Shared => &mut shared,
                VfsScope::PerModule => {
                    scoped = VirtualFileSystem::new(&root, self.fs.clone());
                    &mut scoped
                }
            };
            vfs.set_owner(Some(module.id.clone()));

            let outcome = self.run_module(&interpreter, module, project, vfs);
            let halt = (self.options.halt_on_failure && !outcome.success)
                || outcome.abort_run
                || self.cancel.is_cancelled();

            let mut report = module_report(module, outcome, started.elapsed());
            if report.success && self.options.vfs_scope == VfsScope::PerModule && !self.options.dry_run {
                flush(vfs, &mut report);
            }

            log_module(&report);
            reports.push(report);
            if halt {
                warn!(module = %module.id, "Halting run");
                break;
            }
        }

        // A failed module already rolled back its own writes, so the shared
        // VFS holds only the work of modules that succeeded.
        if self.options.vfs_scope == VfsScope::Shared && !self.options.dry_run {
            if self.cancel.is_cancelled() {
                debug!("Shared VFS discarded after cancellation");
                shared.discard();
            } else {
                flush_shared(&mut shared, &mut reports);
            }
        }
        let success = reports.iter().all(|r| r.success) && reports.len() == order.len();

        let report = RunReport {
            run_id,
            started_at,
            dry_run: self.options.dry_run,
            execution_order: order.iter().map(|m| m.id.clone()).collect(),
            resolution_warnings,
            modules: reports,
            success,
        };
        info!(
            success = report.success,
            files = report.files().count(),
            failed = report.failed_modules().count(),
            "Run finished"
        );
        Ok(report)
    }

    fn run_module(
        &self,
        interpreter: &BlueprintInterpreter,
        module: &Module,
        project: &ProjectSettings,
        vfs: &mut VirtualFileSystem,
    ) -> ExecutionResult {
        let blueprint = match self.store.load(&module.id) {
            Ok(blueprint) => blueprint,
            Err(error) => {
                return ExecutionResult {
                    errors: vec![error],
                    ..ExecutionResult::default()
                };
            }
        };
        debug!(module = %module.id, actions = blueprint.actions.len(), "Loaded blueprint");
        let context = TemplateContext::new(project, module);
        interpreter.execute(&blueprint, &context, vfs)
    }
}

fn module_report(module: &Module, outcome: ExecutionResult, elapsed: Duration) -> ModuleReport {
    ModuleReport {
        module_id: module.id.clone(),
        success: outcome.success,
        files: outcome.files,
        errors: outcome.errors.iter().map(ErrorReport::from).collect(),
        warnings: outcome.warnings,
        duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}

fn failed_report(module: &Module, error: KilnError, duration_ms: u64) -> ModuleReport {
    ModuleReport {
        module_id: module.id.clone(),
        success: false,
        files: Vec::new(),
        errors: vec![ErrorReport::from(&error)],
        warnings: Vec::new(),
        duration_ms,
    }
}

fn flush_error(path: &str, error: &KilnError) -> KilnError {
    ApplicationError::FilesystemError {
        path: PathBuf::from(path),
        reason: error.to_string(),
    }
    .into()
}

fn flush(vfs: &mut VirtualFileSystem, report: &mut ModuleReport) {
    let flushed = vfs.flush_to_disk();
    if flushed.is_success() {
        return;
    }
    report.success = false;
    for (path, error) in &flushed.failed {
        report
            .errors
            .push(ErrorReport::from(&flush_error(path.as_str(), error)));
    }
}

/// Flush the shared VFS, charging each failed path to the module that wrote it.
fn flush_shared(shared: &mut VirtualFileSystem, reports: &mut [ModuleReport]) {
    let flushed = shared.flush_to_disk();
    for (path, error) in &flushed.failed {
        let origin = shared.entry(path).and_then(|e| e.origin.clone());
        let index = origin
            .and_then(|id| reports.iter().position(|r| r.module_id == id))
            .or_else(|| reports.len().checked_sub(1));
        if let Some(report) = index.and_then(|i| reports.get_mut(i)) {
            report.success = false;
            report
                .errors
                .push(ErrorReport::from(&flush_error(path.as_str(), error)));
        }
    }
}

fn log_module(report: &ModuleReport) {
    if report.success {
        info!(
            module = %report.module_id,
            files = report.files.len(),
            warnings = report.warnings.len(),
            duration_ms = report.duration_ms,
            "Module applied"
        );
    } else {
        for error in &report.errors {
            warn!(module = %report.module_id, code = %error.code, "{}", error.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::{FakeFilesystem, FakeStore, ScriptedRunner};
    use crate::domain::{ActionKind, Blueprint, BlueprintAction};
    use serde_json::json;

    fn create(path: &str, content: &str) -> BlueprintAction {
        ActionKind::CreateFile {
            path: path.into(),
            content: content.into(),
            conflict: None,
        }
        .into()
    }

    fn project() -> ProjectSettings {
        ProjectSettings {
            name: "demo".into(),
            root: "/project".into(),
            ..Default::default()
        }
    }

    fn modules() -> Vec<Module> {
        vec![
            Module::builder("auth").requires("database").build().unwrap(),
            Module::builder("drizzle").provides("database").build().unwrap(),
        ]
    }

    fn store() -> FakeStore {
        FakeStore::default()
            .with("drizzle", Blueprint::new("drizzle", vec![create("src/db.ts", "// {{ project.name }}")]))
            .with(
                "auth",
                Blueprint::new(
                    "auth",
                    vec![
                        create("src/auth.ts", "import \"./db\";"),
                        ActionKind::InstallPackages {
                            packages: vec!["better-auth@^1.0.0".into()],
                            dev: false,
                        }
                        .into(),
                    ],
                ),
            )
    }

    fn orchestrator(fs: &Arc<FakeFilesystem>, store: FakeStore, code: i32) -> Orchestrator {
        Orchestrator::new(fs.clone(), Arc::new(store), ScriptedRunner::exiting_with(code))
    }

    #[test]
    fn runs_in_dependency_order_and_flushes() {
        let fs = Arc::new(FakeFilesystem::default());
        let report = orchestrator(&fs, store(), 0).run(&modules(), &project()).unwrap();

        assert!(report.success);
        let order: Vec<&str> = report.execution_order.iter().map(ModuleId::as_str).collect();
        assert_eq!(order, ["drizzle", "auth"]);
        assert_eq!(fs.read("/project/src/db.ts").as_deref(), Some("// demo"));
        assert!(fs.read("/project/package.json").unwrap().contains("better-auth"));
        assert_eq!(report.files().count(), 3);
    }

    #[test]
    fn resolution_errors_are_fatal_and_touch_nothing() {
        let fs = Arc::new(FakeFilesystem::default());
        let only_auth = vec![Module::builder("auth").requires("database").build().unwrap()];
        let err = orchestrator(&fs, store(), 0).run(&only_auth, &project()).unwrap_err();

        assert_eq!(err.code(), "MISSING_CAPABILITY");
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn failed_module_is_not_flushed_and_loop_continues() {
        let fs = Arc::new(FakeFilesystem::default());
        let store = FakeStore::default()
            .with("drizzle", Blueprint::new("drizzle", vec![create("a.txt", "1"), create("a.txt", "2")]))
            .with("auth", Blueprint::new("auth", vec![create("b.txt", "ok")]));

        let report = orchestrator(&fs, store, 0).run(&modules(), &project()).unwrap();

        assert!(!report.success);
        assert_eq!(report.modules.len(), 2);
        assert_eq!(report.modules[0].errors[0].code, "FILE_ALREADY_EXISTS");
        assert!(fs.read("/project/a.txt").is_none());
        assert_eq!(fs.read("/project/b.txt").as_deref(), Some("ok"));
    }

    #[test]
    fn halt_on_failure_stops_after_first_failure() {
        let fs = Arc::new(FakeFilesystem::default());
        let store = FakeStore::default().with("auth", Blueprint::new("auth", vec![create("b.txt", "ok")]));

        let report = orchestrator(&fs, store, 0)
            .with_options(RunOptions {
                halt_on_failure: true,
                ..Default::default()
            })
            .run(&modules(), &project())
            .unwrap();

        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].errors[0].code, "BLUEPRINT_NOT_FOUND");
        assert_eq!(report.skipped().len(), 1);
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn abort_run_command_stops_the_loop() {
        let fs = Arc::new(FakeFilesystem::default());
        let store = store().with(
            "drizzle",
            Blueprint::new(
                "drizzle",
                vec![
                    ActionKind::RunCommand {
                        command: "npx drizzle-kit generate".into(),
                        args: vec![],
                        cwd: None,
                        env: Default::default(),
                        abort_run: true,
                    }
                    .into(),
                ],
            ),
        );

        let report = orchestrator(&fs, store, 1).run(&modules(), &project()).unwrap();
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].errors[0].code, "COMMAND_FAILED");
    }

    #[test]
    fn dry_run_never_flushes() {
        let fs = Arc::new(FakeFilesystem::default());
        let report = orchestrator(&fs, store(), 0)
            .with_options(RunOptions {
                dry_run: true,
                ..Default::default()
            })
            .run(&modules(), &project())
            .unwrap();

        assert!(report.success);
        assert_eq!(report.files().count(), 3);
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn shared_scope_flushes_once_at_the_end() {
        let fs = Arc::new(FakeFilesystem::default());
        let store = FakeStore::default()
            .with("drizzle", Blueprint::new("drizzle", vec![create("a.txt", "a")]))
            .with(
                "auth",
                Blueprint::new(
                    "auth",
                    vec![ActionKind::AppendToFile {
                        path: "a.txt".into(),
                        content: "b".into(),
                    }
                    .into()],
                ),
            );

        let report = orchestrator(&fs, store, 0)
            .with_options(RunOptions {
                vfs_scope: VfsScope::Shared,
                ..Default::default()
            })
            .run(&modules(), &project())
            .unwrap();

        assert!(report.success);
        assert_eq!(fs.read("/project/a.txt").as_deref(), Some("ab"));
    }

    #[test]
    fn shared_scope_keeps_work_of_modules_that_succeeded() {
        let fs = Arc::new(FakeFilesystem::default());
        let store = FakeStore::default()
            .with("drizzle", Blueprint::new("drizzle", vec![create("ok.txt", "db")]))
            .with(
                "auth",
                Blueprint::new("auth", vec![create("auth.txt", "1"), create("auth.txt", "2")]),
            );

        let report = orchestrator(&fs, store, 0)
            .with_options(RunOptions {
                vfs_scope: VfsScope::Shared,
                ..Default::default()
            })
            .run(&modules(), &project())
            .unwrap();

        assert!(!report.success);
        assert!(report.modules[0].success);
        assert_eq!(report.modules[1].errors[0].code, "FILE_ALREADY_EXISTS");
        assert_eq!(fs.read("/project/ok.txt").as_deref(), Some("db"));
        assert!(fs.read("/project/auth.txt").is_none());
    }

    #[test]
    fn cancelled_run_reports_cancelled() {
        let fs = Arc::new(FakeFilesystem::default());
        let token = CancellationToken::new();
        token.cancel();

        let report = orchestrator(&fs, store(), 0)
            .with_cancellation(token)
            .run(&modules(), &project())
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.modules[0].errors[0].code, "CANCELLED");
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn report_serializes_camel_case() {
        let fs = Arc::new(FakeFilesystem::default());
        let report = orchestrator(&fs, store(), 0).run(&modules(), &project()).unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["executionOrder"], json!(["drizzle", "auth"]));
        assert_eq!(value["modules"][0]["moduleId"], json!("drizzle"));
        assert_eq!(value["modules"][0]["files"][0], json!({"path": "src/db.ts", "change": "created"}));
        assert!(value["runId"].is_string());
    }
}
