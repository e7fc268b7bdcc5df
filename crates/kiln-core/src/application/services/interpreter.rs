//! Blueprint interpreter: runs one module's actions against a VFS.
//!
//! Actions run strictly in order and the first failure stops the blueprint.
//! The VFS is snapshotted before the first action and restored on failure,
//! so a failed blueprint leaves nothing staged.
//!
//! Every action kind is lowered to either a VFS primitive, a modifier call
//! or an external command:
//!
//! ```text
//!   INSTALL_PACKAGES, ADD_SCRIPT ─► package-json-merger
//!   ADD_ENV_VAR ──────────────────► dotenv-merger
//!   CREATE_FILE ──────────────────► write_file / conflict resolver
//!   APPEND_TO_FILE, PREPEND_... ──► VFS primitive
//!   RUN_COMMAND ──────────────────► CommandRunner (skipped in dry runs)
//!   MERGE_JSON ───────────────────► json-merge
//!   ADD_IMPORT ───────────────────► ts-module-enhancer
//!   ENHANCE_FILE ─────────────────► any registered modifier
//!   MERGE_CONFIG ─────────────────► json-merge | js-config-merger
//!   WRAP_CONFIG ──────────────────► js-config-wrapper
//!   EXTEND_SCHEMA ────────────────► schema-extender
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::{
    application::{
        ApplicationError,
        modifiers::{ModifierOutcome, ModifierRegistry},
        ports::{CommandRunner, CommandSpec},
        services::{
            conflict::{ConflictResolver, Resolution},
            vfs::{ChangeKind, VirtualFileSystem},
        },
    },
    domain::{ActionKind, Blueprint, BlueprintAction, MissingFilePolicy, RelativePath, TemplateContext},
    error::{KilnError, KilnResult},
};

/// Cooperative cancellation, checked between actions.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InterpreterOptions {
    /// Skip `RUN_COMMAND` actions (with a warning).
    pub dry_run: bool,
    /// Budget for one blueprint, checked before each action.
    pub timeout: Option<Duration>,
    /// Kill commands that run longer than this.
    pub command_timeout: Option<Duration>,
}

/// A file the blueprint staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: RelativePath,
    pub change: ChangeKind,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub files: Vec<FileChange>,
    pub errors: Vec<KilnError>,
    pub warnings: Vec<String>,
    /// A failing `RUN_COMMAND` asked to stop the whole run.
    pub abort_run: bool,
}

pub struct BlueprintInterpreter {
    registry: Arc<ModifierRegistry>,
    runner: Arc<dyn CommandRunner>,
    conflicts: ConflictResolver,
    options: InterpreterOptions,
    cancel: CancellationToken,
}

impl BlueprintInterpreter {
    pub fn new(registry: Arc<ModifierRegistry>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            registry,
            runner,
            conflicts: ConflictResolver::new(),
            options: InterpreterOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: InterpreterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[instrument(skip_all, fields(blueprint = %blueprint.id, actions = blueprint.actions.len()))]
    pub fn execute(
        &self,
        blueprint: &Blueprint,
        context: &TemplateContext,
        vfs: &mut VirtualFileSystem,
    ) -> ExecutionResult {
        let snapshot = vfs.snapshot();
        let mut run = Run {
            interpreter: self,
            vfs,
            touched: BTreeSet::new(),
            warnings: Vec::new(),
            abort_run: false,
            started: Instant::now(),
        };

        let outcome = blueprint
            .validate()
            .map_err(KilnError::from)
            .and_then(|()| run.actions(blueprint, context));

        let files = run
            .touched
            .iter()
            .filter_map(|path| {
                run.vfs.entry(path).map(|entry| FileChange {
                    path: path.clone(),
                    change: entry.change_kind(),
                })
            })
            .collect();
        let warnings = std::mem::take(&mut run.warnings);
        let abort_run = run.abort_run;

        match outcome {
            Ok(()) => ExecutionResult {
                success: true,
                files,
                errors: Vec::new(),
                warnings,
                abort_run: false,
            },
            Err(error) => {
                warn!(error = %error, code = error.code(), "Blueprint failed, rolling back staged writes");
                vfs.restore(snapshot);
                ExecutionResult {
                    success: false,
                    files,
                    errors: vec![error],
                    warnings,
                    abort_run,
                }
            }
        }
    }
}

/// State for one `execute` call.
struct Run<'a> {
    interpreter: &'a BlueprintInterpreter,
    vfs: &'a mut VirtualFileSystem,
    touched: BTreeSet<RelativePath>,
    warnings: Vec<String>,
    abort_run: bool,
    started: Instant,
}

impl Run<'_> {
    fn actions(&mut self, blueprint: &Blueprint, context: &TemplateContext) -> KilnResult<()> {
        for (index, action) in blueprint.actions.iter().enumerate() {
            self.action(action, context).inspect_err(|e| {
                debug!(action = index + 1, kind = action.kind.name(), error = %e, "Action failed");
            })?;
        }
        Ok(())
    }

    fn checkpoint(&self, blueprint_action: &str) -> KilnResult<()> {
        if self.interpreter.cancel.is_cancelled() {
            return Err(ApplicationError::Cancelled.into());
        }
        if let Some(limit) = self.interpreter.options.timeout {
            let elapsed = self.started.elapsed();
            if elapsed >= limit {
                return Err(ApplicationError::Timeout {
                    operation: format!("blueprint before {blueprint_action}"),
                    elapsed,
                }
                .into());
            }
        }
        Ok(())
    }

    fn action(&mut self, action: &BlueprintAction, context: &TemplateContext) -> KilnResult<()> {
        let iterations = match &action.for_each {
            Some(target) => context
                .resolve_array(target)?
                .into_iter()
                .enumerate()
                .map(|(index, item)| context.with_item(item, index))
                .collect(),
            None => vec![context.clone()],
        };

        for ctx in &iterations {
            self.checkpoint(action.kind.name())?;
            if let Some(condition) = &action.condition {
                if !ctx.evaluate_condition(condition)? {
                    debug!(kind = action.kind.name(), condition = %condition, "Condition false, skipped");
                    continue;
                }
            }
            debug!(kind = action.kind.name(), "Running action");
            self.apply(&action.kind, ctx)?;
        }
        Ok(())
    }

    fn path(&self, ctx: &TemplateContext, raw: &str) -> KilnResult<RelativePath> {
        Ok(RelativePath::try_new(ctx.render(raw)?)?)
    }

    fn modify(
        &mut self,
        modifier: &str,
        path: RelativePath,
        params: Map<String, Value>,
        ctx: &TemplateContext,
        fallback: MissingFilePolicy,
    ) -> KilnResult<()> {
        let outcome = self.interpreter.registry.execute_with_fallback(
            modifier, &path, &params, ctx, self.vfs, fallback,
        )?;
        match outcome {
            ModifierOutcome::Changed => {
                self.touched.insert(path);
            }
            ModifierOutcome::Unchanged => {}
            ModifierOutcome::Skipped => self
                .warnings
                .push(format!("Skipped {modifier} on {path}: file not found")),
        }
        Ok(())
    }

    fn apply(&mut self, kind: &ActionKind, ctx: &TemplateContext) -> KilnResult<()> {
        match kind {
            ActionKind::InstallPackages { packages, dev } => {
                let mut deps = Map::new();
                for spec in packages {
                    let (name, version) = split_package_spec(&ctx.render(spec)?);
                    deps.insert(name, Value::String(version));
                }
                let field = if *dev { "devDependencies" } else { "dependencies" };
                let params = object(json!({ field: deps }));
                self.modify("package-json-merger", package_json()?, params, ctx, MissingFilePolicy::Create)
            }

            ActionKind::AddScript { name, command } => {
                let params = object(json!({
                    "scripts": { ctx.render(name)?: ctx.render(command)? }
                }));
                self.modify("package-json-merger", package_json()?, params, ctx, MissingFilePolicy::Create)
            }

            ActionKind::AddEnvVar {
                key,
                value,
                path,
                description,
                overwrite,
            } => {
                let mut params = object(json!({
                    "key": ctx.render(key)?,
                    "value": ctx.render(value)?,
                    "overwrite": overwrite,
                }));
                if let Some(description) = description {
                    params.insert("comment".into(), Value::String(ctx.render(description)?));
                }
                let path = self.path(ctx, path)?;
                self.modify("dotenv-merger", path, params, ctx, MissingFilePolicy::Create)
            }

            ActionKind::CreateFile {
                path,
                content,
                conflict,
            } => {
                let path = self.path(ctx, path)?;
                let content = ctx.render(content)?;
                if !self.vfs.exists(&path) {
                    self.vfs.write_file(&path, content)?;
                    self.touched.insert(path);
                    return Ok(());
                }
                let existing = self.vfs.read_file(&path)?;
                match self
                    .interpreter
                    .conflicts
                    .resolve(&path, &existing, &content, *conflict)?
                {
                    Resolution::Write(merged) => {
                        if merged != existing {
                            self.vfs.put_file(&path, merged);
                            self.touched.insert(path);
                        }
                    }
                    Resolution::Keep { warning } => self.warnings.push(warning),
                }
                Ok(())
            }

            ActionKind::AppendToFile { path, content } => {
                let path = self.path(ctx, path)?;
                self.vfs.append_file(&path, &ctx.render(content)?)?;
                self.touched.insert(path);
                Ok(())
            }

            ActionKind::PrependToFile { path, content } => {
                let path = self.path(ctx, path)?;
                self.vfs.prepend_file(&path, &ctx.render(content)?)?;
                self.touched.insert(path);
                Ok(())
            }

            ActionKind::RunCommand {
                command,
                args,
                cwd,
                env,
                abort_run,
            } => self.run_command(ctx, command, args, cwd.as_deref(), env, *abort_run),

            ActionKind::MergeJson {
                path,
                content,
                deep,
                arrays,
            } => {
                let params = object(json!({
                    "content": ctx.render_value(content)?,
                    "deep": deep,
                    "arrays": arrays,
                }));
                let path = self.path(ctx, path)?;
                self.modify("json-merge", path, params, ctx, MissingFilePolicy::Create)
            }

            ActionKind::AddImport { path, imports } => {
                let imports = ctx.render_value(&to_json(imports)?)?;
                let params = object(json!({ "imports": imports }));
                let path = self.path(ctx, path)?;
                self.modify("ts-module-enhancer", path, params, ctx, MissingFilePolicy::Error)
            }

            ActionKind::EnhanceFile {
                path,
                modifier,
                params,
                fallback,
            } => {
                let params = object(ctx.render_value(&Value::Object(params.clone()))?);
                let path = self.path(ctx, path)?;
                self.modify(modifier, path, params, ctx, *fallback)
            }

            ActionKind::MergeConfig { path, config } => {
                let path = self.path(ctx, path)?;
                let config = ctx.render_value(&Value::Object(config.clone()))?;
                let (modifier, params) = match path.extension().as_deref() {
                    Some("json" | "jsonc") => ("json-merge", object(json!({ "content": config }))),
                    _ => ("js-config-merger", object(json!({ "config": config }))),
                };
                self.modify(modifier, path, params, ctx, MissingFilePolicy::Error)
            }

            ActionKind::WrapConfig {
                path,
                wrapper,
                import,
                options,
                env,
            } => {
                let mut params = object(json!({ "wrapper": ctx.render(wrapper)? }));
                if let Some(import) = import {
                    params.insert("import".into(), ctx.render_value(&to_json(import)?)?);
                }
                if let Some(options) = options {
                    params.insert("options".into(), ctx.render_value(options)?);
                }
                if !env.is_empty() {
                    params.insert("env".into(), ctx.render_value(&Value::Object(env.clone()))?);
                }
                let path = self.path(ctx, path)?;
                self.modify("js-config-wrapper", path, params, ctx, MissingFilePolicy::Error)
            }

            ActionKind::ExtendSchema {
                path,
                definitions,
                imports,
            } => {
                let params = object(json!({
                    "definitions": ctx.render_value(&to_json(definitions)?)?,
                    "imports": ctx.render_value(&to_json(imports)?)?,
                }));
                let path = self.path(ctx, path)?;
                self.modify("schema-extender", path, params, ctx, MissingFilePolicy::Create)
            }
        }
    }

    fn run_command(
        &mut self,
        ctx: &TemplateContext,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &std::collections::BTreeMap<String, String>,
        abort_run: bool,
    ) -> KilnResult<()> {
        let command = ctx.render(command)?;
        let mut args = args
            .iter()
            .map(|a| ctx.render(a))
            .collect::<Result<Vec<_>, _>>()?;

        // `command: "npx drizzle-kit generate"` without `args`.
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or_default().to_string();
        if args.is_empty() {
            args = words.map(str::to_string).collect();
        } else if command.contains(char::is_whitespace) {
            let mut leading: Vec<String> = words.map(str::to_string).collect();
            leading.append(&mut args);
            args = leading;
        }

        if self.interpreter.options.dry_run {
            let rendered = std::iter::once(program.as_str())
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            self.warnings
                .push(format!("Dry run: skipped command `{rendered}`"));
            return Ok(());
        }

        let cwd = match cwd {
            Some(dir) => self.vfs.root().join(self.path(ctx, dir)?.as_path()),
            None => self.vfs.root().to_path_buf(),
        };
        let mut spec = CommandSpec::new(program, cwd).args(args);
        for (key, value) in env {
            spec.env.insert(key.clone(), ctx.render(value)?);
        }
        spec.timeout = self.interpreter.options.command_timeout;

        debug!(command = %spec, "Running command");
        let output = match self.interpreter.runner.run(&spec) {
            Ok(output) => output,
            Err(error) => {
                self.abort_run = abort_run;
                return Err(error);
            }
        };

        if !output.success() {
            self.abort_run = abort_run;
            return Err(ApplicationError::CommandFailed {
                command: spec.to_string(),
                code: output.code,
                stderr: last_lines(&output.stderr, 20),
            }
            .into());
        }
        Ok(())
    }
}

fn package_json() -> KilnResult<RelativePath> {
    Ok(RelativePath::try_new("package.json")?)
}

fn to_json<T: Serialize>(value: &T) -> KilnResult<Value> {
    serde_json::to_value(value).map_err(|e| KilnError::Internal {
        message: format!("failed to serialize action field: {e}"),
    })
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `name@range` → (name, range); scoped names keep their leading `@`.
/// A bare name means `latest`.
pub fn split_package_spec(spec: &str) -> (String, String) {
    let spec = spec.trim();
    match spec.rfind('@') {
        Some(at) if at > 0 => (spec[..at].to_string(), spec[at + 1..].to_string()),
        _ => (spec.to_string(), "latest".to_string()),
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}
