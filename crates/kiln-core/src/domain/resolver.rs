//! Capability-based dependency resolution.
//!
//! Turns an unordered module selection into an execution order, or into a
//! structured list of everything that is wrong with the selection.
//!
//! ## Algorithm
//!
//! 1. Reject duplicate module ids.
//! 2. Index providers per capability, in declaration order.
//! 3. Flag incompatible providers of the same capability.
//! 4. Match every requirement against the index (`MISSING_CAPABILITY`).
//! 5. Check explicit `dependencies` (`MISSING_MODULE`).
//! 6. Build the graph: requirer → each satisfying provider, explicit
//!    dependencies, and every non-foundation module → each foundation module.
//! 7. Kahn's algorithm; ties broken by declaration order.
//! 8. Whatever Kahn could not place is reported as cycles (`[A, B, A]`).
//!
//! Resolution is pure: the same input always yields the same result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::{debug, instrument};

use super::{CapabilityIndex, Module, ModuleId};

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    MissingCapability,
    ConflictingProviders,
    CircularDependency,
    MissingModule,
    DuplicateModule,
    DuplicateProvider,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCapability => "MISSING_CAPABILITY",
            Self::ConflictingProviders => "CONFLICTING_PROVIDERS",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::MissingModule => "MISSING_MODULE",
            Self::DuplicateModule => "DUPLICATE_MODULE",
            Self::DuplicateProvider => "DUPLICATE_PROVIDER",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One problem found while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,
    /// The module the issue is reported against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Other modules involved: conflicting providers, or the cycle path.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ResolutionIssue {
    fn new(code: IssueCode, severity: Severity, message: String) -> Self {
        Self {
            code,
            severity,
            message,
            module: None,
            capability: None,
            modules: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn module(mut self, id: &ModuleId) -> Self {
        self.module = Some(id.clone());
        self
    }

    fn capability(mut self, name: &str) -> Self {
        self.capability = Some(name.to_string());
        self
    }

    fn involving(mut self, modules: Vec<ModuleId>) -> Self {
        self.modules = modules;
        self
    }

    fn suggest(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

impl fmt::Display for ResolutionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Outcome of a resolution. `execution_order` is empty whenever `errors` is not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    pub execution_order: Vec<Module>,
    pub errors: Vec<ResolutionIssue>,
    pub warnings: Vec<ResolutionIssue>,
}

impl ResolutionResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn order_ids(&self) -> Vec<&ModuleId> {
        self.execution_order.iter().map(|m| &m.id).collect()
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Downgrade `CONFLICTING_PROVIDERS` from error to warning.
    pub allow_conflicts: bool,
    /// Capabilities that may legitimately have several providers.
    pub multi_provider_capabilities: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    options: ResolverOptions,
}

impl DependencyResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    #[instrument(skip_all, fields(modules = modules.len()))]
    pub fn resolve(&self, modules: &[Module]) -> ResolutionResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Unique ids. Later duplicates are dropped from further analysis.
        let mut by_id: HashMap<&ModuleId, usize> = HashMap::new();
        let mut selected: Vec<&Module> = Vec::new();
        for module in modules {
            if by_id.contains_key(&module.id) {
                errors.push(
                    ResolutionIssue::new(
                        IssueCode::DuplicateModule,
                        Severity::Error,
                        format!("Module '{}' is selected more than once", module.id),
                    )
                    .module(&module.id)
                    .suggest(vec!["Remove the duplicate entry from the selection".into()]),
                );
                continue;
            }
            by_id.insert(&module.id, selected.len());
            selected.push(module);
        }

        // 2. Provider index.
        let mut index = CapabilityIndex::default();
        for (i, module) in selected.iter().enumerate() {
            for capability in &module.provides {
                index.insert(module.id.clone(), i, capability.clone());
            }
        }

        // 3. Provider conflicts.
        self.check_providers(&index, &mut errors, &mut warnings);

        // 4-6. Requirements, explicit dependencies, edges.
        // `depends_on[i]` holds the nodes that must run before `i`.
        let mut depends_on: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); selected.len()];

        for (i, module) in selected.iter().enumerate() {
            for requirement in &module.requires {
                let providers: Vec<usize> =
                    index.satisfying(requirement).map(|p| p.index).collect();
                if providers.is_empty() {
                    errors.push(missing_capability(module, requirement, &index));
                    continue;
                }
                depends_on[i].extend(providers.into_iter().filter(|&p| p != i));
            }

            for dependency in &module.dependencies {
                match by_id.get(dependency) {
                    Some(&d) if d != i => {
                        depends_on[i].insert(d);
                    }
                    Some(_) => {}
                    None => errors.push(missing_module(module, dependency, &selected)),
                }
            }
        }

        let foundations: Vec<usize> = selected
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_foundation())
            .map(|(i, _)| i)
            .collect();
        for (i, module) in selected.iter().enumerate() {
            if !module.is_foundation() {
                depends_on[i].extend(foundations.iter().copied());
            }
        }

        // 7. Kahn.
        let (order, remaining) = kahn(&depends_on);

        // 8. Cycles.
        if !remaining.is_empty() {
            for cycle in find_cycles(&depends_on, &remaining) {
                let path: Vec<ModuleId> = cycle.iter().map(|&i| selected[i].id.clone()).collect();
                let rendered = path
                    .iter()
                    .map(ModuleId::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                errors.push(
                    ResolutionIssue::new(
                        IssueCode::CircularDependency,
                        Severity::Error,
                        format!("Circular dependency: {rendered}"),
                    )
                    .module(&path[0])
                    .involving(path)
                    .suggest(vec![
                        "Remove one of the requirements in the cycle".into(),
                        "Or split a module so the shared capability has its own provider".into(),
                    ]),
                );
            }
        }

        let execution_order = if errors.is_empty() {
            order.into_iter().map(|i| selected[i].clone()).collect()
        } else {
            Vec::new()
        };

        debug!(
            ordered = execution_order.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            "Resolution finished"
        );

        ResolutionResult {
            execution_order,
            errors,
            warnings,
        }
    }

    fn check_providers(
        &self,
        index: &CapabilityIndex,
        errors: &mut Vec<ResolutionIssue>,
        warnings: &mut Vec<ResolutionIssue>,
    ) {
        for (name, providers) in index.iter() {
            if providers.len() < 2 || self.options.multi_provider_capabilities.contains(name) {
                continue;
            }

            let ids: Vec<ModuleId> = providers.iter().map(|p| p.module.clone()).collect();
            let listed = ids
                .iter()
                .map(ModuleId::as_str)
                .collect::<Vec<_>>()
                .join(", ");

            let incompatible = providers.iter().enumerate().any(|(i, a)| {
                providers[i + 1..].iter().any(|b| {
                    match (a.capability.version(), b.capability.version()) {
                        (Some(va), Some(vb)) => !va.is_compatible_with(vb),
                        _ => false,
                    }
                })
            });

            if incompatible {
                let severity = if self.options.allow_conflicts {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                let versions = providers
                    .iter()
                    .map(|p| format!("{} ({})", p.module, p.capability))
                    .collect::<Vec<_>>()
                    .join(", ");
                let issue = ResolutionIssue::new(
                    IssueCode::ConflictingProviders,
                    severity,
                    format!("Capability '{name}' has incompatible providers: {versions}"),
                )
                .module(&ids[0])
                .capability(name)
                .involving(ids)
                .suggest(vec![
                    format!("Keep only one of: {listed}"),
                    "Or pass --allow-conflicts to proceed anyway".into(),
                ]);
                match severity {
                    Severity::Error => errors.push(issue),
                    Severity::Warning => warnings.push(issue),
                }
            } else {
                warnings.push(
                    ResolutionIssue::new(
                        IssueCode::DuplicateProvider,
                        Severity::Warning,
                        format!("Capability '{name}' is provided by several modules: {listed}"),
                    )
                    .module(&ids[0])
                    .capability(name)
                    .involving(ids),
                );
            }
        }
    }
}

// ============================================================================
// Issue builders
// ============================================================================

fn missing_capability(
    module: &Module,
    requirement: &super::CapabilityRequirement,
    index: &CapabilityIndex,
) -> ResolutionIssue {
    let mut suggestions = Vec::new();

    for provider in index.providers(&requirement.name) {
        suggestions.push(format!(
            "'{}' provides {} but '{}' requires {}",
            provider.module, provider.capability, module.id, requirement.range
        ));
    }

    for name in index.names() {
        if name != requirement.name && is_similar(name, &requirement.name) {
            let providers = index
                .providers(name)
                .iter()
                .map(|p| p.module.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            suggestions.push(format!("Did you mean '{name}'? (provided by {providers})"));
        }
    }

    if suggestions.is_empty() {
        suggestions.push(format!(
            "Add a module that provides '{}'",
            requirement.name
        ));
    }

    ResolutionIssue::new(
        IssueCode::MissingCapability,
        Severity::Error,
        format!(
            "Module '{}' requires '{}' but no selected module provides it",
            module.id, requirement
        ),
    )
    .module(&module.id)
    .capability(&requirement.name)
    .suggest(suggestions)
}

fn missing_module(module: &Module, dependency: &ModuleId, selected: &[&Module]) -> ResolutionIssue {
    let mut suggestions: Vec<String> = selected
        .iter()
        .filter(|m| is_similar(m.id.as_str(), dependency.as_str()))
        .map(|m| format!("Did you mean '{}'?", m.id))
        .collect();
    suggestions.push(format!("Add '{dependency}' to the module selection"));

    ResolutionIssue::new(
        IssueCode::MissingModule,
        Severity::Error,
        format!(
            "Module '{}' depends on '{}', which is not selected",
            module.id, dependency
        ),
    )
    .module(&module.id)
    .involving(vec![dependency.clone()])
    .suggest(suggestions)
}

// ============================================================================
// Graph helpers
// ============================================================================

/// Kahn's algorithm over `depends_on`. Returns (order, unplaced nodes).
fn kahn(depends_on: &[BTreeSet<usize>]) -> (Vec<usize>, BTreeSet<usize>) {
    let n = depends_on.len();
    let mut in_degree: Vec<usize> = depends_on.iter().map(BTreeSet::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, deps) in depends_on.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    let placed: BTreeSet<usize> = order.iter().copied().collect();
    let remaining = (0..n).filter(|i| !placed.contains(i)).collect();
    (order, remaining)
}

/// Distinct elementary cycles among `remaining`, each closed (`[a, b, a]`).
///
/// Depth-first from each unvisited node in declaration order; every back
/// edge closes one cycle. Rotations of the same cycle are reported once.
fn find_cycles(depends_on: &[BTreeSet<usize>], remaining: &BTreeSet<usize>) -> Vec<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        node: usize,
        depends_on: &[BTreeSet<usize>],
        remaining: &BTreeSet<usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        seen: &mut BTreeSet<Vec<usize>>,
        cycles: &mut Vec<Vec<usize>>,
    ) {
        marks[node] = Mark::OnStack;
        stack.push(node);

        for &next in &depends_on[node] {
            if !remaining.contains(&next) {
                continue;
            }
            match marks[next] {
                Mark::Unvisited => {
                    visit(next, depends_on, remaining, marks, stack, seen, cycles);
                }
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let cycle: Vec<usize> = stack[start..].to_vec();
                    if seen.insert(canonical(&cycle)) {
                        let mut closed = cycle;
                        closed.push(next);
                        cycles.push(closed);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
    }

    let mut marks = vec![Mark::Unvisited; depends_on.len()];
    let mut stack = Vec::new();
    let mut seen = BTreeSet::new();
    let mut cycles = Vec::new();

    for &node in remaining {
        if marks[node] == Mark::Unvisited {
            visit(
                node,
                depends_on,
                remaining,
                &mut marks,
                &mut stack,
                &mut seen,
                &mut cycles,
            );
        }
    }
    cycles
}

/// Rotate a cycle so it starts at its smallest node.
fn canonical(cycle: &[usize]) -> Vec<usize> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map_or(0, |(i, _)| i);
    cycle[pivot..].iter().chain(&cycle[..pivot]).copied().collect()
}

fn is_similar(a: &str, b: &str) -> bool {
    let (a, b) = (a.to_ascii_lowercase(), b.to_ascii_lowercase());
    a.contains(&b) || b.contains(&a) || edit_distance(&a, &b) <= 2
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

/// Group issues by code, for summaries.
pub fn count_by_code(issues: &[ResolutionIssue]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.code.as_str()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, provides: &[&str], requires: &[&str]) -> Module {
        let mut builder = Module::builder(id);
        for p in provides {
            builder = builder.provides(*p);
        }
        for r in requires {
            builder = builder.requires(*r);
        }
        builder.build().unwrap()
    }

    fn ids(result: &ResolutionResult) -> Vec<&str> {
        result.execution_order.iter().map(|m| m.id.as_str()).collect()
    }

    fn resolve(modules: &[Module]) -> ResolutionResult {
        DependencyResolver::default().resolve(modules)
    }

    #[test]
    fn orders_providers_before_requirers() {
        let result = resolve(&[
            module("auth", &["auth"], &["database"]),
            module("orm", &["database@1.0"], &[]),
        ]);
        assert!(result.is_success());
        assert_eq!(ids(&result), ["orm", "auth"]);
    }

    #[test]
    fn foundation_runs_first() {
        let result = resolve(&[
            module("ui", &["ui"], &["foundation"]),
            module("orm", &["database@1.0"], &["foundation"]),
            module("framework", &["foundation"], &[]),
        ]);
        assert!(result.is_success());
        assert_eq!(ids(&result)[0], "framework");
        assert_eq!(ids(&result), ["framework", "ui", "orm"]);
    }

    #[test]
    fn foundation_precedes_modules_that_do_not_require_it() {
        let result = resolve(&[
            module("docs", &[], &[]),
            module("framework", &["foundation"], &[]),
        ]);
        assert_eq!(ids(&result), ["framework", "docs"]);
    }

    #[test]
    fn ties_keep_declaration_order() {
        let result = resolve(&[
            module("c", &[], &[]),
            module("a", &[], &[]),
            module("b", &[], &[]),
        ]);
        assert_eq!(ids(&result), ["c", "a", "b"]);
    }

    #[test]
    fn two_node_cycle_is_reported_once_with_full_path() {
        let result = resolve(&[module("A", &["x"], &["y"]), module("B", &["y"], &["x"])]);

        assert!(result.execution_order.is_empty());
        let cycles: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == IssueCode::CircularDependency)
            .collect();
        assert_eq!(cycles.len(), 1);
        let path: Vec<&str> = cycles[0].modules.iter().map(ModuleId::as_str).collect();
        assert_eq!(path, ["A", "B", "A"]);
    }

    #[test]
    fn separate_cycles_are_reported_separately() {
        let result = resolve(&[
            module("a", &["a"], &["b"]),
            module("b", &["b"], &["a"]),
            module("c", &["c"], &["d"]),
            module("d", &["d"], &["c"]),
        ]);
        let cycles = result
            .errors
            .iter()
            .filter(|e| e.code == IssueCode::CircularDependency)
            .count();
        assert_eq!(cycles, 2);
    }

    #[test]
    fn incompatible_providers_conflict() {
        let result = resolve(&[
            module("drizzle", &["database@^1.0"], &[]),
            module("prisma", &["database@^2.0"], &[]),
        ]);

        let issue = result
            .errors
            .iter()
            .find(|e| e.code == IssueCode::ConflictingProviders)
            .expect("conflict reported");
        let involved: Vec<&str> = issue.modules.iter().map(ModuleId::as_str).collect();
        assert_eq!(involved, ["drizzle", "prisma"]);
        assert!(result.execution_order.is_empty());
    }

    #[test]
    fn allow_conflicts_downgrades_to_warning() {
        let resolver = DependencyResolver::new(ResolverOptions {
            allow_conflicts: true,
            ..ResolverOptions::default()
        });
        let result = resolver.resolve(&[
            module("drizzle", &["database@1.0"], &[]),
            module("prisma", &["database@2.0"], &[]),
        ]);
        assert!(result.is_success());
        assert_eq!(result.warnings[0].code, IssueCode::ConflictingProviders);
    }

    #[test]
    fn compatible_duplicates_warn_unless_multi_provider() {
        let modules = [
            module("eslint", &["lint@1.0"], &[]),
            module("biome", &["lint@1.2"], &[]),
        ];
        let result = resolve(&modules);
        assert!(result.is_success());
        assert_eq!(result.warnings[0].code, IssueCode::DuplicateProvider);

        let resolver = DependencyResolver::new(ResolverOptions {
            multi_provider_capabilities: BTreeSet::from(["lint".to_string()]),
            ..ResolverOptions::default()
        });
        assert!(resolver.resolve(&modules).warnings.is_empty());
    }

    #[test]
    fn missing_capability_suggests_similar_names_and_versions() {
        let result = resolve(&[
            module("auth", &[], &["databse", "cache@^2"]),
            module("orm", &["database@1.0"], &[]),
            module("redis", &["cache@1.0"], &[]),
        ]);

        let missing: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == IssueCode::MissingCapability)
            .collect();
        assert_eq!(missing.len(), 2);
        assert!(missing[0].suggestions.iter().any(|s| s.contains("'database'")));
        assert!(missing[1].suggestions.iter().any(|s| s.contains("redis")));
    }

    #[test]
    fn explicit_dependencies_order_and_validate() {
        let ok = resolve(&[
            Module::builder("seed").depends_on("schema").build().unwrap(),
            Module::builder("schema").build().unwrap(),
        ]);
        assert_eq!(ids(&ok), ["schema", "seed"]);

        let missing = resolve(&[Module::builder("seed").depends_on("schemaa").build().unwrap()]);
        assert_eq!(missing.errors[0].code, IssueCode::MissingModule);
    }

    #[test]
    fn duplicate_module_ids_are_errors() {
        let result = resolve(&[module("a", &[], &[]), module("a", &[], &[])]);
        assert_eq!(result.errors[0].code, IssueCode::DuplicateModule);
        assert!(result.execution_order.is_empty());
    }

    #[test]
    fn self_requirement_is_ignored() {
        let result = resolve(&[module("a", &["x"], &["x"])]);
        assert!(result.is_success());
    }

    #[test]
    fn resolution_is_deterministic() {
        let modules = [
            module("ui", &["ui"], &["foundation"]),
            module("framework", &["foundation"], &[]),
            module("auth", &["auth"], &["database"]),
            module("orm", &["database@1.0"], &["foundation"]),
        ];
        assert_eq!(resolve(&modules), resolve(&modules));
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("database", "databse"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
    }
}
