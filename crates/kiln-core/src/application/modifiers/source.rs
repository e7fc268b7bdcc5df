//! Structural model of an ES/TS module, just deep enough for declarative edits.
//!
//! A module is split into top-level items (imports, the default export, named
//! exports, everything else). Each item keeps its exact source text, so
//! printing an unedited file reproduces it byte for byte; only items that an
//! edit touches are re-printed.
//!
//! The scanner understands strings, template literals (with `${}` nesting),
//! comments and bracket depth. It does not understand regex literals; a
//! regex containing an unbalanced bracket or quote can confuse it.
//!
//! [`ObjectLiteral`] does the same for `{ key: value }` literals inside config
//! files, so keys can be added or merged without re-printing the whole object.

use serde_json::Value;

use crate::domain::ImportSpec;

/// Words after which a quote character starts a string literal.
const STRING_KEYWORDS: &[&str] = &[
    "from", "import", "return", "case", "typeof", "in", "of", "export", "default", "yield",
    "await", "else", "void", "throw", "new", "delete", "require",
];

// ============================================================================
// Scanner
// ============================================================================

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
        }
    }

    fn at(&self, i: usize) -> u8 {
        self.bytes.get(i).copied().unwrap_or(0)
    }

    /// Skip whitespace and comments starting at `i`.
    fn skip_trivia(&self, mut i: usize) -> usize {
        loop {
            match self.at(i) {
                b' ' | b'\t' | b'\r' | b'\n' => i += 1,
                b'/' if self.at(i + 1) == b'/' => i = self.line_end(i),
                b'/' if self.at(i + 1) == b'*' => i = self.block_comment_end(i),
                _ => return i,
            }
        }
    }

    fn line_end(&self, i: usize) -> usize {
        self.src[i..].find('\n').map_or(self.bytes.len(), |n| i + n)
    }

    fn block_comment_end(&self, i: usize) -> usize {
        self.src[i + 2..]
            .find("*/")
            .map_or(self.bytes.len(), |n| i + 2 + n + 2)
    }

    fn skip_string(&self, mut i: usize, quote: u8) -> usize {
        i += 1;
        while i < self.bytes.len() {
            match self.at(i) {
                b'\\' => i += 2,
                b'\n' => return i,
                c if c == quote => return i + 1,
                _ => i += 1,
            }
        }
        self.bytes.len()
    }

    fn skip_template(&self, mut i: usize) -> usize {
        i += 1;
        while i < self.bytes.len() {
            match self.at(i) {
                b'\\' => i += 2,
                b'`' => return i + 1,
                b'$' if self.at(i + 1) == b'{' => i = self.skip_balanced(i + 1),
                _ => i += 1,
            }
        }
        self.bytes.len()
    }

    /// `i` points at an opening bracket; returns the index after its match.
    fn skip_balanced(&self, i: usize) -> usize {
        let mut depth = 0usize;
        let mut j = i;
        let mut prev = Prev::default();
        while j < self.bytes.len() {
            let c = self.at(j);
            match c {
                b'/' if self.at(j + 1) == b'/' => {
                    j = self.line_end(j);
                    continue;
                }
                b'/' if self.at(j + 1) == b'*' => {
                    j = self.block_comment_end(j);
                    continue;
                }
                b'\'' | b'"' if prev.allows_string() => {
                    j = self.skip_string(j, c);
                    prev.significant(c);
                    continue;
                }
                b'`' => {
                    j = self.skip_template(j);
                    prev.significant(c);
                    continue;
                }
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return j + 1;
                    }
                }
                _ => {}
            }
            prev.observe(c);
            j += 1;
        }
        self.bytes.len()
    }

    /// Scan one top-level statement starting at `start` (after trivia).
    /// Returns the end of the statement, excluding its line break.
    fn statement_end(&self, start: usize) -> usize {
        let mut depth = 0usize;
        let mut i = start;
        let mut prev = Prev::default();

        while i < self.bytes.len() {
            let c = self.at(i);
            match c {
                b'/' if self.at(i + 1) == b'/' => {
                    i = self.line_end(i);
                    continue;
                }
                b'/' if self.at(i + 1) == b'*' => {
                    i = self.block_comment_end(i);
                    continue;
                }
                b'\'' | b'"' if prev.allows_string() => {
                    i = self.skip_string(i, c);
                    prev.significant(c);
                    continue;
                }
                b'`' => {
                    i = self.skip_template(i);
                    prev.significant(c);
                    continue;
                }
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                b';' if depth == 0 => return i + 1,
                b'\n' if depth == 0 && self.completes_at_newline(prev.last, i) => return i,
                _ => {}
            }
            prev.observe(c);
            i += 1;
        }
        self.bytes.len()
    }

    fn completes_at_newline(&self, last: u8, newline: usize) -> bool {
        if last == 0 || b"=,(+-*/&|?:.<>![{".contains(&last) {
            return false;
        }
        let next = self.skip_trivia(newline);
        if next >= self.bytes.len() {
            return true;
        }
        let rest = &self.src[next..];
        if rest.starts_with("=>") || rest.starts_with("as ") || rest.starts_with("satisfies ") {
            return false;
        }
        !b".?:)]},+-*/&|=".contains(&self.at(next))
    }
}

/// Tracks the previous significant character and word, to tell a string
/// literal from an apostrophe in JSX text (`<p>Don't</p>`).
#[derive(Default)]
struct Prev {
    last: u8,
    word: String,
    /// Whitespace seen since `last`.
    gap: bool,
}

impl Prev {
    fn observe(&mut self, c: u8) {
        if c.is_ascii_whitespace() {
            self.gap = true;
            return;
        }
        if is_ident_byte(c) {
            if self.gap || !is_ident_byte(self.last) {
                self.word.clear();
            }
            self.word.push(c as char);
        } else {
            self.word.clear();
        }
        self.last = c;
        self.gap = false;
    }

    fn significant(&mut self, c: u8) {
        self.word.clear();
        self.last = c;
        self.gap = false;
    }

    fn allows_string(&self) -> bool {
        match self.last {
            0 => true,
            b')' | b']' => false,
            c if is_ident_byte(c) => STRING_KEYWORDS.contains(&self.word.as_str()),
            _ => true,
        }
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Import(ImportDecl),
    /// `export default <expr>`
    ExportDefault,
    /// `module.exports = <expr>`
    ModuleExports,
    /// `export const|function|class|type|... <name>`
    NamedExport(String),
    /// `'use client'`, `"use strict"`
    Directive,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Whitespace and comments before the code.
    pub leading: String,
    pub code: String,
    /// Rest of the line after the code, including the line break.
    pub trailing: String,
    pub kind: ItemKind,
}

impl Item {
    fn new(leading: String, code: String, trailing: String) -> Self {
        let kind = classify(&code);
        Self {
            leading,
            code,
            trailing,
            kind,
        }
    }

    fn set_code(&mut self, code: String) {
        self.kind = classify(&code);
        self.code = code;
    }
}

fn classify(code: &str) -> ItemKind {
    let starts_with_word = |text: &str, word: &str| {
        text.strip_prefix(word)
            .is_some_and(|rest| rest.chars().next().is_none_or(|c| !is_ident_char(c)))
    };

    if starts_with_word(code, "import") && !code[6..].trim_start().starts_with('(') {
        if let Some(decl) = ImportDecl::parse(code) {
            return ItemKind::Import(decl);
        }
    }
    if let Some(rest) = code.strip_prefix("export") {
        let rest = rest.trim_start();
        if starts_with_word(rest, "default") {
            return ItemKind::ExportDefault;
        }
        if let Some(name) = declared_name(rest) {
            return ItemKind::NamedExport(name);
        }
    }
    if code.starts_with("module.exports") {
        return ItemKind::ModuleExports;
    }
    let unquoted = code.trim_end_matches(';');
    if (unquoted.starts_with('\'') || unquoted.starts_with('"'))
        && unquoted.len() > 2
        && unquoted[1..unquoted.len() - 1].starts_with("use ")
    {
        return ItemKind::Directive;
    }
    ItemKind::Other
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Name introduced by a declaration (`const x`, `async function f`, `class C`).
pub(crate) fn declared_name(text: &str) -> Option<String> {
    let mut rest = text.trim_start();
    for modifier in ["declare ", "async ", "abstract "] {
        if let Some(r) = rest.strip_prefix(modifier) {
            rest = r.trim_start();
        }
    }
    for keyword in [
        "const ", "let ", "var ", "function* ", "function ", "class ", "type ", "interface ",
        "enum ",
    ] {
        if let Some(r) = rest.strip_prefix(keyword) {
            let name: String = r.trim_start().chars().take_while(|&c| is_ident_char(c)).collect();
            return (!name.is_empty()).then_some(name);
        }
    }
    None
}

// ============================================================================
// Import declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub source: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    /// Named bindings as written (`a`, `b as c`, `type T`).
    pub named: Vec<String>,
    pub type_only: bool,
    quote: char,
    semicolon: bool,
}

impl ImportDecl {
    pub fn parse(code: &str) -> Option<Self> {
        let semicolon = code.trim_end().ends_with(';');
        let body = code.trim_end().trim_end_matches(';').trim_end();
        let rest = body.strip_prefix("import")?.trim_start();

        // Side-effect import: `import "./globals.css"`
        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let source = rest.trim_matches(quote).to_string();
            return Some(Self {
                source,
                default: None,
                namespace: None,
                named: Vec::new(),
                type_only: false,
                quote,
                semicolon,
            });
        }

        let (type_only, rest) = match rest.strip_prefix("type ") {
            Some(r) => (true, r.trim_start()),
            None => (false, rest),
        };

        let quote_pos = rest.rfind(['"', '\''])?;
        let quote = rest[quote_pos..].chars().next()?;
        let open = rest[..quote_pos].rfind(quote)?;
        let source = rest[open + 1..quote_pos].to_string();
        let clause = rest[..open].trim_end().strip_suffix("from")?.trim();

        let mut decl = Self {
            source,
            default: None,
            namespace: None,
            named: Vec::new(),
            type_only,
            quote,
            semicolon,
        };

        let (head, braces) = match (clause.find('{'), clause.rfind('}')) {
            (Some(a), Some(b)) if a < b => (&clause[..a], Some(&clause[a + 1..b])),
            _ => (clause, None),
        };
        if let Some(inner) = braces {
            decl.named = inner
                .split(',')
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|s| !s.is_empty())
                .collect();
        }
        for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some(ns) = part.strip_prefix('*') {
                decl.namespace = Some(ns.trim().strip_prefix("as")?.trim().to_string());
            } else {
                decl.default = Some(part.to_string());
            }
        }
        Some(decl)
    }

    pub fn from_spec(spec: &ImportSpec, quote: char, semicolon: bool) -> Self {
        Self {
            source: spec.from.clone(),
            default: spec.default.clone(),
            namespace: spec.namespace.clone(),
            named: spec.named.clone(),
            type_only: spec.type_only,
            quote,
            semicolon,
        }
    }

    /// Local binding introduced by a named entry (`b as c` → `c`).
    fn local_name(entry: &str) -> &str {
        let entry = entry.strip_prefix("type ").unwrap_or(entry);
        entry.rsplit(" as ").next().unwrap_or(entry).trim()
    }

    fn has_named(&self, entry: &str) -> bool {
        let wanted = Self::local_name(entry);
        self.named.iter().any(|n| Self::local_name(n) == wanted)
    }

    pub fn is_side_effect(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }

    pub fn render(&self) -> String {
        let q = self.quote;
        let end = if self.semicolon { ";" } else { "" };
        if self.is_side_effect() {
            return format!("import {q}{}{q}{end}", self.source);
        }

        let mut parts = Vec::new();
        if let Some(default) = &self.default {
            parts.push(default.clone());
        }
        if let Some(ns) = &self.namespace {
            parts.push(format!("* as {ns}"));
        }
        if !self.named.is_empty() {
            parts.push(format!("{{ {} }}", self.named.join(", ")));
        }
        let type_kw = if self.type_only { "type " } else { "" };
        format!(
            "import {type_kw}{} from {q}{}{q}{end}",
            parts.join(", "),
            self.source
        )
    }
}

// ============================================================================
// SourceFile
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub items: Vec<Item>,
    /// Trivia after the last item.
    pub tail: String,
}

impl SourceFile {
    pub fn parse(src: &str) -> Self {
        let scanner = Scanner::new(src);
        let mut items = Vec::new();
        let mut pos = 0;

        loop {
            let code_start = scanner.skip_trivia(pos);
            if code_start >= src.len() {
                return Self {
                    items,
                    tail: src[pos..].to_string(),
                };
            }
            let code_end = scanner.statement_end(code_start).max(code_start + 1);

            // Same-line trailing whitespace/comment plus one line break.
            let mut trail_end = code_end;
            while matches!(scanner.at(trail_end), b' ' | b'\t' | b'\r') {
                trail_end += 1;
            }
            if scanner.at(trail_end) == b'/' && scanner.at(trail_end + 1) == b'/' {
                trail_end = scanner.line_end(trail_end);
            }
            if scanner.at(trail_end) == b'\n' {
                trail_end += 1;
            }

            items.push(Item::new(
                src[pos..code_start].to_string(),
                src[code_start..code_end].to_string(),
                src[code_end..trail_end].to_string(),
            ));
            pos = trail_end;
        }
    }

    pub fn print(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            out.push_str(&item.leading);
            out.push_str(&item.code);
            out.push_str(&item.trailing);
        }
        out.push_str(&self.tail);
        out
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportDecl> {
        self.items.iter().filter_map(|i| match &i.kind {
            ItemKind::Import(decl) => Some(decl),
            _ => None,
        })
    }

    /// Quote and semicolon style of the first import, defaulting to `"` and `;`.
    fn import_style(&self) -> (char, bool) {
        self.imports()
            .next()
            .map_or(('"', true), |d| (d.quote, d.semicolon))
    }

    /// Add or merge an import. Returns whether anything changed.
    pub fn add_import(&mut self, spec: &ImportSpec) -> bool {
        let (quote, semicolon) = self.import_style();
        let wanted = ImportDecl::from_spec(spec, quote, semicolon);

        // Merge into an existing declaration for the same source.
        for item in &mut self.items {
            let ItemKind::Import(existing) = &item.kind else {
                continue;
            };
            if existing.source != wanted.source || existing.type_only != wanted.type_only {
                continue;
            }
            if wanted.is_side_effect() {
                return false;
            }
            // Namespace imports cannot share a declaration with named ones.
            if existing.namespace.is_some() != wanted.namespace.is_some()
                && !(wanted.namespace.is_none() && wanted.named.is_empty())
            {
                continue;
            }

            let mut merged = existing.clone();
            let mut changed = false;
            if let Some(default) = &wanted.default {
                if merged.default.is_none() {
                    merged.default = Some(default.clone());
                    changed = true;
                }
            }
            if merged.namespace.is_none() && wanted.namespace.is_some() {
                merged.namespace = wanted.namespace.clone();
                changed = true;
            }
            for name in &wanted.named {
                if !merged.has_named(name) {
                    merged.named.push(name.clone());
                    changed = true;
                }
            }
            if changed {
                item.set_code(merged.render());
            }
            return changed;
        }

        let insert_at = self
            .items
            .iter()
            .rposition(|i| matches!(i.kind, ItemKind::Import(_)))
            .or_else(|| {
                self.items
                    .iter()
                    .rposition(|i| matches!(i.kind, ItemKind::Directive))
            })
            .map_or(0, |p| p + 1);

        let leading = if insert_at == 0 {
            String::new()
        } else if self.items[insert_at - 1].trailing.ends_with('\n') {
            String::new()
        } else {
            "\n".into()
        };
        let new_item = Item::new(leading, wanted.render(), "\n".into());

        // A header comment separated by a blank line (license, file docs)
        // stays at the top; a comment attached to the first statement stays
        // with it.
        if insert_at == 0 {
            if let Some(first) = self.items.first_mut() {
                let leading = std::mem::take(&mut first.leading);
                let (header, rest) = match leading.rfind("\n\n") {
                    Some(i) => leading.split_at(i + 1),
                    None => ("", leading.as_str()),
                };
                let mut new_item = new_item;
                new_item.leading = header.to_string();
                first.leading = if matches!(first.kind, ItemKind::Import(_)) || rest.starts_with('\n') {
                    rest.to_string()
                } else {
                    format!("\n{rest}")
                };
                self.items.insert(0, new_item);
                return true;
            }
        }
        self.items.insert(insert_at, new_item);
        true
    }

    /// Whether a statement equivalent to `code` (ignoring whitespace) exists.
    pub fn contains_statement(&self, code: &str) -> bool {
        let wanted = normalize(code);
        self.items.iter().any(|i| normalize(&i.code) == wanted)
    }

    /// Append a statement at the end of the module, separated by a blank line.
    pub fn append_statement(&mut self, code: &str) {
        let code = code.trim();
        let leading = match self.items.last() {
            None => String::new(),
            Some(last) if last.trailing.ends_with('\n') => "\n".into(),
            Some(_) => "\n\n".into(),
        };
        // Trailing trivia moves after the new statement.
        let tail = std::mem::take(&mut self.tail);
        let leading = if tail.trim().is_empty() {
            leading
        } else {
            format!("{leading}{}", tail.trim_end_matches([' ', '\t']))
        };
        self.items.push(Item::new(leading, code.to_string(), "\n".into()));
    }

    pub fn find(&self, pred: impl Fn(&ItemKind) -> bool) -> Option<usize> {
        self.items.iter().position(|i| pred(&i.kind))
    }

    pub fn item_mut(&mut self, index: usize) -> &mut Item {
        &mut self.items[index]
    }

    /// Replace an item's code, keeping its surrounding trivia.
    pub fn replace_code(&mut self, index: usize, code: String) {
        self.items[index].set_code(code);
    }

    /// Insert a fresh statement right after `index`.
    pub fn insert_after(&mut self, index: usize, code: String) {
        let item = Item::new("\n".into(), code, "\n".into());
        if !self.items[index].trailing.ends_with('\n') {
            self.items[index].trailing.push('\n');
        }
        self.items.insert(index + 1, item);
    }

    /// Index of the top-level `const|let|var <name> = ...` declaration.
    pub fn find_declaration(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| {
            let code = item.code.strip_prefix("export ").unwrap_or(&item.code);
            ["const ", "let ", "var "].iter().any(|kw| {
                code.strip_prefix(kw).is_some_and(|rest| {
                    let ident: String = rest.chars().take_while(|&c| is_ident_char(c)).collect();
                    ident == name
                })
            })
        })
    }
}

/// Split `export default <expr>[;]` / `module.exports = <expr>[;]` into the
/// prefix up to the expression, the expression, and the terminator.
pub fn split_export_expression(code: &str) -> Option<(&str, &str, &str)> {
    let start = if let Some(rest) = code.strip_prefix("export") {
        let rest = rest.trim_start();
        let rest = rest.strip_prefix("default")?;
        code.len() - rest.len()
    } else if let Some(rest) = code.strip_prefix("module.exports") {
        let rest = rest.trim_start().strip_prefix('=')?;
        code.len() - rest.len()
    } else {
        return None;
    };

    let expr_start = start + (code[start..].len() - code[start..].trim_start().len());
    let body = code[expr_start..].trim_end();
    let (expr, end) = match body.strip_suffix(';') {
        Some(e) => (e.trim_end(), ";"),
        None => (body, ""),
    };
    Some((&code[..expr_start], expr, end))
}

/// Whitespace-insensitive form used for "already present" checks.
pub fn normalize(code: &str) -> String {
    code.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `text` is a plain identifier (`nextConfig`).
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(is_ident_char)
}

/// Index just past the bracket that closes the one at `open`.
pub fn balanced_end(text: &str, open: usize) -> usize {
    Scanner::new(text).skip_balanced(open)
}

/// Split a call expression `callee(arg, ...)` that spans all of `expr`.
/// Returns the callee and the byte span of each argument.
pub fn call_arguments(expr: &str) -> Option<(&str, Vec<(usize, usize)>)> {
    let expr_end = expr.trim_end().len();
    let paren = expr.find('(')?;
    let callee = expr[..paren].trim();
    if callee.is_empty() || !callee.split('.').all(is_identifier) {
        return None;
    }
    let scanner = Scanner::new(expr);
    if scanner.skip_balanced(paren) != expr_end {
        return None;
    }

    let close = expr_end - 1;
    let mut args = Vec::new();
    let mut pos = paren + 1;
    loop {
        let start = scanner.skip_trivia(pos);
        if start >= close {
            break;
        }
        let end = ObjectLiteral::property_end(&scanner, start, close);
        args.push((start, start + expr[start..end].trim_end().len()));
        pos = if scanner.at(end) == b',' { end + 1 } else { end };
        if pos >= close {
            break;
        }
    }
    Some((callee, args))
}

/// Offset of the initializer in `const name[: Type] = expr`.
pub fn initializer(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    (1..bytes.len())
        .find(|&i| {
            bytes[i] == b'='
                && !matches!(bytes.get(i + 1), Some(b'>') | Some(b'='))
                && !b"=!<>".contains(&bytes[i - 1])
        })
        .map(|i| {
            let rest = &code[i + 1..];
            i + 1 + (rest.len() - rest.trim_start().len())
        })
}

// ============================================================================
// Object literals
// ============================================================================

/// A property of an object literal, with byte spans into the literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Unquoted key; `None` for spreads, methods and computed keys.
    pub key: Option<String>,
    pub start: usize,
    /// Start and end of the value expression.
    pub value: (usize, usize),
    /// End of the property including a trailing comma, if any.
    pub end: usize,
}

/// `{ ... }` text plus its parsed top-level properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLiteral {
    pub text: String,
    pub properties: Vec<Property>,
}

impl ObjectLiteral {
    /// Parse a literal; `text` must start with `{` and end with `}`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('{') || !text.ends_with('}') {
            return None;
        }
        let scanner = Scanner::new(text);
        if scanner.skip_balanced(0) != text.len() {
            return None;
        }

        let close = text.len() - 1;
        let mut properties = Vec::new();
        let mut pos = 1;
        loop {
            let start = scanner.skip_trivia(pos);
            if start >= close {
                break;
            }
            let end_of_prop = Self::property_end(&scanner, start, close);
            let raw = &text[start..end_of_prop];
            let body = raw.trim_end().trim_end_matches(',').trim_end();
            let key_info = Self::split_key(body);

            let (key, value) = match key_info {
                Some((key, value_offset)) => {
                    let value_start = start + value_offset;
                    let value_start = scanner.skip_trivia(value_start);
                    (Some(key), (value_start, start + body.len()))
                }
                None => (None, (start, start + body.len())),
            };
            let mut end = end_of_prop;
            if scanner.at(end) == b',' {
                end += 1;
            }
            properties.push(Property {
                key,
                start,
                value,
                end,
            });
            pos = end;
            if pos >= close {
                break;
            }
        }

        Some(Self {
            text: text.to_string(),
            properties,
        })
    }

    /// End of a property: the next top-level comma or the closing brace.
    fn property_end(scanner: &Scanner<'_>, start: usize, close: usize) -> usize {
        let mut i = start;
        let mut prev = Prev::default();
        while i < close {
            let c = scanner.at(i);
            match c {
                b'/' if scanner.at(i + 1) == b'/' => {
                    i = scanner.line_end(i);
                    continue;
                }
                b'/' if scanner.at(i + 1) == b'*' => {
                    i = scanner.block_comment_end(i);
                    continue;
                }
                b'\'' | b'"' if prev.allows_string() => {
                    i = scanner.skip_string(i, c);
                    prev.significant(c);
                    continue;
                }
                b'`' => {
                    i = scanner.skip_template(i);
                    prev.significant(c);
                    continue;
                }
                b'(' | b'[' | b'{' => {
                    i = scanner.skip_balanced(i);
                    prev.significant(b')');
                    continue;
                }
                b',' => return i,
                _ => {}
            }
            prev.observe(c);
            i += 1;
        }
        // Trim trailing whitespace before the closing brace.
        let mut end = close;
        while end > start && scanner.at(end - 1).is_ascii_whitespace() {
            end -= 1;
        }
        end
    }

    /// `key: value` → (key, offset of value). Spreads and methods → `None`.
    fn split_key(body: &str) -> Option<(String, usize)> {
        let (key, rest_offset) = if let Some(q) = body.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let close = body[1..].find(q)? + 1;
            (body[1..close].to_string(), close + 1)
        } else {
            let ident: String = body.chars().take_while(|&c| is_ident_char(c)).collect();
            if ident.is_empty() {
                return None;
            }
            (ident.clone(), ident.len())
        };
        let after = &body[rest_offset..];
        let colon = after.len() - after.trim_start().len();
        if after.trim_start().starts_with(':') {
            Some((key, rest_offset + colon + 1))
        } else if after.trim().is_empty() {
            // Shorthand `{ env }`: the key is its own value.
            Some((key, 0))
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.key.as_deref() == Some(key))
    }

    pub fn value_text(&self, property: &Property) -> &str {
        &self.text[property.value.0..property.value.1]
    }

    /// Indentation used for properties (detected, or closing indent + 2).
    pub fn indent(&self) -> String {
        self.indent_or("  ")
    }

    fn indent_or(&self, fallback: &str) -> String {
        if let Some(first) = self.properties.first() {
            let line_start = self.text[..first.start].rfind('\n').map_or(0, |n| n + 1);
            let indent = &self.text[line_start..first.start];
            if indent.chars().all(char::is_whitespace) && line_start > 0 {
                return indent.to_string();
            }
        }
        let close_line = self.text.rfind('\n').map_or(0, |n| n + 1);
        let closing = &self.text[close_line..self.text.len() - 1];
        if closing.chars().all(char::is_whitespace) && close_line > 0 {
            format!("{closing}  ")
        } else {
            fallback.to_string()
        }
    }

    fn is_multiline(&self) -> bool {
        self.text.contains('\n')
    }

    /// Deep-merge JSON into this literal and return the new text.
    ///
    /// Missing keys are added; objects recurse; other values are replaced
    /// only when their printed form differs.
    pub fn merge(&self, incoming: &serde_json::Map<String, Value>) -> String {
        self.merge_at(incoming, "  ")
    }

    /// `merge` for a literal nested at `indent`, used when its own layout
    /// gives no hint.
    fn merge_at(&self, incoming: &serde_json::Map<String, Value>, indent: &str) -> String {
        let indent = self.indent_or(indent);
        let mut replacements: Vec<(usize, usize, String)> = Vec::new();
        let mut additions: Vec<String> = Vec::new();

        for (key, value) in incoming {
            match self.get(key) {
                Some(prop) => {
                    let current = self.value_text(prop);
                    let replacement = match (value, ObjectLiteral::parse(current)) {
                        (Value::Object(inner), Some(nested)) => {
                            nested.merge_at(inner, &format!("{indent}  "))
                        }
                        _ => to_js_literal(value, &indent),
                    };
                    if normalize(&replacement) != normalize(current) {
                        if prop.value.0 == prop.start && !current.contains(':') {
                            // Shorthand property: expand to `key: value`.
                            replacements.push((
                                prop.start,
                                prop.value.1,
                                format!("{}: {}", property_key(key), replacement),
                            ));
                        } else {
                            replacements.push((prop.value.0, prop.value.1, replacement));
                        }
                    }
                }
                None => additions.push(format!(
                    "{}: {}",
                    property_key(key),
                    to_js_literal(value, &indent)
                )),
            }
        }

        self.apply(replacements, &additions, &indent)
    }

    /// Add properties whose values are raw JS expressions. Keys that already
    /// exist are left alone.
    pub fn add_raw(&self, entries: &[(String, String)]) -> String {
        let additions: Vec<String> = entries
            .iter()
            .filter(|(key, _)| self.get(key).is_none())
            .map(|(key, value)| format!("{}: {}", property_key(key), value))
            .collect();
        self.apply(Vec::new(), &additions, &self.indent())
    }

    fn apply(
        &self,
        mut replacements: Vec<(usize, usize, String)>,
        additions: &[String],
        indent: &str,
    ) -> String {
        let mut text = self.text.clone();

        if !additions.is_empty() {
            let insert_at = self.text.len() - 1;
            let mut insertion = String::new();
            let needs_comma = self
                .properties
                .last()
                .is_some_and(|p| !self.text[p.start..p.end].trim_end().ends_with(','));
            if self.is_multiline() || self.properties.is_empty() {
                let closing_indent = indent.strip_suffix("  ").unwrap_or("");
                for addition in additions {
                    insertion.push_str(&format!("{indent}{addition},\n"));
                }
                insertion.push_str(closing_indent);
                let trimmed_end = self.text[..insert_at].trim_end().len();
                replacements.push((trimmed_end, insert_at, String::new()));
                let prefix = if needs_comma { ",\n" } else { "\n" };
                replacements.push((insert_at, insert_at, format!("{prefix}{insertion}")));
            } else {
                let joined = additions.join(", ");
                let trimmed_end = self.text[..insert_at].trim_end().len();
                let sep = if needs_comma { ", " } else { " " };
                replacements.push((trimmed_end, insert_at, format!("{sep}{joined} ")));
            }
        }

        // Edit back to front so earlier spans stay valid.
        replacements.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        for (start, end, replacement) in replacements {
            text.replace_range(start..end, &replacement);
        }
        text
    }
}

fn property_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        serde_json::to_string(key).unwrap_or_else(|_| format!("\"{key}\""))
    }
}

/// Print JSON as a JS literal: identifier keys unquoted, nested objects indented.
pub fn to_js_literal(value: &Value, indent: &str) -> String {
    match value {
        Value::Object(map) if map.is_empty() => "{}".into(),
        Value::Object(map) => {
            let inner = format!("{indent}  ");
            let mut out = String::from("{\n");
            for (key, v) in map {
                out.push_str(&format!(
                    "{inner}{}: {},\n",
                    property_key(key),
                    to_js_literal(v, &inner)
                ));
            }
            out.push_str(indent);
            out.push('}');
            out
        }
        Value::Array(items) => {
            let printed: Vec<String> = items.iter().map(|v| to_js_literal(v, indent)).collect();
            format!("[{}]", printed.join(", "))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LAYOUT: &str = r#"'use client';
// Root layout
import { Inter } from "next/font/google";
import "./globals.css";

const inter = Inter({ subsets: ["latin"] });

export default function RootLayout({ children }) {
  return (
    <html lang="en">
      <body className={inter.className}>Don't {children}</body>
    </html>
  );
}
"#;

    #[test]
    fn print_round_trips_exactly() {
        let file = SourceFile::parse(LAYOUT);
        assert_eq!(file.print(), LAYOUT);
    }

    #[test]
    fn classifies_top_level_items() {
        let file = SourceFile::parse(LAYOUT);
        let kinds: Vec<_> = file.items.iter().map(|i| &i.kind).collect();
        assert!(matches!(kinds[0], ItemKind::Directive));
        assert!(matches!(kinds[1], ItemKind::Import(d) if d.source == "next/font/google"));
        assert!(matches!(kinds[2], ItemKind::Import(d) if d.is_side_effect()));
        assert!(matches!(kinds[3], ItemKind::Other));
        assert!(matches!(kinds[4], ItemKind::ExportDefault));
        assert_eq!(kinds.len(), 5);
    }

    #[test]
    fn statements_without_semicolons_split_on_newlines() {
        let src = "const a = 1\nconst b = a\n  .toString()\nexport const c = () =>\n  b\n";
        let file = SourceFile::parse(src);
        assert_eq!(file.items.len(), 3);
        assert_eq!(file.items[2].kind, ItemKind::NamedExport("c".into()));
        assert_eq!(file.print(), src);
    }

    #[test]
    fn parses_import_forms() {
        let d = ImportDecl::parse("import React, { useState, type FC as F } from 'react'").unwrap();
        assert_eq!(d.default.as_deref(), Some("React"));
        assert_eq!(d.named, ["useState", "type FC as F"]);
        assert_eq!(d.source, "react");
        assert!(!d.semicolon);

        let ns = ImportDecl::parse("import * as schema from \"./schema\";").unwrap();
        assert_eq!(ns.namespace.as_deref(), Some("schema"));

        let t = ImportDecl::parse("import type { Config } from \"drizzle-kit\";").unwrap();
        assert!(t.type_only);
        assert_eq!(t.render(), "import type { Config } from \"drizzle-kit\";");
    }

    #[test]
    fn add_import_merges_and_is_idempotent() {
        let mut file = SourceFile::parse(LAYOUT);
        assert!(file.add_import(&ImportSpec::named("next/font/google", &["Roboto"])));
        assert!(!file.add_import(&ImportSpec::named("next/font/google", &["Roboto"])));
        assert!(file.print().contains("import { Inter, Roboto } from \"next/font/google\";"));

        assert!(file.add_import(&ImportSpec::default_import("@/lib/auth", "auth")));
        let printed = file.print();
        let globals = printed.find("./globals.css").unwrap();
        let auth = printed.find("@/lib/auth").unwrap();
        assert!(auth > globals, "new import goes after existing imports");
        assert!(!file.add_import(&ImportSpec::default_import("@/lib/auth", "auth")));
    }

    #[test]
    fn add_import_into_file_without_imports() {
        let mut file = SourceFile::parse("export const x = 1;\n");
        file.add_import(&ImportSpec::named("zod", &["z"]));
        assert_eq!(
            file.print(),
            "import { z } from \"zod\";\n\nexport const x = 1;\n"
        );
    }

    #[test]
    fn append_statement_and_contains() {
        let mut file = SourceFile::parse("const a = 1;\n");
        file.append_statement("a.toString();");
        assert!(file.contains_statement("a.toString()"));
        assert_eq!(file.print(), "const a = 1;\n\na.toString();\n");
    }

    #[test]
    fn split_export_expression_forms() {
        assert_eq!(
            split_export_expression("export default nextConfig;"),
            Some(("export default ", "nextConfig", ";"))
        );
        assert_eq!(
            split_export_expression("module.exports = { a: 1 }"),
            Some(("module.exports = ", "{ a: 1 }", ""))
        );
        assert_eq!(split_export_expression("export const a = 1"), None);
    }

    #[test]
    fn object_literal_properties() {
        let obj = ObjectLiteral::parse(
            "{\n  reactStrictMode: true,\n  \"output\": 'standalone',\n  ...base,\n  images: { domains: [\"a.com\"] }\n}",
        )
        .unwrap();
        let keys: Vec<_> = obj.properties.iter().map(|p| p.key.as_deref()).collect();
        assert_eq!(
            keys,
            [Some("reactStrictMode"), Some("output"), None, Some("images")]
        );
        assert_eq!(obj.value_text(obj.get("output").unwrap()), "'standalone'");
    }

    #[test]
    fn object_merge_adds_and_recurses() {
        let obj = ObjectLiteral::parse("{\n  reactStrictMode: true,\n  images: { domains: [] }\n}")
            .unwrap();
        let merged = obj.merge(
            json!({"images": {"unoptimized": true}, "output": "standalone"})
                .as_object()
                .unwrap(),
        );
        assert_eq!(
            merged,
            "{\n  reactStrictMode: true,\n  images: { domains: [], unoptimized: true },\n  output: \"standalone\",\n}"
        );

        // Merging again changes nothing.
        let again = ObjectLiteral::parse(&merged).unwrap().merge(
            json!({"images": {"unoptimized": true}, "output": "standalone"})
                .as_object()
                .unwrap(),
        );
        assert_eq!(again, merged);
    }

    #[test]
    fn object_merge_into_empty_literal() {
        let obj = ObjectLiteral::parse("{}").unwrap();
        let merged = obj.merge(json!({"a": 1}).as_object().unwrap());
        assert_eq!(merged, "{\n  a: 1,\n}");
    }

    #[test]
    fn js_literal_printing() {
        let printed = to_js_literal(&json!({"a-b": [1, "x"], "c": {"d": null}}), "");
        assert_eq!(printed, "{\n  \"a-b\": [1, \"x\"],\n  c: {\n    d: null,\n  },\n}");
    }

    #[test]
    fn call_arguments_split_at_top_level() {
        let expr = "withSentry(nextConfig, { silent: true, org: f(a, b) })";
        let (callee, args) = call_arguments(expr).unwrap();
        assert_eq!(callee, "withSentry");
        let texts: Vec<_> = args.iter().map(|(s, e)| &expr[*s..*e]).collect();
        assert_eq!(texts, ["nextConfig", "{ silent: true, org: f(a, b) }"]);

        assert!(call_arguments("a(b) + c(d)").is_none());
        assert!(call_arguments("{ a: 1 }").is_none());
    }

    #[test]
    fn initializer_skips_type_annotations() {
        let code = "const nextConfig: NextConfig = { output: \"export\" };";
        let at = initializer(code).unwrap();
        assert!(code[at..].starts_with("{ output"));
        assert!(initializer("const f = () => 1").is_some_and(|at| at == 10));
    }

    #[test]
    fn add_raw_only_adds_missing_keys() {
        let obj = ObjectLiteral::parse("{ A: process.env.A }").unwrap();
        let out = obj.add_raw(&[
            ("A".into(), "other".into()),
            ("B".into(), "process.env.B".into()),
        ]);
        assert_eq!(out, "{ A: process.env.A, B: process.env.B }");
    }
}
