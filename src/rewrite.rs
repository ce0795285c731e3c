//! Binding/Wrapper Rewriter
//!
//! Takes import-stripped component source and produces the module text the
//! sandbox compiles: dependency bindings on top, the component body with all
//! module syntax removed, and an entry dispatcher at the bottom. This is
//! text-to-text only; nothing here evaluates code.

use crate::classify::{Classification, Resolution};
use crate::files::SiblingFiles;
use crate::loader::slot_name;
use crate::scanner::{ImportKind, ImportRecord};
use crate::shims;
use crate::stylesheet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Local binding that receives an anonymous `export default <expr>`.
pub const DEFAULT_BINDING: &str = "__previewDefault";

/// Names tried after every detected export.
pub const FALLBACK_ENTRY_NAMES: [&str; 6] = ["App", "Component", "Preview", "Demo", "Example", "Main"];

lazy_static! {
    static ref DIRECTIVE_RE: Regex =
        Regex::new(r#"^\s*(?:"use [A-Za-z ]+"|'use [A-Za-z ]+')[ \t]*;?[ \t]*\r?\n?"#).unwrap();
    static ref LEADING_COMMENT_RE: Regex =
        Regex::new(r"^\s*(?://[^\n]*\n|/\*[\s\S]*?\*/)").unwrap();
    static ref STAR_REEXPORT_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*export\s+(?:type\s+)?\*\s*(?:as\s+[A-Za-z_$][\w$]*\s+)?from\s*["'][^"'\n]+["'][ \t]*;?[ \t]*\r?\n?"#
    )
    .unwrap();
    static ref NAMED_REEXPORT_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*export\s+(?:type\s+)?\{[^}]*\}\s*from\s*["'][^"'\n]+["'][ \t]*;?[ \t]*\r?\n?"#
    )
    .unwrap();
    static ref TYPE_EXPORT_LIST_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s+type\s+\{[^}]*\}[ \t]*;?[ \t]*\r?\n?").unwrap();
    static ref EXPORT_LIST_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?[ \t]*\r?\n?").unwrap();
    static ref TYPE_DECL_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?(?:(type)\s+[A-Za-z_$][\w$]*\s*[<=]|(interface)\s+[A-Za-z_$][\w$]*\s*(?:<[^{;]*>\s*)?(?:extends\s[^{;]*)?\{)"
    )
    .unwrap();
    static ref EXPORT_DEFAULT_RE: Regex =
        Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap();
    static ref DEFAULT_DECL_RE: Regex = Regex::new(
        r"^(?:async\s+)?(?:function\s*\*?\s*([A-Za-z_$][\w$]*)\s*[(<]|class\s+([A-Za-z_$][\w$]*)\b)"
    )
    .unwrap();
    static ref DEFAULT_IDENT_RE: Regex =
        Regex::new(r"(?m)\A([A-Za-z_$][\w$]*)[ \t]*(?:;|\r?$)").unwrap();
    static ref EXPORT_DECL_RE: Regex = Regex::new(
        r"(?m)^([ \t]*)export\s+((?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)|class\s+([A-Za-z_$][\w$]*)|(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)|(?:const|let|var)\s+([A-Za-z_$][\w$]*))"
    )
    .unwrap();
    static ref EXPORT_KEYWORD_RE: Regex = Regex::new(r"(?m)^([ \t]*)export\s+").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE SYNTAX REMOVAL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportName {
    pub local: String,
    pub exported: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrippedModule {
    pub code: String,
    /// Name the default export is reachable under, if there is one
    pub default_binding: Option<String>,
    /// Declared name of a default-exported function or class
    pub default_declared: Option<String>,
    pub exports: Vec<ExportName>,
}

/// Remove leading `"use client"`-style directives. Comments ahead of them
/// are kept.
pub fn strip_directives(source: &str) -> String {
    let mut kept = String::new();
    let mut rest = source;
    loop {
        if let Some(m) = DIRECTIVE_RE.find(rest) {
            rest = &rest[m.end()..];
            continue;
        }
        if let Some(m) = LEADING_COMMENT_RE.find(rest) {
            kept.push_str(&rest[..m.end()]);
            rest = &rest[m.end()..];
            continue;
        }
        break;
    }
    kept.push_str(rest);
    kept
}

fn parse_export_list(list: &str) -> Vec<ExportName> {
    list.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty() && !part.starts_with("type "))
        .filter_map(|part| {
            let mut pieces = part.split_whitespace();
            let local = pieces.next()?.to_string();
            let exported = match (pieces.next(), pieces.next()) {
                (Some("as"), Some(alias)) => alias.to_string(),
                _ => local.clone(),
            };
            IDENT_RE.is_match(&local).then_some(ExportName { local, exported })
        })
        .collect()
}

/// Drop re-exports and type-only export lists; local export lists are
/// dropped too but their names are returned.
pub fn strip_export_lists(source: &str) -> (String, Vec<ExportName>) {
    let code = STAR_REEXPORT_RE.replace_all(source, "");
    let code = NAMED_REEXPORT_RE.replace_all(&code, "");
    let code = TYPE_EXPORT_LIST_RE.replace_all(&code, "");
    let mut exports = Vec::new();
    let code = EXPORT_LIST_RE.replace_all(&code, |caps: &regex::Captures| {
        exports.extend(parse_export_list(&caps[1]));
        String::new()
    });
    (code.into_owned(), exports)
}

/// Last significant byte before `end`, skipping whitespace.
fn last_significant(bytes: &[u8], from: usize, end: usize) -> Option<u8> {
    bytes[from..end]
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .copied()
}

fn next_significant(bytes: &[u8], from: usize) -> Option<(usize, u8)> {
    bytes[from..]
        .iter()
        .enumerate()
        .find(|(_, b)| !b.is_ascii_whitespace())
        .map(|(i, b)| (from + i, *b))
}

/// Does a type alias body carry on past the newline at `newline`?
fn alias_continues(bytes: &[u8], start: usize, newline: usize) -> bool {
    let line = String::from_utf8_lossy(&bytes[start..newline]);
    if line.trim_end().ends_with("=>") {
        return true;
    }
    if let Some(b'=' | b'|' | b'&' | b',' | b':' | b'?' | b'(' | b'<' | b'{' | b'[') =
        last_significant(bytes, start, newline)
    {
        return true;
    }
    match next_significant(bytes, newline + 1) {
        Some((at, b'=')) => bytes.get(at + 1) == Some(&b'>'),
        Some((_, b'|' | b'&' | b'?' | b':' | b'.')) => true,
        Some((at, b'e')) => bytes[at..].starts_with(b"extends "),
        _ => false,
    }
}

/// End (exclusive) of a type alias or interface starting at `start`.
///
/// Depth-balanced over `()[]{}<>`, string/template/comment aware. An alias
/// ends at a top-level `;` or at a newline the body does not continue past;
/// an interface ends where its body brace closes.
fn declaration_end(bytes: &[u8], start: usize, interface: bool) -> usize {
    let mut i = start;
    let mut depth: i32 = 0;
    let mut seen_body = false;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' | b'`' => quote = Some(c),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b'(' | b'[' | b'{' | b'<' => {
                depth += 1;
                if c == b'{' && interface {
                    seen_body = true;
                }
            }
            b')' | b']' | b'}' | b'>' => {
                depth = (depth - 1).max(0);
                if depth == 0 && interface && seen_body && c == b'}' {
                    return i + 1;
                }
            }
            b'=' if depth == 0 && !interface => seen_body = true,
            b';' if depth == 0 => return i + 1,
            b'\n' if depth == 0 && seen_body && !interface => {
                if !alias_continues(bytes, start, i) {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Remove standalone `type X = ...` aliases and `interface X {...}`
/// declarations, including multi-line ones.
pub fn strip_type_declarations(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for caps in TYPE_DECL_RE.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() < cursor {
            continue;
        }
        let interface = caps.get(2).is_some();
        let mut end = declaration_end(bytes, whole.start(), interface).min(bytes.len());
        while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t' || bytes[end] == b'\r') {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b'\n' {
            end += 1;
        }
        out.push_str(&source[cursor..whole.start()]);
        cursor = end;
    }
    out.push_str(&source[cursor.min(source.len())..]);
    out
}

/// Strip `export` syntax from a module body. A default export becomes
/// reachable under its declared name, or under `default_local` when it is an
/// expression. Export lists are removed and their names collected.
pub fn strip_exports(source: &str, default_local: &str) -> StrippedModule {
    let (code, mut exports) = strip_export_lists(source);
    let mut default_binding = None;
    let mut default_declared = None;

    // A default export carried by an export list (`export { App as default }`)
    if let Some(entry) = exports.iter().find(|e| e.exported == "default") {
        default_binding = Some(entry.local.clone());
    }

    let rewritten = EXPORT_DEFAULT_RE.captures(&code).map(|caps| {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let indent = &caps[1];
        let rest = &code[whole.end..];
        let declared = DEFAULT_DECL_RE.captures(rest).and_then(|decl| {
            decl.get(1)
                .or_else(|| decl.get(2))
                .map(|m| m.as_str().to_string())
                .filter(|n| n != "extends")
        });
        let replacement = match declared {
            Some(name) => {
                default_binding = Some(name.clone());
                default_declared = Some(name);
                indent.to_string()
            }
            None => {
                if let Some(ident) = DEFAULT_IDENT_RE.captures(rest) {
                    default_declared = Some(ident[1].to_string());
                }
                default_binding = Some(default_local.to_string());
                format!("{}const {} = ", indent, default_local)
            }
        };
        format!("{}{}{}", &code[..whole.start], replacement, rest)
    });
    let code = rewritten.unwrap_or(code);

    let code = EXPORT_DECL_RE.replace_all(&code, |caps: &regex::Captures| {
        let name = (3..=6).find_map(|i| caps.get(i)).map(|m| m.as_str().to_string());
        if let Some(name) = name {
            exports.push(ExportName {
                local: name.clone(),
                exported: name,
            });
        }
        format!("{}{}", &caps[1], &caps[2])
    });
    let code = EXPORT_KEYWORD_RE.replace_all(&code, "$1").into_owned();

    StrippedModule {
        code,
        default_binding,
        default_declared,
        exports,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

fn member(object: &str, name: &str) -> String {
    if IDENT_RE.is_match(name) {
        format!("{}.{}", object, name)
    } else {
        format!(
            "{}[{}]",
            object,
            serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string())
        )
    }
}

fn slot(name: &str) -> String {
    format!("__env[\"{}\"]", name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteOutput {
    pub binding_statements: Vec<String>,
    pub wrapper_body: String,
    pub entry_point_candidates: Vec<String>,
    /// Locals not bound because an earlier import already declared them
    pub skipped_bindings: Vec<String>,
}

impl RewriteOutput {
    /// Bindings, body and dispatcher as one module text.
    pub fn module_text(&self) -> String {
        let mut text = String::new();
        for binding in &self.binding_statements {
            text.push_str(binding);
            text.push('\n');
        }
        text.push_str(&self.wrapper_body);
        if !self.wrapper_body.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&dispatcher(&self.entry_point_candidates));
        text
    }
}

struct BindingWriter<'a> {
    files: &'a SiblingFiles,
    declared: HashSet<String>,
    injected: HashSet<String>,
    statements: Vec<String>,
    skipped: Vec<String>,
}

impl<'a> BindingWriter<'a> {
    fn declare(&mut self, local: &str, expr: String) {
        if !self.declared.insert(local.to_string()) {
            tracing::debug!(local, "binding already declared, skipping");
            self.skipped.push(local.to_string());
            return;
        }
        self.statements.push(format!("const {} = {};", local, expr));
    }

    fn record(&mut self, record: &ImportRecord, resolution: &Resolution) {
        match resolution {
            Resolution::Framework { global } => {
                let object = format!("__env.{}", global);
                self.bind_each(record, |kind, name| match (kind, name) {
                    (BindKind::Named, Some(imported)) => member(&object, imported),
                    _ => object.clone(),
                });
            }
            Resolution::Stylesheet { module } => self.stylesheet(record, *module),
            Resolution::LocalEmpty => self.bind_each(record, |kind, _| match kind {
                BindKind::Namespace => "new Proxy({}, { get: () => __env.__noop })".to_string(),
                _ => "__env.__noop".to_string(),
            }),
            Resolution::AnimationFamily { base } => {
                let module = slot(&slot_name(base));
                let shim = slot(shims::animation_slot(base));
                let last_segment = record
                    .module
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                self.bind_each(record, |kind, name| match (kind, name) {
                    (BindKind::Named, Some(imported)) => format!(
                        "{} ?? {}",
                        member(&format!("({} || {{}})", module), imported),
                        member(&shim, imported)
                    ),
                    (BindKind::Namespace, _) => format!("Object.assign({{}}, {}, {})", shim, module),
                    _ => format!(
                        "{} ?? {} ?? ({} || {{}}).default ?? {}.default",
                        member(&format!("({} || {{}})", module), &last_segment),
                        member(&shim, &last_segment),
                        module,
                        shim
                    ),
                });
            }
            Resolution::HelperShim { helper } => {
                let shim = slot(shims::helper_slot(*helper));
                self.bind_each(record, |kind, name| match (kind, name) {
                    (BindKind::Named, Some(imported)) => {
                        format!("{} ?? {}.default", member(&shim, imported), shim)
                    }
                    (BindKind::Namespace, _) => shim.clone(),
                    _ => format!("{}.default", shim),
                });
            }
            Resolution::Shim { .. } | Resolution::LocalShim { .. } | Resolution::Fetch { .. } => {
                let module = slot(&slot_name(&record.module));
                self.bind_each(record, |kind, name| match (kind, name) {
                    (BindKind::Named, Some(imported)) => format!(
                        "{} ?? {}",
                        member(&format!("({} || {{}})", module), imported),
                        member(&format!("(({} || {{}}).default || {{}})", module), imported)
                    ),
                    (BindKind::Namespace, _) => format!("{} || {{}}", module),
                    _ => format!("({} || {{}}).default || {} || {{}}", module, module),
                });
            }
            Resolution::Rejected { .. } => {}
        }
    }

    fn bind_each(&mut self, record: &ImportRecord, expr: impl Fn(BindKind, Option<&str>) -> String) {
        if let Some(default) = &record.default_name {
            self.declare(default, expr(BindKind::Default, None));
        }
        if let Some(namespace) = &record.namespace_name {
            self.declare(namespace, expr(BindKind::Namespace, None));
        }
        for named in &record.named {
            let value = if named.imported == "default" {
                expr(BindKind::Default, None)
            } else {
                expr(BindKind::Named, Some(&named.imported))
            };
            self.declare(&named.local, value);
        }
    }

    fn stylesheet(&mut self, record: &ImportRecord, module: bool) {
        let files = self.files;
        let css = files.resolve(&record.module);
        if let Some(css) = css {
            if self.injected.insert(record.module.clone()) {
                let css_literal = serde_json::to_string(css).unwrap_or_else(|_| "\"\"".to_string());
                let id_literal =
                    serde_json::to_string(&record.module).unwrap_or_else(|_| "\"\"".to_string());
                self.statements
                    .push(format!("__env.__injectStyle({}, {});", css_literal, id_literal));
            }
        } else {
            tracing::debug!(specifier = %record.module, "stylesheet not in sibling files");
        }
        if !module && record.kind == ImportKind::SideEffect {
            return;
        }
        let lookup = css
            .map(stylesheet::lookup_object)
            .unwrap_or_else(|| "{}".to_string());
        let classes: Vec<String> = css.map(stylesheet::scrape_class_names).unwrap_or_default();
        self.bind_each(record, |kind, name| match (kind, name) {
            (BindKind::Named, Some(class)) => {
                if classes.iter().any(|c| c == class) {
                    serde_json::to_string(class).unwrap_or_else(|_| "undefined".to_string())
                } else {
                    "undefined".to_string()
                }
            }
            _ => lookup.clone(),
        });
    }
}

#[derive(Clone, Copy)]
enum BindKind {
    Default,
    Namespace,
    Named,
}

/// Entry dispatcher. The module text returns a resolver; calling it yields
/// the first candidate that is a function or a framework element-type
/// object, or throws.
pub fn dispatcher(candidates: &[String]) -> String {
    let entries: Vec<String> = candidates
        .iter()
        .filter(|c| IDENT_RE.is_match(c))
        .map(|c| {
            format!(
                "    [\"{name}\", typeof {name} !== \"undefined\" ? {name} : undefined],",
                name = c
            )
        })
        .collect();
    format!(
        r#"return function __resolveEntry() {{
  const __candidates = [
{entries}
  ];
  for (const [, __value] of __candidates) {{
    if (typeof __value === "function") return __value;
    if (__value && typeof __value === "object" && __value.$$typeof) return __value;
  }}
  throw new Error("No component to render. Tried: " + __candidates.map(([n]) => n).join(", ") + ". Export a component as default or name it App.");
}};
"#,
        entries = entries.join("\n")
    )
}

/// Rewrite import-stripped source into the module text's parts.
pub fn rewrite_module(
    stripped_source: &str,
    records: &[ImportRecord],
    classifications: &[Classification],
    files: &SiblingFiles,
) -> RewriteOutput {
    let by_specifier: HashMap<&str, &Classification> = classifications
        .iter()
        .map(|c| (c.specifier.as_str(), c))
        .collect();

    let mut writer = BindingWriter {
        files,
        declared: HashSet::new(),
        injected: HashSet::new(),
        statements: Vec::new(),
        skipped: Vec::new(),
    };
    for record in records.iter().filter(|r| !r.type_only) {
        if let Some(classification) = by_specifier.get(record.module.as_str()) {
            writer.record(record, &classification.resolution);
        }
    }

    let body = strip_directives(stripped_source);
    let body = strip_type_declarations(&body);
    let stripped = strip_exports(&body, DEFAULT_BINDING);

    let mut candidates: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !candidates.iter().any(|c| c == name) {
            candidates.push(name.to_string());
        }
    };
    if let Some(declared) = &stripped.default_declared {
        push(declared);
    }
    if let Some(binding) = &stripped.default_binding {
        push(binding);
    }
    for export in &stripped.exports {
        push(&export.local);
    }
    for fallback in FALLBACK_ENTRY_NAMES {
        push(fallback);
    }

    RewriteOutput {
        binding_statements: writer.statements,
        wrapper_body: stripped.code,
        entry_point_candidates: candidates,
        skipped_bindings: writer.skipped,
    }
}
