//! Import Scanner
//!
//! Pulls static `import` statements out of raw component source and returns
//! them as [`ImportRecord`]s together with the source text minus those
//! statements.
//!
//! The default scanner is line-oriented and deliberately *not*
//! bracket-balanced: a statement starts on a line beginning with `import`
//! and swallows following lines only while they look like a continuation.
//! Unusual formatting can defeat it. [`ScanMode::Strict`] takes statement
//! boundaries from a real parser instead.

use crate::config::ScanMode;
use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, ModuleExportName, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORD TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
    SideEffect,
    Namespace,
    Named,
    Default,
    DefaultNamed,
}

/// Byte range into the original source. Starts at the beginning of the
/// statement's first line and, when nothing else follows the statement on
/// its last line, includes that line's newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedImport {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub kind: ImportKind,
    pub module: String,
    pub source_span: SourceSpan,
    pub default_name: Option<String>,
    pub namespace_name: Option<String>,
    pub named: Vec<NamedImport>,
    /// `import type ...`: removed, but binds nothing at runtime
    #[serde(default)]
    pub type_only: bool,
}

impl ImportRecord {
    /// Every local identifier this record introduces, in declaration order.
    pub fn local_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(d) = &self.default_name {
            names.push(d.as_str());
        }
        if let Some(ns) = &self.namespace_name {
            names.push(ns.as_str());
        }
        names.extend(self.named.iter().map(|n| n.local.as_str()));
        names
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub records: Vec<ImportRecord>,
    /// Source with every import statement removed
    pub stripped: String,
    /// Statements that started like an import but matched no known shape
    pub dropped: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT SHAPES
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref SIDE_EFFECT_RE: Regex =
        Regex::new(r#"^import\s*["']([^"']+)["']$"#).unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(
        r#"^import\s+(type\s+)?\*\s*as\s+([A-Za-z_$][\w$]*)\s+from\s*["']([^"']+)["']$"#
    )
    .unwrap();
    static ref NAMED_RE: Regex =
        Regex::new(r#"^import\s*(type\s*)?\{([^}]*)\}\s*from\s*["']([^"']+)["']$"#).unwrap();
    static ref DEFAULT_NAMED_RE: Regex = Regex::new(
        r#"^import\s+(type\s+)?([A-Za-z_$][\w$]*)\s*,\s*\{([^}]*)\}\s*from\s*["']([^"']+)["']$"#
    )
    .unwrap();
    static ref DEFAULT_RE: Regex = Regex::new(
        r#"^import\s+(type\s+)?([A-Za-z_$][\w$]*)\s+from\s*["']([^"']+)["']$"#
    )
    .unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r#"^(\S+)\s+as\s+(\S+)$"#).unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    /// A module string closed at the very end: `... from "x"` or `import "x"`
    static ref COMPLETE_MODULE_RE: Regex =
        Regex::new(r#"(?:\bfrom|^\s*import)\s*(?:"[^"\n]*"|'[^'\n]*')\s*$"#).unwrap();
}

/// Does this (already trimmed) line open a static import statement?
pub fn starts_import(trimmed: &str) -> bool {
    match trimmed.strip_prefix("import") {
        Some(rest) => match rest.chars().next() {
            None => true,
            Some(c) => c.is_whitespace() || c == '{' || c == '*' || c == '"' || c == '\'',
        },
        None => false,
    }
}

fn looks_like_continuation(trimmed: &str) -> bool {
    if trimmed.starts_with("from")
        || trimmed.starts_with("//")
        || trimmed.starts_with("/*")
    {
        return true;
    }
    match trimmed.chars().next() {
        Some(c) => {
            c == ',' || c == '{' || c == '}' || c == '*' || c.is_alphabetic() || c == '_' || c == '$'
        }
        None => false,
    }
}

/// Byte offset of the first `;` outside string literals and comments.
fn find_terminator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q || c == b'\n' {
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
            b';' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Remove `//` and `/* */` comments that sit outside string literals.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' || c == '`' {
            quote = Some(c);
            out.push(c);
            i += 1;
            continue;
        }
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            out.push(' ');
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn module_string_complete(text: &str) -> bool {
    COMPLETE_MODULE_RE.is_match(strip_comments(text).trim_end())
}

fn parse_named_list(list: &str) -> Vec<NamedImport> {
    let mut named = Vec::new();
    let mut seen = HashSet::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() || part.starts_with("type ") {
            continue;
        }
        let (imported, local) = match ALIAS_RE.captures(part) {
            Some(caps) => (caps[1].to_string(), caps[2].to_string()),
            None => (part.to_string(), part.to_string()),
        };
        let imported = imported.trim_matches(|c| c == '"' || c == '\'').to_string();
        if !IDENT_RE.is_match(&local) || !seen.insert(local.clone()) {
            continue;
        }
        named.push(NamedImport { imported, local });
    }
    named
}

/// Match one assembled statement against the five recognized shapes.
pub fn parse_statement(statement: &str, span: SourceSpan) -> Option<ImportRecord> {
    let normalized = WHITESPACE_RE
        .replace_all(strip_comments(statement).trim(), " ")
        .to_string();
    let normalized = normalized.trim_end_matches(';').trim_end();

    let record = |kind, module: &str| ImportRecord {
        kind,
        module: module.to_string(),
        source_span: span,
        default_name: None,
        namespace_name: None,
        named: vec![],
        type_only: false,
    };

    if let Some(caps) = SIDE_EFFECT_RE.captures(normalized) {
        return Some(record(ImportKind::SideEffect, &caps[1]));
    }
    if let Some(caps) = NAMESPACE_RE.captures(normalized) {
        let mut r = record(ImportKind::Namespace, &caps[3]);
        r.namespace_name = Some(caps[2].to_string());
        r.type_only = caps.get(1).is_some();
        return Some(r);
    }
    if let Some(caps) = NAMED_RE.captures(normalized) {
        let mut r = record(ImportKind::Named, &caps[3]);
        r.named = parse_named_list(&caps[2]);
        r.type_only = caps.get(1).is_some();
        return Some(r);
    }
    if let Some(caps) = DEFAULT_NAMED_RE.captures(normalized) {
        let mut r = record(ImportKind::DefaultNamed, &caps[4]);
        let default = caps[2].to_string();
        r.named = parse_named_list(&caps[3])
            .into_iter()
            .filter(|n| n.local != default)
            .collect();
        r.default_name = Some(default);
        r.type_only = caps.get(1).is_some();
        return Some(r);
    }
    if let Some(caps) = DEFAULT_RE.captures(normalized) {
        let mut r = record(ImportKind::Default, &caps[3]);
        r.default_name = Some(caps[2].to_string());
        r.type_only = caps.get(1).is_some();
        return Some(r);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

struct Line {
    start: usize,
    /// End of content, excluding the newline
    content_end: usize,
    /// End including the newline
    end: usize,
}

fn split_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in source.split_inclusive('\n') {
        let content = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push(Line {
            start: offset,
            content_end: offset + content.len(),
            end: offset + raw.len(),
        });
        offset += raw.len();
    }
    lines
}

/// Scan `source` for import statements and remove them.
pub fn scan_imports(source: &str, mode: ScanMode) -> ScanResult {
    if mode == ScanMode::Strict {
        match scan_with_parser(source) {
            Some(result) => return result,
            None => tracing::debug!("strict import scan failed to parse, using heuristic scan"),
        }
    }
    scan_heuristic(source)
}

fn scan_heuristic(source: &str) -> ScanResult {
    let lines = split_lines(source);
    let mut records = Vec::new();
    let mut dropped = Vec::new();
    let mut spans = Vec::new();
    let mut i = 0;
    // Offset of a further import on the line the previous statement ended on.
    let mut resume: Option<usize> = None;

    while i < lines.len() {
        let start = match resume.take() {
            Some(offset) => offset,
            None => {
                let first = &lines[i];
                if !starts_import(source[first.start..first.content_end].trim()) {
                    i += 1;
                    continue;
                }
                first.start
            }
        };
        let mut last = i;
        let mut terminator: Option<usize> = None;
        loop {
            let raw = &source[start..lines[last].content_end];
            if let Some(semi) = find_terminator(raw) {
                terminator = Some(start + semi + 1);
                break;
            }
            if module_string_complete(raw) {
                break;
            }
            let next = last + 1;
            if next >= lines.len() {
                break;
            }
            let next_trimmed = source[lines[next].start..lines[next].content_end].trim();
            if starts_import(next_trimmed) || !looks_like_continuation(next_trimmed) {
                break;
            }
            last = next;
        }

        let statement_end = terminator.unwrap_or(lines[last].content_end);
        let line = &lines[last];
        let span_end = if source[statement_end..line.end].trim().is_empty() {
            line.end
        } else {
            statement_end
        };
        let span = SourceSpan {
            start,
            end: span_end,
        };
        let statement = &source[start..statement_end];
        match parse_statement(statement, span) {
            Some(record) => records.push(record),
            None => {
                tracing::debug!(statement, "import statement matched no known shape, dropping");
                dropped.push(statement.trim().to_string());
            }
        }
        spans.push(span);

        let rest = &source[statement_end..line.content_end];
        let trimmed = rest.trim_start();
        if span_end == statement_end && starts_import(trimmed.trim_end()) {
            resume = Some(statement_end + (rest.len() - trimmed.len()));
            i = last;
        } else {
            i = last + 1;
        }
    }

    ScanResult {
        records,
        stripped: remove_spans(source, &spans),
        dropped,
    }
}

fn scan_with_parser(source: &str) -> Option<ScanResult> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return None;
    }

    let mut records = Vec::new();
    let mut spans = Vec::new();
    for stmt in &ret.program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        let decl_start = decl.span.start as usize;
        let decl_end = decl.span.end as usize;
        let line_start = source[..decl_start].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let start = if source[line_start..decl_start].trim().is_empty() {
            line_start
        } else {
            decl_start
        };
        let line_end = source[decl_end..]
            .find('\n')
            .map(|p| decl_end + p + 1)
            .unwrap_or(source.len());
        let end = if source[decl_end..line_end].trim().is_empty() {
            line_end
        } else {
            decl_end
        };
        let span = SourceSpan { start, end };
        spans.push(span);

        let mut record = ImportRecord {
            kind: ImportKind::SideEffect,
            module: decl.source.value.to_string(),
            source_span: span,
            default_name: None,
            namespace_name: None,
            named: vec![],
            type_only: decl.import_kind.is_type(),
        };
        let mut seen = HashSet::new();
        if let Some(specifiers) = &decl.specifiers {
            record.kind = ImportKind::Named;
            for specifier in specifiers {
                match specifier {
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        let local = s.local.name.to_string();
                        seen.insert(local.clone());
                        record.default_name = Some(local);
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        let local = s.local.name.to_string();
                        seen.insert(local.clone());
                        record.namespace_name = Some(local);
                    }
                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                        if s.import_kind.is_type() {
                            continue;
                        }
                        let local = s.local.name.to_string();
                        if !seen.insert(local.clone()) {
                            continue;
                        }
                        let imported = match &s.imported {
                            ModuleExportName::IdentifierName(id) => id.name.to_string(),
                            ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
                            _ => local.clone(),
                        };
                        record.named.push(NamedImport { imported, local });
                    }
                }
            }
            record.kind = if record.namespace_name.is_some() {
                ImportKind::Namespace
            } else if record.default_name.is_some() && !record.named.is_empty() {
                ImportKind::DefaultNamed
            } else if record.default_name.is_some() {
                ImportKind::Default
            } else {
                ImportKind::Named
            };
        }
        records.push(record);
    }

    Some(ScanResult {
        records,
        stripped: remove_spans(source, &spans),
        dropped: vec![],
    })
}

/// Cut the spans out, then sweep away any line still opening an import.
fn remove_spans(source: &str, spans: &[SourceSpan]) -> String {
    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|s| s.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for span in sorted {
        if span.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..span.start]);
        cursor = span.end;
    }
    out.push_str(&source[cursor..]);

    out.split_inclusive('\n')
        .filter(|line| !starts_import(line.trim()))
        .collect()
}
