//! Rewriter behavior on realistic component sources.

use crate::classify::Classifier;
use crate::config::{PreviewConfig, ScanMode};
use crate::files::SiblingFiles;
use crate::rewrite::*;
use crate::scanner::scan_imports;

fn rewrite_source(source: &str, files: &SiblingFiles) -> RewriteOutput {
    let config = PreviewConfig::default();
    let scan = scan_imports(source, ScanMode::Heuristic);
    let classifications = Classifier::new(&config).classify_records(&scan.records);
    rewrite_module(&scan.stripped, &scan.records, &classifications, files)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODULE SYNTAX
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_strip_directives_keeps_comments() {
    let out = strip_directives("// header\n\"use client\";\n'use strict'\nconst a = 1;\n");
    assert_eq!(out, "// header\nconst a = 1;\n");
}

#[test]
fn test_strip_export_lists() {
    let source = "export * from './all';\nexport { a as b } from './x';\nexport type { T } from './t';\nexport type { U };\nconst a = 1, c = 2;\nexport { a, c as default };\n";
    let (code, exports) = strip_export_lists(source);
    assert_eq!(code, "const a = 1, c = 2;\n");
    assert_eq!(
        exports,
        vec![
            ExportName {
                local: "a".to_string(),
                exported: "a".to_string()
            },
            ExportName {
                local: "c".to_string(),
                exported: "default".to_string()
            },
        ]
    );
}

#[test]
fn test_strip_type_aliases_single_and_multiline() {
    let source = r#"type Size = "sm" | "lg";
export type Props = {
  size: Size;
  onClick: (e: MouseEvent) => void;
};
type Handler<T = string> =
  | ((value: T) => void)
  | null
type Fn = (a: number) => string
interface Theme extends Base<string> {
  color: string;
  nested: { deep: boolean };
}
const keep = "type X = 1";
"#;
    assert_eq!(
        strip_type_declarations(source),
        "const keep = \"type X = 1\";\n"
    );
}

#[test]
fn test_type_alias_ends_without_semicolon() {
    let source = "type A = string\nconst b = 1\n";
    assert_eq!(strip_type_declarations(source), "const b = 1\n");
}

#[test]
fn test_plain_js_using_type_word_survives() {
    let source = "const type = 'x';\nlet interfaceName = type;\n";
    assert_eq!(strip_type_declarations(source), source);
}

#[test]
fn test_default_function_keeps_name() {
    let out = strip_exports("export default function App() {\n  return null;\n}\n", DEFAULT_BINDING);
    assert_eq!(out.code, "function App() {\n  return null;\n}\n");
    assert_eq!(out.default_binding.as_deref(), Some("App"));
    assert_eq!(out.default_declared.as_deref(), Some("App"));
}

#[test]
fn test_default_expression_becomes_binding() {
    let out = strip_exports("const Card = () => null;\nexport default memo(Card);\n", DEFAULT_BINDING);
    assert_eq!(
        out.code,
        "const Card = () => null;\nconst __previewDefault = memo(Card);\n"
    );
    assert_eq!(out.default_binding.as_deref(), Some(DEFAULT_BINDING));
    assert_eq!(out.default_declared, None);

    let anon = strip_exports("export default function () { return 1; }\n", DEFAULT_BINDING);
    assert!(anon
        .code
        .starts_with("const __previewDefault = function () {"));

    let ident = strip_exports("function Demo() {}\nexport default Demo;\n", DEFAULT_BINDING);
    assert_eq!(ident.default_declared.as_deref(), Some("Demo"));
}

#[test]
fn test_named_exports_are_recorded() {
    let out = strip_exports(
        "export const Button = () => null;\nexport async function load() {}\nexport class Store {}\nexport const enum Tone { A }\nexport let { x } = y;\n",
        DEFAULT_BINDING,
    );
    let names: Vec<_> = out.exports.iter().map(|e| e.local.as_str()).collect();
    assert_eq!(names, vec!["Button", "load", "Store", "Tone"]);
    assert!(!out.code.contains("export"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_framework_bindings() {
    let out = rewrite_source(
        "import React, { useState as useLocal } from 'react';\nimport { createRoot } from 'react-dom/client';\nexport default function App() { return null; }\n",
        &SiblingFiles::new(),
    );
    assert_eq!(
        out.binding_statements,
        vec![
            "const React = __env.React;",
            "const useLocal = __env.React.useState;",
            "const createRoot = __env.ReactDOM.createRoot;",
        ]
    );
}

#[test]
fn test_fetched_bindings_use_fallback_chains() {
    let out = rewrite_source(
        "import Chart, { Line } from 'recharts';\nimport * as Icons from 'lucide-react';\n",
        &SiblingFiles::new(),
    );
    assert_eq!(
        out.binding_statements,
        vec![
            "const Chart = (__env[\"__dep_recharts\"] || {}).default || __env[\"__dep_recharts\"] || {};",
            "const Line = (__env[\"__dep_recharts\"] || {}).Line ?? ((__env[\"__dep_recharts\"] || {}).default || {}).Line;",
            "const Icons = __env[\"__dep_lucide_2dreact\"] || {};",
        ]
    );
}

#[test]
fn test_same_local_from_two_specifiers_declared_once() {
    let out = rewrite_source(
        "import { Star } from 'lucide-react';\nimport Star from 'canvas-confetti';\n",
        &SiblingFiles::new(),
    );
    assert_eq!(out.binding_statements.len(), 1);
    assert!(out.binding_statements[0].contains("__dep_lucide_2dreact"));
    assert_eq!(out.skipped_bindings, vec!["Star"]);
}

#[test]
fn test_type_only_imports_bind_nothing() {
    let out = rewrite_source(
        "import type { FC } from 'react';\nimport type Foo from 'left-pad';\n",
        &SiblingFiles::new(),
    );
    assert!(out.binding_statements.is_empty());
}

#[test]
fn test_stylesheet_module_binding() {
    let mut files = SiblingFiles::new();
    files.insert("Card.module.css", ".card { color: red; }\n.title {}");
    let out = rewrite_source(
        "import styles from './Card.module.css';\nimport { title, missing } from './Card.module.css';\nimport './global.css';\n",
        &files,
    );
    assert_eq!(
        out.binding_statements,
        vec![
            "__env.__injectStyle(\".card { color: red; }\\n.title {}\", \"./Card.module.css\");",
            "const styles = {\"card\":\"card\",\"title\":\"title\"};",
            "const title = \"title\";",
            "const missing = undefined;",
        ]
    );
}

#[test]
fn test_missing_stylesheet_binds_empty_object() {
    let out = rewrite_source("import s from './Gone.module.css';\n", &SiblingFiles::new());
    assert_eq!(out.binding_statements, vec!["const s = {};"]);
}

#[test]
fn test_local_and_helper_bindings() {
    let out = rewrite_source(
        "import Util from './util';\nimport Link from 'next/link';\nimport { motion } from 'framer-motion/client';\n",
        &SiblingFiles::new(),
    );
    assert_eq!(out.binding_statements[0], "const Util = __env.__noop;");
    assert_eq!(
        out.binding_statements[1],
        "const Link = __env[\"__shim_next_link\"].default;"
    );
    assert_eq!(
        out.binding_statements[2],
        "const motion = (__env[\"__dep_framer_2dmotion\"] || {}).motion ?? __env[\"__shim_motion\"].motion;"
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_entry_candidates_order() {
    let out = rewrite_source(
        "export function Helper() {}\nexport default function Card() { return null; }\n",
        &SiblingFiles::new(),
    );
    assert_eq!(
        out.entry_point_candidates,
        vec!["Card", "Helper", "App", "Component", "Preview", "Demo", "Example", "Main"]
    );
}

#[test]
fn test_anonymous_default_candidate() {
    let out = rewrite_source("export default () => null;\n", &SiblingFiles::new());
    assert_eq!(out.entry_point_candidates[0], DEFAULT_BINDING);
    assert!(out.wrapper_body.contains("const __previewDefault = () => null;"));
}

#[test]
fn test_module_text_has_no_module_syntax() {
    let out = rewrite_source(
        "\"use client\";\nimport { useState } from 'react';\ntype P = { a: string };\nexport const Thing = () => null;\nexport default function App() { const [n] = useState(0); return n; }\nexport { Thing as Other };\n",
        &SiblingFiles::new(),
    );
    let text = out.module_text();
    assert!(!text.contains("import "));
    assert!(!text.contains("export "));
    assert!(!text.contains("use client"));
    assert!(text.starts_with("const useState = __env.React.useState;\n"));
    assert!(text.contains("[\"App\", typeof App !== \"undefined\" ? App : undefined],"));
    assert!(text.trim_end().ends_with("};"));
}

#[test]
fn test_dispatcher_skips_non_identifiers() {
    let js = dispatcher(&["App".to_string(), "not-valid".to_string()]);
    assert!(js.contains("typeof App"));
    assert!(!js.contains("not-valid"));
    assert!(js.contains("$$typeof"));
}
