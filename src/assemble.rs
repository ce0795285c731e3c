//! Runtime Assembler
//!
//! Composes loader and rewriter output into the bootstrap routine that runs
//! inside the sandboxed frame, and wraps that routine into the complete
//! preview HTML document.
//!
//! The component's module text never appears as code in the emitted script:
//! it is embedded as one inert JSON string literal, handed to the in-frame
//! compiler, and only the compiler's output is evaluated, through
//! `new Function("__env", code)`. That call is the one place where text
//! becomes code.

use crate::config::PreviewConfig;
use crate::error::DiagnosticKind;
use crate::loader::LoaderPlan;
use crate::preview::SourceLanguage;
use crate::rewrite::{dispatcher, RewriteOutput};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATED RUNTIME
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRuntime {
    pub loader_statements: Vec<String>,
    pub binding_statements: Vec<String>,
    pub wrapper_body: String,
    pub entry_point_candidates: Vec<String>,
    pub virtual_filename: String,
}

impl GeneratedRuntime {
    pub fn new(loader: LoaderPlan, rewrite: RewriteOutput, language: SourceLanguage) -> Self {
        let virtual_filename = virtual_filename(&rewrite.module_text(), language);
        Self {
            loader_statements: loader.statements,
            binding_statements: rewrite.binding_statements,
            wrapper_body: rewrite.wrapper_body,
            entry_point_candidates: rewrite.entry_point_candidates,
            virtual_filename,
        }
    }

    /// Bindings, then body, then dispatcher.
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

/// `preview-<sha256 prefix>.<ext>`, stable for identical module text.
pub fn virtual_filename(module_text: &str, language: SourceLanguage) -> String {
    let digest = Sha256::digest(module_text.as_bytes());
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("preview-{}.{}", hex, language.extension())
}

/// JSON string literal safe to place inside a `<script>` element.
pub fn embed_literal(text: &str) -> String {
    serde_json::to_string(text)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn escape_html_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE TIPS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TipTarget {
    Source,
    Message,
}

/// One heuristic hint attached to compile and evaluation errors. Patterns
/// are written in the common subset of Rust and JS regex syntax because the
/// same table is evaluated in the frame.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileTip {
    pub target: TipTarget,
    pub pattern: &'static str,
    /// Only applies when the language tag has no JSX support
    pub plain_only: bool,
    pub tip: &'static str,
}

pub const COMPILE_TIPS: [CompileTip; 4] = [
    CompileTip {
        target: TipTarget::Source,
        pattern: r"(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*\([^)]*\)\s*=>",
        plain_only: false,
        tip: "Arrow functions are assigned with '=': write `const Name = (props) => ...`.",
    },
    CompileTip {
        target: TipTarget::Message,
        pattern: r"\bexport\b",
        plain_only: false,
        tip: "`export` is only allowed at the top level of the file.",
    },
    CompileTip {
        target: TipTarget::Source,
        pattern: r"</[A-Za-z]|/>",
        plain_only: true,
        tip: "This looks like JSX. Switch the language to jsx or tsx.",
    },
    CompileTip {
        target: TipTarget::Message,
        pattern: r"Expected corresponding JSX closing tag|Unterminated JSX contents",
        plain_only: false,
        tip: "A JSX element is missing its closing tag.",
    },
];

pub const UNBALANCED_TIP: &str = "Brackets are unbalanced: check that every (, [ and { is closed.";

lazy_static! {
    static ref TIP_PATTERNS: Vec<Regex> = COMPILE_TIPS
        .iter()
        .map(|t| Regex::new(t.pattern).unwrap())
        .collect();
}

/// Whether `()[]{}` fail to pair up outside string literals and comments.
pub fn brackets_unbalanced(source: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == '\\' {
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
            '"' | '\'' | '`' => quote = Some(c),
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    !stack.is_empty()
}

/// Tips for a compile error, in table order, unbalanced brackets last.
pub fn compile_tips(source: &str, message: &str, language: SourceLanguage) -> Vec<&'static str> {
    let mut tips: Vec<&'static str> = COMPILE_TIPS
        .iter()
        .zip(TIP_PATTERNS.iter())
        .filter(|(tip, _)| !tip.plain_only || !language.supports_jsx())
        .filter(|(tip, pattern)| match tip.target {
            TipTarget::Source => pattern.is_match(source),
            TipTarget::Message => pattern.is_match(message),
        })
        .map(|(tip, _)| tip.tip)
        .collect();
    if brackets_unbalanced(source) {
        tips.push(UNBALANCED_TIP);
    }
    tips
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOOTSTRAP
// ═══════════════════════════════════════════════════════════════════════════════

fn diagnostic_titles() -> String {
    let entries: Vec<String> = DiagnosticKind::ALL
        .iter()
        .map(|k| format!("{}: {}", k.key(), embed_literal(k.title())))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}

fn indent(statements: &[String], pad: &str) -> String {
    statements
        .iter()
        .flat_map(|s| s.lines().map(move |l| format!("{}{}", pad, l)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The async bootstrap routine, as the body of a module script.
///
/// The in-frame generation check can only trip within one document; stale
/// builds never reach the frame because `PreviewHost::complete_build`
/// discards them.
pub fn bootstrap_script(
    runtime: &GeneratedRuntime,
    config: &PreviewConfig,
    language: SourceLanguage,
    generation: u64,
) -> String {
    let tips = serde_json::to_string(&COMPILE_TIPS).unwrap_or_else(|_| "[]".to_string());
    let guard = if config.guard_stale_mount {
        "  if (window.__previewGeneration !== __generation) return;\n"
    } else {
        ""
    };
    format!(
        r#"(async () => {{
  const __mount = document.getElementById({mount_id});
  const __generation = {generation};
  window.__previewGeneration = Math.max(window.__previewGeneration || 0, __generation);
  const __startedAt = Date.now();
  const __source = {source};
  const __plain = {plain};
  const __titles = {titles};
  const __tips = {tips};
  const __env = Object.create(null);

  const __unbalanced = (s) => {{
    const pairs = {{ ")": "(", "]": "[", "}}": "{{" }};
    const stack = [];
    let quote = null;
    for (let i = 0; i < s.length; i++) {{
      const ch = s[i];
      if (quote) {{ if (ch === "\\") i++; else if (ch === quote) quote = null; continue; }}
      if (ch === '"' || ch === "'" || ch === "`") {{ quote = ch; continue; }}
      if (ch === "/" && s[i + 1] === "/") {{ while (i < s.length && s[i] !== "\n") i++; continue; }}
      if ("([{{".includes(ch)) stack.push(ch);
      else if (pairs[ch] && stack.pop() !== pairs[ch]) return true;
    }}
    return stack.length > 0;
  }};
  const __tipsFor = (message) => {{
    const out = [];
    for (const t of __tips) {{
      if (t.plainOnly && !__plain) continue;
      const hay = t.target === "source" ? __source : message;
      if (new RegExp(t.pattern).test(hay)) out.push(t.tip);
    }}
    if (__unbalanced(__source)) out.push({unbalanced});
    return out;
  }};
  const __showError = (kind, error) => {{
    const message = (error && (error.stack || error.message)) || String(error);
    const tips = kind === "compile" || kind === "eval" ? __tipsFor(message) : [];
    const panel = document.createElement("div");
    panel.className = "preview-error";
    const title = document.createElement("strong");
    title.textContent = __titles[kind] || "Error";
    const pre = document.createElement("pre");
    pre.textContent = message;
    panel.append(title, pre);
    if (tips.length) {{
      const list = document.createElement("ul");
      for (const tip of tips) {{
        const item = document.createElement("li");
        item.textContent = tip;
        list.append(item);
      }}
      panel.append(list);
    }}
    __mount.replaceChildren(panel);
    console.error("[preview:" + kind + "]", message);
  }};

  let React, ReactDOM, Babel;
  try {{
    const __react = await import({framework_url});
    React = __react.default || __react;
    const __dom = await import({dom_url});
    ReactDOM = __dom.createRoot ? __dom : __dom.default || __dom;
    __env.React = React;
    __env.ReactDOM = ReactDOM;
    __env.__noop = () => null;
    __env.__injectStyle = (css, id) => {{
      const style = document.createElement("style");
      style.dataset.previewStyle = id;
      style.textContent = css;
      document.head.append(style);
    }};
    const __compiler = await import({compiler_url});
    Babel = __compiler.default || __compiler;
{loader}
  }} catch (error) {{
    __showError("dependency", error);
    return;
  }}

  window.addEventListener("error", (event) => __showError("runtime", event.error || event.message));
  window.addEventListener("unhandledrejection", (event) => __showError("runtime", event.reason));

  if (Date.now() - __startedAt > {budget}) {{
    __showError("timeout", new Error("Dependencies took longer than {budget}ms to load."));
    return;
  }}

  let __compiled;
  try {{
    __compiled = Babel.transform(__source, {{
      filename: {filename},
      presets: {presets},
      sourceType: "script",
      parserOpts: {{ allowReturnOutsideFunction: true }},
    }}).code;
  }} catch (error) {{
    __showError("compile", error);
    return;
  }}

  window.React = React;
  window.ReactDOM = ReactDOM;
  let __resolveEntry;
  try {{
    __resolveEntry = new Function("__env", __compiled)(__env);
  }} catch (error) {{
    __showError("eval", error);
    return;
  }}

{guard}  try {{
    const Entry = __resolveEntry();
    ReactDOM.createRoot(__mount).render(React.createElement(Entry));
  }} catch (error) {{
    __showError("mount", error);
  }}
}})();
"#,
        mount_id = embed_literal(&config.mount_node_id),
        generation = generation,
        source = embed_literal(&runtime.module_text()),
        plain = !language.supports_jsx(),
        titles = diagnostic_titles(),
        tips = tips.replace("</", "<\\/"),
        unbalanced = embed_literal(UNBALANCED_TIP),
        framework_url = embed_literal(&config.framework_url),
        dom_url = embed_literal(&config.dom_client_url),
        compiler_url = embed_literal(&config.compiler_url),
        loader = indent(&runtime.loader_statements, "    "),
        budget = config.dependency_budget_ms,
        filename = embed_literal(&runtime.virtual_filename),
        presets = language.babel_presets(),
        guard = guard,
    )
}

/// Relays in-frame console calls to the bridge as `console` messages.
const CONSOLE_RELAY: &str = r#"(() => {
  const serialize = (value) => {
    if (value instanceof Error) return value.stack || value.message;
    if (typeof value === "string") return value;
    try { return JSON.stringify(value); } catch (_) { return String(value); }
  };
  for (const level of ["log", "info", "warn", "error", "debug"]) {
    const original = console[level].bind(console);
    console[level] = (...args) => {
      try { parent.postMessage({ type: "console", level, args: args.map(serialize) }, "*"); } catch (_) {}
      original(...args);
    };
  }
})();"#;

/// Complete preview document: mount node, base styles, console relay and
/// the bootstrap routine.
pub fn render_document(
    runtime: &GeneratedRuntime,
    config: &PreviewConfig,
    language: SourceLanguage,
    generation: u64,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Preview</title>
<style>
  html, body {{ margin: 0; padding: 0; min-height: 100%; font-family: system-ui, -apple-system, sans-serif; }}
  #{mount_css} {{ min-height: 100vh; }}
  .preview-error {{ margin: 16px; padding: 12px 16px; border: 1px solid #f5c2c7; border-radius: 8px; background: #fff5f5; color: #842029; font: 13px/1.5 ui-monospace, monospace; }}
  .preview-error pre {{ white-space: pre-wrap; margin: 8px 0 0; }}
  .preview-error ul {{ margin: 8px 0 0; padding-left: 18px; }}
</style>
<script>
{relay}
</script>
</head>
<body>
<div id="{mount_id}"></div>
<script type="module">
{bootstrap}</script>
</body>
</html>
"#,
        mount_css = escape_html_attr(&config.mount_node_id),
        mount_id = escape_html_attr(&config.mount_node_id),
        relay = CONSOLE_RELAY,
        bootstrap = bootstrap_script(runtime, config, language, generation),
    )
}
