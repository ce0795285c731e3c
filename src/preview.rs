//! Preview pipeline.
//!
//! One request in, one output record out:
//! scan imports → classify → (disabled? stop) → loader + rewrite →
//! assemble bootstrap (and optionally the whole document).

use crate::assemble::{bootstrap_script, render_document, GeneratedRuntime};
use crate::classify::{decide_mode, package_name, Classification, Classifier, PreviewMode, Verdict};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::files::SiblingFiles;
use crate::loader::generate_loader;
use crate::rewrite::rewrite_module;
use crate::scanner::scan_imports;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub const SUPPORTED_FRAMEWORK: &str = "react";

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    #[default]
    Tsx,
    Jsx,
    Ts,
    Js,
}

impl SourceLanguage {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "tsx" => Some(SourceLanguage::Tsx),
            "jsx" => Some(SourceLanguage::Jsx),
            "ts" | "mts" | "cts" => Some(SourceLanguage::Ts),
            "js" | "mjs" | "cjs" => Some(SourceLanguage::Js),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SourceLanguage::Tsx => "tsx",
            SourceLanguage::Jsx => "jsx",
            SourceLanguage::Ts => "ts",
            SourceLanguage::Js => "js",
        }
    }

    pub fn supports_jsx(self) -> bool {
        matches!(self, SourceLanguage::Tsx | SourceLanguage::Jsx)
    }

    /// Babel standalone `presets` option as a JS array literal.
    pub fn babel_presets(self) -> &'static str {
        match self {
            SourceLanguage::Tsx => {
                r#"["react", ["typescript", { "isTSX": true, "allExtensions": true }]]"#
            }
            SourceLanguage::Jsx => r#"["react"]"#,
            SourceLanguage::Ts => r#"[["typescript", { "allExtensions": true }]]"#,
            SourceLanguage::Js => "[]",
        }
    }
}

fn default_framework() -> String {
    SUPPORTED_FRAMEWORK.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub source: String,
    #[serde(default)]
    pub language: SourceLanguage,
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default)]
    pub files: SiblingFiles,
    /// Build number checked before mount; superseded builds never mount
    #[serde(default)]
    pub generation: u64,
}

impl PreviewRequest {
    pub fn new(source: impl Into<String>, language: SourceLanguage) -> Self {
        Self {
            source: source.into(),
            language,
            framework: default_framework(),
            files: SiblingFiles::new(),
            generation: 0,
        }
    }

    pub fn with_files(mut self, files: SiblingFiles) -> Self {
        self.files = files;
        self
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOutput {
    pub mode: PreviewMode,
    /// Bootstrap routine; `None` when the preview is disabled
    pub runtime_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub auto_detected_packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// Everything decided before text is emitted.
#[derive(Debug, Clone)]
pub struct PreviewPlan {
    pub mode: PreviewMode,
    pub classifications: Vec<Classification>,
    /// Import-like statements that matched no known shape
    pub dropped_imports: Vec<String>,
    pub runtime: Option<GeneratedRuntime>,
}

impl PreviewPlan {
    /// First specifier that disabled the preview, if any.
    pub fn unsupported(&self) -> Option<&str> {
        self.classifications
            .iter()
            .find(|c| c.verdict == Verdict::Unsafe)
            .map(|c| c.specifier.as_str())
    }

    /// Distinct base packages fetched on trust from the public registry.
    pub fn auto_detected_packages(&self) -> Vec<String> {
        let mut packages: Vec<String> = Vec::new();
        for c in &self.classifications {
            if c.verdict != Verdict::AutoDetected {
                continue;
            }
            let name = package_name(&c.specifier).to_string();
            if !packages.contains(&name) {
                packages.push(name);
            }
        }
        packages
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn plan_preview(request: &PreviewRequest, config: &PreviewConfig) -> Result<PreviewPlan> {
    if request.framework != SUPPORTED_FRAMEWORK {
        return Err(PreviewError::UnsupportedFramework {
            framework: request.framework.clone(),
        });
    }

    let scan = scan_imports(&request.source, config.scan_mode);
    let classifications = Classifier::new(config).classify_records(&scan.records);
    let mode = decide_mode(&classifications);

    let runtime = if mode == PreviewMode::Disabled {
        None
    } else {
        let loader = generate_loader(config, &classifications);
        let rewrite = rewrite_module(&scan.stripped, &scan.records, &classifications, &request.files);
        for local in &rewrite.skipped_bindings {
            tracing::debug!(local = %local, "binding already declared by an earlier import");
        }
        Some(GeneratedRuntime::new(loader, rewrite, request.language))
    };

    Ok(PreviewPlan {
        mode,
        classifications,
        dropped_imports: scan.dropped,
        runtime,
    })
}

/// Build one preview. Unsupported dependencies do not fail the call; they
/// produce a `disabled` record carrying the message.
pub fn build_preview(request: &PreviewRequest, config: &PreviewConfig) -> Result<PreviewOutput> {
    let plan = plan_preview(request, config)?;
    let auto_detected_packages = plan.auto_detected_packages();

    let Some(runtime) = &plan.runtime else {
        let specifier = plan.unsupported().unwrap_or_default().to_string();
        let message = PreviewError::UnsupportedDependency { specifier }.to_string();
        tracing::info!(mode = ?plan.mode, error = %message, "preview disabled");
        return Ok(PreviewOutput {
            mode: plan.mode,
            runtime_code: None,
            error: Some(message),
            auto_detected_packages,
            document: None,
        });
    };

    let runtime_code = bootstrap_script(runtime, config, request.language, request.generation);
    let document = config
        .emit_document
        .then(|| render_document(runtime, config, request.language, request.generation));

    tracing::info!(
        mode = ?plan.mode,
        filename = %runtime.virtual_filename,
        loader_statements = runtime.loader_statements.len(),
        bindings = runtime.binding_statements.len(),
        "preview built"
    );

    Ok(PreviewOutput {
        mode: plan.mode,
        runtime_code: Some(runtime_code),
        error: None,
        auto_detected_packages,
        document,
    })
}

/// Build many previews in parallel. Output order matches input order.
pub fn build_previews(requests: &[PreviewRequest], config: &PreviewConfig) -> Vec<Result<PreviewOutput>> {
    requests
        .par_iter()
        .map(|request| build_preview(request, config))
        .collect()
}
