//! # Preview Compiler
//!
//! Turns one component source file into a self-contained program that
//! renders it inside a sandboxed frame.
//!
//! ## Pipeline
//!
//! 1. **Scan** (`scanner`): find and remove static import statements.
//! 2. **Classify** (`classify`): decide per specifier whether it is the
//!    framework, a local file, a registry entry, an auto-detected public
//!    package or unsafe. One unsafe verdict disables the whole preview.
//! 3. **Load** (`loader`): shims first, then one `await import(url)` per
//!    distinct dependency, peers ahead of dependents.
//! 4. **Rewrite** (`rewrite`): `const` bindings off `__env`, module syntax
//!    stripped, entry-point dispatcher appended.
//! 5. **Assemble** (`assemble`): the bootstrap routine that compiles and
//!    mounts the component in the frame, and the full preview document.
//!
//! The crate only produces text. Nothing here evaluates component code.
//!
//! ## Frame protocol
//!
//! `bridge` renders and models the same-origin bridge document that hosts
//! the sandboxed inner frame; `host` models the embedding page's side;
//! `embeds` rewrites video embeds into their privacy-respecting forms.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod assemble;
pub mod bridge;
pub mod classify;
pub mod config;
pub mod embeds;
pub mod error;
pub mod files;
pub mod host;
pub mod loader;
pub mod preview;
pub mod rewrite;
pub mod scanner;
pub mod shims;
pub mod stylesheet;

#[cfg(test)]
mod rewrite_tests;
#[cfg(test)]
mod scenario_tests;

pub use bridge::{render_bridge_document, BridgeDocument, PreviewMessage, RouteKind};
pub use classify::{Classification, Classifier, PreviewMode, Verdict};
pub use config::{DependencyDescriptor, DescriptorType, PreviewConfig, Registry, ScanMode};
pub use error::{PreviewError, Result};
pub use files::SiblingFiles;
pub use host::{PreviewHost, WindowId};
pub use preview::{build_preview, build_previews, PreviewOutput, PreviewRequest, SourceLanguage};

/// Build one preview from a JSON `PreviewRequest`. `config_json` overrides
/// the built-in configuration field by field.
#[cfg(feature = "napi")]
#[napi]
pub fn build_preview_native(
    request_json: String,
    config_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let request: PreviewRequest = serde_json::from_str(&request_json)
        .map_err(|e| napi::Error::from_reason(format!("Request parse error: {}", e)))?;
    let config = match config_json {
        Some(json) => PreviewConfig::from_json_str(&json)
            .map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => PreviewConfig::default(),
    };
    let output = build_preview(&request, &config)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn render_bridge_document_native() -> String {
    render_bridge_document()
}
