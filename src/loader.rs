//! Dependency Loader Generator
//!
//! Turns accepted classifications into the ordered statements the bootstrap
//! runs before compiling the component: inlined shims first, then one
//! `await import(url)` per distinct dependency with its peers ahead of it.
//! Every loaded module lands in a local named after its slot and in the
//! same slot on the `__env` object the component body receives. Each fetch
//! is guarded on its own, so one unreachable package only logs a warning.

use crate::classify::Classification;
use crate::classify::Resolution;
use crate::config::{DescriptorType, PreviewConfig};
use crate::rewrite::strip_exports;
use crate::shims;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Deterministic `__env` slot for a specifier. ASCII letters and digits
/// pass through; every other byte, `_` included, becomes `_xx` in lowercase
/// hex, so distinct specifiers never share a slot.
pub fn slot_name(specifier: &str) -> String {
    let mut slot = String::from("__dep_");
    for b in specifier.bytes() {
        if b.is_ascii_alphanumeric() {
            slot.push(b as char);
        } else {
            slot.push_str(&format!("_{:02x}", b));
        }
    }
    slot
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderFetch {
    pub specifier: String,
    pub slot: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderPlan {
    /// Shim statements followed by fetch statements
    pub statements: Vec<String>,
    /// Fetches in emission order
    pub fetches: Vec<LoaderFetch>,
}

pub struct LoaderGenerator<'a> {
    config: &'a PreviewConfig,
    visited: HashSet<String>,
    shim_statements: Vec<String>,
    fetch_statements: Vec<String>,
    fetches: Vec<LoaderFetch>,
}

impl<'a> LoaderGenerator<'a> {
    pub fn new(config: &'a PreviewConfig) -> Self {
        Self {
            config,
            visited: HashSet::new(),
            shim_statements: Vec::new(),
            fetch_statements: Vec::new(),
            fetches: Vec::new(),
        }
    }

    pub fn generate(mut self, classifications: &[Classification]) -> LoaderPlan {
        for classification in classifications {
            let specifier = classification.specifier.as_str();
            match &classification.resolution {
                Resolution::Shim { body } | Resolution::LocalShim { body } => {
                    self.add_module_shim(&slot_name(specifier), body)
                }
                Resolution::HelperShim { helper } => {
                    self.add_raw_shim(shims::helper_slot(*helper), shims::helper_source(*helper))
                }
                Resolution::AnimationFamily { base } => {
                    self.add_raw_shim(shims::animation_slot(base), shims::animation_source(base));
                    self.add_dependency(base);
                }
                Resolution::Fetch { url, peers } => self.add_fetch(specifier, url, peers),
                Resolution::Framework { .. }
                | Resolution::Stylesheet { .. }
                | Resolution::LocalEmpty
                | Resolution::Rejected { .. } => {}
            }
        }

        let mut statements = self.shim_statements;
        statements.extend(self.fetch_statements);
        LoaderPlan {
            statements,
            fetches: self.fetches,
        }
    }

    fn add_raw_shim(&mut self, slot: &str, source: &str) {
        if !self.visited.insert(slot.to_string()) {
            return;
        }
        self.shim_statements
            .push(format!("__env[\"{}\"] = {};", slot, source));
    }

    /// Inline an ES module body: exports are stripped and collected into the
    /// object the wrapper returns.
    fn add_module_shim(&mut self, slot: &str, body: &str) {
        if !self.visited.insert(slot.to_string()) {
            return;
        }
        let stripped = strip_exports(body, "__shimDefault");
        let mut fields: Vec<String> = Vec::new();
        if let Some(default) = &stripped.default_binding {
            fields.push(format!("default: {}", default));
        }
        for export in &stripped.exports {
            if export.exported != "default" {
                fields.push(format!("{}: {}", export.exported, export.local));
            }
        }
        self.shim_statements.push(format!(
            "__env[\"{slot}\"] = (function () {{\n{body}\nreturn {{ {fields} }};\n}})();",
            slot = slot,
            body = stripped.code.trim_end(),
            fields = fields.join(", "),
        ));
    }

    /// A dependency known only by name (animation base, peer).
    fn add_dependency(&mut self, specifier: &str) {
        if self.config.is_core(specifier) {
            return;
        }
        match self.config.registry.get(specifier) {
            Some(descriptor) => match descriptor.kind {
                DescriptorType::Core => {}
                DescriptorType::Cdn => {
                    let url = descriptor
                        .locator
                        .clone()
                        .unwrap_or_else(|| self.config.public_registry_url(specifier));
                    let peers = descriptor.peer_dependencies.clone();
                    self.add_fetch(specifier, &url, &peers);
                }
                DescriptorType::Shim => {
                    let body = descriptor.shim_body.clone().unwrap_or_default();
                    self.add_module_shim(&slot_name(specifier), &body);
                }
                DescriptorType::Unsupported => {
                    tracing::warn!(specifier, "skipping unsupported peer dependency");
                }
            },
            None => {
                let url = self.config.public_registry_url(specifier);
                self.add_fetch(specifier, &url, &[]);
            }
        }
    }

    fn add_fetch(&mut self, specifier: &str, url: &str, peers: &[String]) {
        let slot = slot_name(specifier);
        if !self.visited.insert(slot.clone()) {
            return;
        }
        for peer in peers {
            self.add_dependency(peer);
        }
        let literal = serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string());
        let name = serde_json::to_string(specifier).unwrap_or_else(|_| "\"\"".to_string());
        // A failed fetch leaves the slot undefined; bindings fall back to `{}`.
        self.fetch_statements.push(format!(
            "let {slot};\ntry {{\n  {slot} = await import({url});\n}} catch (error) {{\n  console.warn(\"[preview] could not load\", {name}, error);\n}}\n__env[\"{slot}\"] = {slot};",
            slot = slot,
            url = literal,
            name = name,
        ));
        self.fetches.push(LoaderFetch {
            specifier: specifier.to_string(),
            slot,
            url: url.to_string(),
        });
    }
}

pub fn generate_loader(config: &PreviewConfig, classifications: &[Classification]) -> LoaderPlan {
    LoaderGenerator::new(config).generate(classifications)
}
