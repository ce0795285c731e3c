//! Dependency Classifier
//!
//! Judges every import specifier against the injected [`PreviewConfig`] and
//! reduces the per-specifier verdicts to one mode for the whole module.
//! Classification is pure: the same specifier under the same configuration
//! always yields the same [`Classification`].

use crate::config::{DescriptorType, PreviewConfig};
use crate::scanner::ImportRecord;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

lazy_static! {
    /// Public package name, optionally scoped, optionally followed by a subpath
    static ref PACKAGE_NAME_RE: Regex = Regex::new(
        r"^(?:@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*(?:/[A-Za-z0-9._~-]+)*$"
    )
    .unwrap();
}

const MAX_PACKAGE_NAME_LEN: usize = 214;

pub const ANIMATION_FAMILIES: [&str; 3] = ["framer-motion", "motion", "gsap"];

// ═══════════════════════════════════════════════════════════════════════════════
// VERDICTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Local,
    Core,
    RegistryKnown,
    AutoDetected,
    Unsafe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HelperKind {
    Link,
    Image,
}

impl HelperKind {
    pub fn from_specifier(specifier: &str) -> Option<Self> {
        match specifier {
            "next/link" => Some(HelperKind::Link),
            "next/image" => Some(HelperKind::Image),
            _ => None,
        }
    }
}

/// How the loader and the rewriter have to treat one specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resolution {
    /// Read off the loaded framework object (`React`, `ReactDOM`)
    Framework { global: String },
    /// Relative stylesheet, `module` when it binds a class lookup object
    Stylesheet { module: bool },
    /// Exact configured shim for a relative path
    LocalShim { body: String },
    /// Relative import nothing provides; binds a no-op component
    LocalEmpty,
    /// `framer-motion/*`, `motion/*`, `gsap/*`: base package fetched plus shims
    AnimationFamily { base: String },
    /// `next/link`, `next/image`
    HelperShim { helper: HelperKind },
    /// Registry shim body, inlined
    Shim { body: String },
    /// Dynamic import from `url`, after `peers`
    Fetch { url: String, peers: Vec<String> },
    Rejected { reason: String },
}

impl Resolution {
    /// Accepted dependencies satisfied by hand-written or inlined code.
    pub fn is_shim(&self) -> bool {
        matches!(
            self,
            Resolution::Shim { .. }
                | Resolution::LocalShim { .. }
                | Resolution::HelperShim { .. }
                | Resolution::AnimationFamily { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub specifier: String,
    pub verdict: Verdict,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewMode {
    Live,
    Shimmed,
    Auto,
    Disabled,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFIER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Classifier<'a> {
    config: &'a PreviewConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a PreviewConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, specifier: &str) -> Classification {
        let (verdict, resolution) = self.decide(specifier);
        if verdict == Verdict::Unsafe {
            tracing::warn!(specifier, ?resolution, "unsafe dependency");
        }
        Classification {
            specifier: specifier.to_string(),
            verdict,
            resolution,
        }
    }

    /// Classify every runtime import once, in first-seen order. Type-only
    /// records carry no dependency and are skipped.
    pub fn classify_records(&self, records: &[ImportRecord]) -> Vec<Classification> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|r| !r.type_only)
            .filter(|r| seen.insert(r.module.clone()))
            .map(|r| self.classify(&r.module))
            .collect()
    }

    fn decide(&self, specifier: &str) -> (Verdict, Resolution) {
        // 1. Core framework
        if self.config.is_core(specifier) {
            let global = self
                .config
                .registry
                .get(specifier)
                .and_then(|d| d.global_name.clone())
                .unwrap_or_else(|| framework_global(specifier).to_string());
            return (Verdict::Core, Resolution::Framework { global });
        }

        // 2. Relative path
        if specifier.starts_with("./") || specifier.starts_with("../") {
            return (Verdict::Local, self.resolve_local(specifier));
        }

        // 3. Unscoped subpath
        if !specifier.starts_with('@') && specifier.contains('/') {
            return self.resolve_subpath(specifier);
        }

        // 4. Registry
        if let Some(descriptor) = self.config.registry.get(specifier) {
            return match descriptor.kind {
                DescriptorType::Core => (
                    Verdict::Core,
                    Resolution::Framework {
                        global: descriptor
                            .global_name
                            .clone()
                            .unwrap_or_else(|| framework_global(specifier).to_string()),
                    },
                ),
                DescriptorType::Cdn => (
                    Verdict::RegistryKnown,
                    Resolution::Fetch {
                        url: descriptor
                            .locator
                            .clone()
                            .unwrap_or_else(|| self.config.public_registry_url(specifier)),
                        peers: descriptor.peer_dependencies.clone(),
                    },
                ),
                DescriptorType::Shim => (
                    Verdict::RegistryKnown,
                    Resolution::Shim {
                        body: descriptor.shim_body.clone().unwrap_or_default(),
                    },
                ),
                DescriptorType::Unsupported => rejected("not supported in previews"),
            };
        }

        // 5. Auto-detection
        match self.validate(specifier) {
            Ok(()) => (
                Verdict::AutoDetected,
                Resolution::Fetch {
                    url: self.config.public_registry_url(specifier),
                    peers: vec![],
                },
            ),
            Err(reason) => rejected(reason),
        }
    }

    fn resolve_local(&self, specifier: &str) -> Resolution {
        if specifier.ends_with(".module.css") || specifier.ends_with(".module.scss") {
            return Resolution::Stylesheet { module: true };
        }
        if specifier.ends_with(".css") || specifier.ends_with(".scss") {
            return Resolution::Stylesheet { module: false };
        }
        match self.config.local_shims.get(specifier) {
            Some(body) => Resolution::LocalShim { body: body.clone() },
            None => Resolution::LocalEmpty,
        }
    }

    fn resolve_subpath(&self, specifier: &str) -> (Verdict, Resolution) {
        let base = specifier.split('/').next().unwrap_or_default();
        if self.config.is_denylisted(base) {
            return rejected("host capability");
        }
        if let Err(reason) = self.validate(specifier) {
            return rejected(reason);
        }
        if ANIMATION_FAMILIES.contains(&base) {
            return (
                Verdict::RegistryKnown,
                Resolution::AnimationFamily {
                    base: base.to_string(),
                },
            );
        }
        if let Some(helper) = HelperKind::from_specifier(specifier) {
            return (Verdict::RegistryKnown, Resolution::HelperShim { helper });
        }
        (
            Verdict::RegistryKnown,
            Resolution::Fetch {
                url: self.config.public_registry_url(specifier),
                peers: vec![],
            },
        )
    }

    fn validate(&self, specifier: &str) -> std::result::Result<(), &'static str> {
        if specifier.is_empty() || specifier.len() > MAX_PACKAGE_NAME_LEN {
            return Err("invalid package name");
        }
        if self
            .config
            .dangerous_patterns
            .iter()
            .any(|p| specifier.contains(p.as_str()))
        {
            return Err("dangerous pattern");
        }
        if !PACKAGE_NAME_RE.is_match(specifier) {
            return Err("invalid package name");
        }
        if self.config.is_denylisted(package_name(specifier)) {
            return Err("host capability");
        }
        Ok(())
    }
}

fn rejected(reason: &str) -> (Verdict, Resolution) {
    (
        Verdict::Unsafe,
        Resolution::Rejected {
            reason: reason.to_string(),
        },
    )
}

fn framework_global(specifier: &str) -> &'static str {
    if specifier.starts_with("react-dom") {
        "ReactDOM"
    } else {
        "React"
    }
}

/// Package part of a specifier: `@scope/name` or the first segment.
pub fn package_name(specifier: &str) -> &str {
    if specifier.starts_with('@') {
        match specifier.match_indices('/').nth(1) {
            Some((idx, _)) => &specifier[..idx],
            None => specifier,
        }
    } else {
        specifier.split('/').next().unwrap_or(specifier)
    }
}

/// Reduce verdicts to one mode: disabled > auto > shimmed > live.
pub fn decide_mode(classifications: &[Classification]) -> PreviewMode {
    if classifications.iter().any(|c| c.verdict == Verdict::Unsafe) {
        PreviewMode::Disabled
    } else if classifications
        .iter()
        .any(|c| c.verdict == Verdict::AutoDetected)
    {
        PreviewMode::Auto
    } else if classifications.iter().any(|c| c.resolution.is_shim()) {
        PreviewMode::Shimmed
    } else {
        PreviewMode::Live
    }
}
