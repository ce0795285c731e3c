//! Preview configuration: the dependency registry, the host-capability
//! denylist and the runtime URLs the generated bootstrap pulls in.
//!
//! Everything here is plain data. A `PreviewConfig` is built once (from
//! `Default` or JSON) and passed by reference through the whole pipeline,
//! so tests and deployments can swap the registry without touching code.

use crate::error::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DescriptorType {
    /// Supplied by the runtime itself (the component framework)
    Core,
    /// Fetched with a dynamic import from `locator`
    Cdn,
    /// Inlined `shim_body` instead of a real module
    Shim,
    /// Known and explicitly refused
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescriptor {
    #[serde(rename = "type")]
    pub kind: DescriptorType,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub shim_body: Option<String>,
    #[serde(default)]
    pub peer_dependencies: Vec<String>,
}

impl DependencyDescriptor {
    fn core(global_name: &str) -> Self {
        Self {
            kind: DescriptorType::Core,
            locator: None,
            global_name: Some(global_name.to_string()),
            shim_body: None,
            peer_dependencies: vec![],
        }
    }

    fn cdn(locator: &str, peers: &[&str]) -> Self {
        Self {
            kind: DescriptorType::Cdn,
            locator: Some(locator.to_string()),
            global_name: None,
            shim_body: None,
            peer_dependencies: peers.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn shim(body: &str) -> Self {
        Self {
            kind: DescriptorType::Shim,
            locator: None,
            global_name: None,
            shim_body: Some(body.to_string()),
            peer_dependencies: vec![],
        }
    }

    fn unsupported() -> Self {
        Self {
            kind: DescriptorType::Unsupported,
            locator: None,
            global_name: None,
            shim_body: None,
            peer_dependencies: vec![],
        }
    }
}

/// Immutable specifier → descriptor table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    entries: BTreeMap<String, DependencyDescriptor>,
}

impl Registry {
    pub fn new(entries: BTreeMap<String, DependencyDescriptor>) -> Self {
        Self { entries }
    }

    pub fn get(&self, specifier: &str) -> Option<&DependencyDescriptor> {
        self.entries.get(specifier)
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.entries.contains_key(specifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DependencyDescriptor)> {
        self.entries.iter()
    }

    /// Builder-style override, mostly for tests.
    pub fn with_entry(mut self, specifier: &str, descriptor: DependencyDescriptor) -> Self {
        self.entries.insert(specifier.to_string(), descriptor);
        self
    }
}

const REACT_DEPS: &str = "deps=react@18.3.1,react-dom@18.3.1";

const CLSX_SHIM: &str = r#"export default function clsx(...args) {
  const out = [];
  const walk = (value) => {
    if (!value) return;
    if (typeof value === "string" || typeof value === "number") out.push(String(value));
    else if (Array.isArray(value)) value.forEach(walk);
    else if (typeof value === "object") for (const key in value) if (value[key]) out.push(key);
  };
  args.forEach(walk);
  return out.join(" ");
}
export { clsx };"#;

const UUID_SHIM: &str = r#"export function v4() {
  if (typeof crypto !== "undefined" && crypto.randomUUID) return crypto.randomUUID();
  return "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx".replace(/[xy]/g, (c) => {
    const r = (Math.random() * 16) | 0;
    return (c === "x" ? r : (r & 0x3) | 0x8).toString(16);
  });
}"#;

fn default_registry() -> Registry {
    let mut m = BTreeMap::new();
    m.insert("react".to_string(), DependencyDescriptor::core("React"));
    m.insert("react-dom".to_string(), DependencyDescriptor::core("ReactDOM"));
    m.insert("react-dom/client".to_string(), DependencyDescriptor::core("ReactDOM"));
    m.insert("react/jsx-runtime".to_string(), DependencyDescriptor::core("React"));
    m.insert(
        "framer-motion".to_string(),
        DependencyDescriptor::cdn(&format!("https://esm.sh/framer-motion@11.2.10?{}", REACT_DEPS), &[]),
    );
    m.insert(
        "motion".to_string(),
        DependencyDescriptor::cdn(&format!("https://esm.sh/motion@11.2.10?{}", REACT_DEPS), &[]),
    );
    m.insert("gsap".to_string(), DependencyDescriptor::cdn("https://esm.sh/gsap@3.12.5", &[]));
    m.insert(
        "lucide-react".to_string(),
        DependencyDescriptor::cdn(&format!("https://esm.sh/lucide-react@0.395.0?{}", REACT_DEPS), &[]),
    );
    m.insert(
        "recharts".to_string(),
        DependencyDescriptor::cdn(&format!("https://esm.sh/recharts@2.12.7?{}", REACT_DEPS), &[]),
    );
    m.insert("three".to_string(), DependencyDescriptor::cdn("https://esm.sh/three@0.165.0", &[]));
    m.insert(
        "@react-three/fiber".to_string(),
        DependencyDescriptor::cdn(
            &format!("https://esm.sh/@react-three/fiber@8.16.8?{}", REACT_DEPS),
            &["three"],
        ),
    );
    m.insert(
        "@react-three/drei".to_string(),
        DependencyDescriptor::cdn(
            &format!("https://esm.sh/@react-three/drei@9.107.0?{}", REACT_DEPS),
            &["three", "@react-three/fiber"],
        ),
    );
    m.insert("clsx".to_string(), DependencyDescriptor::shim(CLSX_SHIM));
    m.insert("classnames".to_string(), DependencyDescriptor::shim(CLSX_SHIM));
    m.insert("uuid".to_string(), DependencyDescriptor::shim(UUID_SHIM));
    m.insert("react-native".to_string(), DependencyDescriptor::unsupported());
    m.insert("next".to_string(), DependencyDescriptor::unsupported());
    Registry::new(m)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREVIEW CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    /// Line-oriented scanner, not bracket-balanced
    #[default]
    Heuristic,
    /// Parser-backed statement boundaries, falls back to heuristic on parse errors
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    pub registry: Registry,
    /// Specifiers the runtime supplies itself
    pub core_specifiers: Vec<String>,
    /// Host-capability packages that are never loaded
    pub denylist: Vec<String>,
    /// Substrings that make a specifier unsafe outright
    pub dangerous_patterns: Vec<String>,
    /// Exact relative-path shims (`./utils` → module body)
    pub local_shims: BTreeMap<String, String>,
    /// Public registry base for auto-detected packages
    pub cdn_base: String,
    /// Query appended to synthesized public-registry URLs
    pub cdn_query: String,
    pub framework_url: String,
    pub dom_client_url: String,
    pub compiler_url: String,
    /// Wall-clock budget checked once before compilation
    pub dependency_budget_ms: u64,
    pub scan_mode: ScanMode,
    /// Check the build generation right before mount. The generation is
    /// baked into the document, so this only catches a second bootstrap run
    /// inside the same document. Superseded builds are dropped host-side by
    /// `PreviewHost::complete_build`.
    pub guard_stale_mount: bool,
    /// Also render the complete HTML document into the output record
    pub emit_document: bool,
    pub mount_node_id: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            core_specifiers: ["react", "react-dom", "react-dom/client", "react/jsx-runtime"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            denylist: [
                "fs", "fs-extra", "path", "os", "child_process", "net", "http", "https", "http2",
                "tls", "dgram", "dns", "cluster", "worker_threads", "vm", "module", "process",
                "readline", "repl", "inspector", "v8", "perf_hooks", "async_hooks", "electron",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            dangerous_patterns: [
                "://", "..", "node:", "file:", "data:", "javascript:", "\\", "child_process",
                "process.env", "__proto__",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            local_shims: BTreeMap::new(),
            cdn_base: "https://esm.sh".to_string(),
            cdn_query: REACT_DEPS.to_string(),
            framework_url: "https://esm.sh/react@18.3.1".to_string(),
            dom_client_url: "https://esm.sh/react-dom@18.3.1/client".to_string(),
            compiler_url: "https://esm.sh/@babel/standalone@7.24.7".to_string(),
            dependency_budget_ms: 15_000,
            scan_mode: ScanMode::Heuristic,
            guard_stale_mount: true,
            emit_document: false,
            mount_node_id: "root".to_string(),
        }
    }
}

impl PreviewConfig {
    /// Parse a configuration document. Missing fields keep their defaults,
    /// so a JSON file may override just the registry or just the URLs.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| PreviewError::io(path, e))?;
        Self::from_json_str(&data)
    }

    pub fn is_core(&self, specifier: &str) -> bool {
        self.core_specifiers.iter().any(|c| c == specifier)
    }

    pub fn is_denylisted(&self, package: &str) -> bool {
        self.denylist.iter().any(|d| d == package)
    }

    /// Public-registry URL for a package the registry does not know.
    pub fn public_registry_url(&self, specifier: &str) -> String {
        let base = self.cdn_base.trim_end_matches('/');
        if self.cdn_query.is_empty() {
            format!("{}/{}", base, specifier)
        } else {
            format!("{}/{}?{}", base, specifier, self.cdn_query)
        }
    }
}
