//! End-to-end behavior across the pipeline and the frame protocol.

use crate::bridge::{BridgeDocument, BridgeOutcome, PreviewMessage};
use crate::classify::{decide_mode, Classifier, PreviewMode};
use crate::config::{PreviewConfig, ScanMode};
use crate::host::{HostReaction, PreviewHost, WindowId};
use crate::preview::{build_preview, plan_preview, PreviewRequest, SourceLanguage};
use crate::scanner::scan_imports;

const BRIDGE_URL: &str = "https://app.example.test/preview/bridge.html";
const BRIDGE_ORIGIN: &str = "https://app.example.test";

fn tsx(source: &str) -> PreviewRequest {
    PreviewRequest::new(source, SourceLanguage::Tsx)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_framework_hook_component_is_live() {
    let request = tsx(r#"import { useState } from "react";

export default function Counter() {
  const [count, setCount] = useState(0);
  return <button onClick={() => setCount(count + 1)}>{count}</button>;
}
"#);
    let config = PreviewConfig::default();
    let output = build_preview(&request, &config).unwrap();
    assert_eq!(output.mode, PreviewMode::Live);
    assert!(output.runtime_code.is_some());
    assert!(output.error.is_none());

    let runtime = plan_preview(&request, &config).unwrap().runtime.unwrap();
    assert!(!runtime.wrapper_body.contains("import "));
    assert!(!runtime.wrapper_body.contains("export "));
    assert!(runtime.loader_statements.is_empty());
    assert_eq!(runtime.entry_point_candidates[0], "Counter");
}

#[test]
fn test_filesystem_import_disables_preview() {
    let request = tsx("import { readFileSync } from 'fs';\nexport default function App() { return null; }\n");
    let output = build_preview(&request, &PreviewConfig::default()).unwrap();
    assert_eq!(output.mode, PreviewMode::Disabled);
    assert!(output.error.unwrap().contains("Unsupported dependency"));
    assert!(output.runtime_code.is_none());
}

#[test]
fn test_filesystem_import_after_another_on_one_line_disables_preview() {
    let request = tsx(
        "import React from 'react'; import fs from 'fs';\nexport default function App() { return null; }\n",
    );
    let output = build_preview(&request, &PreviewConfig::default()).unwrap();
    assert_eq!(output.mode, PreviewMode::Disabled);
    assert!(output.error.unwrap().contains("Unsupported dependency"));
    assert!(output.runtime_code.is_none());
}

#[test]
fn test_lookalike_packages_bind_separate_slots() {
    let request = tsx(
        "import merge from 'lodash.merge';\nimport mergeAll from 'lodash-merge';\nexport default function App() { return null; }\n",
    );
    let runtime = plan_preview(&request, &PreviewConfig::default())
        .unwrap()
        .runtime
        .unwrap();
    let loads = runtime
        .loader_statements
        .iter()
        .filter(|s| s.contains("await import("))
        .count();
    assert_eq!(loads, 2);
    assert_eq!(runtime.binding_statements.len(), 2);
    assert!(runtime.binding_statements[0].contains("__env[\"__dep_lodash_2emerge\"]"));
    assert!(runtime.binding_statements[1].contains("__env[\"__dep_lodash_2dmerge\"]"));
}

#[test]
fn test_unregistered_package_is_auto_detected() {
    let request = tsx("import confetti from 'canvas-confetti';\nexport default function App() { return null; }\n");
    let config = PreviewConfig::default();
    let output = build_preview(&request, &config).unwrap();
    assert_eq!(output.mode, PreviewMode::Auto);
    assert_eq!(output.auto_detected_packages, vec!["canvas-confetti"]);

    let url = config.public_registry_url("canvas-confetti");
    let runtime = plan_preview(&request, &config).unwrap().runtime.unwrap();
    let targeting: Vec<_> = runtime
        .loader_statements
        .iter()
        .filter(|s| s.contains(&url))
        .collect();
    assert_eq!(targeting.len(), 1);
}

#[test]
fn test_early_payload_is_redelivered_after_first_load() {
    let frame = WindowId(1);
    let mut host = PreviewHost::new(frame);
    let mut bridge = BridgeDocument::new(BRIDGE_URL).unwrap();

    host.set_content("<html><head></head><body><p>hello</p></body></html>");
    for message in host.take_outbox() {
        assert_eq!(bridge.receive(BRIDGE_ORIGIN, message), BridgeOutcome::Deferred);
    }
    assert_eq!(bridge.inner_document(), None);

    // initial blank document of the inner frame
    bridge.inner_loaded();
    assert!(bridge.inner_document().unwrap().contains("<p>hello</p>"));

    // the redelivered document itself
    bridge.inner_loaded();
    let mut reactions = Vec::new();
    for message in bridge.take_outbox() {
        reactions.push(host.on_message(frame, message));
    }
    assert_eq!(reactions, vec![HostReaction::Acknowledged, HostReaction::Loaded]);
    assert!(host.is_loaded());
    assert!(host.take_outbox().is_empty());
}

#[test]
fn test_aliases_of_one_specifier_share_one_load() {
    let request = tsx(
        "import { Star } from 'lucide-react';\nimport { Heart as Love } from 'lucide-react';\nexport default function App() { return null; }\n",
    );
    let runtime = plan_preview(&request, &PreviewConfig::default())
        .unwrap()
        .runtime
        .unwrap();
    let loads: Vec<_> = runtime
        .loader_statements
        .iter()
        .filter(|s| s.contains("await import("))
        .collect();
    assert_eq!(loads.len(), 1);
    assert!(loads[0].contains("__dep_lucide_2dreact"));

    assert_eq!(runtime.binding_statements.len(), 2);
    assert!(runtime.binding_statements[0].starts_with("const Star = "));
    assert!(runtime.binding_statements[1].starts_with("const Love = "));
    assert!(runtime
        .binding_statements
        .iter()
        .all(|b| b.contains("__env[\"__dep_lucide_2dreact\"]")));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

const ALL_SHAPES: &str = r#"import './reset.css';
import * as Icons from 'lucide-react';
import {
  useState,
  type FC,
} from 'react';
import clsx, { clsx as cx } from 'clsx';
import gsap from 'gsap'
export default function App() { return null; }
"#;

#[test]
fn test_scan_removes_every_shape_and_is_idempotent() {
    for mode in [ScanMode::Heuristic, ScanMode::Strict] {
        let first = scan_imports(ALL_SHAPES, mode);
        assert_eq!(first.records.len(), 5);
        assert!(!first
            .stripped
            .lines()
            .any(|l| l.trim_start().starts_with("import")));
        let second = scan_imports(&first.stripped, mode);
        assert!(second.records.is_empty());
        assert_eq!(second.stripped, first.stripped);
    }
}

#[test]
fn test_classification_is_deterministic() {
    let config = PreviewConfig::default();
    let classifier = Classifier::new(&config);
    for specifier in ["react", "./a.module.css", "gsap/ScrollTrigger", "left-pad", "fs", "https://x.test/y.js"] {
        assert_eq!(classifier.classify(specifier), classifier.classify(specifier));
    }
}

#[test]
fn test_disabled_dominates_any_mix() {
    let config = PreviewConfig::default();
    let classifier = Classifier::new(&config);
    let others = ["react", "left-pad", "clsx", "lucide-react", "./Card", "next/link"];
    for unsafe_spec in ["fs", "child_process", "react-native", "node:path", "https://cdn.example.test/lib.js"] {
        let mut mix: Vec<_> = others.iter().map(|s| classifier.classify(s)).collect();
        mix.insert(mix.len() / 2, classifier.classify(unsafe_spec));
        assert_eq!(decide_mode(&mix), PreviewMode::Disabled, "{}", unsafe_spec);
    }
}

#[test]
fn test_peers_load_before_dependents_once() {
    let request = tsx(
        "import { Canvas } from '@react-three/fiber';\nimport { OrbitControls } from '@react-three/drei';\nimport * as THREE from 'three';\n",
    );
    let runtime = plan_preview(&request, &PreviewConfig::default())
        .unwrap()
        .runtime
        .unwrap();
    let position = |slot: &str| {
        let needle = format!("  {} = await import(", slot);
        let hits: Vec<_> = runtime
            .loader_statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains(&needle))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits.len(), 1, "{}", slot);
        hits[0]
    };
    let three = position("__dep_three");
    let fiber = position("__dep__40react_2dthree_2ffiber");
    let drei = position("__dep__40react_2dthree_2fdrei");
    assert!(three < fiber);
    assert!(fiber < drei);
}

#[test]
fn test_no_local_declared_twice() {
    let request = tsx(
        "import { motion } from 'framer-motion';\nimport motion from 'motion';\nimport { Star as motion2, Star } from 'lucide-react';\nimport Star from 'canvas-confetti';\n",
    );
    let runtime = plan_preview(&request, &PreviewConfig::default())
        .unwrap()
        .runtime
        .unwrap();
    let mut locals: Vec<&str> = runtime
        .binding_statements
        .iter()
        .filter_map(|b| b.strip_prefix("const "))
        .filter_map(|b| b.split(' ').next())
        .collect();
    let total = locals.len();
    locals.sort_unstable();
    locals.dedup();
    assert_eq!(locals.len(), total);
    assert_eq!(total, 3);
}

#[test]
fn test_foreign_origin_never_reaches_inner_frame() {
    let mut bridge = BridgeDocument::new(BRIDGE_URL).unwrap();
    let message = PreviewMessage::SetPreviewHtml {
        html: "<p>from elsewhere</p>".to_string(),
    };
    assert_eq!(bridge.receive("https://evil.example.test", message.clone()), BridgeOutcome::Ignored);
    bridge.inner_loaded();
    assert_eq!(bridge.receive("http://app.example.test", message), BridgeOutcome::Ignored);
    bridge.inner_loaded();
    assert_eq!(bridge.inner_document(), None);
    assert_eq!(bridge.take_outbox(), vec![PreviewMessage::Loaded]);
}
