//! Hand-written stand-ins for imports that cannot be fetched as-is.
//!
//! Each shim is a JS expression evaluating to an export object. The loader
//! stores it in `__env` under a fixed slot and the rewriter binds locals
//! from that slot. Shims run after the framework is loaded, so they may use
//! `__env.React`.

use crate::classify::HelperKind;

const MOTION_SHIM: &str = r#"(() => {
  const React = __env.React;
  const MOTION_PROPS = ["initial", "animate", "exit", "transition", "variants", "whileHover",
    "whileTap", "whileInView", "whileFocus", "whileDrag", "drag", "dragConstraints", "layout",
    "layoutId", "viewport", "onAnimationStart", "onAnimationComplete"];
  const cache = new Map();
  const make = (tag) => {
    if (!cache.has(tag)) {
      const C = React.forwardRef((props, ref) => {
        const rest = {};
        for (const key in props) if (!MOTION_PROPS.includes(key)) rest[key] = props[key];
        return React.createElement(tag, Object.assign(rest, { ref }));
      });
      C.displayName = "motion." + String(tag);
      cache.set(tag, C);
    }
    return cache.get(tag);
  };
  const motion = new Proxy(make, { get: (_, tag) => make(tag) });
  const controls = () => ({ start: () => Promise.resolve(), stop: () => {}, set: () => {} });
  const value = (v) => ({ get: () => v, set: (n) => { v = n; }, on: () => () => {} });
  return {
    motion,
    m: motion,
    AnimatePresence: ({ children }) => React.createElement(React.Fragment, null, children),
    LayoutGroup: ({ children }) => React.createElement(React.Fragment, null, children),
    MotionConfig: ({ children }) => React.createElement(React.Fragment, null, children),
    useAnimation: controls,
    useAnimationControls: controls,
    useMotionValue: value,
    useSpring: value,
    useTransform: () => value(0),
    useScroll: () => ({ scrollX: value(0), scrollY: value(0), scrollXProgress: value(0), scrollYProgress: value(0) }),
    useInView: () => true,
    useReducedMotion: () => false,
    animate: () => ({ stop: () => {}, then: (f) => Promise.resolve().then(f) }),
    stagger: () => 0,
    default: motion,
  };
})()"#;

const GSAP_SHIM: &str = r#"(() => {
  const tween = () => ({ kill: () => {}, play: () => {}, pause: () => {}, reverse: () => {}, progress: () => 0 });
  const timeline = () => {
    const tl = Object.assign(tween(), {});
    for (const k of ["to", "from", "fromTo", "set", "add", "addLabel", "call"]) tl[k] = () => tl;
    return tl;
  };
  const gsap = {
    to: tween, from: tween, fromTo: tween, set: tween, timeline,
    registerPlugin: () => {}, context: (fn) => { if (typeof fn === "function") fn(); return { revert: () => {} }; },
    utils: { toArray: (v) => Array.from(typeof v === "string" ? document.querySelectorAll(v) : [].concat(v)) },
  };
  const ScrollTrigger = { create: () => ({ kill: () => {} }), refresh: () => {}, getAll: () => [] };
  return { gsap, ScrollTrigger, Draggable: { create: () => [] }, default: gsap };
})()"#;

const LINK_SHIM: &str = r##"(() => {
  const React = __env.React;
  const Link = React.forwardRef(({ href, children, prefetch, replace, scroll, shallow, passHref, legacyBehavior, ...rest }, ref) => {
    const target = typeof href === "string" ? href : (href && href.pathname) || "#";
    return React.createElement("a", Object.assign({ href: target, ref }, rest), children);
  });
  Link.displayName = "Link";
  return { default: Link, Link };
})()"##;

const IMAGE_SHIM: &str = r#"(() => {
  const React = __env.React;
  const Image = React.forwardRef(({ src, alt, width, height, fill, priority, quality, placeholder, blurDataURL, loader, unoptimized, style, ...rest }, ref) => {
    const resolved = typeof src === "string" ? src : (src && src.src) || "";
    const sizing = fill ? { position: "absolute", inset: 0, width: "100%", height: "100%", objectFit: "cover" } : {};
    return React.createElement("img", Object.assign({ src: resolved, alt: alt || "", width, height, ref, loading: priority ? "eager" : "lazy", style: Object.assign(sizing, style) }, rest));
  });
  Image.displayName = "Image";
  return { default: Image, Image };
})()"#;

/// `__env` slot holding the shim for an animation family base package.
pub fn animation_slot(base: &str) -> &'static str {
    if base == "gsap" {
        "__shim_gsap"
    } else {
        "__shim_motion"
    }
}

pub fn animation_source(base: &str) -> &'static str {
    if base == "gsap" {
        GSAP_SHIM
    } else {
        MOTION_SHIM
    }
}

pub fn helper_slot(helper: HelperKind) -> &'static str {
    match helper {
        HelperKind::Link => "__shim_next_link",
        HelperKind::Image => "__shim_next_image",
    }
}

pub fn helper_source(helper: HelperKind) -> &'static str {
    match helper {
        HelperKind::Link => LINK_SHIM,
        HelperKind::Image => IMAGE_SHIM,
    }
}
