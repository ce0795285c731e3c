//! Video embed fixup.
//!
//! Recognized YouTube and Vimeo iframes are rewritten into their
//! privacy-respecting forms: `youtube-nocookie.com/embed/<id>` and Vimeo
//! players with `dnt=1`. The same mapping exists twice: [`fixup_embeds`]
//! applies it to a document with html5ever, and [`FIXUP_SCRIPT`] is injected
//! into the inner document so it also runs on load and on nodes inserted
//! later.

use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::TendrilSink;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use tendril::StrTendril;
use url::Url;

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{6,}$").unwrap();
    static ref VIMEO_ID_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref HEAD_OPEN_RE: Regex = Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap();
}

const YOUTUBE_HOSTS: [&str; 4] = ["youtube.com", "www.youtube.com", "m.youtube.com", "music.youtube.com"];

fn youtube_embed(id: &str, url: &Url, skip: &[&str]) -> Option<String> {
    if !VIDEO_ID_RE.is_match(id) {
        return None;
    }
    let mut out = Url::parse("https://www.youtube-nocookie.com/").ok()?;
    out.set_path(&format!("/embed/{}", id));
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !skip.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        out.query_pairs_mut().extend_pairs(kept);
    }
    Some(out.to_string())
}

/// Privacy-respecting form of a video embed URL, or `None` when the URL is
/// not a recognized embed or is already in that form.
pub fn rewrite_embed_url(src: &str) -> Option<String> {
    let url = Url::parse(src.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if YOUTUBE_HOSTS.contains(&host.as_str()) {
        return match segments.as_slice() {
            ["watch"] => {
                let id = url.query_pairs().find(|(k, _)| k == "v")?.1.into_owned();
                youtube_embed(&id, &url, &["v"])
            }
            ["embed", id] | ["shorts", id] | ["live", id] => youtube_embed(id, &url, &[]),
            _ => None,
        };
    }
    if host == "youtu.be" {
        return match segments.as_slice() {
            [id] => youtube_embed(id, &url, &[]),
            _ => None,
        };
    }
    if host == "player.vimeo.com" {
        if url.query_pairs().any(|(k, _)| k == "dnt") {
            return None;
        }
        let mut out = url.clone();
        out.query_pairs_mut().append_pair("dnt", "1");
        return Some(out.to_string());
    }
    if host == "vimeo.com" || host == "www.vimeo.com" {
        return match segments.as_slice() {
            [id] if VIMEO_ID_RE.is_match(id) => {
                Some(format!("https://player.vimeo.com/video/{}?dnt=1", id))
            }
            _ => None,
        };
    }
    None
}

fn walk(handle: &Handle, changed: &mut usize) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        if &*name.local == "iframe" {
            for attr in attrs.borrow_mut().iter_mut() {
                if &*attr.name.local != "src" {
                    continue;
                }
                if let Some(rewritten) = rewrite_embed_url(&attr.value) {
                    tracing::debug!(from = %attr.value, to = %rewritten, "rewrote video embed");
                    attr.value = StrTendril::from_slice(&rewritten);
                    *changed += 1;
                }
            }
        }
    }
    for child in handle.children.borrow().iter() {
        walk(child, changed);
    }
}

/// Rewrite every recognized video iframe in `html`. The document is
/// returned untouched when nothing matched.
pub fn fixup_embeds(html: &str) -> String {
    let dom = match parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(e) => {
            tracing::debug!(error = %e, "embed fixup could not parse document");
            return html.to_string();
        }
    };

    let mut changed = 0;
    walk(&dom.document, &mut changed);
    if changed == 0 {
        return html.to_string();
    }

    let mut bytes = Vec::new();
    let document: SerializableHandle = dom.document.clone().into();
    if serialize(&mut bytes, &document, SerializeOpts::default()).is_err() {
        return html.to_string();
    }
    String::from_utf8(bytes).unwrap_or_else(|_| html.to_string())
}

/// In-frame fixup: same mapping, applied on load and to late-inserted nodes.
pub const FIXUP_SCRIPT: &str = r#"(() => {
  const YT = ["youtube.com", "www.youtube.com", "m.youtube.com", "music.youtube.com"];
  const ID = /^[A-Za-z0-9_-]{6,}$/;
  const embed = (id, url, skip) => {
    if (!ID.test(id)) return null;
    const out = new URL("https://www.youtube-nocookie.com/embed/" + id);
    url.searchParams.forEach((v, k) => { if (!skip.includes(k)) out.searchParams.append(k, v); });
    return out.toString();
  };
  const rewrite = (src) => {
    let url;
    try { url = new URL(src); } catch (_) { return null; }
    const host = url.hostname.toLowerCase();
    const parts = url.pathname.split("/").filter(Boolean);
    if (YT.includes(host)) {
      if (parts.length === 1 && parts[0] === "watch") return url.searchParams.get("v") ? embed(url.searchParams.get("v"), url, ["v"]) : null;
      if (parts.length === 2 && ["embed", "shorts", "live"].includes(parts[0])) return embed(parts[1], url, []);
      return null;
    }
    if (host === "youtu.be") return parts.length === 1 ? embed(parts[0], url, []) : null;
    if (host === "player.vimeo.com") {
      if (url.searchParams.has("dnt")) return null;
      url.searchParams.append("dnt", "1");
      return url.toString();
    }
    if ((host === "vimeo.com" || host === "www.vimeo.com") && parts.length === 1 && /^[0-9]+$/.test(parts[0])) {
      return "https://player.vimeo.com/video/" + parts[0] + "?dnt=1";
    }
    return null;
  };
  const fix = (root) => {
    const frames = root.tagName === "IFRAME" ? [root] : root.querySelectorAll ? root.querySelectorAll("iframe[src]") : [];
    for (const frame of frames) {
      const next = rewrite(frame.getAttribute("src") || "");
      if (next) frame.setAttribute("src", next);
    }
  };
  const start = () => {
    fix(document);
    new MutationObserver((records) => {
      for (const record of records) {
        if (record.type === "attributes") fix(record.target);
        for (const node of record.addedNodes) if (node.nodeType === 1) fix(node);
      }
    }).observe(document.documentElement, { childList: true, subtree: true, attributes: true, attributeFilter: ["src"] });
  };
  if (document.readyState === "loading") document.addEventListener("DOMContentLoaded", start);
  else start();
})();"#;

/// Place [`FIXUP_SCRIPT`] at the top of the document's head, or in front of
/// everything when there is no head tag.
pub fn inject_fixup_script(html: &str) -> String {
    let tag = format!("<script>{}</script>", FIXUP_SCRIPT);
    match HEAD_OPEN_RE.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.end()], tag, &html[m.end()..]),
        None => format!("{}{}", tag, html),
    }
}
