use super::document::Document;
use super::url::{rewrite_srcset, rewrite_url};
use super::RewriteContext;
use crate::constants::{BASE_TARGET, INERT_STYLESHEET_REL, VIEWPORT_CONTENT};
use tracing::debug;

/// Elements whose link-bearing attribute is routed through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Anchor,
    Image,
    StylesheetLink,
    Script,
    Form,
}

impl TagKind {
    pub const ALL: [TagKind; 5] = [
        TagKind::Anchor,
        TagKind::Image,
        TagKind::StylesheetLink,
        TagKind::Script,
        TagKind::Form,
    ];

    pub fn attribute(self) -> &'static str {
        match self {
            TagKind::Anchor | TagKind::StylesheetLink => "href",
            TagKind::Image | TagKind::Script => "src",
            TagKind::Form => "action",
        }
    }

    fn selector(self) -> &'static str {
        match self {
            TagKind::Anchor => "a[href]",
            TagKind::Image => "img[src]",
            TagKind::StylesheetLink => "link[href][rel]",
            TagKind::Script => "script[src]",
            TagKind::Form => "form[action]",
        }
    }

    fn applies_to(self, doc: &Document, id: ego_tree::NodeId) -> bool {
        match self {
            TagKind::StylesheetLink => doc.attr_tokens(id, "rel").iter().any(|t| t == "stylesheet"),
            _ => true,
        }
    }
}

/// Rewrites a fetched page so that navigation and subresources stay inside the proxy.
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut doc = Document::parse(html);
    let mut rewritten = rewrite_links(&mut doc, ctx);
    rewritten += rewrite_srcsets(&mut doc, ctx);
    ensure_head_tags(&mut doc);
    let swapped = promote_alternate_stylesheet(&mut doc);

    debug!(base_url = %ctx.base_url, rewritten, swapped, "Rewrote document links");
    doc.html()
}

fn rewrite_links(doc: &mut Document, ctx: &RewriteContext) -> usize {
    let mut count = 0;
    for kind in TagKind::ALL {
        let attribute = kind.attribute();
        for id in doc.select(kind.selector()) {
            if !kind.applies_to(doc, id) {
                continue;
            }
            let Some(value) = doc.attr(id, attribute).map(str::to_string) else {
                continue;
            };
            let new_value = rewrite_url(&value, &ctx.base_url, &ctx.proxy_prefix);
            if new_value != value {
                doc.set_attr(id, attribute, &new_value);
                count += 1;
            }
        }
    }
    count
}

fn rewrite_srcsets(doc: &mut Document, ctx: &RewriteContext) -> usize {
    let mut count = 0;
    for id in doc.select("img[srcset]") {
        let Some(value) = doc.attr(id, "srcset").map(str::to_string) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        doc.set_attr(id, "srcset", &rewrite_srcset(&value, &ctx.base_url, &ctx.proxy_prefix));
        count += 1;
    }
    count
}

/// One `<base target="_self">` and a viewport `<meta>`, both inside `<head>`.
fn ensure_head_tags(doc: &mut Document) {
    let head = match doc.first("head") {
        Some(head) => Some(head),
        None => doc
            .first("html")
            .and_then(|html| doc.prepend_element(html, "head", &[])),
    };

    match doc.first("base") {
        Some(base) => {
            doc.set_attr(base, "target", BASE_TARGET);
        }
        None => {
            if let Some(head) = head {
                doc.prepend_element(head, "base", &[("target", BASE_TARGET)]);
            }
        }
    }

    let has_viewport = doc.select("meta[name]").into_iter().any(|id| {
        doc.attr(id, "name")
            .map(|n| n.eq_ignore_ascii_case("viewport"))
            .unwrap_or(false)
    });
    if !has_viewport {
        if let Some(head) = head {
            doc.append_element(head, "meta", &[("name", "viewport"), ("content", VIEWPORT_CONTENT)]);
        }
    }
}

/// Some sites ship the intended theme as `rel="stylesheet alternate"` next to a primary
/// stylesheet. When both exist the primary is disabled and the alternate takes its place.
fn promote_alternate_stylesheet(doc: &mut Document) -> bool {
    let links = doc.select("link[rel]");
    let alternate = links.iter().copied().find(|&id| {
        let rel = doc.attr_tokens(id, "rel");
        rel.iter().any(|t| t == "stylesheet") && rel.iter().any(|t| t == "alternate")
    });
    let primary = links
        .iter()
        .copied()
        .find(|&id| doc.attr_tokens(id, "rel") == ["stylesheet"]);

    match (primary, alternate) {
        (Some(primary), Some(alternate)) => {
            doc.set_attr(primary, "rel", INERT_STYLESHEET_REL);
            doc.set_attr(alternate, "rel", "stylesheet");
            true
        }
        _ => false,
    }
}
