use ego_tree::NodeId;
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{Html, Node, Selector};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// The small parse/select/mutate/serialize surface the rewriter needs from an HTML parser.
///
/// Parsing is lenient: any input produces a document.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        Self {
            html: Html::parse_document(text),
        }
    }

    /// Node ids of all elements matching `css`, in document order. An invalid selector
    /// matches nothing.
    pub fn select(&self, css: &str) -> Vec<NodeId> {
        match Selector::parse(css) {
            Ok(selector) => self.html.select(&selector).map(|el| el.id()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn first(&self, css: &str) -> Option<NodeId> {
        self.select(css).into_iter().next()
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        self.html.tree.get(id)?.value().as_element()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    /// Whitespace-separated, lowercased tokens of a `rel`-style attribute.
    pub fn attr_tokens(&self, id: NodeId, name: &str) -> Vec<String> {
        self.attr(id, name)
            .map(|v| v.split_whitespace().map(|t| t.to_ascii_lowercase()).collect())
            .unwrap_or_default()
    }

    /// Sets (or adds) one attribute. Returns false if `id` is not an element.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return false;
        };
        let updated = match node.value() {
            Node::Element(element) => with_attr(element, name, value),
            _ => return false,
        };
        *node.value() = Node::Element(updated);
        true
    }

    /// Inserts a new element as the first child of `parent`.
    pub fn prepend_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> Option<NodeId> {
        let element = self.new_element(parent, tag, attrs)?;
        let mut parent = self.html.tree.get_mut(parent)?;
        Some(parent.prepend(Node::Element(element)).id())
    }

    /// Inserts a new element as the last child of `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> Option<NodeId> {
        let element = self.new_element(parent, tag, attrs)?;
        let mut parent = self.html.tree.get_mut(parent)?;
        Some(parent.append(Node::Element(element)).id())
    }

    /// New elements share the namespace of the element they are inserted into.
    fn new_element(&self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> Option<Element> {
        let ns = self
            .element(parent)
            .map(|p| p.name.ns.clone())
            .unwrap_or_else(|| Namespace::from(HTML_NAMESPACE));
        let name = QualName::new(None, ns, LocalName::from(tag));
        let attributes = attrs.iter().map(|(k, v)| attribute(k, v)).collect();
        Some(Element::new(name, attributes))
    }

    pub fn html(&self) -> String {
        self.html.html()
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}

fn with_attr(element: &Element, name: &str, value: &str) -> Element {
    let mut replaced = false;
    let mut attributes: Vec<Attribute> = element
        .attrs()
        .map(|(k, v)| {
            if k == name {
                replaced = true;
                attribute(k, value)
            } else {
                attribute(k, v)
            }
        })
        .collect();
    if !replaced {
        attributes.push(attribute(name, value));
    }
    Element::new(element.name.clone(), attributes)
}
