//! Namespaced queries over DAV XML trees

use minidom::Element;

/// XML namespaces that DAV servers commonly use, with the short aliases used in paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `d`
    Dav,
    /// `cal`
    CalDav,
    /// `card`
    CardDav,
    /// `cs`
    CalendarServer,
    /// `s`
    SabreDav,
    /// `apple`
    Apple,
}

impl Namespace {
    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Dav => "DAV:",
            Namespace::CalDav => "urn:ietf:params:xml:ns:caldav",
            Namespace::CardDav => "urn:ietf:params:xml:ns:carddav",
            Namespace::CalendarServer => "http://calendarserver.org/ns/",
            Namespace::SabreDav => "http://sabredav.org/ns",
            Namespace::Apple => "http://apple.com/ns/ical/",
        }
    }

    pub fn alias(&self) -> &'static str {
        match self {
            Namespace::Dav => "d",
            Namespace::CalDav => "cal",
            Namespace::CardDav => "card",
            Namespace::CalendarServer => "cs",
            Namespace::SabreDav => "s",
            Namespace::Apple => "apple",
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "d" => Some(Namespace::Dav),
            "cal" => Some(Namespace::CalDav),
            "card" => Some(Namespace::CardDav),
            "cs" => Some(Namespace::CalendarServer),
            "s" => Some(Namespace::SabreDav),
            "apple" => Some(Namespace::Apple),
            _ => None,
        }
    }
}

/// One step of a path: the namespace and local name of a child element
pub type PathStep<'a> = (Namespace, &'a str);

/// Follow `path` from `root`, one level of direct children per step.
///
/// At each level, the first child (in document order) that matches is taken. \
/// Returns `None` as soon as a step has no matching child.
pub fn evaluate_node<'e>(root: &'e Element, path: &[PathStep]) -> Option<&'e Element> {
    let mut node = root;
    for (ns, name) in path {
        node = node.children().find(|child| child.is(*name, ns.uri()))?;
    }
    Some(node)
}

/// Walks an XML tree and returns every descendant (excluding `root` itself) with the given namespace and name, in document order
pub fn find_elems<'e>(root: &'e Element, ns: Namespace, searched_name: &str) -> Vec<&'e Element> {
    let mut elems: Vec<&Element> = Vec::new();

    for el in root.children() {
        if el.is(searched_name, ns.uri()) {
            elems.push(el);
        }
        elems.extend(find_elems(el, ns, searched_name));
    }
    elems
}
