//! Reading and patching RQM XML documents.
//!
//! RQM answers with small documents (one resource, one feed page, one list of
//! process areas), so they are read into a lightweight element tree instead
//! of being streamed.

use std::collections::BTreeMap;
use std::collections::HashSet;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rqm_state::{fields, ClientError, ClientResult, RemoteResource, ResourceId, ResourceType};
use serde_json::Value;

/// Namespace of qm resource elements (`testcase`, `testplan`, ...).
pub const QM_NAMESPACE: &str = "http://jazz.net/xmlns/alm/qm/v0.1/";

/// Child elements whose `href` links another resource.
const LINK_ELEMENTS: [&str; 5] = [
    fields::TESTCASE,
    fields::TESTPLAN,
    fields::CONFIGURATION,
    fields::BUILD_RECORD,
    fields::EXECUTION_RECORD,
];

/// One XML element with its qualified name, raw attributes and text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `ns2:testcase`.
    pub qname: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn parse(xml: &str) -> ClientResult<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event().map_err(invalid)? {
                Event::Start(e) => stack.push(element(&e)?),
                Event::Empty(e) => {
                    let el = element(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(el),
                        None => root = Some(el),
                    }
                }
                Event::End(_) => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(done),
                            None => root = Some(done),
                        }
                    }
                }
                Event::Text(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&e.unescape().map_err(invalid)?);
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        root.ok_or_else(|| ClientError::InvalidResponse("empty XML document".to_string()))
    }

    /// Name without namespace prefix.
    pub fn name(&self) -> &str {
        local(&self.qname)
    }

    /// Attribute value by local name, ignoring namespace declarations.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| !key.starts_with("xmlns") && local(key) == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name() == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name() == name)
    }

    /// Trimmed text of the first child with this name, if not blank.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// First descendant (depth-first, self included) with this name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name() == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Prefix bound to `namespace` on this element, `Some("")` if default.
    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| {
            if value != namespace {
                return None;
            }
            match key.as_str() {
                "xmlns" => Some(""),
                k => k.strip_prefix("xmlns:"),
            }
        })
    }
}

fn local(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn element(e: &BytesStart<'_>) -> ClientResult<XmlElement> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ClientError::InvalidResponse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(invalid)?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        qname: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        attributes,
        ..XmlElement::default()
    })
}

fn invalid(err: quick_xml::Error) -> ClientError {
    ClientError::InvalidResponse(format!("malformed XML: {err}"))
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Last path segment of a URL, without query string.
pub fn last_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Resource id from an integration URL or `urn:com.ibm.rqm:<type>:<id>` segment.
pub fn id_from_url(url: &str) -> ResourceId {
    let segment = last_segment(url);
    ResourceId::from(segment.rsplit(':').next().unwrap_or(segment))
}

// ---------------------------------------------------------------------------
// Resources and feeds
// ---------------------------------------------------------------------------

/// Map a resource document onto a [`RemoteResource`].
///
/// `id` wins over the document's `webId` when given.
pub fn resource_from_element(
    resource_type: ResourceType,
    el: &XmlElement,
    id: Option<&str>,
) -> RemoteResource {
    let id = id
        .map(str::to_string)
        .or_else(|| el.child_text("webId").map(str::to_string))
        .unwrap_or_default();
    let mut resource = RemoteResource::new(resource_type, id);
    if let Some(title) = el.child_text("title") {
        resource = resource.with_field(fields::TITLE, title);
    }

    let mut links: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for child in &el.children {
        let Some(href) = child.attr("href") else {
            continue;
        };
        if let Some(field) = LINK_ELEMENTS.iter().find(|f| **f == child.name()) {
            links
                .entry(*field)
                .or_default()
                .push(Value::String(id_from_url(href).to_string()));
        }
    }
    for (field, mut ids) in links {
        let value = if ids.len() == 1 {
            ids.remove(0)
        } else {
            Value::Array(ids)
        };
        resource = resource.with_field(field, value);
    }
    resource
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub id: ResourceId,
    pub title: Option<String>,
    /// Resource element inside `<content>`, when the feed carries one.
    pub content: Option<XmlElement>,
}

impl FeedEntry {
    pub fn into_resource(self, resource_type: ResourceType) -> RemoteResource {
        let mut resource = match &self.content {
            Some(content) => resource_from_element(resource_type, content, None),
            None => RemoteResource::new(resource_type, self.id.clone()),
        };
        if resource.id.as_str().is_empty() {
            resource.id = self.id;
        }
        if resource.title().is_none() {
            if let Some(title) = self.title {
                resource = resource.with_field(fields::TITLE, title);
            }
        }
        resource
    }
}

/// One page of an Atom feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub entries: Vec<FeedEntry>,
    pub next: Option<String>,
}

pub fn parse_feed(xml: &str) -> ClientResult<Feed> {
    let root = XmlElement::parse(xml)?;
    if root.name() != "feed" {
        return Err(ClientError::InvalidResponse(format!(
            "expected a feed, got <{}>",
            root.qname
        )));
    }

    let entries = root
        .children_named("entry")
        .map(|entry| FeedEntry {
            id: entry
                .child_text("id")
                .map(id_from_url)
                .unwrap_or_else(|| ResourceId::from("")),
            title: entry.child_text("title").map(str::to_string),
            content: entry
                .child("content")
                .and_then(|c| c.children.first())
                .cloned(),
        })
        .collect();
    let next = root
        .children_named("link")
        .find(|l| l.attr("rel") == Some("next"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string);

    Ok(Feed { entries, next })
}

/// `(name, url)` of each `project-area` / `team-area` in a process listing.
pub fn parse_process_areas(xml: &str, element_name: &str) -> ClientResult<Vec<(String, String)>> {
    let root = XmlElement::parse(xml)?;
    Ok(root
        .children_named(element_name)
        .filter_map(|area| {
            let name = area.attr("name")?;
            let url = area.child_text("url")?;
            Some((name.to_string(), url.to_string()))
        })
        .collect())
}

/// Append `<testcase href=".."/>` links for `urls` not yet in the document.
///
/// Returns `None` when every url is already linked.
pub fn append_testcase_links(document: &str, urls: &[String]) -> ClientResult<Option<String>> {
    let root = XmlElement::parse(document)?;
    let existing: HashSet<String> = root
        .children_named(fields::TESTCASE)
        .filter_map(|c| c.attr("href"))
        .map(|href| id_from_url(href).to_string())
        .collect();
    let missing: Vec<&String> = urls
        .iter()
        .filter(|url| !existing.contains(id_from_url(url).as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(None);
    }

    let close = document
        .trim_end()
        .rfind("</")
        .ok_or_else(|| ClientError::InvalidResponse("document root is not closed".to_string()))?;
    let mut links = String::new();
    for url in missing {
        let href = quick_xml::escape::escape(url.as_str());
        match root.prefix_for(QM_NAMESPACE) {
            Some("") => links.push_str(&format!("<testcase href=\"{href}\"/>")),
            Some(prefix) => links.push_str(&format!("<{prefix}:testcase href=\"{href}\"/>")),
            None => links.push_str(&format!(
                "<testcase xmlns=\"{QM_NAMESPACE}\" href=\"{href}\"/>"
            )),
        }
    }

    let mut patched = String::with_capacity(document.len() + links.len());
    patched.push_str(&document[..close]);
    patched.push_str(&links);
    patched.push_str(&document[close..]);
    Ok(Some(patched))
}

// ---------------------------------------------------------------------------
// Test case patching
// ---------------------------------------------------------------------------

/// Namespace of Dublin Core elements (`title`, `description`).
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Namespace of process elements (`team-area`).
pub const PROCESS_NAMESPACE: &str = "http://jazz.net/xmlns/prod/jazz/process/0.6/";

pub const REQUIREMENT_ID_ATTRIBUTE: &str = "Requirement ID";
pub const ROBOT_FILE_ATTRIBUTE: &str = "Robot File";

const COMPONENT_TERM: &str = "Component";

/// Test case fields an import rewrites. `None` leaves the remote value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCasePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub component: Option<String>,
    pub requirement_ids: Option<String>,
    pub source_ref: Option<String>,
    pub team_area_url: Option<String>,
}

impl TestCasePatch {
    pub fn from_fields(values: &BTreeMap<String, Value>) -> Self {
        let get = |name: &str| values.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            title: get(fields::TITLE),
            description: get(fields::DESCRIPTION),
            component: get(fields::COMPONENT),
            requirement_ids: get(fields::REQUIREMENT_IDS),
            source_ref: get(fields::SOURCE_REF),
            team_area_url: get(fields::TEAM_AREA),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn custom_attribute(&self, name: &str) -> Option<&str> {
        match name {
            REQUIREMENT_ID_ATTRIBUTE => self.requirement_ids.as_deref(),
            ROBOT_FILE_ATTRIBUTE => self.source_ref.as_deref(),
            _ => None,
        }
    }
}

/// Rewrite the patched fields of a test case document.
///
/// Every other node, the owner included, is copied through unchanged.
/// Patched fields the document lacks are appended to the root element.
pub fn patch_testcase(document: &str, patch: &TestCasePatch) -> ClientResult<String> {
    let root = XmlElement::parse(document)?;
    let custom_names: Vec<String> = root
        .child("customAttributes")
        .map(|block| {
            block
                .children_named("customAttribute")
                .map(|a| a.child_text("name").unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default();
    let missing_custom = [REQUIREMENT_ID_ATTRIBUTE, ROBOT_FILE_ATTRIBUTE]
        .into_iter()
        .filter(|name| !custom_names.iter().any(|n| n == name))
        .filter_map(|name| patch.custom_attribute(name).map(|v| (name, v.to_string())))
        .collect();

    let mut patcher = Patcher {
        patch,
        root,
        custom_names,
        missing_custom,
        writer: Writer::new(Vec::new()),
        seen: Seen::default(),
        depth: 0,
        in_custom_block: false,
        custom_index: 0,
        current_custom: None,
    };

    let mut reader = Reader::from_str(document);
    loop {
        match reader.read_event().map_err(invalid)? {
            Event::Eof => break,
            Event::Start(e) => {
                if patcher.open(&e, false)? {
                    reader.read_to_end(e.name()).map_err(invalid)?;
                }
            }
            Event::Empty(e) => {
                patcher.open(&e, true)?;
            }
            Event::End(e) => patcher.close(e)?,
            other => patcher.write(other)?,
        }
    }

    String::from_utf8(patcher.writer.into_inner())
        .map_err(|e| ClientError::InvalidResponse(format!("patched document is not UTF-8: {e}")))
}

/// Root children met while patching.
#[derive(Default)]
struct Seen {
    title: bool,
    description: bool,
    component: bool,
    custom_attributes: bool,
    team_area: bool,
}

struct Patcher<'p> {
    patch: &'p TestCasePatch,
    root: XmlElement,
    custom_names: Vec<String>,
    missing_custom: Vec<(&'static str, String)>,
    writer: Writer<Vec<u8>>,
    seen: Seen,
    /// Depth of the innermost open element, the root being 1.
    depth: usize,
    in_custom_block: bool,
    custom_index: usize,
    current_custom: Option<String>,
}

impl Patcher<'_> {
    /// Handle an opening tag. Returns true when the element's content was
    /// replaced and the caller must skip the original content.
    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> ClientResult<bool> {
        let depth = self.depth + 1;
        let el = element(e)?;
        let name = el.name();
        let patch = self.patch;

        if depth == 2 {
            let text = match name {
                "title" => {
                    self.seen.title = true;
                    patch.title.as_deref()
                }
                "description" => {
                    self.seen.description = true;
                    patch.description.as_deref()
                }
                _ => None,
            };
            if let Some(text) = text {
                self.write_text_element(e.borrow(), text)?;
                return Ok(!empty);
            }

            if name == "category" && el.attr("term") == Some(COMPONENT_TERM) {
                self.seen.component = true;
                if let Some(component) = patch.component.as_deref() {
                    let start = with_attribute(e, "value", component)?;
                    return self.copy_open(start, empty, depth);
                }
            }

            if name == "team-area" {
                if let Some(url) = patch.team_area_url.as_deref() {
                    if !self.seen.team_area {
                        self.write_team_area(url)?;
                    }
                    self.seen.team_area = true;
                    return Ok(!empty);
                }
            }

            if name == "customAttributes" {
                self.seen.custom_attributes = true;
                if empty {
                    if self.missing_custom.is_empty() {
                        return self.copy_open(e.borrow(), true, depth);
                    }
                    let end = e.to_end().into_owned();
                    self.write(Event::Start(e.borrow()))?;
                    self.write_missing_custom()?;
                    self.write(Event::End(end))?;
                    return Ok(false);
                }
                self.in_custom_block = true;
            }
        }

        if self.in_custom_block && depth == 3 && name == "customAttribute" {
            self.current_custom = self.custom_names.get(self.custom_index).cloned();
            self.custom_index += 1;
        }
        if self.in_custom_block && depth == 4 && name == "value" {
            let value = self
                .current_custom
                .as_deref()
                .and_then(|n| patch.custom_attribute(n));
            if let Some(value) = value {
                self.write_text_element(e.borrow(), value)?;
                return Ok(!empty);
            }
        }

        self.copy_open(e.borrow(), empty, depth)
    }

    fn copy_open(&mut self, start: BytesStart<'_>, empty: bool, depth: usize) -> ClientResult<bool> {
        if empty {
            self.write(Event::Empty(start))?;
        } else {
            self.write(Event::Start(start))?;
            self.depth = depth;
        }
        Ok(false)
    }

    fn close(&mut self, e: BytesEnd<'_>) -> ClientResult<()> {
        match self.depth {
            1 => self.write_missing_root_children()?,
            2 if self.in_custom_block => {
                self.write_missing_custom()?;
                self.in_custom_block = false;
            }
            3 => self.current_custom = None,
            _ => {}
        }
        self.depth = self.depth.saturating_sub(1);
        self.write(Event::End(e))
    }

    fn write_missing_root_children(&mut self) -> ClientResult<()> {
        let patch = self.patch;
        if let (Some(title), false) = (patch.title.as_deref(), self.seen.title) {
            let start = self.start_in(DC_NAMESPACE, "title");
            self.write_text_element(start, title)?;
        }
        if let (Some(description), false) = (patch.description.as_deref(), self.seen.description) {
            let start = self.start_in(DC_NAMESPACE, "description");
            self.write_text_element(start, description)?;
        }
        if let (Some(component), false) = (patch.component.as_deref(), self.seen.component) {
            let start = self
                .start_in(QM_NAMESPACE, "category")
                .with_attributes([("term", COMPONENT_TERM), ("value", component)]);
            self.write(Event::Empty(start))?;
        }
        if !self.seen.custom_attributes && !self.missing_custom.is_empty() {
            let block = self.start_in(QM_NAMESPACE, "customAttributes");
            let end = block.to_end().into_owned();
            self.write(Event::Start(block))?;
            self.write_missing_custom()?;
            self.write(Event::End(end))?;
        }
        if let (Some(url), false) = (patch.team_area_url.as_deref(), self.seen.team_area) {
            self.write_team_area(url)?;
        }
        Ok(())
    }

    fn write_missing_custom(&mut self) -> ClientResult<()> {
        for (name, value) in std::mem::take(&mut self.missing_custom) {
            let attribute = self.start_in(QM_NAMESPACE, "customAttribute");
            let end = attribute.to_end().into_owned();
            self.write(Event::Start(attribute))?;
            let start = self.start_in(QM_NAMESPACE, "name");
            self.write_text_element(start, name)?;
            let start = self.start_in(QM_NAMESPACE, "value");
            self.write_text_element(start, &value)?;
            self.write(Event::End(end))?;
        }
        Ok(())
    }

    fn write_team_area(&mut self, url: &str) -> ClientResult<()> {
        let area = self.start_in(PROCESS_NAMESPACE, "team-area");
        let end = area.to_end().into_owned();
        self.write(Event::Start(area))?;
        let start = self.start_in(PROCESS_NAMESPACE, "url");
        self.write_text_element(start, url)?;
        self.write(Event::End(end))
    }

    fn write_text_element(&mut self, start: BytesStart<'_>, text: &str) -> ClientResult<()> {
        let end = start.to_end().into_owned();
        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(end))
    }

    /// Start tag for `local` in `namespace`, declaring it inline when the
    /// root does not bind a prefix for it.
    fn start_in(&self, namespace: &str, local: &str) -> BytesStart<'static> {
        match self.root.prefix_for(namespace) {
            Some("") => BytesStart::new(local.to_string()),
            Some(prefix) => BytesStart::new(format!("{prefix}:{local}")),
            None => BytesStart::new(local.to_string()).with_attributes([("xmlns", namespace)]),
        }
    }

    fn write(&mut self, event: Event<'_>) -> ClientResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ClientError::InvalidResponse(format!("cannot write XML: {e}")))
    }
}

/// Copy of `e` with attribute `name` set to `value`.
fn with_attribute(e: &BytesStart<'_>, name: &str, value: &str) -> ClientResult<BytesStart<'static>> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let mut replaced = false;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ClientError::InvalidResponse(err.to_string()))?;
        if attr.key.local_name().as_ref() == name.as_bytes() && !attr.key.as_ref().starts_with(b"xmlns") {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            out.push_attribute((key.as_str(), value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !replaced {
        out.push_attribute((name, value));
    }
    Ok(out)
}
