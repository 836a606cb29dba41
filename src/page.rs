use crate::{Binder, Dom, Error, InitFailure, NodeId, Result, ScanReport};

const SNIPPET_CHARS: usize = 200;

/// A document plus the binder that decorates it, driven through the usual
/// lifecycle: content ready, content inserted, user interaction.
///
/// `Page` owns the triggering policy; the binder only ever runs when one of
/// these methods asks it to.
#[derive(Debug)]
pub struct Page {
    dom: Dom,
    binder: Binder<Dom>,
    failures: Vec<InitFailure<NodeId>>,
}

impl Page {
    /// Parses `html`. Nothing is bound until [`Page::ready`] runs.
    pub fn from_html(html: &str, binder: Binder<Dom>) -> Result<Self> {
        Ok(Self {
            dom: Dom::parse(html)?,
            binder,
            failures: Vec::new(),
        })
    }

    /// The document-ready signal: scans the whole document. Safe to repeat;
    /// elements already bound are skipped.
    pub fn ready(&mut self) -> Result<ScanReport<NodeId>> {
        let root = self.dom.document();
        self.scan_roots(&[root])
    }

    /// Appends `html` to the first element matching `parent_selector` and
    /// scans only the newly inserted nodes.
    pub fn insert_html(&mut self, parent_selector: &str, html: &str) -> Result<ScanReport<NodeId>> {
        let parent = self.select_one(parent_selector)?;
        let inserted = self.dom.append_html(parent, html)?;
        self.scan_roots(&inserted)
    }

    /// Replaces the content of the first element matching `selector` and
    /// scans the new content.
    pub fn replace_html(&mut self, selector: &str, html: &str) -> Result<ScanReport<NodeId>> {
        let target = self.select_one(selector)?;
        let inserted = self.dom.set_inner_html(target, html)?;
        self.binder.collect_garbage(&self.dom);
        self.scan_roots(&inserted)
    }

    /// Removes the first element matching `selector` and forgets its
    /// bindings.
    pub fn remove(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dom.remove(target)?;
        self.binder.collect_garbage(&self.dom);
        Ok(())
    }

    pub fn dispatch(&mut self, selector: &str, event_type: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dom.dispatch(target, event_type)
    }

    pub fn click(&mut self, selector: &str) -> Result<()> {
        self.dispatch(selector, "click")
    }

    fn scan_roots(&mut self, roots: &[NodeId]) -> Result<ScanReport<NodeId>> {
        let mut report = ScanReport::default();
        for root in roots {
            // An initializer on an earlier root may have removed a later one.
            if !self.dom.is_alive(*root) {
                continue;
            }
            report.merge(self.binder.scan(&mut self.dom, *root)?);
        }
        self.failures.extend(report.failures.iter().cloned());
        Ok(report)
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_attr(&self, selector: &str, name: &str, expected: Option<&str>) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.attr(target, name);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: format!("{selector} [{name}]"),
                expected: format!("{expected:?}"),
                actual: format!("{actual:?}"),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_count(&self, selector: &str, expected: usize) -> Result<()> {
        let actual = self.dom.query_selector_all(selector)?.len();
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
                dom_snippet: self.node_snippet(self.dom.document()),
            });
        }
        Ok(())
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn binder(&self) -> &Binder<Dom> {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut Binder<Dom> {
        &mut self.binder
    }

    /// Initializer failures seen by every scan this page triggered.
    pub fn failures(&self) -> &[InitFailure<NodeId>] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<InitFailure<NodeId>> {
        std::mem::take(&mut self.failures)
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.binder.take_trace_logs()
    }

    pub(crate) fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        let html = if node_id == self.dom.document() {
            self.dom.inner_html(node_id)
        } else {
            self.dom.outer_html(node_id)
        };
        truncate_chars(&html.unwrap_or_default(), SNIPPET_CHARS)
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &value[..end]),
        None => value.to_string(),
    }
}
