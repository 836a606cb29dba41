use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::diagnostics::{BinderConfig, InitFailure, ScanReport, TraceState};
use crate::tree::{Event, Listener};
use crate::{Error, Result, Selector, Tree};

/// What an initializer reports back. Any error type converts through `?`.
pub type InitResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Identity of one registration. Ids are handed out in registration order and
/// never reused by the same binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(usize);

impl RegistrationId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration#{}", self.0)
    }
}

/// One-time setup for an element newly matched by a registration's selector.
pub trait Initializer<T: Tree> {
    fn init(&mut self, element: &mut ElementHandle<'_, T>) -> InitResult;
}

impl<T, F> Initializer<T> for F
where
    T: Tree,
    F: FnMut(&mut ElementHandle<'_, T>) -> InitResult,
{
    fn init(&mut self, element: &mut ElementHandle<'_, T>) -> InitResult {
        self(element)
    }
}

/// The element an initializer is applied to, together with the tree it lives
/// in.
pub struct ElementHandle<'a, T: Tree> {
    tree: &'a mut T,
    node: T::Node,
    root: T::Node,
}

impl<'a, T: Tree> ElementHandle<'a, T> {
    pub fn node(&self) -> T::Node {
        self.node
    }

    /// The node the selector was matched under: the scan root for top-level
    /// registrations, the parent's matched element for scoped ones.
    pub fn root(&self) -> T::Node {
        self.root
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.tree.attr(self.node, name)
    }

    pub fn data(&self, key: &str) -> Option<String> {
        self.tree.data(self.node, key)
    }

    pub fn set_data(&mut self, key: &str, value: &str) -> Result<()> {
        self.tree.set_data(self.node, key, value)
    }

    /// Subscribes `listener` to `event_type` on this element. The binder keeps
    /// no reference to it.
    pub fn on<F>(&mut self, event_type: &str, listener: F) -> Result<()>
    where
        F: Fn(&mut T, &Event<T::Node>) -> Result<()> + 'static,
    {
        let listener: Listener<T> = Rc::new(listener);
        self.tree.on(self.node, event_type, listener)
    }

    pub fn tree(&self) -> &T {
        &*self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut *self.tree
    }
}

impl<T: Tree> fmt::Debug for ElementHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("node", &self.node)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

struct Registration<T: Tree> {
    id: RegistrationId,
    // Scoped registrations only match inside elements their parent matched.
    parent: Option<RegistrationId>,
    selector: Selector,
    initializer: Box<dyn Initializer<T>>,
}

/// Registry of `(selector, initializer)` pairs plus the binding records that
/// keep each initializer from running twice on the same element.
pub struct Binder<T: Tree> {
    registrations: Vec<Registration<T>>,
    records: HashMap<T::Node, HashSet<RegistrationId>>,
    next_id: usize,
    config: BinderConfig,
    trace: TraceState,
}

impl<T: Tree> Default for Binder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tree> fmt::Debug for Binder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field(
                "registrations",
                &self
                    .registrations
                    .iter()
                    .map(|registration| (registration.id, registration.selector.as_str()))
                    .collect::<Vec<_>>(),
            )
            .field("bound_nodes", &self.records.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Tree> Binder<T> {
    pub fn new() -> Self {
        let config = BinderConfig::default();
        Self {
            registrations: Vec::new(),
            records: HashMap::new(),
            next_id: 0,
            trace: TraceState::from_config(&config),
            config,
        }
    }

    pub fn with_config(config: BinderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            trace: TraceState::from_config(&config),
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Adds a registration. The selector is parsed here, so syntax errors
    /// surface as [`Error::UnsupportedSelector`] and leave the registry
    /// untouched. Nothing is scanned.
    pub fn register<F>(&mut self, selector: &str, initializer: F) -> Result<RegistrationId>
    where
        F: FnMut(&mut ElementHandle<'_, T>) -> InitResult + 'static,
    {
        self.register_initializer(selector, initializer)
    }

    /// Same as [`Binder::register`] for any [`Initializer`] implementation.
    pub fn register_initializer<I>(&mut self, selector: &str, initializer: I) -> Result<RegistrationId>
    where
        I: Initializer<T> + 'static,
    {
        self.push_registration(None, selector, Box::new(initializer))
    }

    /// Adds a registration that only applies inside elements matched by
    /// `parent`. For every element the parent matches, scoped registrations
    /// are scanned under that element (the element included) before the
    /// parent's own initializer runs. Scoped registrations have their own ids
    /// and binding records, and may themselves have scoped children.
    pub fn register_scoped<F>(
        &mut self,
        parent: RegistrationId,
        selector: &str,
        initializer: F,
    ) -> Result<RegistrationId>
    where
        F: FnMut(&mut ElementHandle<'_, T>) -> InitResult + 'static,
    {
        self.register_scoped_initializer(parent, selector, initializer)
    }

    pub fn register_scoped_initializer<I>(
        &mut self,
        parent: RegistrationId,
        selector: &str,
        initializer: I,
    ) -> Result<RegistrationId>
    where
        I: Initializer<T> + 'static,
    {
        if self.position(parent).is_none() {
            return Err(Error::RegistrationNotFound(parent.to_string()));
        }
        self.push_registration(Some(parent), selector, Box::new(initializer))
    }

    fn push_registration(
        &mut self,
        parent: Option<RegistrationId>,
        selector: &str,
        initializer: Box<dyn Initializer<T>>,
    ) -> Result<RegistrationId> {
        let selector = Selector::parse(selector)?;
        let id = RegistrationId::new(self.next_id);
        self.next_id += 1;
        match parent {
            None => {
                tracing::debug!(%id, selector = %selector, "registered behavior");
                self.trace
                    .line(|| format!("[bind] register id={id} selector={selector}"));
            }
            Some(parent) => {
                tracing::debug!(%id, %parent, selector = %selector, "registered scoped behavior");
                self.trace.line(|| {
                    format!("[bind] register id={id} selector={selector} parent={parent}")
                });
            }
        }
        self.registrations.push(Registration {
            id,
            parent,
            selector,
            initializer,
        });
        Ok(id)
    }

    fn position(&self, id: RegistrationId) -> Option<usize> {
        self.registrations
            .iter()
            .position(|registration| registration.id == id)
    }

    /// Removes every registration whose selector text equals `selector`
    /// (surrounding whitespace ignored), together with their scoped
    /// descendants, and returns how many registrations were removed.
    /// Elements already initialized keep their state.
    pub fn unregister(&mut self, selector: &str) -> usize {
        let selector = selector.trim();
        let targets = self
            .registrations
            .iter()
            .filter(|registration| registration.selector.as_str() == selector)
            .map(|registration| registration.id)
            .collect::<Vec<_>>();
        let removed = self.remove_with_descendants(targets);
        if removed > 0 {
            tracing::debug!(selector, removed, "unregistered behavior");
            self.trace
                .line(|| format!("[bind] unregister selector={selector} removed={removed}"));
        }
        removed
    }

    /// Removes one registration and its scoped descendants. Returns false when
    /// `id` is not registered.
    pub fn unregister_id(&mut self, id: RegistrationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let selector = self.registrations[index].selector.to_string();
        let removed = self.remove_with_descendants(vec![id]);
        tracing::debug!(%id, selector = %selector, removed, "unregistered behavior");
        self.trace.line(|| {
            format!("[bind] unregister id={id} selector={selector} removed={removed}")
        });
        true
    }

    fn remove_with_descendants(&mut self, roots: Vec<RegistrationId>) -> usize {
        let mut doomed = roots.into_iter().collect::<HashSet<_>>();
        // Children always come after their parent, so one forward pass
        // reaches every descendant.
        for registration in &self.registrations {
            if registration
                .parent
                .is_some_and(|parent| doomed.contains(&parent))
            {
                doomed.insert(registration.id);
            }
        }
        let before = self.registrations.len();
        self.registrations
            .retain(|registration| !doomed.contains(&registration.id));
        before - self.registrations.len()
    }

    /// Registrations in the order they were added, scoped ones included.
    pub fn registrations(&self) -> impl Iterator<Item = (RegistrationId, &Selector)> + '_ {
        self.registrations
            .iter()
            .map(|registration| (registration.id, &registration.selector))
    }

    /// The registration `id` is scoped to, if any.
    pub fn parent_of(&self, id: RegistrationId) -> Option<RegistrationId> {
        let index = self.position(id)?;
        self.registrations[index].parent
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn is_bound(&self, node: T::Node, id: RegistrationId) -> bool {
        self.records
            .get(&node)
            .is_some_and(|applied| applied.contains(&id))
    }

    /// Registrations already applied to `node`, in registration order.
    pub fn bound_registrations(&self, node: T::Node) -> Vec<RegistrationId> {
        let mut applied = self
            .records
            .get(&node)
            .map(|applied| applied.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        applied.sort();
        applied
    }

    /// Number of elements that carry at least one binding record.
    pub fn bound_node_count(&self) -> usize {
        self.records.len()
    }

    /// Drops the binding records of nodes `tree` no longer holds. Returns the
    /// number of nodes forgotten.
    pub fn collect_garbage(&mut self, tree: &T) -> usize {
        let before = self.records.len();
        self.records.retain(|node, _| tree.is_alive(*node));
        let pruned = before - self.records.len();
        if pruned > 0 {
            tracing::trace!(pruned, "pruned binding records");
            self.trace.line(|| format!("[bind] prune records={pruned}"));
        }
        pruned
    }

    /// Applies every top-level registration, in registration order, to the
    /// matching elements of the subtree rooted at `root` (`root` included), in
    /// document order. Each `(registration, element)` pair is initialized at
    /// most once over the lifetime of the element; the record is written
    /// before the initializer runs, so failed applications are never retried.
    ///
    /// Initializer errors and panics are collected into the report instead of
    /// aborting the scan. The only error is a `root` that is not alive.
    pub fn scan(&mut self, tree: &mut T, root: T::Node) -> Result<ScanReport<T::Node>> {
        if !tree.is_alive(root) {
            return Err(Error::NodeNotFound(format!("scan root {root:?}")));
        }
        self.collect_garbage(tree);

        let mut report = ScanReport::default();
        for index in self.children_of(None) {
            self.apply(index, tree, root, &mut report);
        }

        tracing::debug!(
            ?root,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failures.len(),
            "scan finished"
        );
        self.trace.line(|| {
            format!(
                "[bind] scan root={root:?} applied={} skipped={} failed={}",
                report.applied,
                report.skipped,
                report.failures.len()
            )
        });
        Ok(report)
    }

    /// Indices of the registrations directly under `parent`, in registration
    /// order.
    fn children_of(&self, parent: Option<RegistrationId>) -> Vec<usize> {
        self.registrations
            .iter()
            .enumerate()
            .filter(|(_, registration)| registration.parent == parent)
            .map(|(index, _)| index)
            .collect()
    }

    /// Applies the registration at `index` under `root`. Registrations are
    /// not added or removed during a scan, so indices stay valid.
    fn apply(
        &mut self,
        index: usize,
        tree: &mut T,
        root: T::Node,
        report: &mut ScanReport<T::Node>,
    ) {
        let id = self.registrations[index].id;
        let scoped = self.children_of(Some(id));
        // Matching is recomputed per registration: earlier initializers may
        // have changed what matches.
        let matched = tree.select(root, &self.registrations[index].selector);

        for node in matched {
            if !tree.is_alive(node) {
                continue;
            }
            for &child in &scoped {
                self.apply(child, tree, node, report);
            }
            if !tree.is_alive(node) {
                continue;
            }

            let catch_panics = self.config.catch_panics;
            let registration = &mut self.registrations[index];
            if !self.records.entry(node).or_default().insert(id) {
                report.skipped += 1;
                tracing::trace!(selector = %registration.selector, ?node, "already bound");
                self.trace.line(|| {
                    format!(
                        "[bind] skip selector={} node={node:?}",
                        registration.selector
                    )
                });
                continue;
            }

            report.applied += 1;
            tracing::debug!(selector = %registration.selector, ?node, "applying behavior");
            self.trace.line(|| {
                format!(
                    "[bind] apply selector={} node={node:?}",
                    registration.selector
                )
            });

            let mut handle = ElementHandle {
                tree: &mut *tree,
                node,
                root,
            };
            let failure = run_initializer(
                registration.initializer.as_mut(),
                &mut handle,
                catch_panics,
            );
            if let Some((message, panicked)) = failure {
                tracing::warn!(
                    registration = %id,
                    selector = %registration.selector,
                    ?node,
                    panicked,
                    "initializer failed: {message}"
                );
                self.trace.line(|| {
                    format!(
                        "[bind] fail selector={} node={node:?} panicked={panicked} message={message}",
                        registration.selector
                    )
                });
                report.failures.push(InitFailure {
                    registration: id,
                    selector: registration.selector.to_string(),
                    node,
                    message,
                    panicked,
                });
            }
        }
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.config.trace = enabled;
        self.trace.enabled = enabled;
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.config.trace_to_stderr = enabled;
        self.trace.to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        self.trace.set_log_limit(max_entries)?;
        self.config.trace_log_limit = max_entries;
        Ok(())
    }

    pub fn set_catch_panics(&mut self, enabled: bool) {
        self.config.catch_panics = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.trace.take()
    }
}

/// Runs one initializer, turning an error or (optionally) a panic into a
/// `(message, panicked)` pair.
fn run_initializer<T: Tree>(
    initializer: &mut dyn Initializer<T>,
    handle: &mut ElementHandle<'_, T>,
    catch_panics: bool,
) -> Option<(String, bool)> {
    if !catch_panics {
        return initializer.init(handle).err().map(|err| (err.to_string(), false));
    }
    match panic::catch_unwind(AssertUnwindSafe(|| initializer.init(handle))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some((err.to_string(), false)),
        Err(payload) => Some((panic_message(payload.as_ref()), true)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "initializer panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dom, NodeId};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn logging(
        log: &Log,
        label: &'static str,
    ) -> impl FnMut(&mut ElementHandle<'_, Dom>) -> InitResult + 'static {
        let log = Rc::clone(log);
        move |element| {
            let id = element.attr("id").unwrap_or("?").to_string();
            log.borrow_mut().push(format!("{label}:{id}"));
            Ok(())
        }
    }

    #[test]
    fn register_rejects_invalid_selectors_without_touching_the_registry() -> Result<()> {
        let mut binder = Binder::<Dom>::new();
        binder.register(".ok", |_| Ok(()))?;
        match binder.register("div >", |_| Ok(())) {
            Err(Error::UnsupportedSelector(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(binder.len(), 1);
        Ok(())
    }

    #[test]
    fn scan_applies_each_registration_once_per_element() -> Result<()> {
        let mut dom = Dom::parse("<div id='a' class='w'></div><div id='b' class='w'></div>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", logging(&log, "w"))?;

        let root = dom.document();
        let first = binder.scan(&mut dom, root)?;
        let second = binder.scan(&mut dom, root)?;

        assert_eq!(*log.borrow(), vec!["w:a", "w:b"]);
        assert_eq!((first.applied, first.skipped), (2, 0));
        assert_eq!((second.applied, second.skipped), (0, 2));
        Ok(())
    }

    #[test]
    fn registrations_apply_in_order_and_see_earlier_mutations() -> Result<()> {
        let mut dom = Dom::parse("<div id='x' class='w'></div>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", |element: &mut ElementHandle<'_, Dom>| {
            let node = element.node();
            element.tree_mut().class_add(node, "ready")?;
            Ok(())
        })?;
        binder.register(".ready", logging(&log, "ready"))?;
        binder.register(".w", logging(&log, "w-again"))?;

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert_eq!(report.applied, 3);
        assert_eq!(*log.borrow(), vec!["ready:x", "w-again:x"]);

        let x = dom.by_id("x").expect("x should exist");
        let ids = binder.registrations().map(|(id, _)| id).collect::<Vec<_>>();
        assert_eq!(binder.bound_registrations(x), ids);
        Ok(())
    }

    #[test]
    fn scan_root_is_a_candidate_and_must_be_alive() -> Result<()> {
        let mut dom = Dom::parse(
            "<section class='w' id='s'><p class='w' id='p'></p></section><p class='w' id='out'></p>",
        )?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", logging(&log, "w"))?;

        let section = dom.by_id("s").expect("section should exist");
        binder.scan(&mut dom, section)?;
        assert_eq!(*log.borrow(), vec!["w:s", "w:p"]);

        dom.remove(section)?;
        match binder.scan(&mut dom, section) {
            Err(Error::NodeNotFound(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn failures_are_reported_and_never_retried() -> Result<()> {
        let mut dom = Dom::parse(
            "<i id='1' class='w'></i><i id='2' class='w bad'></i><i id='3' class='w'></i>",
        )?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", |element: &mut ElementHandle<'_, Dom>| {
            if element.attr("class").is_some_and(|c| c.contains("bad")) {
                return Err("bad widget".into());
            }
            element.set_data("init", "1")?;
            Ok(())
        })?;
        binder.register(".w", logging(&log, "second"))?;

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert_eq!(report.applied, 6);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.message, "bad widget");
        assert_eq!(failure.selector, ".w");
        assert!(!failure.panicked);
        assert_eq!(Some(failure.node), dom.by_id("2"));
        assert_eq!(*log.borrow(), vec!["second:1", "second:2", "second:3"]);

        let again = binder.scan(&mut dom, root)?;
        assert_eq!(again.applied, 0);
        assert!(again.is_clean());
        Ok(())
    }

    #[test]
    fn panics_are_isolated_like_errors() -> Result<()> {
        let mut dom = Dom::parse("<b id='1' class='w'></b><b id='2' class='w'></b>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register("#1", |_: &mut ElementHandle<'_, Dom>| -> InitResult {
            panic!("exploded")
        })?;
        binder.register(".w", logging(&log, "w"))?;

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].panicked);
        assert_eq!(report.failures[0].message, "exploded");
        assert_eq!(*log.borrow(), vec!["w:1", "w:2"]);
        Ok(())
    }

    #[test]
    fn elements_removed_mid_scan_are_skipped() -> Result<()> {
        let mut dom = Dom::parse("<ul><li id='1' class='w'></li><li id='2' class='w'></li></ul>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register("#1", |element: &mut ElementHandle<'_, Dom>| {
            let doomed = element
                .tree()
                .by_id("2")
                .ok_or("second item missing")?;
            element.tree_mut().remove(doomed)?;
            Ok(())
        })?;
        binder.register(".w", logging(&log, "w"))?;

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert!(report.is_clean());
        assert_eq!(*log.borrow(), vec!["w:1"]);
        Ok(())
    }

    #[test]
    fn unregister_stops_future_matches_but_keeps_records() -> Result<()> {
        let mut dom = Dom::parse("<p id='1' class='w'></p>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        let first = binder.register(".w", logging(&log, "a"))?;
        binder.register(" .w ", logging(&log, "b"))?;
        let other = binder.register("p", logging(&log, "p"))?;

        let root = dom.document();
        binder.scan(&mut dom, root)?;
        let p = dom.by_id("1").expect("p should exist");
        assert!(binder.is_bound(p, first));

        assert_eq!(binder.unregister(".w"), 2);
        assert_eq!(binder.unregister(".w"), 0);
        assert!(binder.is_bound(p, first));

        dom.append_html(root, "<p id='2' class='w'></p>")?;
        binder.scan(&mut dom, root)?;
        assert_eq!(*log.borrow(), vec!["a:1", "b:1", "p:1", "p:2"]);

        assert!(binder.unregister_id(other));
        assert!(!binder.unregister_id(other));
        assert!(binder.is_empty());
        Ok(())
    }

    #[test]
    fn records_of_removed_elements_are_pruned() -> Result<()> {
        let mut dom = Dom::parse("<div id='w' class='w'></div>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", logging(&log, "w"))?;

        let root = dom.document();
        binder.scan(&mut dom, root)?;
        assert_eq!(binder.bound_node_count(), 1);

        let old = dom.by_id("w").expect("widget should exist");
        dom.remove(old)?;
        assert_eq!(binder.collect_garbage(&dom), 1);
        assert_eq!(binder.bound_node_count(), 0);

        dom.append_html(root, "<div id='w' class='w'></div>")?;
        binder.scan(&mut dom, root)?;
        assert_eq!(*log.borrow(), vec!["w:w", "w:w"]);
        Ok(())
    }

    #[test]
    fn trace_records_bind_lines() -> Result<()> {
        let mut dom = Dom::parse("<div class='widget'></div>")?;
        let mut binder = Binder::<Dom>::new();
        binder.enable_trace(true);
        binder.set_trace_stderr(false);
        binder.register(".widget", |_: &mut ElementHandle<'_, Dom>| Ok(()))?;

        let root = dom.document();
        binder.scan(&mut dom, root)?;
        binder.scan(&mut dom, root)?;
        let div = dom.children(root)[0];

        let logs = binder.take_trace_logs();
        assert!(logs.contains(&"[bind] register id=registration#0 selector=.widget".to_string()));
        assert!(logs.contains(&format!("[bind] apply selector=.widget node={div:?}")));
        assert!(logs.contains(&format!("[bind] skip selector=.widget node={div:?}")));
        assert!(binder.take_trace_logs().is_empty());

        match binder.set_trace_log_limit(0) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains("at least 1 entry")),
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn with_config_validates_the_log_limit() {
        let config = BinderConfig {
            trace_log_limit: 0,
            ..BinderConfig::default()
        };
        assert!(matches!(
            Binder::<Dom>::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    fn logging_with_root(
        log: &Log,
        label: &'static str,
    ) -> impl FnMut(&mut ElementHandle<'_, Dom>) -> InitResult + 'static {
        let log = Rc::clone(log);
        move |element| {
            let id = element.attr("id").unwrap_or("?").to_string();
            let root = element.tree().attr(element.root(), "id").unwrap_or("-");
            log.borrow_mut().push(format!("{label}:{id}@{root}"));
            Ok(())
        }
    }

    #[test]
    fn scoped_registrations_run_inside_each_parent_match_first() -> Result<()> {
        let mut dom = Dom::parse(
            "<form id='f1' class='form'><input id='a'></form>\
             <form id='f2' class='form'><input id='b'></form><input id='c'>",
        )?;
        let log = Log::default();
        let mut binder = Binder::new();
        let form = binder.register(".form", logging_with_root(&log, "form"))?;
        let input = binder.register_scoped(form, "input", logging_with_root(&log, "input"))?;
        assert_eq!(binder.parent_of(input), Some(form));
        assert_eq!(binder.parent_of(form), None);

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert_eq!(report.applied, 4);
        assert_eq!(
            *log.borrow(),
            vec!["input:a@f1", "form:f1@-", "input:b@f2", "form:f2@-"]
        );
        let c = dom.by_id("c").expect("c should exist");
        assert!(binder.bound_registrations(c).is_empty());
        Ok(())
    }

    #[test]
    fn scoped_registrations_reach_new_content_under_bound_parents() -> Result<()> {
        let mut dom = Dom::parse("<form id='f1' class='form'><input id='a'></form>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        let form = binder.register(".form", logging_with_root(&log, "form"))?;
        let input = binder.register_scoped(form, "input", logging_with_root(&log, "input"))?;
        binder.register_scoped(input, "[data-nested]", logging_with_root(&log, "nested"))?;

        let root = dom.document();
        binder.scan(&mut dom, root)?;
        let f1 = dom.by_id("f1").expect("form should exist");
        dom.append_html(f1, "<input id='d' data-nested>")?;
        log.borrow_mut().clear();

        let report = binder.scan(&mut dom, root)?;
        assert_eq!((report.applied, report.skipped), (2, 2));
        assert_eq!(*log.borrow(), vec!["nested:d@d", "input:d@f1"]);

        assert!(binder.unregister_id(form));
        assert!(binder.is_empty());
        match binder.register_scoped(form, "input", |_| Ok(())) {
            Err(Error::RegistrationNotFound(id)) => assert_eq!(id, "registration#0"),
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn unregister_by_selector_drops_scoped_descendants() -> Result<()> {
        let mut binder = Binder::<Dom>::new();
        let menu = binder.register(".menu", |_| Ok(()))?;
        binder.register_scoped(menu, "li", |_| Ok(()))?;
        binder.register("li", |_| Ok(()))?;

        assert_eq!(binder.unregister(".menu"), 2);
        let left = binder
            .registrations()
            .map(|(_, selector)| selector.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(left, vec!["li"]);
        Ok(())
    }

    #[test]
    fn top_level_initializers_see_the_scan_root() -> Result<()> {
        let mut dom = Dom::parse("<main id='m'><p id='p' class='w'></p></main>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register(".w", logging_with_root(&log, "w"))?;

        let main = dom.by_id("m").expect("main should exist");
        binder.scan(&mut dom, main)?;
        assert_eq!(*log.borrow(), vec!["w:p@m"]);
        Ok(())
    }

    #[test]
    fn extreme_nth_offsets_scan_without_panicking() -> Result<()> {
        let mut dom = Dom::parse("<ul><li id='1'></li><li id='2'></li></ul>")?;
        let log = Log::default();
        let mut binder = Binder::new();
        binder.register("li:nth-child(-9223372036854775808)", logging(&log, "min"))?;
        binder.register("li:nth-child(-n+9223372036854775807)", logging(&log, "all"))?;

        let root = dom.document();
        let report = binder.scan(&mut dom, root)?;
        assert!(report.is_clean());
        assert_eq!(*log.borrow(), vec!["all:1", "all:2"]);
        Ok(())
    }

    #[test]
    fn listeners_attached_by_initializers_survive_the_scan() -> Result<()> {
        let mut dom = Dom::parse("<div id='outer'><button id='b' class='counter'>0</button></div>")?;
        let mut binder = Binder::new();
        binder.register(".counter", |element: &mut ElementHandle<'_, Dom>| {
            element.on("click", |dom: &mut Dom, event: &Event<NodeId>| {
                let node = event.current_target();
                let count = dom.text_content(node).parse::<u32>().unwrap_or(0) + 1;
                dom.set_text_content(node, &count.to_string())
            })?;
            Ok(())
        })?;

        let root = dom.document();
        binder.scan(&mut dom, root)?;
        binder.scan(&mut dom, root)?;
        let button = dom.by_id("b").expect("button should exist");
        assert_eq!(dom.listener_count(button, "click"), 1);
        dom.dispatch(button, "click")?;
        dom.dispatch(button, "click")?;
        assert_eq!(dom.text_content(button), "2");
        Ok(())
    }
}
