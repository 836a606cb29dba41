//! Declarative behavior binding for element trees.
//!
//! A [`Binder`] owns a list of `(selector, initializer)` registrations. Calling
//! [`Binder::scan`] matches every registered selector against a subtree and runs
//! each initializer at most once per matching element. When to scan is left to
//! the caller; [`Page`] shows the usual document-ready / content-inserted flow.

use std::error::Error as StdError;
use std::fmt;

mod binder;
mod diagnostics;
mod dom;
mod html;
mod matching;
mod page;
mod selector;
mod tree;

pub use binder::{Binder, ElementHandle, InitResult, Initializer, RegistrationId};
pub use diagnostics::{BinderConfig, InitFailure, ScanReport};
pub use dom::{Dom, NodeId};
pub use page::Page;
pub use selector::Selector;
pub use tree::{Event, Listener, Tree};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    UnsupportedSelector(String),
    SelectorNotFound(String),
    NodeNotFound(String),
    TreeMutation(String),
    InvalidConfig(String),
    RegistrationNotFound(String),
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::NodeNotFound(node) => write!(f, "node not found: {node}"),
            Self::TreeMutation(msg) => write!(f, "tree mutation error: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid binder config: {msg}"),
            Self::RegistrationNotFound(id) => write!(f, "registration not found: {id}"),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}
