use std::collections::VecDeque;
use std::fmt;

use crate::binder::RegistrationId;
use crate::{Error, Result};

const DEFAULT_TRACE_LOG_LIMIT: usize = 10_000;

/// Knobs for a [`Binder`](crate::Binder). Every field can also be changed on a
/// live binder through its setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    /// Record `[bind]` lines in the trace buffer.
    pub trace: bool,
    /// Echo trace lines to stderr while tracing is enabled.
    pub trace_to_stderr: bool,
    /// Maximum number of buffered trace lines; the oldest are dropped first.
    pub trace_log_limit: usize,
    /// Turn initializer panics into [`InitFailure`]s. When false a panic
    /// unwinds out of [`Binder::scan`](crate::Binder::scan).
    pub catch_panics: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            trace: false,
            trace_to_stderr: true,
            trace_log_limit: DEFAULT_TRACE_LOG_LIMIT,
            catch_panics: true,
        }
    }
}

impl BinderConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.trace_log_limit == 0 {
            return Err(Error::InvalidConfig(
                "trace_log_limit requires at least 1 entry".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) to_stderr: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
}

impl TraceState {
    pub(crate) fn from_config(config: &BinderConfig) -> Self {
        Self {
            enabled: config.trace,
            to_stderr: config.trace_to_stderr,
            logs: VecDeque::new(),
            log_limit: config.trace_log_limit.max(1),
        }
    }

    pub(crate) fn set_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.log_limit = max_entries;
        while self.logs.len() > self.log_limit {
            self.logs.pop_front();
        }
        Ok(())
    }

    pub(crate) fn line(&mut self, line: impl FnOnce() -> String) {
        if !self.enabled {
            return;
        }
        let line = line();
        if self.to_stderr {
            eprintln!("{line}");
        }
        if self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        self.logs.drain(..).collect()
    }
}

/// One initializer application that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure<N> {
    pub registration: RegistrationId,
    pub selector: String,
    pub node: N,
    pub message: String,
    pub panicked: bool,
}

impl<N: fmt::Debug> fmt::Display for InitFailure<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(
            f,
            "initializer for {} ({}) {kind} on {:?}: {}",
            self.selector, self.registration, self.node, self.message
        )
    }
}

/// Outcome of one [`Binder::scan`](crate::Binder::scan).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport<N> {
    /// Initializer invocations, successful or not.
    pub applied: usize,
    /// Matches that already carried a record for the registration.
    pub skipped: usize,
    pub failures: Vec<InitFailure<N>>,
}

impl<N> Default for ScanReport<N> {
    fn default() -> Self {
        Self {
            applied: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }
}

impl<N> ScanReport<N> {
    pub fn succeeded(&self) -> usize {
        self.applied - self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn merge(&mut self, other: ScanReport<N>) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}
