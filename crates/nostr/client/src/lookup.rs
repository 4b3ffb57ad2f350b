//! Result of a read that can legitimately find nothing.

use crate::error::Result;
use crate::subscription::{FetchOutcome, StopReason};

/// Outcome of a network lookup.
///
/// Keeps "nothing there" apart from "could not ask", so callers can decide
/// whether an empty screen is an answer or an outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// The query hit its hard timeout without an answer
    Timeout,
    NetworkError(String),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Timeout => Lookup::Timeout,
            Lookup::NetworkError(e) => Lookup::NetworkError(e),
        }
    }

    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.found().unwrap_or_default()
    }
}

impl Lookup<FetchOutcome> {
    /// Lift a finished query into a lookup of its raw outcome. An empty
    /// result that ran into the hard timeout is a `Timeout`; any other empty
    /// result is `NotFound`.
    pub(crate) fn from_fetch(result: Result<FetchOutcome>) -> Self {
        match result {
            Ok(outcome) if !outcome.is_empty() => Lookup::Found(outcome),
            Ok(outcome) if outcome.stop == StopReason::HardTimeout => Lookup::Timeout,
            Ok(_) => Lookup::NotFound,
            Err(e) => Lookup::NetworkError(e.to_string()),
        }
    }
}
