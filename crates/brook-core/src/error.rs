//! Error types for the routing core.
//!
//! Registration and usage failures are plain enums. Handler execution errors
//! are carried by [`HandlerError`], a cheaply clonable, type-erased wrapper
//! that travels through the pipeline in error mode.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// =============================================================================
// Setup-time errors
// =============================================================================

/// Errors raised while compiling a topic pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern source is the empty string.
    #[error("topic pattern is empty")]
    Empty,

    /// Two delimiters with nothing in between (e.g. `a..b`).
    #[error("empty segment at position {position} in pattern '{pattern}'")]
    EmptySegment {
        /// The offending pattern.
        pattern: String,
        /// Zero-based segment index.
        position: usize,
    },

    /// A `:` marker with no name after it.
    #[error("parameter name missing at position {position} in pattern '{pattern}'")]
    EmptyParam {
        /// The offending pattern.
        pattern: String,
        /// Zero-based segment index.
        position: usize,
    },

    /// The same parameter name is bound twice.
    #[error("parameter ':{name}' appears more than once in pattern '{pattern}'")]
    DuplicateParam {
        /// The offending pattern.
        pattern: String,
        /// The repeated name.
        name: String,
    },

    /// `*` used anywhere but the last segment.
    #[error("wildcard must be the last segment of pattern '{pattern}'")]
    WildcardNotTerminal {
        /// The offending pattern.
        pattern: String,
    },
}

/// Errors raised while building the routing tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A sibling router already uses this topic pattern.
    #[error("topic '{topic}' is already registered under '{scope}'")]
    DuplicateTopic {
        /// The rejected pattern.
        topic: String,
        /// Name of the parent router.
        scope: String,
    },

    /// A wildcard router consumes the whole topic, so nothing below it could match.
    #[error("cannot mount '{topic}' under wildcard router '{scope}'")]
    WildcardParent {
        /// The rejected pattern.
        topic: String,
        /// Name of the parent router.
        scope: String,
    },

    /// The topic pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Misuse of the request/response API from handler code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageError {
    /// [`Response::end`](crate::Response::end) was called a second time.
    #[error("response end should be called only once")]
    AlreadyEnded,
}

// =============================================================================
// HandlerError
// =============================================================================

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

/// A handler panicked while running.
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// The panic payload rendered as text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error raised by handler code and propagated in error mode.
///
/// Clones share the same underlying error, so identity survives the trip
/// through the pipeline; use [`ptr_eq`](Self::ptr_eq) to check it.
///
/// Any `std::error::Error + Send + Sync` converts into a `HandlerError`, which
/// lets handlers use `?` freely.
#[derive(Clone)]
pub struct HandlerError {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl HandlerError {
    /// Wraps a concrete error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(MessageError(message.to_string()))
    }

    /// Wraps an already boxed error.
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            inner: Arc::from(error),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(PanicError { message })
    }

    /// Returns `true` if this error was produced by a caught panic.
    pub fn is_panic(&self) -> bool {
        self.inner.is::<PanicError>()
    }

    /// Attempts to downcast to the concrete error type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Returns `true` if both values share the same underlying error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Borrows the underlying error.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerError").field(&self.inner).finish()
    }
}
