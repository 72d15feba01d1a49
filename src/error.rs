use rust_alloc::string::String;

/// Errors raised by weak references and by forwarded operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A weak reference was offered as the target of another weak reference.
    #[error("cannot create weakref of weakref")]
    InvalidArgument,
    /// The target was reclaimed before it could be pinned.
    #[error("invalid reference - already expired")]
    DanglingReference,
    /// The live target has no operation with this name.
    #[error("undefined method `{method}' for {receiver}")]
    MethodNotFound {
        receiver: &'static str,
        method: String,
    },
    #[error("wrong number of arguments (given {given}, expected {expected})")]
    ArgumentCount { given: usize, expected: usize },
    #[error("no implicit conversion of {found} into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// An error raised by the target's own operation.
    #[error("{message} ({class})")]
    Raised { class: String, message: String },
}

impl Error {
    pub fn method_not_found(receiver: &'static str, method: &str) -> Self {
        Self::MethodNotFound {
            receiver,
            method: method.into(),
        }
    }

    pub fn raised(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            class: class.into(),
            message: message.into(),
        }
    }
}
