//! Error types surfaced to scripting code and embedders

/// Result type for every fallible bridge operation
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error kinds.
///
/// The `Display` form of each variant is the message a script sees when the
/// error unwinds to a protected-call boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Write through a view that has no setter table at all (e.g. a const object)
    #[error("No member named '{0}'")]
    NoSuchMember(String),

    /// Write to a symbol with no setter anywhere in the inheritance chain
    #[error("No writable member '{0}'")]
    NotWritable(String),

    /// Write to a property registered without a setter
    #[error("'{0}' is read-only")]
    ReadOnly(String),

    /// A stack argument could not be converted to the declared parameter type
    #[error("Argument {index}: expected {expected}, got {got}")]
    ArgumentTypeMismatch {
        /// Zero-based index among the declared (non-receiver) parameters
        index: usize,
        /// Expected kind name
        expected: &'static str,
        /// Kind actually found on the stack ("no value" when missing)
        got: &'static str,
    },

    /// Error or panic raised by native code during a call
    #[error("{0}")]
    NativeCallFailure(String),

    /// The receiver slot does not hold an object of the expected native type
    #[error("Expected {expected} receiver, got {got}")]
    InvalidReceiver {
        /// Native type name the callable was registered for
        expected: &'static str,
        /// What was found instead
        got: String,
    },

    /// A mutating member was called through a const reference
    #[error("Cannot call mutating member on const {0}")]
    ConstViolation(&'static str),

    /// A referenced native object was destroyed by its owner
    #[error("Referenced {0} is no longer alive")]
    Expired(&'static str),

    /// The object is already borrowed by a call further up the stack
    #[error("{0} is already in use by an active call")]
    Reentrant(&'static str),

    /// Attempt to call a value that is not a function
    #[error("Attempt to call a {0} value")]
    NotCallable(&'static str),

    /// Field access on a value that is neither an object nor a class
    #[error("Attempt to index a {0} value")]
    NotIndexable(&'static str),

    /// Stack slot or call depth limit exceeded
    #[error("Stack overflow")]
    StackOverflow,

    /// Live handle limit exceeded
    #[error("Handle limit of {0} exceeded")]
    HandleLimit(usize),

    /// A native type crossed the boundary without a registered class
    #[error("Type {0} is not registered with the bridge")]
    UnregisteredType(&'static str),

    /// A class id that does not belong to the registry
    #[error("Unknown class id {0}")]
    UnknownClass(usize),

    /// A class name registered twice
    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    /// Reparenting would close a loop in the inheritance chain
    #[error("Making '{parent}' the parent of '{class}' would create an inheritance cycle")]
    CyclicInheritance {
        /// Class being reparented
        class: String,
        /// Proposed parent
        parent: String,
    },

    /// The declared native parent type does not match the parent class
    #[error("Class '{parent}' does not wrap {expected}")]
    ParentMismatch {
        /// Parent class name
        parent: String,
        /// Native type the derived class upcasts to
        expected: &'static str,
    },
}

impl BridgeError {
    /// Argument mismatch for the `index`-th declared parameter
    pub fn mismatch(index: usize, expected: &'static str, got: &'static str) -> Self {
        BridgeError::ArgumentTypeMismatch {
            index,
            expected,
            got,
        }
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::NativeCallFailure(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::NativeCallFailure(s.to_string())
    }
}
