//! Capability-based permission system for the port/actor boundary.
//!
//! Capabilities control which port verbs (section 6.2) and embedding-API external
//! calls (section 6.1) the trampoline is allowed to dispatch. They are checked at
//! the yield boundary — the point where a level's executor hands control to a port
//! actor or an embedding-API external call.
//!
//! Without capabilities, the yield boundary is purely architectural. With capabilities,
//! it becomes a security boundary: the core can request any operation, but the host only
//! fulfills requests that match the interpreter's capability set.
//!
//! # Usage
//!
//! ```
//! use ember::capability::{Capability, CapabilitySet};
//!
//! let caps = CapabilitySet::new(vec![
//!     Capability::PortVerb("read".into()),
//!     Capability::PortVerb("write".into()),
//! ]);
//!
//! assert!(caps.allows_function("read"));
//! assert!(!caps.allows_function("delete"));
//! ```

use std::fmt;

/// A single permission grant.
///
/// Each variant represents a class of operation the sandbox is allowed to perform.
/// The capability is checked against the function name and arguments at the yield
/// boundary before the host executes the operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Permission to invoke a specific port verb (e.g. `"read"`, `"delete"`).
    ///
    /// This is the most common capability — it allows a port actor to carry out
    /// one of the verbs in the table of section 6.2.
    PortVerb(String),

    /// Permission to invoke any port verb (wildcard).
    ///
    /// Use with caution — this bypasses per-verb checks. Appropriate for
    /// trusted embeddings where the filesystem port is not sandboxed.
    AnyPortVerb,

    /// Permission to open ports against a given scheme (e.g. `"file"`).
    OpenScheme(String),

    /// Custom capability identified by a string key.
    ///
    /// For embedding-API external calls that don't fit the built-in categories.
    /// The host is responsible for interpreting these during external-call handling.
    Custom(String),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortVerb(verb) => write!(f, "verb:{verb}"),
            Self::AnyPortVerb => f.write_str("verb:*"),
            Self::OpenScheme(scheme) => write!(f, "open:{scheme}"),
            Self::Custom(key) => write!(f, "custom:{key}"),
        }
    }
}

/// Error returned when an operation is denied by the capability set.
#[derive(Debug, Clone)]
pub struct PermissionDenied {
    /// Human-readable description of the denied operation.
    pub operation: String,
    /// Capability that would have been required.
    pub required: String,
}

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PermissionError: {} denied (requires capability '{}')",
            self.operation, self.required
        )
    }
}

impl std::error::Error for PermissionDenied {}

/// A set of granted capabilities for a sandbox session.
///
/// The capability set is immutable once created — capabilities cannot be escalated
/// during execution. A forked session inherits its parent's capabilities or a subset.
///
/// An empty capability set (`CapabilitySet::none()`) denies all external operations,
/// making the sandbox a pure computation environment with no host interaction.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
}

impl CapabilitySet {
    /// Creates a new capability set with the given permissions.
    #[must_use]
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self { capabilities }
    }

    /// Creates an empty capability set that denies everything.
    ///
    /// This is the most restrictive profile — the VM can compute but cannot
    /// call any external functions or access proxy objects.
    #[must_use]
    pub fn none() -> Self {
        Self {
            capabilities: Vec::new(),
        }
    }

    /// Creates a capability set that allows all operations.
    ///
    /// Equivalent to running without capabilities — for trusted embeddings.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            capabilities: vec![Capability::AnyPortVerb],
        }
    }

    /// Checks whether a specific port verb is allowed.
    ///
    /// Returns `Ok(())` if the verb matches a `PortVerb` capability or if
    /// `AnyPortVerb` is granted. Returns `Err(PermissionDenied)` otherwise.
    pub fn check_function_call(&self, function_name: &str) -> Result<(), PermissionDenied> {
        for cap in &self.capabilities {
            match cap {
                Capability::AnyPortVerb => return Ok(()),
                Capability::PortVerb(name) if name == function_name => return Ok(()),
                _ => {}
            }
        }
        Err(PermissionDenied {
            operation: format!("port verb '{function_name}'"),
            required: format!("verb:{function_name}"),
        })
    }

    /// Checks whether opening a port against `scheme` is allowed.
    pub fn check_open_scheme(&self, scheme: &str) -> Result<(), PermissionDenied> {
        for cap in &self.capabilities {
            match cap {
                Capability::AnyPortVerb => return Ok(()),
                Capability::OpenScheme(name) if name == scheme => return Ok(()),
                _ => {}
            }
        }
        Err(PermissionDenied {
            operation: format!("open port scheme '{scheme}'"),
            required: format!("open:{scheme}"),
        })
    }

    /// Returns `true` if the given verb is allowed.
    #[must_use]
    pub fn allows_function(&self, function_name: &str) -> bool {
        self.check_function_call(function_name).is_ok()
    }

    /// Returns `true` if opening the given scheme is allowed.
    #[must_use]
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.check_open_scheme(scheme).is_ok()
    }

    /// Creates a subset of this capability set, retaining only capabilities
    /// that also appear in `restrict`.
    ///
    /// Used when forking interpreters to narrow permissions:
    /// ```
    /// # use ember::capability::{Capability, CapabilitySet};
    /// let parent = CapabilitySet::new(vec![
    ///     Capability::PortVerb("read".into()),
    ///     Capability::PortVerb("write".into()),
    /// ]);
    /// let child = parent.subset(&[Capability::PortVerb("read".into())]);
    /// assert!(child.allows_function("read"));
    /// assert!(!child.allows_function("write"));
    /// ```
    #[must_use]
    pub fn subset(&self, restrict: &[Capability]) -> Self {
        let capabilities = self
            .capabilities
            .iter()
            .filter(|cap| restrict.contains(cap))
            .cloned()
            .collect();
        Self { capabilities }
    }

    /// Returns the capabilities as a slice for inspection.
    #[must_use]
    pub fn as_slice(&self) -> &[Capability] {
        &self.capabilities
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.capabilities.is_empty() {
            return f.write_str("CapabilitySet(none)");
        }
        f.write_str("CapabilitySet(")?;
        for (i, cap) in self.capabilities.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{cap}")?;
        }
        f.write_str(")")
    }
}
