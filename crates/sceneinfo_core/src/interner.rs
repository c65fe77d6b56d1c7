//! Schema Type Interner
//!
//! Schema type names ("Mesh", "Xform", "PointInstancer", ...) are compared
//! and hashed on every capability lookup. They are interned once into a
//! compact [`TypeTag`] so those lookups are integer operations.

use std::fmt;
use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Interned schema type name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(Spur);

impl TypeTag {
    /// Interns `name`, returning the existing tag if it was seen before.
    #[inline]
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(INTERNER.get_or_intern(name))
    }

    /// Looks up a tag without interning.
    #[inline]
    #[must_use]
    pub fn get(name: &str) -> Option<Self> {
        INTERNER.get(name).map(Self)
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        INTERNER.resolve(&self.0)
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.as_str())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = TypeTag::new("Mesh");
        let b = TypeTag::new("Mesh");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Mesh");
        assert_ne!(a, TypeTag::new("Xform"));
        assert_eq!(TypeTag::get("Mesh"), Some(a));
        assert_eq!(TypeTag::get("NeverInterned_7f3a"), None);
    }
}
