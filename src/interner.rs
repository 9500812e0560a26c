// Compilation-unit-wide string interning for identifiers and string
// literals. Equality between two `InternedStr` values is a single integer
// compare, reimplementing the host runtime's pointer-identity equality for
// interned strings at this layer.

use string_interner::backend::BucketBackend;
use string_interner::symbol::SymbolU32;
use string_interner::StringInterner as RawInterner;

/// An interned string or identifier. Cheap to copy, compare and hash;
/// equal interned strings always carry equal bytes and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedStr(SymbolU32);

/// Wraps the host's `intern_string` hook behind a single
/// compilation-unit-owned table, as the design notes recommend for a
/// reimplementation that does not share a process-global interner.
#[derive(Default)]
pub struct Interner {
    table: RawInterner<BucketBackend<SymbolU32>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> InternedStr {
        InternedStr(self.table.get_or_intern(text))
    }

    pub fn resolve(&self, sym: InternedStr) -> &str {
        self.table.resolve(sym.0).expect("InternedStr from a foreign Interner")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_interns_to_equal_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_interns_to_distinct_symbol() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "foo");
        assert_eq!(interner.resolve(b), "bar");
    }
}
