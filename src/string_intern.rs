use std::{collections::HashMap, rc::Rc};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct StrId(usize);

/// Deduplicating string table. Identifier and string-literal text is stored
/// once; equal strings always intern to the same id, so id equality is
/// string equality.
pub struct StringInterner {
    ids: HashMap<Rc<str>, StrId>,
    strings: Vec<Rc<str>>,
}

impl StringInterner {
    pub fn new() -> StringInterner {
        StringInterner {
            ids: HashMap::new(),
            strings: Vec::new(),
        }
    }

    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }

        let entry: Rc<str> = Rc::from(text);
        let id = StrId(self.strings.len());
        self.ids.insert(entry.clone(), id);
        self.strings.push(entry);
        id
    }

    pub fn lookup(&self, id: StrId) -> &str {
        &self.strings[id.0]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut interner = StringInterner::new();
        let a = interner.intern("count");
        let b = interner.intern("total");
        let c = interner.intern("count");

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.lookup(a), "count");
        assert_eq!(interner.lookup(b), "total");
        assert_eq!(interner.len(), 2);
    }
}
