/// An ordered multi-map of string keys to ordered lists of string values.
///
/// Backed by a `Vec` rather than a `HashMap` so that insertion order among
/// distinct keys is preserved (matches typical RPC wire conventions, e.g.
/// repeated HTTP headers). `set` is a merge: calling it twice with the same
/// key appends to that key's existing value list rather than replacing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, Vec<String>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends `value` to `key`'s list, creating the key if absent.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some((_, values)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            values.push(value.into());
        } else {
            self.entries.push((key, vec![value.into()]));
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.entries.iter()
    }

    /// Merges `other` into `self`, concatenating value lists key-by-key,
    /// in `other`'s insertion order. This is the operation `RPCState`'s
    /// `setHeaders`/`setTrailers` use (spec §4.2's merge policy).
    pub fn merge(&mut self, other: &Metadata) {
        for (key, values) in &other.entries {
            for value in values {
                self.add(key.clone(), value.clone());
            }
        }
    }
}
