// The source registry: maps every loaded source (the main chunk or an
// import) to a stable small integer.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use typed_index_collections::TiVec;

/// Index into the `SourceRegistry`. Kept to a single byte because spans pack
/// it into the high byte of an encoded line (see `span::encode_bcline`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceIdx(pub u8);

impl typed_index_collections::Idx for SourceIdx {
    fn from_usize(idx: usize) -> Self {
        SourceIdx(idx as u8)
    }
    fn into_usize(self) -> usize {
        self.0 as usize
    }
}

/// Metadata recorded for one registered source file.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub filename: String,
    pub starting_line: u32,
    pub total_lines: u32,
    pub parent_index: Option<SourceIdx>,
    pub import_line_in_parent: u32,
    pub namespace: Option<String>,
    path_hash: u64,
}

fn hash_path(path: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// Assigns every loaded source a unique small integer and remembers where it
/// came from. Registration is idempotent on path hash: re-registering the
/// same logical path returns the existing index rather than minting a new
/// one, which is what makes repeated `import` of the same library cheap and
/// lets the circular-import check work off a simple membership test.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: TiVec<SourceIdx, SourceInfo>,
    by_hash: HashMap<u64, SourceIdx>,
    by_namespace: HashMap<String, SourceIdx>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` (the host-resolved filesystem path used for
    /// deduplication) under the given `filename` (the display name used in
    /// diagnostics). Returns the existing index if `path` was already
    /// registered.
    pub fn register(
        &mut self,
        path: &str,
        filename: impl Into<String>,
        parent_index: Option<SourceIdx>,
        import_line: u32,
    ) -> SourceIdx {
        let hash = hash_path(path);
        if let Some(existing) = self.by_hash.get(&hash) {
            return *existing;
        }
        if self.entries.len() >= crate::span::MAX_SOURCES {
            // The encoding has no room left; pin to the last valid slot
            // rather than silently wrapping into a previously-assigned index.
            return SourceIdx((crate::span::MAX_SOURCES - 1) as u8);
        }
        let idx = self.entries.push_and_get_key(SourceInfo {
            filename: filename.into(),
            starting_line: 1,
            total_lines: 0,
            parent_index,
            import_line_in_parent: import_line,
            namespace: None,
            path_hash: hash,
        });
        self.by_hash.insert(hash, idx);
        idx
    }

    pub fn find_by_path_hash(&self, hash: u64) -> Option<SourceIdx> {
        self.by_hash.get(&hash).copied()
    }

    pub fn find_by_path(&self, path: &str) -> Option<SourceIdx> {
        self.find_by_path_hash(hash_path(path))
    }

    pub fn find_by_namespace(&self, name: &str) -> Option<SourceIdx> {
        self.by_namespace.get(name).copied()
    }

    /// Records a namespace binding for `idx`. Conflicting namespace names
    /// across different files are tolerated (the last writer wins) but the
    /// caller is expected to have logged a diagnostic; see
    /// `parser::imports::bind_namespace`.
    pub fn set_namespace(&mut self, idx: SourceIdx, name: impl Into<String>) {
        let name = name.into();
        self.entries[idx].namespace = Some(name.clone());
        self.by_namespace.insert(name, idx);
    }

    pub fn set_total_lines(&mut self, idx: SourceIdx, total_lines: u32) {
        self.entries[idx].total_lines = total_lines;
    }

    pub fn get(&self, idx: SourceIdx) -> &SourceInfo {
        &self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_on_path() {
        let mut reg = SourceRegistry::new();
        let a = reg.register("/lib/a.t", "a.t", None, 0);
        let b = reg.register("/lib/a.t", "a.t", None, 0);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn namespace_lookup_round_trips() {
        let mut reg = SourceRegistry::new();
        let idx = reg.register("/lib/util.t", "util.t", None, 0);
        reg.set_namespace(idx, "util");
        assert_eq!(reg.find_by_namespace("util"), Some(idx));
    }

    #[test]
    fn distinct_paths_get_distinct_indices() {
        let mut reg = SourceRegistry::new();
        let a = reg.register("/lib/a.t", "a.t", None, 0);
        let b = reg.register("/lib/b.t", "b.t", Some(a), 3);
        assert_ne!(a, b);
        assert_eq!(reg.get(b).parent_index, Some(a));
        assert_eq!(reg.get(b).import_line_in_parent, 3);
    }
}
