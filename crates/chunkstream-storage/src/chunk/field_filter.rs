//! Field Filtering
//!
//! A `FieldFilter` names the protobuf field paths a caller needs. The
//! Transpose decoder uses it to rewrite unneeded state-machine nodes into
//! skips and to leave their buckets compressed. Inclusion does not
//! guarantee exclusion of other fields; it only promises the named paths
//! survive. The Simple codec returns whole records and ignores filters.

/// Path of field numbers from the message root, e.g. `[3, 2]` for field 2
/// of submessage field 3.
pub type FieldPath = Vec<u32>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldFilter {
    /// Keep everything.
    #[default]
    All,
    /// Keep the named paths (and their ancestors and descendants).
    Include(Vec<FieldPath>),
}

impl FieldFilter {
    pub fn all() -> Self {
        FieldFilter::All
    }

    pub fn include(paths: Vec<FieldPath>) -> Self {
        FieldFilter::Include(paths)
    }

    pub fn includes_all(&self) -> bool {
        matches!(self, FieldFilter::All)
    }

    /// Whether a node at `path` must be decoded.
    ///
    /// A path is included when some filter path is its prefix (the node is
    /// inside a wanted subtree) or it is a prefix of some filter path (the
    /// node is an ancestor that must be kept so the wanted field stays
    /// addressable).
    pub fn includes(&self, path: &[u32]) -> bool {
        match self {
            FieldFilter::All => true,
            FieldFilter::Include(paths) => paths.iter().any(|wanted| {
                let len = wanted.len().min(path.len());
                wanted[..len] == path[..len]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_includes_everything() {
        let filter = FieldFilter::all();
        assert!(filter.includes(&[]));
        assert!(filter.includes(&[1]));
        assert!(filter.includes(&[9, 9, 9]));
    }

    #[test]
    fn test_include_exact_and_descendants() {
        let filter = FieldFilter::include(vec![vec![3, 2]]);
        assert!(filter.includes(&[3, 2]));
        assert!(filter.includes(&[3, 2, 7]), "descendants stay");
        assert!(filter.includes(&[3]), "ancestors stay");
        assert!(!filter.includes(&[3, 1]));
        assert!(!filter.includes(&[2]));
    }

    #[test]
    fn test_include_multiple_paths() {
        let filter = FieldFilter::include(vec![vec![1], vec![3, 2]]);
        assert!(filter.includes(&[1]));
        assert!(filter.includes(&[1, 5]));
        assert!(filter.includes(&[3, 2]));
        assert!(!filter.includes(&[4]));
        assert!(!filter.includes(&[3, 3]));
    }

    #[test]
    fn test_empty_include_matches_nothing() {
        let filter = FieldFilter::include(vec![]);
        assert!(!filter.includes(&[]));
        assert!(!filter.includes(&[1]));
    }
}
