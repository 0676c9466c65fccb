use std::collections::{BTreeMap, HashMap, HashSet};

use super::{ToolingId, ToolingRecord};

/// Replacement links of a record batch, indexed in both directions.
///
/// A record points forward at the tool that replaces it. Walking either
/// direction stops at the first id already visited, so a malformed cycle
/// simply ends the chain.
#[derive(Debug, Clone, Default)]
pub struct ReplacementIndex {
    forward: HashMap<ToolingId, ToolingId>,
    backward: BTreeMap<ToolingId, Vec<ToolingId>>,
}

impl ReplacementIndex {
    pub fn build(records: &[ToolingRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            if let Some(target) = record.replacement() {
                index.forward.insert(record.id, target);
                index.backward.entry(target).or_default().push(record.id);
            }
        }
        for sources in index.backward.values_mut() {
            sources.sort_unstable();
        }
        index
    }

    /// Tool that directly replaces `id`.
    pub fn replacement_of(&self, id: ToolingId) -> Option<ToolingId> {
        self.forward.get(&id).copied()
    }

    /// Tool that `id` directly replaced; the lowest id wins when several
    /// records point at the same replacement.
    pub fn predecessor_of(&self, id: ToolingId) -> Option<ToolingId> {
        self.backward.get(&id).and_then(|sources| sources.first().copied())
    }

    /// Replacements of `id`, nearest first.
    pub fn descendants(&self, id: ToolingId) -> Vec<ToolingId> {
        self.walk(id, |current| self.replacement_of(current))
    }

    /// Tools replaced by `id`, nearest first.
    pub fn ancestors(&self, id: ToolingId) -> Vec<ToolingId> {
        self.walk(id, |current| self.predecessor_of(current))
    }

    /// Whole chain containing `id`, oldest tool first.
    pub fn chain(&self, id: ToolingId) -> Vec<ToolingId> {
        let mut chain: Vec<ToolingId> = self.ancestors(id).into_iter().rev().collect();
        chain.push(id);
        for next in self.descendants(id) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
        }
        chain
    }

    /// [`ReplacementIndex::chain`] as `1 > 2 > 3`; empty for a tool with no
    /// replacement links.
    pub fn chain_text(&self, id: ToolingId) -> String {
        let chain = self.chain(id);
        if chain.len() < 2 {
            return String::new();
        }
        chain
            .iter()
            .map(ToolingId::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    fn walk(&self, start: ToolingId, step: impl Fn(ToolingId) -> Option<ToolingId>) -> Vec<ToolingId> {
        let mut visited = HashSet::from([start]);
        let mut path = Vec::new();
        let mut current = start;
        while let Some(next) = step(current) {
            if !visited.insert(next) {
                break;
            }
            path.push(next);
            current = next;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: ToolingId, replacement: Option<ToolingId>) -> ToolingRecord {
        ToolingRecord {
            id,
            status: "obsolete".into(),
            replacement_tooling_id: replacement,
            ..ToolingRecord::default()
        }
    }

    #[test]
    fn walks_both_directions() {
        let records = vec![record(1, Some(2)), record(2, Some(3)), record(3, None)];
        let index = ReplacementIndex::build(&records);

        assert_eq!(index.descendants(1), vec![2, 3]);
        assert_eq!(index.ancestors(3), vec![2, 1]);
        assert_eq!(index.chain(2), vec![1, 2, 3]);
    }

    #[test]
    fn cycles_terminate_the_walk() {
        let records = vec![record(1, Some(2)), record(2, Some(3)), record(3, Some(1))];
        let index = ReplacementIndex::build(&records);

        assert_eq!(index.descendants(1), vec![2, 3]);
        assert_eq!(index.ancestors(1), vec![3, 2]);
        assert_eq!(index.chain(1), vec![2, 3, 1]);
    }

    #[test]
    fn zero_reference_is_not_a_link() {
        let index = ReplacementIndex::build(&[record(4, Some(0))]);
        assert!(index.descendants(4).is_empty());
        assert_eq!(index.chain_text(4), "");
    }

    #[test]
    fn chain_text_lists_the_whole_chain_from_any_member() {
        let records = vec![record(5, Some(8)), record(8, Some(9)), record(9, None)];
        let index = ReplacementIndex::build(&records);

        assert_eq!(index.chain_text(5), "5 > 8 > 9");
        assert_eq!(index.chain_text(9), "5 > 8 > 9");
    }
}
