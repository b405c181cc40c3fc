//! Generic `A__B__C=v` environment tree normaliser.
//!
//! Keys are split on `__`, lower-cased, and folded into a nested tree.
//! Numbered groups (`FEEDS__1__SEED`, `FEEDS__2__SEED`, ...) become branch
//! nodes keyed by the numeral string; callers that need list semantics sort
//! those keys numerically with [`EnvNode::numeric_child_keys`].

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum EnvNode {
    Leaf(String),
    Branch(BTreeMap<String, EnvNode>),
}

impl EnvNode {
    pub fn empty_branch() -> Self {
        EnvNode::Branch(BTreeMap::new())
    }

    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            EnvNode::Leaf(v) => Some(v.as_str()),
            EnvNode::Branch(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&EnvNode> {
        match self {
            EnvNode::Branch(map) => map.get(&key.to_ascii_lowercase()),
            EnvNode::Leaf(_) => None,
        }
    }

    /// Keys of a branch's direct children, sorted numerically (for
    /// `FEEDS__1__...`, `FEEDS__2__...`, ... groups). Non-numeric keys sort
    /// after all numeric keys, in lexical order.
    pub fn numeric_child_keys(&self) -> Vec<String> {
        let EnvNode::Branch(map) = self else {
            return Vec::new();
        };
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort_by_key(|k| match k.parse::<u64>() {
            Ok(n) => (0u8, n, k.clone()),
            Err(_) => (1u8, 0, k.clone()),
        });
        keys
    }

    fn insert(&mut self, segments: &[&str], value: &str) {
        let EnvNode::Branch(map) = self else {
            return;
        };
        let (head, rest) = match segments.split_first() {
            Some(pair) => pair,
            None => return,
        };
        let head = head.to_ascii_lowercase();
        if rest.is_empty() {
            map.insert(head, EnvNode::Leaf(value.to_string()));
            return;
        }
        let child = map.entry(head).or_insert_with(EnvNode::empty_branch);
        child.insert(rest, value);
    }
}

/// Fold an iterator of `(KEY, value)` pairs into a nested [`EnvNode::Branch`].
/// Keys with no `__` separator still land as single-segment leaves.
pub fn normalise<I, K, V>(vars: I) -> EnvNode
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = EnvNode::empty_branch();
    for (key, value) in vars {
        let segments: Vec<&str> = key.as_ref().split("__").collect();
        root.insert(&segments, value.as_ref());
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_double_underscore_keys() {
        let tree = normalise([
            ("ELASTICSEARCH__HOST", "es.example.com"),
            ("ELASTICSEARCH__PORT", "9200"),
        ]);
        let es = tree.get("elasticsearch").unwrap();
        assert_eq!(es.get("host").unwrap().as_leaf(), Some("es.example.com"));
        assert_eq!(es.get("port").unwrap().as_leaf(), Some("9200"));
    }

    #[test]
    fn numeric_children_sort_numerically_not_lexically() {
        let tree = normalise([
            ("FEEDS__10__SEED", "a"),
            ("FEEDS__2__SEED", "b"),
            ("FEEDS__1__SEED", "c"),
        ]);
        let feeds = tree.get("feeds").unwrap();
        assert_eq!(feeds.numeric_child_keys(), vec!["1", "2", "10"]);
    }

    #[test]
    fn case_is_normalised() {
        let tree = normalise([("Sentry__Dsn", "abc")]);
        assert_eq!(
            tree.get("sentry").unwrap().get("dsn").unwrap().as_leaf(),
            Some("abc")
        );
    }
}
