//! # Layered Merge
//!
//! Statically typed merge of two spec trees of the same shape.
//!
//! `base` supplies defaults and `overlay` supplies intent. Every field of a
//! node type is tagged with one of four merge kinds:
//!
//! - `primitive` - scalars, enums and arrays: overlay wins when present
//! - `map` - string maps: overlay entries win, base fills missing keys
//! - `composite` - nested node types: recurse when both sides are present
//! - `opaque` - externally managed objects: copied from overlay verbatim
//!
//! Node types implement [`Merge`] through [`impl_merge!`](crate::impl_merge),
//! which lists every field with its kind. A field missing from the list is a
//! compile error, so new spec fields cannot silently skip defaulting.

use std::collections::BTreeMap;

/// A spec tree node that can be layered over a base of the same shape.
pub trait Merge: Sized {
    /// Combine `base` and `overlay` without mutating either.
    #[must_use]
    fn merge(base: &Self, overlay: &Self) -> Self;
}

/// Overlay value if present, else base value.
pub fn primitive<T: Clone>(base: &Option<T>, overlay: &Option<T>) -> Option<T> {
    overlay.clone().or_else(|| base.clone())
}

/// Overlay map with every base key inserted only when absent.
pub fn map<V: Clone>(
    base: &Option<BTreeMap<String, V>>,
    overlay: &Option<BTreeMap<String, V>>,
) -> Option<BTreeMap<String, V>> {
    match (base, overlay) {
        (None, None) => None,
        (Some(base), None) => Some(base.clone()),
        (None, Some(overlay)) => Some(overlay.clone()),
        (Some(base), Some(overlay)) => {
            let mut merged = overlay.clone();
            for (key, value) in base {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Some(merged)
        }
    }
}

/// Recurse when both sides are present, otherwise take whichever exists.
pub fn composite<T: Merge + Clone>(base: &Option<T>, overlay: &Option<T>) -> Option<T> {
    match (base, overlay) {
        (Some(base), Some(overlay)) => Some(T::merge(base, overlay)),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    }
}

/// Overlay copied whole when present; base is never mixed in.
pub fn opaque<T: Clone>(base: &Option<T>, overlay: &Option<T>) -> Option<T> {
    overlay.clone().or_else(|| base.clone())
}

/// Implement [`Merge`] for a spec node by tagging each field with its kind.
///
/// ```ignore
/// impl_merge!(ImageSpec {
///     registry => primitive,
///     tag => primitive,
/// });
/// ```
#[macro_export]
macro_rules! impl_merge {
    ($ty:ident { $($field:ident => $kind:ident),* $(,)? }) => {
        impl $crate::compose::Merge for $ty {
            fn merge(base: &Self, overlay: &Self) -> Self {
                Self {
                    $($field: $crate::compose::merge::$kind(&base.$field, &overlay.$field)),*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Leaf {
        name: Option<String>,
        count: Option<i32>,
    }

    crate::impl_merge!(Leaf {
        name => primitive,
        count => primitive,
    });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Node {
        leaf: Option<Leaf>,
        labels: Option<BTreeMap<String, String>>,
        identity: Option<Leaf>,
        tags: Option<Vec<String>>,
    }

    crate::impl_merge!(Node {
        leaf => composite,
        labels => map,
        identity => opaque,
        tags => primitive,
    });

    fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_primitive_overlay_wins() {
        assert_eq!(primitive(&Some(1), &Some(2)), Some(2));
        assert_eq!(primitive(&Some(1), &None), Some(1));
        assert_eq!(primitive::<i32>(&None, &None), None);
    }

    #[test]
    fn test_map_union_with_overlay_precedence() {
        let base = labels(&[("a", "1"), ("b", "2")]);
        let overlay = labels(&[("b", "9"), ("c", "3")]);

        let merged = map(&base, &overlay);

        assert_eq!(merged, labels(&[("a", "1"), ("b", "9"), ("c", "3")]));
    }

    #[test]
    fn test_composite_recurses_when_both_present() {
        let base = Node {
            leaf: Some(Leaf {
                name: Some("base".to_string()),
                count: Some(1),
            }),
            ..Node::default()
        };
        let overlay = Node {
            leaf: Some(Leaf {
                name: None,
                count: Some(5),
            }),
            ..Node::default()
        };

        let merged = Node::merge(&base, &overlay);

        assert_eq!(
            merged.leaf,
            Some(Leaf {
                name: Some("base".to_string()),
                count: Some(5),
            })
        );
    }

    #[test]
    fn test_opaque_is_not_recursed() {
        let base = Node {
            identity: Some(Leaf {
                name: Some("base-secret".to_string()),
                count: Some(1),
            }),
            ..Node::default()
        };
        let overlay = Node {
            identity: Some(Leaf {
                name: Some("user-secret".to_string()),
                count: None,
            }),
            ..Node::default()
        };

        let merged = Node::merge(&base, &overlay);

        // The base count must not leak into the user's identity object
        assert_eq!(
            merged.identity,
            Some(Leaf {
                name: Some("user-secret".to_string()),
                count: None,
            })
        );
    }

    #[test]
    fn test_arrays_are_replaced() {
        let base = Node {
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            ..Node::default()
        };
        let overlay = Node {
            tags: Some(vec!["c".to_string()]),
            ..Node::default()
        };

        assert_eq!(
            Node::merge(&base, &overlay).tags,
            Some(vec!["c".to_string()])
        );
    }

    #[test]
    fn test_inputs_are_untouched() {
        let base = Node {
            labels: labels(&[("a", "1")]),
            ..Node::default()
        };
        let overlay = Node {
            labels: labels(&[("b", "2")]),
            ..Node::default()
        };
        let base_before = base.clone();
        let overlay_before = overlay.clone();

        let _ = Node::merge(&base, &overlay);

        assert_eq!(base, base_before);
        assert_eq!(overlay, overlay_before);
    }
}
