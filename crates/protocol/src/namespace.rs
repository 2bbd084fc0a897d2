// SPDX-License-Identifier: PolyForm-Shield-1.0

/// A hierarchical identifier built from ordered segments joined by a
/// delimiter, e.g. `"orders.v2.OrderPlaced.json"`.
///
/// Two namespaces are equal iff their joined form is equal; `Namespace`
/// itself only ever carries the segments that precede the leaf type name,
/// which is appended by [`Namespace::with_suffix`] at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    parts: Vec<String>,
    delimiter: String,
}

impl Namespace {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_delimiter(parts, ".")
    }

    pub fn with_delimiter<I, S>(parts: I, delimiter: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            delimiter: delimiter.into(),
        }
    }

    /// The joined form of this namespace's own segments.
    pub fn path(&self) -> String {
        self.parts.join(&self.delimiter)
    }

    /// Join this namespace's path with the given trailing segments.
    ///
    /// `ns.with_suffix(["Order", "json"])` on a namespace with path
    /// `"orders.v2"` yields `"orders.v2.Order.json"`.
    pub fn with_suffix<I, S>(&self, suffix: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = vec![self.path()];
        segments.extend(suffix.into_iter().map(Into::into));
        segments.join(&self.delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_parts_with_delimiter() {
        let ns = Namespace::new(["orders", "v2"]);
        assert_eq!(ns.path(), "orders.v2");
    }

    #[test]
    fn with_suffix_appends_after_path() {
        let ns = Namespace::new(["orders", "v2"]);
        assert_eq!(ns.with_suffix(["Order", "json"]), "orders.v2.Order.json");
    }

    #[test]
    fn equality_is_by_joined_form() {
        let a = Namespace::new(["a", "b"]);
        let b = Namespace::new(["a", "b"]);
        assert_eq!(a, b);
    }

    #[test]
    fn custom_delimiter_is_honoured() {
        let ns = Namespace::with_delimiter(["a", "b"], "/");
        assert_eq!(ns.with_suffix(["Leaf"]), "a/b/Leaf");
    }
}
