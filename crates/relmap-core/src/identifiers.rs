//! Table and column name rules.
//!
//! A declared name is either plain or delimited. Plain names are folded to
//! lower case for lookup and emitted exactly as written. Delimited names are
//! wrapped in double quotes: the quotes are stripped for lookup, case is
//! preserved, and the quoted form is what ends up in generated SQL.

use std::fmt;

/// A resolved table or column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    lookup: String,
    emitted: String,
    delimited: bool,
}

impl Identifier {
    /// Resolve a declared name, falling back to `default` when none (or an
    /// empty one) was given.
    ///
    /// ```
    /// use relmap_core::Identifier;
    ///
    /// let plain = Identifier::resolve(Some("FirstName"), "first_name");
    /// assert_eq!(plain.lookup_key(), "firstname");
    /// assert_eq!(plain.emitted(), "FirstName");
    ///
    /// let quoted = Identifier::resolve(Some("\"FirstName\""), "first_name");
    /// assert_eq!(quoted.lookup_key(), "FirstName");
    /// assert_eq!(quoted.emitted(), "\"FirstName\"");
    ///
    /// let fallback = Identifier::resolve(Some(""), "Hero");
    /// assert_eq!(fallback.emitted(), "Hero");
    /// ```
    pub fn resolve(declared: Option<&str>, default: &str) -> Self {
        let declared = declared.map(str::trim).filter(|name| !name.is_empty());
        match declared {
            Some(name) => match strip_quotes(name) {
                Some(inner) if !inner.is_empty() => Self {
                    lookup: inner,
                    emitted: name.to_string(),
                    delimited: true,
                },
                Some(_) => Self::plain(default),
                None => Self::plain(name),
            },
            None => Self::plain(default),
        }
    }

    fn plain(name: &str) -> Self {
        Self {
            lookup: fold_case(name),
            emitted: name.to_string(),
            delimited: false,
        }
    }

    /// The logical lookup key (lower-cased unless delimited, never quoted).
    pub fn lookup_key(&self) -> &str {
        &self.lookup
    }

    /// The form written into SQL text.
    pub fn emitted(&self) -> &str {
        &self.emitted
    }

    /// Whether the name was declared in double quotes.
    pub const fn is_delimited(&self) -> bool {
        self.delimited
    }

}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.emitted)
    }
}

/// Lower-case a name for case-insensitive lookup.
pub fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

/// Strip one pair of surrounding double quotes, un-doubling embedded quotes.
///
/// Returns `None` when the name is not wrapped in quotes.
pub fn strip_quotes(name: &str) -> Option<String> {
    let inner = name.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.replace("\"\"", "\""))
}

/// Reduce a result label to the bare column name: drop a `table.` prefix and
/// surrounding quotes.
pub fn unquote_label(label: &str) -> &str {
    let bare = match label.rsplit_once('.') {
        Some((_, column)) if !column.is_empty() => column,
        _ => label,
    };
    bare.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(bare)
}
