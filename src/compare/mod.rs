//! Comparison contract.
//!
//! Every result type that can be snapshotted implements [`Comparable`]:
//! - serializes itself for the snapshot body and loads a peer back from it
//! - substitutes volatile fragments (replacers) before comparing
//! - diffs itself against a peer, returning an empty string when equal
//!
//! Concrete comparators:
//! - [`Text`]: context-windowed character diff
//! - [`Json`]: structural json diff
//! - [`HttpResponse`]: status + headers, body delegated by content type

pub mod http;
pub mod json;
pub mod text;

use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpResponse;
pub use json::{InvalidPolicy, Json};
pub use text::Text;

/// Stable tag identifying a comparator family. Used as the key of the replacer table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    pub const TEXT: Kind = Kind::from_static("string");
    pub const JSON: Kind = Kind::from_static("json");
    pub const HTTP_RESPONSE: Kind = Kind::from_static("http-response");

    pub const fn from_static(name: &'static str) -> Self {
        Kind(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Kind(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token or field path -> fixed replacement, for one kind.
pub type Replacements = BTreeMap<String, String>;

/// Replacements for every kind, as read from the project config.
pub type ReplacerTable = HashMap<Kind, Replacements>;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("\"{source_kind}\" does not know how to compare itself to \"{target_kind}\"")]
    CannotCompare { source_kind: Kind, target_kind: Kind },

    #[error("source is not a valid {kind}")]
    SourceInvalid { kind: Kind },

    #[error("target is not a valid {kind}")]
    TargetInvalid { kind: Kind },

    #[error("neither source nor target are valid {kind}")]
    BothInvalid { kind: Kind },

    #[error("cannot load a {kind} from the snapshot body: {reason}")]
    Load { kind: Kind, reason: String },

    #[error("comparing bodies: {0}")]
    Body(#[source] Box<CompareError>),
}

/// A value that can take part in snapshotting.
///
/// `Display` is the total, deterministic textual rendering; comparators that meet a
/// peer of a foreign kind fall back to comparing renderings.
pub trait Comparable: fmt::Display + Send + Sync + 'static {
    fn kind(&self) -> Kind;

    /// Canonical snapshot body.
    fn dump(&self) -> Vec<u8>;

    /// Reconstruct a value of the same kind from a body produced by [`Comparable::dump`].
    /// Configuration of `self` (context size, pretty mode, handlers) carries over.
    fn load(&self, body: &[u8]) -> Result<Box<dyn Comparable>, CompareError>;

    /// Substitute matched fragments in place. No-op when nothing matches.
    fn replace(&mut self, replacements: &Replacements);

    /// Whether this value owns nested comparables that need their own replacers.
    fn has_subtypes(&self) -> bool {
        false
    }

    fn replace_subtypes(&mut self, _table: &ReplacerTable) {}

    /// Empty string when semantically equal, a human readable diff otherwise.
    fn compare_to(&self, other: &dyn Comparable) -> Result<String, CompareError>;

    /// File name suffix for the stored body, without the dot. Empty for none.
    fn extension(&self) -> &'static str {
        ""
    }

    fn as_any(&self) -> &dyn Any;
}

/// Apply the table to a value: its own kind first, then nested values.
pub fn apply_replacers(value: &mut dyn Comparable, table: &ReplacerTable) {
    if let Some(replacements) = table.get(&value.kind()) {
        value.replace(replacements);
    }
    if value.has_subtypes() {
        value.replace_subtypes(table);
    }
}
