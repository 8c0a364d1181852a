//! Watch configuration.
//!
//! [`WatchOptions`] is a plain option map. It can be deserialized from JSON
//! (camelCase keys, unknown keys rejected) or assembled with
//! [`WatchOptionsBuilder`], which is also the only way to attach hooks and
//! node-valued hide entries.
//!
//! ```
//! use kyrowatch::WatchOptions;
//!
//! let json = r#"{"depth": -1, "mutable": true, "oldValues": 1}"#;
//! let opts = WatchOptions::from_json(json).unwrap();
//! assert!(opts.mutable);
//! assert!(opts.depth.is_unbounded());
//! ```

use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

use crate::chain::ParentChain;
use crate::error::ConfigError;
use crate::value::Value;

/// Veto hook consulted before subscribing to a node: `(parents, child) -> keep`.
pub type BeforeWatch = Rc<dyn Fn(&ParentChain, &Value) -> bool>;

/// Veto hook consulted before wrapping a field: `(parents, field, value) -> wrap`.
pub type BeforeWrap = Rc<dyn Fn(&ParentChain, &str, &Value) -> bool>;

/// Traversal depth budget below the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum Depth {
    /// No limit (`-1`).
    Unbounded,
    /// At most this many levels below the root.
    Levels(usize),
}

impl Depth {
    /// Whether a node at `level` (root = 0) is within budget.
    #[must_use]
    pub const fn allows(self, level: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Levels(max) => level <= max,
        }
    }

    /// True for `-1`, no depth limit.
    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self::Levels(1)
    }
}

impl TryFrom<i64> for Depth {
    type Error = ConfigError;

    fn try_from(depth: i64) -> Result<Self, Self::Error> {
        match depth {
            -1 => Ok(Self::Unbounded),
            d => usize::try_from(d)
                .map(Self::Levels)
                .map_err(|_| ConfigError::InvalidDepth { depth }),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "-1"),
            Self::Levels(n) => write!(f, "{n}"),
        }
    }
}

/// Field-name tagging of visited children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "TagFieldsRepr")]
pub enum TagFields {
    /// No tagging.
    #[default]
    Off,
    /// Tag every node-typed child (`true`).
    All,
    /// Tag only children that are composites (`"parentsOnly"`).
    ParentsOnly,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagFieldsRepr {
    Flag(bool),
    Mode(TagMode),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum TagMode {
    All,
    ParentsOnly,
}

impl From<TagFieldsRepr> for TagFields {
    fn from(repr: TagFieldsRepr) -> Self {
        match repr {
            TagFieldsRepr::Flag(false) => Self::Off,
            TagFieldsRepr::Flag(true) | TagFieldsRepr::Mode(TagMode::All) => Self::All,
            TagFieldsRepr::Mode(TagMode::ParentsOnly) => Self::ParentsOnly,
        }
    }
}

/// How a collection change reaches the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionChanges {
    /// One callback per edit-script record.
    #[default]
    Split,
    /// One callback with the whole edit script.
    Batch,
}

/// Options of one watch call.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct WatchOptions {
    /// Levels below the root to traverse (default 1).
    pub depth: Depth,
    /// Field names skipped together with their subtree.
    #[serde(alias = "exclude")]
    pub hide: Vec<String>,
    /// Nodes skipped together with their subtree.
    #[serde(skip)]
    pub hide_nodes: Vec<Value>,
    /// Do not descend into ordered collections.
    pub hide_arrays: bool,
    /// Do not descend into a primitive's own value.
    pub hide_wrapped_values: bool,
    /// Relink subscriptions when a watched primitive's value is replaced.
    pub mutable: bool,
    /// Only subscribe to primitives explicitly marked watchable.
    pub watched_only: bool,
    /// Turn plain scalar and list fields into cells on discovery.
    pub wrap: bool,
    /// Tag children with the field name that reached them.
    pub tag_fields: TagFields,
    /// Prior values retained per watched primitive.
    pub old_values: usize,
    /// Claim watched nodes so later watch calls skip them.
    pub seal: bool,
    /// Explicit watchable override stamped on visited nodes.
    pub enabled: Option<bool>,
    /// Per-record or batched collection callbacks.
    pub collection_changes: CollectionChanges,
    /// Defer collection item watch/unwatch to the next scheduler turn.
    #[serde(rename = "async")]
    pub defer: bool,
    /// Veto hook before subscribing.
    #[serde(skip)]
    pub before_watch: Option<BeforeWatch>,
    /// Veto hook before wrapping.
    #[serde(skip)]
    pub before_wrap: Option<BeforeWrap>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            depth: Depth::default(),
            hide: Vec::new(),
            hide_nodes: Vec::new(),
            hide_arrays: false,
            hide_wrapped_values: false,
            mutable: false,
            watched_only: false,
            wrap: false,
            tag_fields: TagFields::Off,
            old_values: 0,
            seal: false,
            enabled: None,
            collection_changes: CollectionChanges::Split,
            defer: true,
            before_watch: None,
            before_wrap: None,
        }
    }
}

impl WatchOptions {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> WatchOptionsBuilder {
        WatchOptionsBuilder::new()
    }

    /// Parse and validate a JSON option map.
    ///
    /// # Errors
    ///
    /// `InvalidDepth` for a depth below −1, `UnknownOption` for unknown keys
    /// or ill-typed values, `ConflictingOptions` from [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        if let Some(depth) = raw.get("depth").and_then(serde_json::Value::as_i64) {
            Depth::try_from(depth)?;
        }
        let options: Self = serde_json::from_value(raw)?;
        options.validate()?;
        Ok(options)
    }

    /// Setup-time consistency checks.
    ///
    /// # Errors
    ///
    /// `ConflictingOptions` when `seal` is combined with `enabled: true`, or
    /// a `before_wrap` hook is given without `wrap`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seal && self.enabled == Some(true) {
            return Err(ConfigError::ConflictingOptions {
                reason: "seal cannot be combined with enabled: true".to_string(),
            });
        }
        if self.before_wrap.is_some() && !self.wrap {
            return Err(ConfigError::ConflictingOptions {
                reason: "before_wrap requires wrap".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `field` is hidden.
    #[must_use]
    pub fn hides_field(&self, field: &str) -> bool {
        self.hide.iter().any(|h| h == field)
    }

    /// Whether `node` is hidden.
    #[must_use]
    pub fn hides_node(&self, node: &Value) -> bool {
        node.is_node() && self.hide_nodes.iter().any(|h| h == node)
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("depth", &self.depth)
            .field("hide", &self.hide)
            .field("hide_nodes", &self.hide_nodes.len())
            .field("hide_arrays", &self.hide_arrays)
            .field("hide_wrapped_values", &self.hide_wrapped_values)
            .field("mutable", &self.mutable)
            .field("watched_only", &self.watched_only)
            .field("wrap", &self.wrap)
            .field("tag_fields", &self.tag_fields)
            .field("old_values", &self.old_values)
            .field("seal", &self.seal)
            .field("enabled", &self.enabled)
            .field("collection_changes", &self.collection_changes)
            .field("defer", &self.defer)
            .field("before_watch", &self.before_watch.is_some())
            .field("before_wrap", &self.before_wrap.is_some())
            .finish()
    }
}

/// Builder for [`WatchOptions`].
#[derive(Default)]
pub struct WatchOptionsBuilder {
    depth: Option<i64>,
    options: WatchOptions,
}

impl WatchOptionsBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels below the root; `-1` for unbounded (default: 1).
    #[must_use]
    pub fn depth(mut self, depth: i64) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Hide a field name.
    #[must_use]
    pub fn hide(mut self, field: impl Into<String>) -> Self {
        self.options.hide.push(field.into());
        self
    }

    /// Hide a node.
    #[must_use]
    pub fn hide_node(mut self, node: impl Into<Value>) -> Self {
        self.options.hide_nodes.push(node.into());
        self
    }

    /// Skip collection items.
    #[must_use]
    pub fn hide_arrays(mut self, hide: bool) -> Self {
        self.options.hide_arrays = hide;
        self
    }

    /// Do not descend into the value a primitive holds.
    #[must_use]
    pub fn hide_wrapped_values(mut self, hide: bool) -> Self {
        self.options.hide_wrapped_values = hide;
        self
    }

    /// Relink the subtree when a primitive's value is replaced.
    #[must_use]
    pub fn mutable(mut self, mutable: bool) -> Self {
        self.options.mutable = mutable;
        self
    }

    /// Only watch nodes explicitly enabled with `set_enabled`.
    #[must_use]
    pub fn watched_only(mut self, watched_only: bool) -> Self {
        self.options.watched_only = watched_only;
        self
    }

    /// Wrap plain scalar and list fields into primitives.
    #[must_use]
    pub fn wrap(mut self, wrap: bool) -> Self {
        self.options.wrap = wrap;
        self
    }

    /// Which fields get their name recorded.
    #[must_use]
    pub fn tag_fields(mut self, tag: TagFields) -> Self {
        self.options.tag_fields = tag;
        self
    }

    /// Retain the last `n` prior values per watched primitive.
    #[must_use]
    pub fn old_values(mut self, n: usize) -> Self {
        self.options.old_values = n;
        self
    }

    /// Keep later watches off the nodes this one visits.
    #[must_use]
    pub fn seal(mut self, seal: bool) -> Self {
        self.options.seal = seal;
        self
    }

    /// Stamp an explicit watchable flag on visited nodes.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = Some(enabled);
        self
    }

    /// Split or batch delivery of collection records.
    #[must_use]
    pub fn collection_changes(mut self, mode: CollectionChanges) -> Self {
        self.options.collection_changes = mode;
        self
    }

    /// Defer collection item watch/unwatch (default: true).
    #[must_use]
    pub fn defer(mut self, defer: bool) -> Self {
        self.options.defer = defer;
        self
    }

    /// Veto hook run before each subscription.
    #[must_use]
    pub fn before_watch(mut self, hook: impl Fn(&ParentChain, &Value) -> bool + 'static) -> Self {
        self.options.before_watch = Some(Rc::new(hook));
        self
    }

    /// Veto hook run before each field is wrapped.
    #[must_use]
    pub fn before_wrap(
        mut self,
        hook: impl Fn(&ParentChain, &str, &Value) -> bool + 'static,
    ) -> Self {
        self.options.before_wrap = Some(Rc::new(hook));
        self
    }

    /// Build and validate.
    ///
    /// # Errors
    ///
    /// `InvalidDepth` for a depth below −1, or any [`WatchOptions::validate`] error.
    pub fn build(self) -> Result<WatchOptions, ConfigError> {
        let mut options = self.options;
        if let Some(depth) = self.depth {
            options.depth = Depth::try_from(depth)?;
        }
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;

    #[test]
    fn test_defaults() {
        let opts = WatchOptions::default();
        assert_eq!(opts.depth, Depth::Levels(1));
        assert_eq!(opts.collection_changes, CollectionChanges::Split);
        assert!(opts.defer);
        assert_eq!(opts.enabled, None);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_depth_conversion() {
        assert_eq!(Depth::try_from(-1).unwrap(), Depth::Unbounded);
        assert_eq!(Depth::try_from(0).unwrap(), Depth::Levels(0));
        assert!(matches!(
            Depth::try_from(-2),
            Err(ConfigError::InvalidDepth { depth: -2 })
        ));
        assert!(Depth::Levels(1).allows(1));
        assert!(!Depth::Levels(1).allows(2));
        assert!(Depth::Unbounded.allows(usize::MAX));
    }

    #[test]
    fn test_from_json_full_map() {
        let opts = WatchOptions::from_json(
            r#"{
                "depth": 3,
                "exclude": ["secret"],
                "hideArrays": true,
                "hideWrappedValues": true,
                "mutable": true,
                "watchedOnly": true,
                "wrap": true,
                "tagFields": "parentsOnly",
                "oldValues": 2,
                "enabled": false,
                "collectionChanges": "batch",
                "async": false
            }"#,
        )
        .unwrap();

        assert_eq!(opts.depth, Depth::Levels(3));
        assert!(opts.hides_field("secret"));
        assert!(opts.hide_arrays && opts.hide_wrapped_values && opts.mutable);
        assert!(opts.watched_only && opts.wrap);
        assert_eq!(opts.tag_fields, TagFields::ParentsOnly);
        assert_eq!(opts.old_values, 2);
        assert_eq!(opts.enabled, Some(false));
        assert_eq!(opts.collection_changes, CollectionChanges::Batch);
        assert!(!opts.defer);
    }

    #[test]
    fn test_tag_fields_accepts_bool() {
        let opts = WatchOptions::from_json(r#"{"tagFields": true}"#).unwrap();
        assert_eq!(opts.tag_fields, TagFields::All);
        let opts = WatchOptions::from_json(r#"{"tagFields": false}"#).unwrap();
        assert_eq!(opts.tag_fields, TagFields::Off);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            WatchOptions::from_json(r#"{"depth": -5}"#),
            Err(ConfigError::InvalidDepth { depth: -5 })
        ));
        assert!(matches!(
            WatchOptions::from_json(r#"{"colour": "red"}"#),
            Err(ConfigError::UnknownOption { .. })
        ));
        assert!(matches!(
            WatchOptions::from_json(r#"{"seal": true, "enabled": true}"#),
            Err(ConfigError::ConflictingOptions { .. })
        ));
    }

    #[test]
    fn test_builder() {
        let hidden = Cell::new(1);
        let opts = WatchOptions::builder()
            .depth(-1)
            .hide("x")
            .hide_node(hidden.clone())
            .old_values(1)
            .before_watch(|_, _| true)
            .build()
            .unwrap();

        assert!(opts.depth.is_unbounded());
        assert!(opts.hides_field("x"));
        assert!(opts.hides_node(&Value::from(hidden)));
        assert!(!opts.hides_node(&Value::Int(1)));
        assert!(opts.before_watch.is_some());
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            WatchOptions::builder().depth(-7).build(),
            Err(ConfigError::InvalidDepth { depth: -7 })
        ));
        assert!(matches!(
            WatchOptions::builder().before_wrap(|_, _, _| true).build(),
            Err(ConfigError::ConflictingOptions { .. })
        ));
    }
}
