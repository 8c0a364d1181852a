//! Policy evaluator: decides per visited node whether traversal descends.
//!
//! Checks run in a fixed order: depth budget, cycle, hidden node. Teardown
//! stops there so it can reach everything a watch could have subscribed.
//! Otherwise `watchedOnly` requires the watchable marker on every node but
//! the root, judged before an explicit `enabled` option is stamped. Watch
//! mode then consults the stamped flags (disabled, sealed).

use std::fmt;

use tracing::trace;

use crate::chain::Frame;
use crate::engine::Mode;
use crate::options::WatchOptions;
use crate::value::Value;

/// Why a node was not descended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    Depth,
    Cycle,
    HiddenNode,
    NotWatched,
    Disabled,
    Sealed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Depth => "depth budget exhausted",
            Self::Cycle => "already on path",
            Self::HiddenNode => "hidden",
            Self::NotWatched => "not marked watchable",
            Self::Disabled => "disabled",
            Self::Sealed => "sealed",
        };
        f.write_str(s)
    }
}

/// Outcome of [`should_descend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Attach to the node and descend.
    Descend,
    /// A previously disabled node was re-enabled: descend, attaching only if
    /// nothing in the context observes the node yet.
    Wake,
    /// Leave the node and its subtree alone.
    Skip(SkipReason),
}

pub(crate) fn should_descend(
    node: &Value,
    frame: &Frame,
    mode: &Mode,
    options: &WatchOptions,
) -> Decision {
    let decision = evaluate(node, frame, mode, options);
    if let Decision::Skip(reason) = decision {
        trace!(
            node = ?node.node_id(),
            kind = node.type_name(),
            level = frame.level,
            %reason,
            "skipping node"
        );
    }
    decision
}

fn evaluate(node: &Value, frame: &Frame, mode: &Mode, options: &WatchOptions) -> Decision {
    if !options.depth.allows(frame.level) {
        return Decision::Skip(SkipReason::Depth);
    }
    if node.node_id().is_some_and(|id| frame.path.contains(id)) {
        return Decision::Skip(SkipReason::Cycle);
    }
    if options.hides_node(node) {
        return Decision::Skip(SkipReason::HiddenNode);
    }
    if matches!(mode, Mode::Unwatch(_)) {
        return Decision::Descend;
    }

    let previous = node.watchable();
    if options.watched_only && !frame.is_root() && previous != Some(true) {
        return Decision::Skip(SkipReason::NotWatched);
    }
    if let Some(enabled) = options.enabled {
        node.with_meta_mut(|meta| meta.watchable = Some(enabled));
    }
    if matches!(mode, Mode::Stamp) {
        return Decision::Descend;
    }

    if node.watchable() == Some(false) {
        return Decision::Skip(SkipReason::Disabled);
    }
    if options.enabled == Some(true) && previous == Some(false) {
        return Decision::Wake;
    }
    if node.is_sealed() {
        return Decision::Skip(SkipReason::Sealed);
    }
    Decision::Descend
}

/// Claim `node` for the sealing watch; later watch calls skip it.
pub(crate) fn seal(node: &Value) {
    node.with_meta_mut(|meta| meta.sealed = true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;
    use crate::registry::Scope;
    use crate::value::Object;

    fn nested_frame(levels: usize) -> Frame {
        let mut frame = Frame::root();
        for _ in 0..levels {
            frame = frame.child(&Value::from(Object::new()));
        }
        frame
    }

    #[test]
    fn test_depth_budget() {
        let node = Value::from(Cell::new(1));
        let opts = WatchOptions::default();
        assert_eq!(should_descend(&node, &nested_frame(1), &Mode::Watch, &opts), Decision::Descend);
        assert_eq!(
            should_descend(&node, &nested_frame(2), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::Depth)
        );

        let opts = WatchOptions::builder().depth(-1).build().unwrap();
        assert_eq!(should_descend(&node, &nested_frame(5), &Mode::Watch, &opts), Decision::Descend);
    }

    #[test]
    fn test_cycle_is_skipped() {
        let obj = Value::from(Object::new());
        let frame = Frame::root().child(&obj);
        let opts = WatchOptions::default();
        assert_eq!(
            should_descend(&obj, &frame, &Mode::Watch, &opts),
            Decision::Skip(SkipReason::Cycle)
        );
    }

    #[test]
    fn test_hidden_node() {
        let cell = Cell::new(1);
        let opts = WatchOptions::builder().hide_node(cell.clone()).build().unwrap();
        assert_eq!(
            should_descend(&Value::from(cell), &nested_frame(1), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::HiddenNode)
        );
    }

    #[test]
    fn test_enabled_is_stamped_and_disables() {
        let node = Value::from(Cell::new(1));
        let off = WatchOptions::builder().enabled(false).build().unwrap();
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Watch, &off),
            Decision::Skip(SkipReason::Disabled)
        );
        assert_eq!(node.watchable(), Some(false));

        let plain = WatchOptions::default();
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Watch, &plain),
            Decision::Skip(SkipReason::Disabled)
        );

        let on = WatchOptions::builder().enabled(true).build().unwrap();
        assert_eq!(should_descend(&node, &nested_frame(1), &Mode::Watch, &on), Decision::Wake);
        assert_eq!(node.watchable(), Some(true));
        assert_eq!(should_descend(&node, &nested_frame(1), &Mode::Watch, &on), Decision::Descend);
    }

    #[test]
    fn test_stamp_mode_ignores_gating() {
        let node = Value::from(Cell::new(1));
        node.with_meta_mut(|m| m.watchable = Some(false));
        let on = WatchOptions::builder().enabled(true).build().unwrap();
        assert_eq!(should_descend(&node, &nested_frame(1), &Mode::Stamp, &on), Decision::Descend);
        assert_eq!(node.watchable(), Some(true));
    }

    #[test]
    fn test_watched_only_gates_every_node_but_root() {
        let node = Value::from(Cell::new(1));
        let opts = WatchOptions::builder().watched_only(true).build().unwrap();
        assert_eq!(should_descend(&node, &Frame::root(), &Mode::Watch, &opts), Decision::Descend);
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::NotWatched)
        );
        let obj = Value::from(Object::new());
        assert_eq!(
            should_descend(&obj, &nested_frame(1), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::NotWatched)
        );

        node.with_meta_mut(|m| m.watchable = Some(true));
        assert_eq!(should_descend(&node, &nested_frame(1), &Mode::Watch, &opts), Decision::Descend);
    }

    #[test]
    fn test_watched_only_checks_marker_before_stamping() {
        let node = Value::from(Cell::new(1));
        let opts = WatchOptions::builder().watched_only(true).enabled(true).build().unwrap();
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::NotWatched)
        );
        assert_eq!(node.watchable(), None);
    }

    #[test]
    fn test_sealed_nodes() {
        let node = Value::from(Cell::new(1));
        seal(&node);
        let opts = WatchOptions::default();
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Watch, &opts),
            Decision::Skip(SkipReason::Sealed)
        );
        assert_eq!(
            should_descend(&node, &nested_frame(1), &Mode::Unwatch(Scope::Context), &opts),
            Decision::Descend
        );
    }
}
