//! Human-readable change locations.
//!
//! Steps come from the `tagFields` names. A reactive parent renders as
//! `name()`, an item of a collection as `name[index]`, an untagged node as
//! `?`. The changed child renders with its current value, the collection
//! edit if there is one, and its most recent old value:
//!
//! ```text
//! sub().c(3) [1]
//! arr(["a","b","c"]) {{"status":"added","value":"c","index":2}}
//! arr()[1].p("b2") ["b"]
//! ```

use std::fmt::Write;

use crate::chain::ParentChain;
use crate::value::Value;
use crate::watch::CollectionChange;

/// Render the location of a change of `child` below `parents`.
#[must_use]
pub fn describe(parents: &ParentChain, child: &Value, change: Option<&CollectionChange>) -> String {
    let chain = parents.to_vec();
    let mut steps: Vec<String> = Vec::with_capacity(chain.len() + 1);

    for (i, parent) in chain.iter().enumerate() {
        if let Some(name) = parent.field_name() {
            steps.push(if parent.is_reactive() { format!("{name}()") } else { name });
        } else if i > 0 && is_sequence(&chain[i - 1]) {
            let base = steps.pop().unwrap_or_default();
            match position(&chain[i - 1], parent) {
                Some(pos) => steps.push(format!("{base}[{pos}]")),
                None => steps.push(format!("{base}[?]")),
            }
        } else {
            steps.push("?".to_string());
        }
    }

    let mut last = child.field_name().unwrap_or_else(|| "?".to_string());
    // Writing to a String cannot fail.
    if child.is_reactive() {
        let _ = write!(last, "({})", child.to_json());
    } else {
        let _ = write!(last, " = {}", child.to_json());
    }
    if let Some(change) = change {
        let _ = write!(last, " {{{}}}", change.to_json());
    }
    steps.push(last);

    let mut out = steps.join(".");
    if let Some(old) = child.old_values().first() {
        let _ = write!(out, " [{}]", old.to_json());
    }
    out
}

fn is_sequence(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::List(_))
}

fn position(sequence: &Value, item: &Value) -> Option<usize> {
    match sequence {
        Value::Array(array) => array.index_of(item),
        Value::List(list) => list.items().iter().position(|v| v == item),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ArrayChange;
    use crate::reactive::{ArrayCell, Cell};
    use crate::value::Object;

    fn tagged(value: impl Into<Value>, name: &str) -> Value {
        let value = value.into();
        value.with_meta_mut(|m| m.field_name = Some(name.to_string()));
        value
    }

    #[test]
    fn test_root_field() {
        let a = tagged(Cell::new(2), "a");
        a.with_meta_mut(|m| m.record_old_value(Value::Int(1), 1));
        assert_eq!(describe(&ParentChain::new(), &a, None), "a(2) [1]");
    }

    #[test]
    fn test_untagged_steps() {
        let parent = Value::from(Object::new());
        let child = Value::from(Cell::new("x"));
        let parents = ParentChain::new().push(parent);
        assert_eq!(describe(&parents, &child, None), r#"?.?("x")"#);
    }

    #[test]
    fn test_plain_child_renders_as_assignment() {
        let child = tagged(Object::new().with("k", 1), "o");
        assert_eq!(describe(&ParentChain::new(), &child, None), r#"o = {"k":1}"#);
    }

    #[test]
    fn test_collection_item_step() {
        let first = Value::from(Object::new());
        let second = Value::from(Object::new());
        let arr = tagged(ArrayCell::new(vec![first, second.clone()]), "arr");
        let p = tagged(Cell::new("b2"), "p");
        p.with_meta_mut(|m| m.record_old_value(Value::from("b"), 1));

        let parents = ParentChain::new().push(arr).push(second);
        assert_eq!(describe(&parents, &p, None), r#"arr()[1].p("b2") ["b"]"#);
    }

    #[test]
    fn test_change_suffix() {
        let arr = tagged(ArrayCell::new(vec!["a".into(), "b".into(), "c".into()]), "arr");
        let item = CollectionChange::Item(ArrayChange::added(Value::from("c"), 2));
        assert_eq!(
            describe(&ParentChain::new(), &arr, Some(&item)),
            r#"arr(["a","b","c"]) {{"status":"added","value":"c","index":2}}"#
        );

        let batch = CollectionChange::Batch(vec![ArrayChange::added(Value::from("c"), 2)]);
        assert_eq!(
            describe(&ParentChain::new(), &arr, Some(&batch)),
            r#"arr(["a","b","c"]) {[{"status":"added","value":"c","index":2}]}"#
        );
    }
}
