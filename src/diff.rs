//! Collection differ.
//!
//! [`compare`] turns two snapshots of an ordered collection into an edit
//! script of additions, deletions and moves. The script is minimal in the
//! number of insert/delete operations (longest common subsequence), and is
//! ordered by ascending position with a deletion reported before an addition
//! when both are reached at the same step.
//!
//! A deleted item that reappears elsewhere is reported as a single
//! [`ChangeStatus::Moved`] record carrying both positions. Pairing stops after
//! `10 × len(shorter snapshot)` consecutive failed comparisons, so very large
//! reorders degrade to plain additions and deletions instead of quadratic
//! work.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;

use crate::value::Value;

/// Kind of edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Present in the new snapshot only.
    Added,
    /// Present in the old snapshot only.
    Deleted,
    /// Present in both, at a different position.
    Moved,
}

impl ChangeStatus {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        }
    }
}

/// One record of an edit script.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChange {
    /// Kind of edit.
    pub status: ChangeStatus,
    /// The item concerned.
    pub value: Value,
    /// Position in the new snapshot (added, moved) or the old one (deleted).
    pub index: usize,
    /// Old position of a moved item.
    pub from: Option<usize>,
}

impl ArrayChange {
    /// An `Added` record.
    #[must_use]
    pub fn added(value: Value, index: usize) -> Self {
        Self {
            status: ChangeStatus::Added,
            value,
            index,
            from: None,
        }
    }

    /// A `Deleted` record.
    #[must_use]
    pub fn deleted(value: Value, index: usize) -> Self {
        Self {
            status: ChangeStatus::Deleted,
            value,
            index,
            from: None,
        }
    }

    /// A `Moved` record from position `from` to `index`.
    #[must_use]
    pub fn moved(value: Value, from: usize, index: usize) -> Self {
        Self {
            status: ChangeStatus::Moved,
            value,
            index,
            from: Some(from),
        }
    }

    /// `{"status", "value", "index"}` plus `"from"` for moves.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = json!({
            "status": self.status.as_str(),
            "value": self.value.to_json(),
            "index": self.index,
        });
        if let (Some(from), Some(map)) = (self.from, json.as_object_mut()) {
            map.insert("from".to_string(), json!(from));
        }
        json
    }
}

impl Serialize for ArrayChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Edit script turning `prev` into `next`. Empty when nothing changed.
#[must_use]
pub fn compare(prev: &[Value], next: &[Value]) -> Vec<ArrayChange> {
    if prev.len() <= next.len() {
        compare_small_to_big(prev, next, ChangeStatus::Added, ChangeStatus::Deleted)
    } else {
        compare_small_to_big(next, prev, ChangeStatus::Deleted, ChangeStatus::Added)
    }
}

struct Edit {
    status: ChangeStatus,
    value: Value,
    index: usize,
    paired: Option<usize>,
}

fn compare_small_to_big(
    small: &[Value],
    big: &[Value],
    not_in_small: ChangeStatus,
    not_in_big: ChangeStatus,
) -> Vec<ArrayChange> {
    let rows = small.len() + 1;
    let cols = big.len() + 1;

    // distance[i][j]: insert/delete edits between small[..i] and big[..j]
    let mut distance = vec![vec![0usize; cols]; rows];
    for (i, row) in distance.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in distance[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..rows {
        for j in 1..cols {
            distance[i][j] = if small[i - 1] == big[j - 1] {
                distance[i - 1][j - 1]
            } else {
                distance[i - 1][j].min(distance[i][j - 1]) + 1
            };
        }
    }

    let mut edits: Vec<Edit> = Vec::new();
    let (mut i, mut j) = (small.len(), big.len());
    while i > 0 || j > 0 {
        let here = distance[i][j];
        if j > 0 && distance[i][j - 1] + 1 == here {
            j -= 1;
            edits.push(Edit {
                status: not_in_small,
                value: big[j].clone(),
                index: j,
                paired: None,
            });
        } else if i > 0 && distance[i - 1][j] + 1 == here {
            i -= 1;
            edits.push(Edit {
                status: not_in_big,
                value: small[i].clone(),
                index: i,
                paired: None,
            });
        } else {
            i = i.saturating_sub(1);
            j = j.saturating_sub(1);
        }
    }
    edits.reverse();

    pair_moves(&mut edits, not_in_big, not_in_small, small.len() * 10);

    edits
        .into_iter()
        .filter_map(|edit| match (edit.status, edit.paired) {
            (ChangeStatus::Deleted, Some(_)) => None,
            (ChangeStatus::Added, Some(from)) => {
                Some(ArrayChange::moved(edit.value, from, edit.index))
            }
            (status, _) => Some(ArrayChange {
                status,
                value: edit.value,
                index: edit.index,
                from: None,
            }),
        })
        .collect()
}

/// Pair records of `left` status with equal-valued records of `right` status.
///
/// `limit == 0` means unbounded.
fn pair_moves(edits: &mut [Edit], left: ChangeStatus, right: ChangeStatus, limit: usize) {
    // Scan order matches the backtrack order: descending position.
    let positions = |status: ChangeStatus| -> Vec<usize> {
        (0..edits.len()).rev().filter(|&k| edits[k].status == status).collect()
    };
    let lefts = positions(left);
    let mut rights = positions(right);
    if lefts.is_empty() || rights.is_empty() {
        return;
    }

    let mut failed = 0;
    for l in lefts {
        if limit != 0 && failed >= limit {
            break;
        }
        match rights.iter().position(|&r| edits[r].value == edits[l].value) {
            Some(pos) => {
                let r = rights.remove(pos);
                let (l_index, r_index) = (edits[l].index, edits[r].index);
                edits[l].paired = Some(r_index);
                edits[r].paired = Some(l_index);
                failed = 0;
            }
            None => failed += rights.len(),
        }
    }
}

/// Replay `changes` on `prev`, producing the snapshot they were computed against.
#[must_use]
pub fn apply(prev: &[Value], changes: &[ArrayChange]) -> Vec<Value> {
    let mut removed: Vec<usize> = changes
        .iter()
        .filter_map(|c| match c.status {
            ChangeStatus::Deleted => Some(c.index),
            ChangeStatus::Moved => c.from,
            ChangeStatus::Added => None,
        })
        .collect();
    removed.sort_unstable();

    let mut out: Vec<Value> = prev
        .iter()
        .enumerate()
        .filter(|(i, _)| removed.binary_search(i).is_err())
        .map(|(_, v)| v.clone())
        .collect();

    let mut inserted: Vec<&ArrayChange> = changes
        .iter()
        .filter(|c| c.status != ChangeStatus::Deleted)
        .collect();
    inserted.sort_by_key(|c| c.index);
    for change in inserted {
        let at = change.index.min(out.len());
        out.insert(at, change.value.clone());
    }
    out
}
