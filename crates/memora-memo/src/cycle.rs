//! Cycle detection over value graphs.
//!
//! A value is cyclic when some composite node can reach itself through its
//! own contents. Detection is a depth-first walk with grey/black marking:
//! a node is grey while it is on the current path and black once all of its
//! descendants have been explored without finding a cycle.
//!
//! Only a revisit of a *grey* node counts as a cycle. A sub-object shared by
//! two siblings (a DAG) is visited, turns black, and is skipped the second
//! time, so harmless sharing stays on the structural path and the walk is
//! linear in the number of nodes and edges.
//!
//! The visited state lives in one [`has_cycle`] call and is dropped with it.
//! The walk keeps its own stack of frames, so nesting depth is bounded by
//! memory rather than by the thread's call stack.

use std::collections::HashSet;

use memora_core::{ObjectId, Value};

/// Report whether `value` contains a reference cycle.
///
/// Scalars, symbols and functions are acyclic. Arrays, plain objects, maps
/// (keys and values) and sets are traversed.
#[must_use]
pub fn has_cycle(value: &Value) -> bool {
    let Some(root) = Frame::enter(value) else {
        return false;
    };

    let mut on_path: HashSet<ObjectId> = HashSet::from([root.id]);
    let mut finished: HashSet<ObjectId> = HashSet::new();
    let mut stack = vec![root];

    while let Some(frame) = stack.last_mut() {
        let Some(child) = frame.children.next() else {
            let id = frame.id;
            stack.pop();
            on_path.remove(&id);
            finished.insert(id);
            continue;
        };

        let Some(next) = Frame::enter(&child) else {
            continue;
        };
        if on_path.contains(&next.id) {
            return true;
        }
        if finished.contains(&next.id) {
            continue;
        }
        on_path.insert(next.id);
        stack.push(next);
    }

    false
}

/// A composite node on the current path and the children still to visit.
struct Frame {
    id: ObjectId,
    children: std::vec::IntoIter<Value>,
}

impl Frame {
    /// `None` for values that cannot contain anything.
    fn enter(value: &Value) -> Option<Self> {
        // Children are copied out so no lock is held while descending.
        let (id, children): (ObjectId, Vec<Value>) = match value {
            Value::Null
            | Value::Undefined
            | Value::Boolean(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Symbol(_)
            | Value::Function(_) => return None,
            Value::Array(a) => (a.id(), a.items().clone()),
            Value::PlainObject(o) => (o.id(), o.properties().values().cloned().collect()),
            Value::MapValue(m) => (
                m.id(),
                m.entries()
                    .iter()
                    .flat_map(|(k, v)| [k.clone(), v.clone()])
                    .collect(),
            ),
            Value::SetValue(s) => (s.id(), s.members().clone()),
        };
        Some(Self {
            id,
            children: children.into_iter(),
        })
    }
}
