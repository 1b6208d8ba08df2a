//! Model tree reconciliation.
//!
//! Inbound messages carry a destination that doubles as a path into the
//! client's model tree; the method header plus the body's shape decide how
//! the tree is brought in step. Every mutation is a structural, in-place
//! container edit (sequence splice/insert, mapping key set/delete) through
//! a path-addressed accessor — the tree is shared state observed by the
//! caller through snapshots, so a local rebinding of the resolved node is
//! never enough.
//!
//! Paths resolve from the root on every message; no node references are
//! cached across messages. Nothing in here returns an error: inbound
//! messages are unreliable by nature of the transport, so every
//! unresolvable address or shape mismatch degrades to a logged drop.

use serde_json::Value;
use tracing::{debug, trace};

use restomp_api::Method;

// ── Outcome ──────────────────────────────────────────────────────────

/// Whether a message changed the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    Mutated,
    Unchanged,
}

// ── Node classification ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Missing,
    Sequence,
    Mapping,
    Scalar,
}

fn kind(value: Option<&Value>) -> Kind {
    match value {
        None => Kind::Missing,
        Some(Value::Array(_)) => Kind::Sequence,
        Some(Value::Object(_)) => Kind::Mapping,
        Some(_) => Kind::Scalar,
    }
}

// ── Path resolution ──────────────────────────────────────────────────

fn split_destination(destination: &str) -> Vec<&str> {
    destination
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Walk the tree from the root. Purely-numeric segments index sequences;
/// mappings always key by string. A missing intermediate yields `None`,
/// never an error.
fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(*segment),
        _ => None,
    })
}

fn lookup_mut<'a>(root: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| match node {
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i)),
            Value::Object(map) => map.get_mut(*segment),
            _ => None,
        })
}

// ── Reconciliation entry point ───────────────────────────────────────

/// Apply one inbound message to the model tree.
pub(crate) fn apply(
    model: &mut Value,
    destination: &str,
    method: Option<Method>,
    body: Option<Value>,
) -> SyncOutcome {
    let segments = split_destination(destination);
    let Some((&last, parent_path)) = segments.split_last() else {
        debug!(destination, "dropping message addressed at the tree root");
        return SyncOutcome::Unchanged;
    };

    let node_kind = kind(lookup(model, &segments));
    let parent_kind = kind(lookup(model, parent_path));

    if node_kind == Kind::Missing {
        return apply_missing(model, destination, parent_path, parent_kind, method, body);
    }

    match method {
        // A delete carrying a body is treated as delete-with-no-payload:
        // the body is discarded before processing.
        Some(Method::Delete) => {
            if node_kind == Kind::Mapping {
                remove_from_parent(model, parent_path, last)
            } else {
                debug!(destination, ?node_kind, "dropping delete for non-mapping node");
                SyncOutcome::Unchanged
            }
        }

        // Create and update against an existing node re-dispatch as a
        // method-less message carrying the same body.
        Some(Method::Create | Method::Update) if body.is_some() => {
            trace!(destination, "re-dispatching as method-less merge");
            apply(model, destination, None, body)
        }

        Some(Method::Replace) => replace_in_place(model, destination, &segments, node_kind, body),

        Some(Method::Create | Method::Update | Method::Read) => {
            debug!(destination, ?method, "dropping message with no applicable action");
            SyncOutcome::Unchanged
        }

        None => apply_method_less(model, destination, &segments, node_kind, body),
    }
}

/// Node not found: the only addressable case is appending to a sequence
/// parent on create/replace.
fn apply_missing(
    model: &mut Value,
    destination: &str,
    parent_path: &[&str],
    parent_kind: Kind,
    method: Option<Method>,
    body: Option<Value>,
) -> SyncOutcome {
    match (parent_kind, method, body) {
        (Kind::Sequence, Some(Method::Create | Method::Replace), Some(body)) => {
            if let Some(items) = lookup_mut(model, parent_path).and_then(Value::as_array_mut) {
                items.push(body);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        _ => {
            debug!(destination, ?parent_kind, "dropping message with no addressable location");
            SyncOutcome::Unchanged
        }
    }
}

/// Replace the contents of the resolved node in place, when node and body
/// are containers of the same shape.
fn replace_in_place(
    model: &mut Value,
    destination: &str,
    segments: &[&str],
    node_kind: Kind,
    body: Option<Value>,
) -> SyncOutcome {
    match (node_kind, body) {
        (Kind::Sequence, Some(Value::Array(incoming))) => {
            if let Some(items) = lookup_mut(model, segments).and_then(Value::as_array_mut) {
                items.clear();
                items.extend(incoming);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        (Kind::Mapping, Some(Value::Object(incoming))) => {
            if let Some(map) = lookup_mut(model, segments).and_then(Value::as_object_mut) {
                map.clear();
                map.extend(incoming);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        (_, body) => {
            debug!(
                destination,
                ?node_kind,
                body_kind = ?kind(body.as_ref()),
                "dropping replace with mismatched shapes"
            );
            SyncOutcome::Unchanged
        }
    }
}

/// Method-less messages patch the resolved node according to shape.
fn apply_method_less(
    model: &mut Value,
    destination: &str,
    segments: &[&str],
    node_kind: Kind,
    body: Option<Value>,
) -> SyncOutcome {
    match (node_kind, body) {
        (Kind::Sequence, Some(Value::Array(incoming))) => {
            if let Some(items) = lookup_mut(model, segments).and_then(Value::as_array_mut) {
                reconcile_sequence(items, incoming);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        (Kind::Sequence, Some(body @ Value::Object(_))) => {
            if let Some(items) = lookup_mut(model, segments).and_then(Value::as_array_mut) {
                items.push(body);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        (Kind::Mapping, Some(Value::Object(incoming))) => {
            if let Some(map) = lookup_mut(model, segments).and_then(Value::as_object_mut) {
                map.extend(incoming);
                return SyncOutcome::Mutated;
            }
            SyncOutcome::Unchanged
        }
        (_, body) => {
            debug!(
                destination,
                ?node_kind,
                body_kind = ?kind(body.as_ref()),
                "dropping method-less message with no applicable action"
            );
            SyncOutcome::Unchanged
        }
    }
}

/// Delete the entry named by the last path segment from its parent.
fn remove_from_parent(model: &mut Value, parent_path: &[&str], last: &str) -> SyncOutcome {
    match lookup_mut(model, parent_path) {
        Some(Value::Array(items)) => {
            let Some(index) = last.parse::<usize>().ok().filter(|i| *i < items.len()) else {
                return SyncOutcome::Unchanged;
            };
            items.remove(index);
            SyncOutcome::Mutated
        }
        Some(Value::Object(map)) => {
            if map.remove(last).is_some() {
                SyncOutcome::Mutated
            } else {
                SyncOutcome::Unchanged
            }
        }
        _ => SyncOutcome::Unchanged,
    }
}

// ── Collection reconciliation ────────────────────────────────────────

/// Reconcile a local sequence against an incoming one: a patch, not a
/// blind replace.
///
/// When every incoming element is a mapping carrying an `"id"` field the
/// match is by identity: merge matching ids field by field, append
/// unmatched incoming elements, remove local elements whose id is absent
/// from the incoming set. Otherwise the match is positional. Both
/// strategies are idempotent.
fn reconcile_sequence(current: &mut Vec<Value>, incoming: Vec<Value>) {
    let by_identity =
        !incoming.is_empty() && incoming.iter().all(|e| e.get("id").is_some());

    if by_identity {
        current.retain(|local| {
            local
                .get("id")
                .is_some_and(|id| incoming.iter().any(|e| e.get("id") == Some(id)))
        });
        for element in incoming {
            let id = element.get("id").cloned();
            match current
                .iter_mut()
                .find(|local| local.get("id") == id.as_ref())
            {
                Some(local) => merge_into(local, element),
                None => current.push(element),
            }
        }
    } else {
        let target_len = incoming.len();
        for (index, element) in incoming.into_iter().enumerate() {
            match current.get_mut(index) {
                Some(local) => merge_into(local, element),
                None => current.push(element),
            }
        }
        current.truncate(target_len);
    }
}

/// Merge `incoming` into `target`: field-by-field when both are mappings,
/// full overwrite otherwise.
fn merge_into(target: &mut Value, incoming: Value) {
    match (target.as_object_mut(), incoming) {
        (Some(map), Value::Object(fields)) => map.extend(fields),
        (_, incoming) => *target = incoming,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
