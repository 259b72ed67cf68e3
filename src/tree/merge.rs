//! Tree merge engine
//!
//! Merges one tree into another in place: incoming values overwrite,
//! an explicitly set multiplex flag overwrites, children merge by name
//! (appended when no sibling matches), and tombstone controls remove nodes
//! or values. Merge is total: it never fails on well-formed trees. It is
//! order-sensitive only where values and flags actually conflict.

use super::{Multiplex, NodeId, Tree};

/// A tombstone directive queued on a node during loading and applied at
/// merge time against the node it is merged into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Detach the named child.
    RemoveNode(String),
    /// Delete the named value key.
    RemoveValue(String),
}

impl Tree {
    /// Merge another tree into this one at the root.
    pub fn merge(&mut self, other: Tree) {
        self.merge_from(self.root(), &other, other.root());
    }

    /// Merge the subtree of `src` rooted at `src_id` into `target`.
    ///
    /// Names are not checked at this level; name matching only applies to
    /// children during recursion. Controls carried by the incoming node are
    /// applied against the target's pre-merge state, so a document can
    /// remove a node and redefine it in the same pass. Controls that find
    /// no target are queued and retried after every later merge into the
    /// same node, since the node they name may arrive in a subsequent
    /// document.
    pub fn merge_from(&mut self, target: NodeId, src: &Tree, src_id: NodeId) {
        // Controls queued by earlier documents; retried after this merge.
        let queued = self.take_controls(target);

        let mut pending = Vec::new();
        for control in src.controls(src_id).iter().cloned() {
            if !self.apply_control(target, &control) {
                pending.push(control);
            }
        }

        for entry in src.values(src_id).iter().cloned() {
            self.set_value(target, entry.key, entry.value, entry.origin);
        }

        match src.multiplex(src_id) {
            Multiplex::Unset => {}
            flag => self.set_multiplex(target, flag),
        }

        for &child in src.children(src_id) {
            let name = src.name(child).to_string();
            match self.child_by_name(target, &name) {
                Some(existing) => self.merge_from(existing, src, child),
                None => {
                    let copy = self.graft(src, child);
                    self.attach(target, copy);
                }
            }
        }

        // Earlier passes first, then this pass's leftovers. A control from
        // an earlier document may now match a child this merge introduced;
        // this pass's own unresolved controls must not fire against the
        // children it just added.
        let mut still_pending = Vec::new();
        for control in queued {
            if !self.apply_control(target, &control) {
                still_pending.push(control);
            }
        }
        still_pending.extend(pending);
        self.extend_controls(target, still_pending);
    }

    /// Deep-copy a subtree of `src` into this arena as an orphan.
    fn graft(&mut self, src: &Tree, src_id: NodeId) -> NodeId {
        let copy = self.alloc(src.name(src_id).to_string());
        for entry in src.values(src_id).iter().cloned() {
            self.set_value(copy, entry.key, entry.value, entry.origin);
        }
        self.set_multiplex(copy, src.multiplex(src_id));
        self.extend_controls(copy, src.controls(src_id).to_vec());
        for &child in src.children(src_id) {
            let child_copy = self.graft(src, child);
            self.attach(copy, child_copy);
        }
        copy
    }

    /// Apply a control against `target`. Returns whether it found its
    /// target.
    fn apply_control(&mut self, target: NodeId, control: &Control) -> bool {
        match control {
            Control::RemoveNode(name) => match self.child_by_name(target, name) {
                Some(child) => {
                    self.detach(child);
                    true
                }
                None => false,
            },
            Control::RemoveValue(key) => self.remove_value(target, key),
        }
    }
}
