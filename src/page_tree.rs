//! The page tree.
//!
//! Internal nodes are `/Type /Pages` dictionaries with `Kids` and `Count`;
//! leaves are `/Type /Page` dictionaries with a `Parent` back-reference.
//! Nodes live in the [`Context`] and are addressed by [`ObjectRef`], so the
//! tree here is only a root reference plus the algorithms that walk it.
//!
//! `Count` on every internal node equals the number of leaves below it once
//! any public operation returns.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectKind, ObjectRef};
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Page attributes a leaf inherits from its ancestors when absent locally.
pub const INHERITABLE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Role of a node met during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// `/Type /Pages`
    Internal,
    /// `/Type /Page`
    Leaf,
}

/// A page tree rooted at an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTree {
    root: ObjectRef,
}

/// What a kid entry resolved to.
enum Kid {
    Internal(ObjectRef, usize),
    Leaf(ObjectRef),
    Unknown,
}

impl PageTree {
    /// Wrap an existing internal node.
    pub fn new(root: ObjectRef) -> Self {
        Self { root }
    }

    /// Register an empty root node in `ctx`.
    pub fn create(ctx: &mut Context) -> Self {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Pages"));
        dict.insert("Kids".to_string(), Object::Array(Vec::new()));
        dict.insert("Count".to_string(), Object::Integer(0));
        Self {
            root: ctx.register(Object::Dictionary(dict)),
        }
    }

    /// The root node.
    pub fn root(&self) -> ObjectRef {
        self.root
    }

    /// `Count` of the root.
    pub fn count(&self, ctx: &Context) -> Result<usize> {
        node_count(ctx, self.root)
    }

    /// Insert `leaf` so that it becomes the page at `index`.
    ///
    /// Returns the internal node the leaf was spliced into, or `None` when
    /// that node is the root. The leaf's `Parent` is left to the caller.
    pub fn insert_leaf_node(&self, ctx: &mut Context, leaf: ObjectRef, index: usize) -> Result<Option<ObjectRef>> {
        let mut path = HashSet::new();
        insert_at(ctx, self.root, leaf, index, index, &mut path)
    }

    /// Remove the leaf at `index` and return it.
    ///
    /// Internal nodes left without kids are pruned.
    pub fn remove_leaf_node(&self, ctx: &mut Context, index: usize) -> Result<ObjectRef> {
        let count = self.count(ctx)?;
        if index >= count {
            return Err(Error::IndexOutOfRange {
                index,
                min: 0,
                max: count.saturating_sub(1),
            });
        }
        let mut path = HashSet::new();
        remove_at(ctx, self.root, index, index, &mut path)
    }

    /// Post-order walk calling `visitor` once per reachable node below the
    /// root. Kids of an internal node are visited before the node itself.
    ///
    /// Refs seen before (shared or cyclic kids) are skipped.
    pub fn traverse<F>(&self, ctx: &Context, mut visitor: F) -> Result<()>
    where
        F: FnMut(ObjectRef, NodeKind),
    {
        let mut visited = HashSet::from([self.root]);
        let mut stack = vec![(self.root, kid_refs(ctx, self.root)?, 0usize)];

        while let Some(frame) = stack.last_mut() {
            let (node, kids, next) = frame;
            if *next == kids.len() {
                let node = *node;
                stack.pop();
                if node != self.root {
                    visitor(node, NodeKind::Internal);
                }
                continue;
            }

            let kid = kids[*next];
            *next += 1;
            if !visited.insert(kid) {
                log::warn!("Page tree node {} is reachable more than once, skipping", kid);
                continue;
            }

            match classify(ctx, &Object::Reference(kid)) {
                Kid::Internal(kid, _) => {
                    let grandkids = kid_refs(ctx, kid)?;
                    stack.push((kid, grandkids, 0));
                },
                Kid::Leaf(kid) => visitor(kid, NodeKind::Leaf),
                Kid::Unknown => log::warn!("Page tree kid {} is not a page or pages node", kid),
            }
        }
        Ok(())
    }

    /// Leaves in document order.
    pub fn leaves(&self, ctx: &Context) -> Result<Vec<ObjectRef>> {
        let mut leaves = Vec::new();
        self.traverse(ctx, |node, kind| {
            if kind == NodeKind::Leaf {
                leaves.push(node);
            }
        })?;
        Ok(leaves)
    }
}

/// Walk from `start` up through `Parent` links, calling `visitor` on each
/// node including `start`. Stops at the root, on a repeated node, or when
/// the visitor breaks.
pub fn ascend<B, F>(ctx: &Context, start: ObjectRef, mut visitor: F) -> Option<B>
where
    F: FnMut(ObjectRef, &Dict) -> ControlFlow<B>,
{
    let mut seen = HashSet::new();
    let mut current = Some(start);
    while let Some(node) = current {
        if !seen.insert(node) {
            log::warn!("Parent chain loops back to {}", node);
            return None;
        }
        let dict = ctx.get(node)?.as_dict()?;
        if let ControlFlow::Break(value) = visitor(node, dict) {
            return Some(value);
        }
        current = dict.get("Parent").and_then(Object::as_reference);
    }
    None
}

/// Value of `key` on `node` or its nearest ancestor that defines it.
pub fn inherited_attribute(ctx: &Context, node: ObjectRef, key: &str) -> Option<Object> {
    ascend(ctx, node, |_, dict| match dict.get(key) {
        Some(value) => ControlFlow::Break(value.clone()),
        None => ControlFlow::Continue(()),
    })
}

/// A page's `MediaBox` as `[llx, lly, urx, ury]`, inherited if needed.
pub fn media_box(ctx: &Context, page: ObjectRef) -> Result<[f64; 4]> {
    let value = inherited_attribute(ctx, page, "MediaBox").unwrap_or(Object::Null);
    let items = ctx.lookup_array(&value)?;
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = ctx.lookup_number(item)?;
    }
    Ok(rect)
}

fn node_count(ctx: &Context, node: ObjectRef) -> Result<usize> {
    let dict = ctx.dict(node)?;
    let count = match dict.get("Count") {
        Some(value) => ctx.lookup_number(value)?,
        None => 0.0,
    };
    Ok(count.max(0.0) as usize)
}

fn set_count(ctx: &mut Context, node: ObjectRef, count: usize) -> Result<()> {
    ctx.dict_mut(node)?
        .insert("Count".to_string(), Object::from(count));
    Ok(())
}

fn kids(ctx: &Context, node: ObjectRef) -> Result<Vec<Object>> {
    let dict = ctx.dict(node)?;
    match dict.get("Kids") {
        Some(kids) => Ok(ctx.lookup_array(kids)?.clone()),
        None => Ok(Vec::new()),
    }
}

fn kid_refs(ctx: &Context, node: ObjectRef) -> Result<Vec<ObjectRef>> {
    Ok(kids(ctx, node)?.iter().filter_map(Object::as_reference).collect())
}

/// The node's `Kids` array, following an indirect `Kids` value.
fn kids_mut(ctx: &mut Context, node: ObjectRef) -> Result<&mut Vec<Object>> {
    let indirect = ctx.dict(node)?.get("Kids").and_then(Object::as_reference);
    let slot = match indirect {
        Some(reference) => ctx.get_mut(reference),
        None => {
            let dict = ctx.dict_mut(node)?;
            Some(dict.entry("Kids".to_string()).or_insert_with(|| Object::Array(Vec::new())))
        },
    };
    match slot {
        Some(Object::Array(items)) => Ok(items),
        Some(other) => Err(Error::UnexpectedObjectKind {
            expected: ObjectKind::Array,
            found: other.kind(),
        }),
        None => Err(Error::UnexpectedObjectKind {
            expected: ObjectKind::Array,
            found: ObjectKind::Null,
        }),
    }
}

fn classify(ctx: &Context, kid: &Object) -> Kid {
    let Some(reference) = kid.as_reference() else {
        return Kid::Unknown;
    };
    let Some(dict) = ctx.get(reference).and_then(Object::as_dict) else {
        return Kid::Unknown;
    };
    let is_internal = match dict.get("Type").and_then(Object::as_name) {
        Some("Pages") => true,
        Some(_) => false,
        None => dict.contains_key("Kids"),
    };
    if is_internal {
        Kid::Internal(reference, node_count(ctx, reference).unwrap_or(0))
    } else {
        Kid::Leaf(reference)
    }
}

fn insert_at(
    ctx: &mut Context,
    node: ObjectRef,
    leaf: ObjectRef,
    index: usize,
    target: usize,
    path: &mut HashSet<ObjectRef>,
) -> Result<Option<ObjectRef>> {
    let corrupt = || Error::CorruptPageTree {
        index: target,
        operation: "insertLeafNode",
    };
    if !path.insert(node) {
        return Err(corrupt());
    }

    let count = node_count(ctx, node)?;
    if index > count {
        return Err(Error::IndexOutOfRange {
            index,
            min: 0,
            max: count,
        });
    }

    let kids = kids(ctx, node)?;
    let mut remaining = index;
    let mut splice_at = None;
    for (position, kid) in kids.iter().enumerate() {
        if remaining == 0 {
            splice_at = Some(position);
            break;
        }
        match classify(ctx, kid) {
            Kid::Internal(kid_ref, kid_count) if kid_count > remaining => {
                let parent = insert_at(ctx, kid_ref, leaf, remaining, target, path)?;
                set_count(ctx, node, count + 1)?;
                return Ok(Some(parent.unwrap_or(kid_ref)));
            },
            Kid::Internal(_, kid_count) => remaining -= kid_count,
            Kid::Leaf(_) => remaining -= 1,
            Kid::Unknown => {},
        }
    }

    let position = match splice_at {
        Some(position) => position,
        None if remaining == 0 => kids.len(),
        None => return Err(corrupt()),
    };
    kids_mut(ctx, node)?.insert(position, Object::Reference(leaf));
    set_count(ctx, node, count + 1)?;
    Ok(None)
}

fn remove_at(
    ctx: &mut Context,
    node: ObjectRef,
    index: usize,
    target: usize,
    path: &mut HashSet<ObjectRef>,
) -> Result<ObjectRef> {
    let corrupt = || Error::CorruptPageTree {
        index: target,
        operation: "removeLeafNode",
    };
    if !path.insert(node) {
        return Err(corrupt());
    }

    let count = node_count(ctx, node)?;
    let kids = kids(ctx, node)?;
    let mut remaining = index;
    for (position, kid) in kids.iter().enumerate() {
        match classify(ctx, kid) {
            Kid::Internal(kid_ref, kid_count) if kid_count > remaining => {
                let removed = remove_at(ctx, kid_ref, remaining, target, path)?;
                if kids_mut(ctx, kid_ref)?.is_empty() {
                    log::debug!("Pruning empty page tree node {}", kid_ref);
                    kids_mut(ctx, node)?.remove(position);
                }
                set_count(ctx, node, count.saturating_sub(1))?;
                return Ok(removed);
            },
            Kid::Internal(_, kid_count) => remaining -= kid_count,
            Kid::Leaf(leaf) if remaining == 0 => {
                kids_mut(ctx, node)?.remove(position);
                set_count(ctx, node, count.saturating_sub(1))?;
                return Ok(leaf);
            },
            Kid::Leaf(_) => remaining -= 1,
            Kid::Unknown => {},
        }
    }
    Err(corrupt())
}
