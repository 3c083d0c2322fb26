//! Copy object subgraphs between contexts.
//!
//! Every source reference gets exactly one destination reference per
//! copier, so shared objects stay shared and cycles terminate: the
//! destination number is reserved and memoized before the source object's
//! contents are read. Objects are copied from a work queue rather than by
//! recursing through references, so long reference chains do not grow the
//! stack.
//!
//! A page leaf is always copied standalone, however it is reached: an
//! annotation's `/Dest [p /Fit]` pulls in the target page without its
//! `Parent` or the source page tree.

use crate::content::Operation;
use crate::context::Context;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use crate::page_tree::{inherited_attribute, INHERITABLE_ATTRIBUTES};
use std::collections::HashMap;

/// Copies objects from `src` into `dest`.
///
/// Use one copier for everything copied in one operation: a second copier
/// would duplicate objects the first one already copied.
#[derive(Debug)]
pub struct ObjectCopier<'s, 'd> {
    src: &'s Context,
    dest: &'d mut Context,
    memo: HashMap<ObjectRef, ObjectRef>,
    /// Reserved destination refs whose contents are still to be copied
    pending: Vec<(ObjectRef, ObjectRef)>,
}

impl<'s, 'd> ObjectCopier<'s, 'd> {
    /// Create a copier from `src` into `dest`.
    pub fn new(src: &'s Context, dest: &'d mut Context) -> Self {
        Self {
            src,
            dest,
            memo: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Deep-copy a direct value. References inside it, and everything they
    /// reach, are copied into the destination.
    pub fn copy(&mut self, value: &Object) -> Object {
        let copied = self.copy_direct(value);
        self.drain();
        copied
    }

    /// Copy the object behind `reference` and return its destination ref.
    pub fn copy_ref(&mut self, reference: ObjectRef) -> ObjectRef {
        let mapped = self.map_ref(reference);
        self.drain();
        mapped
    }

    /// Copy a page leaf as a standalone page.
    ///
    /// Inheritable attributes missing on the page are pulled down from its
    /// ancestors and `Parent` is dropped, so the page tree it came from is not
    /// copied along with it. The new page is registered in the destination
    /// and has no `Parent` until it is inserted into a tree.
    ///
    /// A page this copier already reached through a reference is not copied
    /// again; its existing destination ref is returned.
    pub fn copy_page(&mut self, page: ObjectRef) -> Result<ObjectRef> {
        if let Some(mapped) = self.mapped(page) {
            log::debug!("Page {} was already copied as {}", page, mapped);
            return Ok(mapped);
        }
        let standalone = standalone_page(self.src, page)?;
        let new_page = self.dest.next_ref();
        // Refs back to the page (e.g. an annotation's /P) land on the copy
        self.memo.insert(page, new_page);

        let copied = self.copy_dict(&standalone);
        self.drain();
        self.dest.assign(new_page, Object::Dictionary(copied));
        Ok(new_page)
    }

    /// Like [`copy_page`](Self::copy_page), but return the copied dictionary
    /// instead of registering it.
    pub fn copy_page_node(&mut self, page: ObjectRef) -> Result<Dict> {
        let standalone = standalone_page(self.src, page)?;
        let copied = self.copy_dict(&standalone);
        self.drain();
        Ok(copied)
    }

    /// Destination ref for a source ref copied so far.
    pub fn mapped(&self, reference: ObjectRef) -> Option<ObjectRef> {
        self.memo.get(&reference).copied()
    }

    /// Number of source objects copied.
    pub fn copied_count(&self) -> usize {
        self.memo.len()
    }

    fn map_ref(&mut self, reference: ObjectRef) -> ObjectRef {
        if let Some(mapped) = self.memo.get(&reference) {
            return *mapped;
        }
        let mapped = self.dest.next_ref();
        self.memo.insert(reference, mapped);
        self.pending.push((reference, mapped));
        mapped
    }

    fn drain(&mut self) {
        let src = self.src;
        while let Some((from, to)) = self.pending.pop() {
            let copied = match src.get(from) {
                Some(object) if object.has_type("Page") => match standalone_page(src, from) {
                    Ok(page) => Object::Dictionary(self.copy_dict(&page)),
                    Err(_) => self.copy_direct(object),
                },
                Some(object) => self.copy_direct(object),
                None => {
                    log::warn!("Copying dangling reference {}, storing null", from);
                    Object::Null
                },
            };
            self.dest.assign(to, copied);
        }
    }

    fn copy_dict(&mut self, dict: &Dict) -> Dict {
        dict.iter()
            .map(|(key, value)| (key.clone(), self.copy_direct(value)))
            .collect()
    }

    fn copy_direct(&mut self, value: &Object) -> Object {
        match value {
            Object::Reference(reference) => Object::Reference(self.map_ref(*reference)),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.copy_direct(item)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dict(dict)),
            Object::Stream { dict, data } => Object::Stream {
                dict: self.copy_dict(dict),
                data: data.clone(),
            },
            Object::ContentStream { dict, operations } => Object::ContentStream {
                dict: self.copy_dict(dict),
                operations: operations
                    .iter()
                    .map(|op| Operation {
                        operands: op.operands.iter().map(|o| self.copy_direct(o)).collect(),
                        ..op.clone()
                    })
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

/// A page dictionary with inherited attributes made local and no `Parent`.
pub fn standalone_page(ctx: &Context, page: ObjectRef) -> Result<Dict> {
    let mut dict = ctx.dict(page)?.clone();
    for key in INHERITABLE_ATTRIBUTES {
        if !dict.contains_key(key) {
            if let Some(value) = inherited_attribute(ctx, page, key) {
                log::debug!("Page {} inherits /{} from an ancestor", page, key);
                dict.insert(key.to_string(), value);
            }
        }
    }
    dict.shift_remove("Parent");
    Ok(dict)
}
