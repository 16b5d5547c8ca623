//! Patch a live subtree to match freshly rendered markup
//!
//! Children are paired by index only. Reordering a list therefore rewrites
//! the content of each position instead of moving nodes.

use super::{same_kind, Document, NodeData, NodeId};
use crate::config::DirectiveSettings;
use crate::error::{ErrorContext, Result};

/// Summary of the mutations one reconciliation applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Patch {
    pub replaced: usize,
    pub text_updates: usize,
    pub attrs_set: usize,
    pub attrs_removed: usize,
    pub appended: usize,
    pub removed: usize,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        *self == Patch::default()
    }

    pub fn total(&self) -> usize {
        self.replaced
            + self.text_updates
            + self.attrs_set
            + self.attrs_removed
            + self.appended
            + self.removed
    }
}

/// Bring the children of `live_root` in line with `markup`
///
/// Attributes the binder owns (event directives and the reference marker)
/// are never set or removed here.
pub fn reconcile(
    document: &mut Document,
    live_root: NodeId,
    markup: &str,
    directives: &DirectiveSettings,
) -> Result<Patch> {
    let tag = document
        .tag(live_root)
        .map(str::to_string)
        .ok_or_else(|| crate::Error::dom("reconcile target is not an element"))?;

    let wrapper = document
        .parse_fragment(markup, &tag)
        .context("parsing rendered markup")?;
    for (name, value) in document.attrs(live_root) {
        document.set_attr(wrapper, &name, &value)?;
    }

    let mut patch = Patch::default();
    let result = Differ {
        document: &mut *document,
        directives,
        patch: &mut patch,
    }
    .diff_node(live_root, wrapper);

    // Whatever was not adopted into the live tree goes with the wrapper
    document.remove(wrapper);
    result?;

    log::debug!("Reconciled <{}>: {:?}", tag, patch);
    Ok(patch)
}

struct Differ<'a> {
    document: &'a mut Document,
    directives: &'a DirectiveSettings,
    patch: &'a mut Patch,
}

impl Differ<'_> {
    fn diff_node(&mut self, live: NodeId, fresh: NodeId) -> Result<()> {
        let kinds_match = match (self.document.data(live), self.document.data(fresh)) {
            (Some(a), Some(b)) => same_kind(a, b),
            _ => false,
        };
        if !kinds_match {
            self.document.replace(live, fresh)?;
            self.patch.replaced += 1;
            return Ok(());
        }

        let has_text = matches!(
            self.document.data(fresh),
            Some(NodeData::Text(_)) | Some(NodeData::Comment(_))
        );
        if has_text {
            let text = self.document.text(fresh).unwrap_or_default().to_string();
            if self.document.text(live) != Some(text.as_str()) {
                self.document.set_text(live, &text)?;
                self.patch.text_updates += 1;
            }
            return Ok(());
        }

        if self.document.is_element(fresh) {
            self.diff_attrs(live, fresh)?;
        }
        self.diff_children(live, fresh)
    }

    fn diff_attrs(&mut self, live: NodeId, fresh: NodeId) -> Result<()> {
        let wanted = self.document.attrs(fresh);

        for (name, value) in &wanted {
            if self.directives.is_binder_owned(name) {
                continue;
            }
            if self.document.attr(live, name) != Some(value.as_str()) {
                self.document.set_attr(live, name, value)?;
                self.patch.attrs_set += 1;
            }
        }

        for (name, _) in self.document.attrs(live) {
            if self.directives.is_binder_owned(&name) {
                continue;
            }
            if !wanted.iter().any(|(n, _)| *n == name) {
                self.document.remove_attr(live, &name);
                self.patch.attrs_removed += 1;
            }
        }

        Ok(())
    }

    fn diff_children(&mut self, live: NodeId, fresh: NodeId) -> Result<()> {
        let old = self.document.children(live);
        let new = self.document.children(fresh);

        for i in 0..old.len().max(new.len()) {
            match (old.get(i), new.get(i)) {
                (Some(&o), Some(&n)) => self.diff_node(o, n)?,
                (None, Some(&n)) => {
                    self.document.append_child(live, n)?;
                    self.patch.appended += 1;
                }
                (Some(&o), None) => {
                    self.document.remove(o);
                    self.patch.removed += 1;
                }
                (None, None) => {}
            }
        }

        Ok(())
    }
}
