//! Scoped mutation handles.

use std::ops::Deref;
use std::sync::Arc;

use cairn_store::StoreResult;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::error;

/// Anything that can be wrapped in an [`Editor`].
pub trait Editable {
    /// Held for the lifetime of every editor of this object.
    fn edit_lock(&self) -> &Arc<Mutex<()>>;

    /// Short name for log output.
    fn label(&self) -> &'static str;
}

type Commit<T> = Box<dyn FnOnce(&T) -> StoreResult<()>>;

/// Exclusive mutation handle with a commit callback.
///
/// The callback publishes the target's new root hash into its parent and
/// commits the parent's editor in turn, so releasing the innermost editor
/// re-saves every ancestor up to the root. Call [`Editor::commit`] to observe
/// the outcome; an editor dropped without it still commits and logs any
/// failure.
pub struct Editor<T: Editable> {
    target: Arc<T>,
    on_commit: Option<Commit<T>>,
    _edit: ArcMutexGuard<RawMutex, ()>,
}

impl<T: Editable> Editor<T> {
    /// Lock `target` for editing. Blocks while another editor holds it.
    pub fn new(target: Arc<T>, on_commit: impl FnOnce(&T) -> StoreResult<()> + 'static) -> Self {
        let edit = target.edit_lock().lock_arc();
        Self {
            target,
            on_commit: Some(Box::new(on_commit)),
            _edit: edit,
        }
    }

    /// An editor whose commit publishes nothing. Used for the top of a chain
    /// and for nodes edited outside any tree.
    pub fn detached(target: Arc<T>) -> Self {
        let edit = target.edit_lock().lock_arc();
        Self {
            target,
            on_commit: None,
            _edit: edit,
        }
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Run the commit callback now and report its result.
    pub fn commit(mut self) -> StoreResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> StoreResult<()> {
        match self.on_commit.take() {
            Some(callback) => callback(&self.target),
            None => Ok(()),
        }
    }
}

impl<T: Editable> Deref for Editor<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T: Editable> Drop for Editor<T> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!(node = self.target.label(), error = %e, "editor commit failed");
        }
    }
}

/// Publish a node kind's write methods on its editor.
///
/// The node methods themselves are crate-private, so a shared read handle
/// obtained from a parent or from `Storage` cannot change state that would
/// never reach the root.
macro_rules! editor_methods {
    (impl<$g:ident: $bound:path> $kind:ty {
        $( $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty; )*
    }) => {
        impl<$g: $bound> $crate::editor::Editor<$crate::node::Node<$kind>> {
            $(
                $(#[$meta])*
                pub fn $name(&self $(, $arg: $ty)*) -> $ret {
                    self.target().$name($($arg),*)
                }
            )*
        }
    };
    (impl $kind:ty {
        $( $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty; )*
    }) => {
        impl $crate::editor::Editor<$crate::node::Node<$kind>> {
            $(
                $(#[$meta])*
                pub fn $name(&self $(, $arg: $ty)*) -> $ret {
                    self.target().$name($($arg),*)
                }
            )*
        }
    };
}

pub(crate) use editor_methods;
