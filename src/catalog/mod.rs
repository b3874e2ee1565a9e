//! The session catalog: the tree of browsers, contexts, and pages the
//! server has opened, the active selection at each level, lifecycle and
//! switching on top of it, and a serializable snapshot of the whole thing.

mod ids;
mod lifecycle;
mod node;
mod snapshot;
mod switch;
mod tree;

pub use ids::{BrowserId, ContextId, PageId};
pub use lifecycle::spawn_event_pump;
pub use snapshot::{BrowserSnapshot, CatalogSnapshot, ContextSnapshot, PageSnapshot};
pub use tree::Catalog;
