//! The operators every registry starts with.

use std::sync::Arc;

use crate::ops::WhereCompiler;
use crate::registry::Registry;

mod assert;
mod discard;
mod from;
mod head;
mod select;
mod sort;
mod tail;

pub use discard::{Discard, DiscardFactory};
pub use head::{HeadCompiler, HeadIr};
pub use sort::{Sort, SortFactory};

pub fn register(reg: &mut Registry) {
    reg.add_native("where", Arc::new(WhereCompiler));
    reg.add_native("head", Arc::new(HeadCompiler));
    reg.add_generic(from::description());
    reg.add_generic(tail::description());
    reg.add_generic(select::description());
    reg.add_generic(assert::description());
    reg.add_legacy("sort", Arc::new(SortFactory));
    reg.add_legacy("discard", Arc::new(DiscardFactory));
}
