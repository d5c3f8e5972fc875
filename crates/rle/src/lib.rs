use std::fmt::Debug;

pub use append::AppendRLE;
pub use splitable_span::*;

mod append;
mod splitable_span;

pub trait Searchable {
    type Item: Copy + Debug;

    /// Checks if the entry contains the specified item. If it does, returns the offset into the
    /// item.
    fn get_offset(&self, loc: Self::Item) -> Option<usize>;

    fn at_offset(&self, offset: usize) -> Self::Item;
}
