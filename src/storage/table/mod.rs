pub mod table_heap;
pub mod tuple;

pub use table_heap::{TableHeap, TableHeapError, TableIterator};
pub use tuple::Tuple;
