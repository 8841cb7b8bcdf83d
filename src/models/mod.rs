pub mod photo;
pub mod snapshot;
pub mod sort_order;

pub use photo::*;
pub use snapshot::*;
pub use sort_order::*;
