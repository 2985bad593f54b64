mod block;
pub(crate) mod image;

pub use block::BlockStorage;
