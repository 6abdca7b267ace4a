//! the plugin surface: adapter contracts, the registry, and every site adapter
pub mod danbooru;
pub mod destination;
pub mod e621;
pub mod gelbooru;
pub mod moebooru;
pub mod registry;
pub mod source;
pub mod szurubooru;

pub use registry::Registry;
