//! site-agnostic resource types shared by every adapter
pub mod pool;
pub mod post;
pub mod sidecar;
pub mod tag;
pub mod unique;

pub use {
    pool::Pool,
    post::{MergeOptions, PluginBundle, Post, Relationship, Safety},
    sidecar::Sidecar,
    tag::{Tag, TagCategory},
    unique::UniqueVec,
};
