pub mod config;
pub mod entity;
pub mod error;
pub mod ghost;
pub mod index;
pub mod key;
pub mod knn;
pub mod neighbor;
pub mod node_map;
pub mod policy;
pub mod range_query;
pub mod visitor;

pub use config::{IndexConfig, SubdivisionPreset, MAX_LEVEL};
pub use entity::{Aabb, EntityId};
pub use error::{LucienError, Result};
pub use index::octree::Octree;
pub use index::tetree::Tetree;
pub use index::{Index, Stats};
pub use key::{MortonKey, SpatialKey, TetreeKey, Vec3};
