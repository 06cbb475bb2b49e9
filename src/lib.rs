//! Chunked object store, tile index, and tile production pipeline for
//! tiled OSM/KML map data (§1-§2).

pub mod abbrev;
pub mod chunk;
pub mod entity;
pub mod error;
pub mod filter;
pub mod geo;
pub mod ids;
pub mod kml_class;
pub mod lru;
pub mod stats;
pub mod tilestore;
pub mod wayalgo;
pub mod xml;

mod index;

pub use entity::{AttrMap, EntityRecord, Member, MemberKind, Node, Relation, Role, Shape, StorageKind, Way};
pub use error::{IndexError, Result};
pub use index::{Index, RefKind, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET, ZOOM_LADDER};
