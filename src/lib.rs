//! Library for decoding [3D Tiles](https://github.com/CesiumGS/3d-tiles) point cloud
//! tilesets and ESRI Shapefile building footprints.
//!
//! A [`Tileset`] is parsed once and queried per frame with a camera position
//! through [`LodSelector`]; the selected tiles are decoded from `pnts` payloads
//! into [`PointCloudTile`]s by a [`TileContentCache`]. The Shapefile readers
//! (`.shp`, `.shx`, `.dbf`, `.prj`) feed a separate [`BuildingLayer`].
//!
//! All decoders work on in-memory byte buffers; fetching bytes is left to an
//! [`AssetProvider`].

pub mod assets;
pub mod bounds;
pub mod cursor;
pub mod dbf;
mod error;
pub mod layer;
pub mod loader;
pub mod pnts;
pub mod prj;
pub mod selection;
pub mod shp;
pub mod shx;
pub mod tileset;

pub use assets::{AssetProvider, DirAssets, MemoryAssets};
pub use bounds::{BoundingVolume, Extent};
pub use cursor::{ByteCursor, Endian, OutOfData};
pub use dbf::{read_dbf, AttributeRecord, AttributeTable, FieldDescriptor, FieldType, Value};
pub use error::{Error, FormatError, Result};
pub use layer::{Building, BuildingLayer, HeightStats, ShapefileSet};
pub use loader::{load_tileset, TileContentCache, TilesetOptions};
pub use pnts::{decode_pnts, PntsHeader, PointCloudTile};
pub use prj::{Projection, ReferenceCode};
pub use selection::{FrameState, LodSelector, Selection, SelectionStats};
pub use shp::{read_shp, PolygonRecord, ShapeType, Shapefile, ShapefileHeader};
pub use shx::{read_shx, IndexOverlap, IndexRecord, SpatialIndex};
pub use tileset::{TileId, TileNode, Tileset};
