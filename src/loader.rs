//! Tileset loading and resident tile content.

use crate::assets::AssetProvider;
use crate::error::{Error, Result};
use crate::pnts::{decode_pnts, PointCloudTile};
use crate::tileset::{TileId, Tileset};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;

pub const DEFAULT_TILESET_FILE: &str = "tileset.json";

/// Where a tileset lives in an [`AssetProvider`]
#[derive(Clone, Debug)]
pub struct TilesetOptions {
    /// Directory of the tileset document; content paths are resolved against it
    pub base_path: String,
    pub tileset_file: String,
}

impl TilesetOptions {
    pub fn new(base_path: impl Into<String>) -> Self {
        TilesetOptions {
            base_path: base_path.into(),
            tileset_file: DEFAULT_TILESET_FILE.to_string(),
        }
    }

    pub fn tileset_path(&self) -> String {
        if self.base_path.is_empty() {
            self.tileset_file.clone()
        } else {
            format!("{}/{}", self.base_path.trim_end_matches('/'), self.tileset_file)
        }
    }
}

/// Reads and parses the tileset document described by `options`.
pub fn load_tileset(assets: &dyn AssetProvider, options: &TilesetOptions) -> Result<Tileset> {
    let path = options.tileset_path();
    debug!("loading tileset from {path}");
    let bytes = assets.read(&path)?;
    let tileset = Tileset::from_slice(&bytes).map_err(|e| Error::decode(&path, "tileset", e))?;
    info!("tileset {path} loaded, {} tiles", tileset.len());
    Ok(tileset.with_base_path(options.base_path.clone()))
}

/// Decoded point data per tileset node.
///
/// Each node has its own slot lock, held for the whole load: there is at
/// most one load in flight per node, and readers only ever see completed
/// loads. Loaded tiles stay resident until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct TileContentCache {
    slots: Vec<Mutex<Option<Arc<PointCloudTile>>>>,
}

impl TileContentCache {
    pub fn new(tileset: &Tileset) -> Self {
        TileContentCache {
            slots: (0..tileset.len()).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Loads the content of `id` unless it is already resident.
    ///
    /// Returns `Ok(None)` for nodes without content. A failed load leaves
    /// the slot empty so it can be retried by the caller.
    pub fn load(
        &self,
        tileset: &Tileset,
        id: TileId,
        assets: &dyn AssetProvider,
    ) -> Result<Option<Arc<PointCloudTile>>> {
        let slot = self.slots.get(id.0).ok_or(Error::UnknownTile(id.0))?;
        let Some(path) = tileset.content_path(id) else {
            return Ok(None);
        };

        let mut slot = slot.lock();
        if let Some(tile) = slot.as_ref() {
            return Ok(Some(Arc::clone(tile)));
        }

        debug!("loading tile content {path}");
        let bytes = assets.read(&path)?;
        let tile = decode_pnts(&bytes).map_err(|e| Error::decode(&path, "pnts", e))?;
        info!("loaded {} points from {path}", tile.point_count());

        let tile = Arc::new(tile);
        *slot = Some(Arc::clone(&tile));
        Ok(Some(tile))
    }

    /// Loads every tile in `ids`, stopping at the first failure.
    pub fn load_all(
        &self,
        tileset: &Tileset,
        ids: &[TileId],
        assets: &dyn AssetProvider,
    ) -> Result<usize> {
        let mut loaded = 0;
        for &id in ids {
            if self.load(tileset, id, assets)?.is_some() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Resident content of `id`, if a load has completed.
    pub fn get(&self, id: TileId) -> Option<Arc<PointCloudTile>> {
        self.slots.get(id.0)?.lock().clone()
    }

    pub fn is_loaded(&self, id: TileId) -> bool {
        self.slots
            .get(id.0)
            .map(|slot| slot.lock().is_some())
            .unwrap_or(false)
    }

    pub fn resident_count(&self) -> usize {
        self.slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn total_points(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.lock().as_ref().map(|t| t.point_count()))
            .sum()
    }

    /// Drops every resident tile.
    pub fn clear(&self) {
        for slot in &self.slots {
            *slot.lock() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::pnts::tests::build_pnts;
    use crate::selection::FrameState;

    const TILESET: &str = r#"{
        "root": {
            "boundingVolume": { "sphere": [0, 0, 0, 10] },
            "geometricError": 100,
            "children": [
                { "boundingVolume": { "sphere": [0, 0, 0, 5] }, "geometricError": 0, "content": { "uri": "a.pnts" } },
                { "boundingVolume": { "sphere": [0, 0, 0, 5] }, "geometricError": 0, "content": { "uri": "broken.pnts" } }
            ]
        }
    }"#;

    fn assets() -> MemoryAssets {
        let assets = MemoryAssets::new();
        assets.insert("set/tileset.json", TILESET);
        assets.insert("set/a.pnts", build_pnts(r#"{"POINTS_LENGTH":0}"#, &[]));
        assets.insert("set/broken.pnts", b"nope".to_vec());
        assets
    }

    #[test]
    fn load_selected_tiles() {
        let assets = assets();
        let tileset = load_tileset(&assets, &TilesetOptions::new("set")).unwrap();
        let cache = TileContentCache::new(&tileset);
        let mut frame = FrameState::new(&tileset);
        let tiles = tileset.select([0.0, 0.0, 10.0], 16.0, &mut frame);
        assert_eq!(tiles.len(), 2);

        let first = cache.load(&tileset, tiles[0], &assets).unwrap().unwrap();
        assert_eq!(first.point_count(), 0);
        assert!(cache.is_loaded(tiles[0]));

        let again = cache.load(&tileset, tiles[0], &assets).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let err = cache.load(&tileset, tiles[1], &assets).unwrap_err();
        assert!(matches!(err, Error::Decode { stage: "pnts", ref resource, .. } if resource == "set/broken.pnts"));
        assert!(!cache.is_loaded(tiles[1]));
        assert_eq!(cache.resident_count(), 1);

        cache.clear();
        assert!(cache.get(tiles[0]).is_none());
    }

    #[test]
    fn group_node_has_nothing_to_load() {
        let assets = assets();
        let tileset = load_tileset(&assets, &TilesetOptions::new("set")).unwrap();
        let cache = TileContentCache::new(&tileset);
        assert!(cache.load(&tileset, TileId(0), &assets).unwrap().is_none());
        assert!(matches!(
            cache.load(&tileset, TileId(9), &assets),
            Err(Error::UnknownTile(9))
        ));
    }

    #[test]
    fn missing_tileset_document() {
        let assets = MemoryAssets::new();
        assert!(matches!(
            load_tileset(&assets, &TilesetOptions::new("none")),
            Err(Error::MissingResource { .. })
        ));
    }

    #[test]
    fn concurrent_loads_share_one_tile() {
        let assets = assets();
        let tileset = load_tileset(&assets, &TilesetOptions::new("set")).unwrap();
        let cache = TileContentCache::new(&tileset);
        let id = TileId(1);
        let tiles: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| cache.load(&tileset, id, &assets).unwrap().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(tiles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
