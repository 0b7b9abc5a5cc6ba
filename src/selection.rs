//! Distance driven level-of-detail selection.
//!
//! Every call re-evaluates the whole tree from the root; nothing is carried
//! over from the previous frame.

use crate::tileset::{TileId, Tileset};
use log::debug;

/// Scale applied to the geometric error before dividing by distance
pub const SSE_SCALE: f64 = 1000.0;
/// Distances below this are clamped to it
pub const MIN_DISTANCE: f64 = 1.0;
pub const DEFAULT_MAX_SCREEN_SPACE_ERROR: f64 = 16.0;

/// Screen space error of a node seen from `distance`.
#[inline]
pub fn projected_error(geometric_error: f64, distance: f64) -> f64 {
    (geometric_error * SSE_SCALE) / distance.max(MIN_DISTANCE)
}

/// Per-node outputs of the last selection pass.
#[derive(Clone, Debug, Default)]
pub struct FrameState {
    distance_to_camera: Vec<f64>,
    should_render: Vec<bool>,
}

impl FrameState {
    pub fn new(tileset: &Tileset) -> Self {
        let mut frame = FrameState::default();
        frame.reset(tileset.len());
        frame
    }

    fn reset(&mut self, len: usize) {
        self.distance_to_camera.clear();
        self.distance_to_camera.resize(len, f64::INFINITY);
        self.should_render.clear();
        self.should_render.resize(len, false);
    }

    /// Distance computed in the last pass; infinite for nodes not visited.
    pub fn distance_to_camera(&self, id: TileId) -> f64 {
        self.distance_to_camera
            .get(id.0)
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn should_render(&self, id: TileId) -> bool {
        self.should_render.get(id.0).copied().unwrap_or(false)
    }
}

/// Counters of one selection pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
    /// Nodes whose distance was computed
    pub visited: usize,
    /// Branches cut because the node had no bounding volume
    pub pruned: usize,
    /// Render candidates without content
    pub skipped_empty: usize,
    /// Deepest level visited, root is 0
    pub max_depth: usize,
}

/// Result of one selection pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Tiles to render, in traversal order
    pub tiles: Vec<TileId>,
    pub stats: SelectionStats,
}

/// Greedy LOD selector
#[derive(Clone, Copy, Debug)]
pub struct LodSelector {
    pub max_screen_space_error: f64,
}

impl Default for LodSelector {
    fn default() -> Self {
        LodSelector {
            max_screen_space_error: DEFAULT_MAX_SCREEN_SPACE_ERROR,
        }
    }
}

impl LodSelector {
    pub fn new(max_screen_space_error: f64) -> Self {
        LodSelector {
            max_screen_space_error,
        }
    }

    /// Selects the tiles to render from `camera`.
    ///
    /// `camera` must be in the frame of the bounding volume centers.
    pub fn select(&self, tileset: &Tileset, camera: [f64; 3], frame: &mut FrameState) -> Selection {
        frame.reset(tileset.len());
        let mut selection = Selection::default();
        if let Some(root) = tileset.root() {
            self.select_node(tileset, root, camera, frame, &mut selection);
        }
        debug!("selected {} tiles to render", selection.tiles.len());
        selection
    }

    fn select_node(
        &self,
        tileset: &Tileset,
        id: TileId,
        camera: [f64; 3],
        frame: &mut FrameState,
        selection: &mut Selection,
    ) {
        let Some(node) = tileset.node(id) else {
            return;
        };
        let Some(volume) = &node.bounding_volume else {
            selection.stats.pruned += 1;
            return;
        };

        let distance = volume.distance_to(camera);
        frame.distance_to_camera[id.0] = distance;
        selection.stats.visited += 1;
        selection.stats.max_depth = selection.stats.max_depth.max(node.depth);

        let error = projected_error(node.geometric_error, distance);
        if error <= self.max_screen_space_error || node.is_leaf() {
            if node.has_content() {
                frame.should_render[id.0] = true;
                selection.tiles.push(id);
            } else {
                selection.stats.skipped_empty += 1;
            }
        } else {
            for &child in &node.children {
                self.select_node(tileset, child, camera, frame, selection);
            }
        }
    }
}

impl Tileset {
    /// Runs [`LodSelector::select`] with the given threshold.
    pub fn select(
        &self,
        camera: [f64; 3],
        max_screen_space_error: f64,
        frame: &mut FrameState,
    ) -> Vec<TileId> {
        LodSelector::new(max_screen_space_error)
            .select(self, camera, frame)
            .tiles
    }
}
