use clap::{Parser, Subcommand};
use geotiles_rs::selection::DEFAULT_MAX_SCREEN_SPACE_ERROR;
use geotiles_rs::{
    decode_pnts, load_tileset, AssetProvider, DirAssets, Error, FrameState, LodSelector,
    ShapefileSet, TileContentCache, TilesetOptions,
};
use log::info;
use std::path::PathBuf;

/// `geotiles` - inspect 3D Tiles point cloud tilesets and Shapefile datasets.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Directory that resource paths are resolved against.
    #[arg(long, env = "GEOTILES_ASSET_ROOT", default_value = ".")]
    pub asset_root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Select the tiles to render from a camera position.
    Tileset {
        /// Directory holding `tileset.json`
        dir: String,
        /// Camera position `x,y,z` in the bounding volume frame
        #[arg(long, value_parser = parse_camera, allow_hyphen_values = true)]
        camera: [f64; 3],
        /// Screen space error threshold
        #[arg(long, env = "GEOTILES_MAX_SSE", default_value_t = DEFAULT_MAX_SCREEN_SPACE_ERROR)]
        max_sse: f64,
        /// Decode the selected tiles
        #[arg(long)]
        load: bool,
    },
    /// Decode a single `pnts` tile.
    Pnts {
        file: String,
        /// Number of points to print
        #[arg(long, default_value_t = 5)]
        show: usize,
    },
    /// Load `<stem>.shp` with its `.dbf`, `.shx` and `.prj` companions.
    Shapefile { dir: String, stem: String },
}

fn parse_camera(s: &str) -> Result<[f64; 3], String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>().map_err(|e| format!("{c:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    coords
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected x,y,z, got {} values", v.len()))
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

fn tileset(
    assets: &DirAssets,
    dir: String,
    camera: [f64; 3],
    max_sse: f64,
    load: bool,
) -> geotiles_rs::Result<()> {
    let tileset = load_tileset(assets, &TilesetOptions::new(dir))?;
    println!(
        "{} tiles, max depth {}, version {}",
        tileset.len(),
        tileset.max_depth(),
        tileset.version().unwrap_or("-")
    );

    let mut frame = FrameState::new(&tileset);
    let selection = LodSelector::new(max_sse).select(&tileset, camera, &mut frame);
    println!(
        "selected {} tiles ({} visited, {} pruned)",
        selection.tiles.len(),
        selection.stats.visited,
        selection.stats.pruned
    );
    for &id in &selection.tiles {
        let content = tileset.content_path(id).unwrap_or_default();
        println!(
            "  {id} {content} distance {:.1}",
            frame.distance_to_camera(id)
        );
    }

    if load {
        let cache = TileContentCache::new(&tileset);
        cache.load_all(&tileset, &selection.tiles, assets)?;
        println!(
            "{} tiles resident, {} points",
            cache.resident_count(),
            cache.total_points()
        );
    }
    Ok(())
}

fn pnts(assets: &DirAssets, file: String, show: usize) -> geotiles_rs::Result<()> {
    let bytes = assets.read(&file)?;
    let tile = decode_pnts(&bytes).map_err(|e| Error::decode(&file, "pnts", e))?;
    let header = &tile.header;
    println!(
        "pnts version {}, {} bytes, feature table {}+{}, batch table {}+{}",
        header.version,
        header.byte_length,
        header.feature_table_json_byte_length,
        header.feature_table_binary_byte_length,
        header.batch_table_json_byte_length,
        header.batch_table_binary_byte_length
    );
    println!(
        "{} points, normals: {}, rtc center: {:?}",
        tile.point_count(),
        tile.has_normals(),
        tile.rtc_center
    );
    for i in 0..show.min(tile.point_count()) {
        if let Some((position, color)) = tile.point(i) {
            println!("  {position:?} {color:?}");
        }
    }
    Ok(())
}

fn shapefile(assets: &DirAssets, dir: String, stem: String) -> geotiles_rs::Result<()> {
    let set = ShapefileSet::load(assets, &join(&dir, &stem))?;
    match &set.projection {
        Some(projection) => println!(
            "projection: {}, needs transform: {}",
            projection.description(),
            projection.needs_transform
        ),
        None => println!("projection: none, assuming WGS 84"),
    }
    println!(
        "geometry: {}, {} polygons, {} skipped",
        set.shapefile.shape_type(),
        set.shapefile.len(),
        set.shapefile.skipped_records
    );
    if let Some(index) = &set.index {
        println!(
            "index: {} records, {} overlaps, {} gap words",
            index.len(),
            index.overlaps.len(),
            index.gap_words
        );
    }
    if let Some(attributes) = &set.attributes {
        println!(
            "attributes: {} records, {} fields, {} deleted",
            attributes.len(),
            attributes.fields.len(),
            attributes.deleted_count
        );
    }

    let layer = set.building_layer();
    println!("{} buildings", layer.len());
    if let Some(avg) = layer.heights.average() {
        println!(
            "heights: {} buildings, min {:.2}, max {:.2}, avg {avg:.2}",
            layer.heights.count, layer.heights.min, layer.heights.max
        );
    }
    if !layer.has_valid_geographic_extent() {
        println!("extent is not geographic WGS 84");
    }
    if let Some(range) = layer.view_range() {
        let (x, y) = layer.extent().center();
        println!("view: center {x:.6},{y:.6}, range {range:.0} m");
    }
    Ok(())
}

fn main() -> geotiles_rs::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();
    info!("asset root {}", config.asset_root.display());
    let assets = DirAssets::new(&config.asset_root);

    match config.command {
        Command::Tileset {
            dir,
            camera,
            max_sse,
            load,
        } => tileset(&assets, dir, camera, max_sse, load),
        Command::Pnts { file, show } => pnts(&assets, file, show),
        Command::Shapefile { dir, stem } => shapefile(&assets, dir, stem),
    }
}
