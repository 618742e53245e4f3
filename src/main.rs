use clap::Parser;

use worldmap_layers::atlas::Atlas;
use worldmap_layers::config::AtlasConfig;
use worldmap_layers::export;
use worldmap_layers::geo::GeoRegion;
use worldmap_layers::layers::LayerKind;
use worldmap_layers::projection::{Projection, ProjectionKind};

#[derive(Parser, Debug)]
#[command(name = "worldmap")]
#[command(about = "Render procedural world map layers to PNG")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,

    /// Random seed (uses random seed if neither this nor a config is given)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Output width in pixels
    #[arg(short = 'W', long, default_value = "512")]
    width: usize,

    /// Output height in pixels
    #[arg(short = 'H', long, default_value = "256")]
    height: usize,

    /// Layer to render (elevation, latitude, biome, land_type, precipitation, water, color)
    #[arg(short, long, default_value = "color")]
    layer: LayerKind,

    /// Region window in degrees: lon_min,lon_max,lat_min,lat_max
    #[arg(long, value_parser = parse_region, allow_hyphen_values = true)]
    region: Option<GeoRegion>,

    /// Normalized water level (0-1)
    #[arg(long)]
    water_level: Option<f64>,

    /// Biome palette, e.g. "count:2,colors:[{0,0,255,255},{0,255,0,255}]"
    #[arg(long)]
    biome_palette: Option<String>,

    /// Projection used when no region is given
    #[arg(long, default_value = "equirectangular")]
    projection: String,

    /// Orthographic center longitude in degrees
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    center_lon: f64,

    /// Orthographic center latitude in degrees
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    center_lat: f64,

    /// Also write the layer's scalar buffer with the spectral colormap
    #[arg(long)]
    scalar: Option<String>,

    /// Output PNG path
    #[arg(short, long, default_value = "worldmap.png")]
    output: String,
}

fn parse_region(s: &str) -> Result<GeoRegion, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("`{}`: {}", p, e)))
        .collect::<Result<_, _>>()?;
    let [lon_min, lon_max, lat_min, lat_max] = parts[..] else {
        return Err(format!("expected 4 comma-separated degrees, got {}", parts.len()));
    };
    GeoRegion::from_degrees(lon_min, lon_max, lat_min, lat_max).map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading config from {}", path);
            AtlasConfig::load(path)?
        }
        None => AtlasConfig {
            seed: rand::random(),
            ..AtlasConfig::default()
        },
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    println!("Building atlas with seed: {}", config.seed);
    println!("Native size: {}x{}", config.width, config.height);
    let atlas = Atlas::new(&config)?;

    if let Some(level) = args.water_level {
        atlas.set_parameter(LayerKind::Water, "waterLevel", level)?;
        println!("Water level set to {:.2}", level);
    }
    if let Some(palette) = &args.biome_palette {
        atlas.parse_parameters(LayerKind::Biome, palette)?;
        println!("Biome palette reconfigured");
    }

    let image = match args.region {
        Some(region) => {
            println!(
                "Rendering {} region ({:.1}° x {:.1}°) at {}x{}{}",
                args.layer,
                region.lon_span().to_degrees(),
                region.lat_span().to_degrees(),
                args.width,
                args.height,
                if atlas.supports_region(args.layer) { "" } else { " (resampled from full globe)" }
            );
            let img = atlas.get_color_region(args.layer, region, args.width, args.height, None)?;
            if let Some(path) = &args.scalar {
                let grid = atlas.sample_region(args.layer, region, args.width, args.height, None)?;
                export::export_scalar(&grid, path)?;
                println!("Saved scalar buffer to {}", path);
            }
            image::RgbaImage::clone(&img)
        }
        None => {
            let kind = match ProjectionKind::from_name(&args.projection) {
                Some(ProjectionKind::Orthographic { .. }) => {
                    ProjectionKind::orthographic_degrees(args.center_lon, args.center_lat)
                }
                Some(kind) => kind,
                None => return Err(format!("unknown projection `{}`", args.projection).into()),
            };
            println!("Rendering {} ({:?}) at {}x{}", args.layer, kind, args.width, args.height);
            let mut projection = Projection::new(kind, atlas.raster_budget());
            let handle = projection.render(&atlas, Some(args.layer), args.width, args.height)?;
            if let Some(path) = &args.scalar {
                export::export_scalar(&*atlas.sample(args.layer)?, path)?;
                println!("Saved scalar buffer to {}", path);
            }
            projection
                .raster(handle)
                .cloned()
                .ok_or("projection raster missing")?
        }
    };

    export::export_color(&image, &args.output)?;
    println!("Saved {} to {}", args.layer, args.output);

    let stats = atlas.cache_stats(args.layer);
    println!("Cache: {}", stats.summary());
    Ok(())
}
