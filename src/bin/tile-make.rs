//! `tile-make prefix z x y out.xml.gz` (§6): runs `make_tile` for one
//! `(zoom, x, y)` against an already-built index, writing the gathered,
//! joined, sampled, and clipped tile document to `out.xml.gz`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use osm_tiles::{Index, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET};

#[derive(Parser, Debug)]
#[command(name = "tile-make", about = "Produces one self-contained tile document from a built index")]
struct Args {
    prefix: String,
    zoom: u8,
    x: i64,
    y: i64,
    output: PathBuf,
}

fn run(args: &Args) -> Result<()> {
    let index_dir = PathBuf::from(format!("{}-index", args.prefix));
    let mut index = Index::open(&index_dir, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET);

    index
        .make_tile(args.zoom, args.x, args.y, &args.output)
        .with_context(|| format!("producing tile {}/{}/{}", args.zoom, args.x, args.y))?;

    info!("wrote {}", args.output.display());

    let (chunk_stats, tile_stats, error_flag) = index.close();
    info!("chunk store: {chunk_stats}");
    info!("tile store: {tile_stats}");
    if error_flag {
        bail!("index reported errors during close");
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let started = Instant::now();

    match run(&args) {
        Ok(()) => {
            info!("OK dt={:?}", started.elapsed());
        }
        Err(err) => {
            log::error!("FAILURE dt={:?} err={err:#}", started.elapsed());
            std::process::exit(1);
        }
    }
}
