//! `osm-tiler filter.xml prefix` (§6): the tile-reference pass. Walks every
//! node/way/relation already resident in `prefix-index/` and, for each one
//! the filter still selects, expands its range into tile refs across
//! `ZOOM_LADDER` via `Index::add_tile_ref`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use osm_tiles::entity::StorageKind;
use osm_tiles::filter::FilterConfig;
use osm_tiles::geo::BBox;
use osm_tiles::{Index, RefKind, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET, ZOOM_LADDER};

#[derive(Parser, Debug)]
#[command(name = "osm-tiler", about = "Adds tile references to an already-built index")]
struct Args {
    filter: PathBuf,
    prefix: String,
}

const FINEST_ZOOM: u8 = ZOOM_LADDER[ZOOM_LADDER.len() - 1];

fn run(args: &Args) -> Result<()> {
    let filter = FilterConfig::load(&args.filter).with_context(|| format!("loading {}", args.filter.display()))?;
    let index_dir = PathBuf::from(format!("{}-index", args.prefix));
    let mut index = Index::open(&index_dir, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET);

    let mut nodes = Vec::new();
    for record in index.iter(StorageKind::Node) {
        if let Some(node) = record.as_node() {
            nodes.push((node.id, BBox::from_point(node.lat, node.lon), node.class, node.name.is_some()));
        }
    }
    let mut node_refs = 0;
    for (id, range, class, has_name) in nodes {
        if filter.selected(class, FINEST_ZOOM as i32, has_name) {
            index.add_tile_ref(&range, FINEST_ZOOM, RefKind::Node, id);
            node_refs += 1;
        }
    }

    let mut ways = Vec::new();
    for record in index.iter(StorageKind::Way) {
        if let Some(way) = record.as_way() {
            ways.push((way.id, way.bbox, way.class, way.name.is_some()));
        }
    }
    let mut way_refs = 0;
    for (id, range, class, has_name) in ways {
        if filter.selected(class, FINEST_ZOOM as i32, has_name) {
            index.add_tile_ref(&range, FINEST_ZOOM, RefKind::Way, id);
            way_refs += 1;
        }
    }

    let mut relations = Vec::new();
    for record in index.iter(StorageKind::Relation) {
        if let Some(relation) = record.as_relation() {
            relations.push((relation.id, relation.bbox, relation.class, relation.name.is_some()));
        }
    }
    let mut relation_refs = 0;
    for (id, range, class, has_name) in relations {
        if filter.selected(class, FINEST_ZOOM as i32, has_name) {
            index.add_tile_ref(&range, FINEST_ZOOM, RefKind::Relation, id);
            relation_refs += 1;
        }
    }

    info!("tile refs added nodes={node_refs} ways={way_refs} relations={relation_refs}");

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
