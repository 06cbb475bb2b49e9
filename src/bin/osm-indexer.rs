//! `osm-indexer filter.xml prefix` (§6): reads `prefix-{nodes,ways,
//! relations}.xml.gz` (each in the same node/way/relation document shape
//! `osm-parser` emits) and populates the chunk store under `prefix-index/`.
//! Tile references are a separate pass (`osm-tiler`) run once every source
//! file has been ingested, so this tool never emits tile refs itself.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use osm_tiles::entity::{Node, Relation, Way};
use osm_tiles::filter::FilterConfig;
use osm_tiles::xml;
use osm_tiles::{Index, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET};

#[derive(Parser, Debug)]
#[command(name = "osm-indexer", about = "Populates a tile index from parsed node/way/relation documents")]
struct Args {
    filter: PathBuf,
    prefix: String,
}

fn run(args: &Args) -> Result<()> {
    let filter = FilterConfig::load(&args.filter).with_context(|| format!("loading {}", args.filter.display()))?;
    let index_dir = PathBuf::from(format!("{}-index", args.prefix));
    let mut index = Index::open(&index_dir, DEFAULT_CHUNK_BUDGET, DEFAULT_TILE_BUDGET);

    let nodes_path = PathBuf::from(format!("{}-nodes.xml.gz", args.prefix));
    let ways_path = PathBuf::from(format!("{}-ways.xml.gz", args.prefix));
    let relations_path = PathBuf::from(format!("{}-relations.xml.gz", args.prefix));

    let nodes_doc = xml::read_tile_document(&nodes_path).with_context(|| format!("reading {}", nodes_path.display()))?;
    let mut node_count = 0;
    for n in nodes_doc.node {
        let node: Node = n.into();
        let Some(info) = filter.lookup(node.class) else { continue };
        if index.add_node(node, 0, info.center, false) {
            node_count += 1;
        }
    }

    let ways_doc = xml::read_tile_document(&ways_path).with_context(|| format!("reading {}", ways_path.display()))?;
    let mut way_count = 0;
    for w in ways_doc.way {
        let way: Way = w.into();
        let Some(info) = filter.lookup(way.class) else { continue };
        if index.add_way(way, 0, info.center, false) {
            way_count += 1;
        }
    }

    let relations_doc =
        xml::read_tile_document(&relations_path).with_context(|| format!("reading {}", relations_path.display()))?;
    let mut relation_count = 0;
    for r in relations_doc.relation {
        let relation: Relation = r.into();
        let Some(info) = filter.lookup(relation.class) else { continue };
        // `add_relation` always emits tile refs internally; zoom=0 sits
        // below every `ZOOM_LADDER` rung so none actually land here —
        // `osm-tiler` is what adds real tile refs, for all three kinds.
        if index.add_relation(relation, 0, info.center) {
            relation_count += 1;
        }
    }

    info!("indexed nodes={node_count} ways={way_count} relations={relation_count}");

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
