//! `osm-parser in.osm out.xml.gz` (§6): the one explicitly out-of-scope
//! collaborator this repo still has to provide a concrete instance of — a
//! thin OSM-XML reader that feeds the core's entity constructors. Class
//! assignment and name abbreviation happen here, once, at ingest time
//! (§4.2 — "abrev is derived there and never recomputed by the core").

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use serde::Deserialize;

use osm_tiles::abbrev;
use osm_tiles::xml::{self, NdXml, NodeXml, RelationXml, TileDocumentXml, WayXml};

#[derive(Parser, Debug)]
#[command(name = "osm-parser", about = "Parses a raw OSM XML export into the chunk-ready node/way/relation form")]
struct Args {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct RawTag {
    #[serde(rename = "@k")]
    k: String,
    #[serde(rename = "@v")]
    v: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawNd {
    #[serde(rename = "@ref")]
    reference: i64,
}

#[derive(Debug, Default, Deserialize)]
struct RawMember {
    #[serde(rename = "@type")]
    member_type: String,
    #[serde(rename = "@ref")]
    reference: i64,
    #[serde(rename = "@role", default)]
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawNode {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
    #[serde(rename = "tag", default)]
    tag: Vec<RawTag>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWay {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "nd", default)]
    nd: Vec<RawNd>,
    #[serde(rename = "tag", default)]
    tag: Vec<RawTag>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRelation {
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "member", default)]
    member: Vec<RawMember>,
    #[serde(rename = "tag", default)]
    tag: Vec<RawTag>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "osm")]
struct RawOsm {
    #[serde(rename = "node", default)]
    node: Vec<RawNode>,
    #[serde(rename = "way", default)]
    way: Vec<RawWay>,
    #[serde(rename = "relation", default)]
    relation: Vec<RawRelation>,
}

/// Ordered `(key, value, class)` rules; the first matching tag wins. A
/// stand-in for the upstream style file's full tag-classification table —
/// the core only ever sees the resulting integer (§1, §3).
const CLASS_RULES: &[(&str, &str, i32)] = &[
    ("highway", "motorway", 1),
    ("highway", "trunk", 2),
    ("highway", "primary", 3),
    ("highway", "secondary", 4),
    ("highway", "residential", 5),
    ("highway", "footway", 6),
    ("waterway", "river", 10),
    ("waterway", "stream", 11),
    ("natural", "water", 20),
    ("natural", "wood", 21),
    ("landuse", "forest", 22),
    ("boundary", "national_park", 30),
    ("leisure", "park", 31),
    ("building", "yes", 40),
];

fn classify(tags: &[RawTag]) -> i32 {
    for (k, v, class) in CLASS_RULES {
        if tags.iter().any(|t| t.k == *k && t.v == *v) {
            return *class;
        }
    }
    0
}

fn tag_value<'a>(tags: &'a [RawTag], key: &str) -> Option<&'a str> {
    tags.iter().find(|t| t.k == key).map(|t| t.v.as_str())
}

fn run(args: &Args) -> Result<()> {
    let file = File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let raw: RawOsm = quick_xml::de::from_reader(BufReader::new(file)).with_context(|| "parsing OSM XML")?;

    let mut node_docs = Vec::with_capacity(raw.node.len());
    for n in &raw.node {
        let name = tag_value(&n.tag, "name").map(str::to_string);
        let abrev = name.as_deref().and_then(abbrev::abbreviate);
        node_docs.push(NodeXml {
            id: n.id,
            lat: n.lat,
            lon: n.lon,
            class: classify(&n.tag),
            name,
            abrev,
            ele: tag_value(&n.tag, "ele").and_then(|v| v.parse().ok()),
            st: 0,
            refcount: 0,
        });
    }

    let mut way_docs = Vec::with_capacity(raw.way.len());
    for w in &raw.way {
        let name = tag_value(&w.tag, "name").map(str::to_string);
        let abrev = name.as_deref().and_then(abbrev::abbreviate);
        way_docs.push(WayXml {
            id: w.id,
            class: classify(&w.tag),
            layer: tag_value(&w.tag, "layer").and_then(|v| v.parse().ok()).unwrap_or(0),
            name,
            abrev,
            oneway: tag_value(&w.tag, "oneway") == Some("yes"),
            bridge: tag_value(&w.tag, "bridge").is_some(),
            tunnel: tag_value(&w.tag, "tunnel").is_some(),
            cutting: tag_value(&w.tag, "cutting").is_some(),
            lat_t: 0.0,
            lon_l: 0.0,
            lat_b: 0.0,
            lon_r: 0.0,
            nd: w.nd.iter().map(|n| NdXml { reference: n.reference }).collect(),
        });
    }

    let mut relation_docs = Vec::with_capacity(raw.relation.len());
    for r in &raw.relation {
        let name = tag_value(&r.tag, "name").map(str::to_string);
        let abrev = name.as_deref().and_then(abbrev::abbreviate);
        let member = r
            .member
            .iter()
            .filter(|m| m.member_type == "node" || m.member_type == "way")
            .map(|m| xml::MemberXml {
                member_type: m.member_type.clone(),
                reference: m.reference,
                role: osm_tiles::Role::from_str_role(&m.role).to_code(),
            })
            .collect();
        relation_docs.push(RelationXml {
            id: r.id,
            class: classify(&r.tag),
            rel_type: 0,
            name,
            abrev,
            lat_t: 0.0,
            lon_l: 0.0,
            lat_b: 0.0,
            lon_r: 0.0,
            member,
        });
    }

    let skipped_relation_members: usize = raw
        .relation
        .iter()
        .map(|r| r.member.iter().filter(|m| m.member_type == "relation").count())
        .sum();
    if skipped_relation_members > 0 {
        warn!("dropped {skipped_relation_members} relation-of-relation members");
    }

    let doc = TileDocumentXml { node: node_docs, way: way_docs, relation: relation_docs };
    xml::write_tile_document(&args.output, &doc)?;
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
