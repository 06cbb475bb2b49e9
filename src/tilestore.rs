//! Tile store (§4.4, §4.5): per-`(zoom,x,y)` reference sets (which node,
//! way, and relation ids a tile must gather at production time), with its
//! own budget and recency list, mirroring `src/chunk.rs`'s discipline.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use log::warn;

use crate::lru::Lru;
use crate::stats::Stats;
use crate::xml;

type TileKey = (u8, i64, i64);

const HASH_OVERHEAD_PER_ENTRY: usize = 24;

pub struct Tile {
    pub zoom: u8,
    pub x: i64,
    pub y: i64,
    pub nodes: HashSet<i64>,
    pub ways: HashSet<i64>,
    pub relations: HashSet<i64>,
    pub dirty: bool,
    pub lock_count: u32,
}

impl Tile {
    fn empty(zoom: u8, x: i64, y: i64) -> Tile {
        Tile {
            zoom,
            x,
            y,
            nodes: HashSet::new(),
            ways: HashSet::new(),
            relations: HashSet::new(),
            dirty: false,
            lock_count: 0,
        }
    }

    pub fn locked(&self) -> bool {
        self.lock_count > 0
    }

    fn bytes(&self) -> usize {
        (self.nodes.len() + self.ways.len() + self.relations.len()) * (std::mem::size_of::<i64>() + HASH_OVERHEAD_PER_ENTRY)
    }
}

pub struct TileStore {
    base: PathBuf,
    pub budget: usize,
    tiles: HashMap<TileKey, Tile>,
    lru: Lru<TileKey>,
    total_bytes: usize,
    pub stats: Stats,
    pub error_flag: bool,
}

impl TileStore {
    pub fn new(base: impl Into<PathBuf>, budget: usize) -> TileStore {
        TileStore {
            base: base.into(),
            budget,
            tiles: HashMap::new(),
            lru: Lru::new(),
            total_bytes: 0,
            stats: Stats::default(),
            error_flag: false,
        }
    }

    fn path_for(&self, zoom: u8, x: i64, y: i64) -> PathBuf {
        self.base.join(format!("{zoom}")).join(format!("{x}")).join(format!("{y}.xml.gz"))
    }

    fn get_or_load(&mut self, zoom: u8, x: i64, y: i64) -> &mut Tile {
        let key = (zoom, x, y);
        let started = Instant::now();

        if self.tiles.contains_key(&key) {
            self.lru.touch(&key);
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            let path = self.path_for(zoom, x, y);
            let tile = if path.exists() {
                let load_started = Instant::now();
                match xml::read_tile_refs(&path) {
                    Ok((n, w, r)) => {
                        self.stats.load.record(load_started.elapsed());
                        Tile {
                            zoom,
                            x,
                            y,
                            nodes: n.into_iter().collect(),
                            ways: w.into_iter().collect(),
                            relations: r.into_iter().collect(),
                            dirty: false,
                            lock_count: 0,
                        }
                    }
                    Err(err) => {
                        warn!("failed to load tile refs {zoom}/{x}/{y}: {err}");
                        self.error_flag = true;
                        Tile::empty(zoom, x, y)
                    }
                }
            } else {
                Tile::empty(zoom, x, y)
            };
            self.total_bytes += tile.bytes() + HASH_OVERHEAD_PER_ENTRY;
            self.tiles.insert(key, tile);
            self.lru.push(key);
            self.evict_over_budget();
        }

        self.stats.get.record(started.elapsed());
        self.tiles.get_mut(&key).expect("just inserted or already resident")
    }

    fn evict_over_budget(&mut self) {
        while self.total_bytes > self.budget {
            let Some(&front) = self.lru.front() else { break };
            let locked = self.tiles.get(&front).map(|t| t.locked()).unwrap_or(false);
            if locked {
                break;
            }
            self.lru.pop_front();
            if let Some(tile) = self.tiles.remove(&front) {
                self.total_bytes = self.total_bytes.saturating_sub(tile.bytes() + HASH_OVERHEAD_PER_ENTRY);
                self.flush_tile(&tile);
                self.stats.evictions += 1;
            }
        }
    }

    fn flush_tile(&mut self, tile: &Tile) {
        if !tile.dirty {
            return;
        }
        let started = Instant::now();
        let path = self.path_for(tile.zoom, tile.x, tile.y);
        let nodes: Vec<i64> = tile.nodes.iter().copied().collect();
        let ways: Vec<i64> = tile.ways.iter().copied().collect();
        let relations: Vec<i64> = tile.relations.iter().copied().collect();
        if let Err(err) = xml::write_tile_refs(&path, &nodes, &ways, &relations) {
            warn!("failed to flush tile refs {}/{}/{}: {err}", tile.zoom, tile.x, tile.y);
            self.error_flag = true;
        }
        self.stats.trim.record(started.elapsed());
    }

    /// `tile_find`: a read-only borrow of the reference sets for one tile.
    pub fn find(&mut self, zoom: u8, x: i64, y: i64) -> &Tile {
        let started = Instant::now();
        let tile = self.get_or_load(zoom, x, y);
        self.stats.find.record(started.elapsed());
        tile
    }

    /// `tile_add_node`/`tile_add_way`/`tile_add_relation` (§4.4): adds a
    /// reference id into the tile's corresponding set; `false` if it was
    /// already present (no-op, no error).
    pub fn add_node(&mut self, zoom: u8, x: i64, y: i64, id: i64) -> bool {
        let tile = self.get_or_load(zoom, x, y);
        let inserted = tile.nodes.insert(id);
        if inserted {
            tile.dirty = true;
            self.total_bytes += std::mem::size_of::<i64>() + HASH_OVERHEAD_PER_ENTRY;
            self.evict_over_budget();
        }
        inserted
    }

    pub fn add_way(&mut self, zoom: u8, x: i64, y: i64, id: i64) -> bool {
        let tile = self.get_or_load(zoom, x, y);
        let inserted = tile.ways.insert(id);
        if inserted {
            tile.dirty = true;
            self.total_bytes += std::mem::size_of::<i64>() + HASH_OVERHEAD_PER_ENTRY;
            self.evict_over_budget();
        }
        inserted
    }

    pub fn add_relation(&mut self, zoom: u8, x: i64, y: i64, id: i64) -> bool {
        let tile = self.get_or_load(zoom, x, y);
        let inserted = tile.relations.insert(id);
        if inserted {
            tile.dirty = true;
            self.total_bytes += std::mem::size_of::<i64>() + HASH_OVERHEAD_PER_ENTRY;
            self.evict_over_budget();
        }
        inserted
    }

    pub fn lock(&mut self, zoom: u8, x: i64, y: i64) {
        self.get_or_load(zoom, x, y).lock_count += 1;
    }

    pub fn unlock(&mut self, zoom: u8, x: i64, y: i64) {
        if let Some(tile) = self.tiles.get_mut(&(zoom, x, y)) {
            tile.lock_count = tile.lock_count.saturating_sub(1);
        }
        self.evict_over_budget();
    }

    pub fn close(&mut self) {
        let keys: Vec<TileKey> = self.tiles.keys().cloned().collect();
        for key in keys {
            if let Some(tile) = self.tiles.remove(&key) {
                self.flush_tile(&tile);
            }
        }
        self.total_bytes = 0;
        self.lru = Lru::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_survive_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = TileStore::new(dir.path(), usize::MAX);
            store.add_node(7, 10, 20, 1);
            store.add_way(7, 10, 20, 2);
            store.close();
        }
        let mut store = TileStore::new(dir.path(), usize::MAX);
        let tile = store.find(7, 10, 20);
        assert!(tile.nodes.contains(&1));
        assert!(tile.ways.contains(&2));
        assert!(!store.error_flag);
    }

    #[test]
    fn duplicate_add_returns_false() {
        let mut store = TileStore::new(tempfile::tempdir().unwrap().path(), usize::MAX);
        assert!(store.add_node(3, 1, 1, 5));
        assert!(!store.add_node(3, 1, 1, 5));
    }

    #[test]
    fn locked_tile_survives_eviction() {
        let mut store = TileStore::new(tempfile::tempdir().unwrap().path(), 1);
        store.add_node(3, 1, 1, 5);
        store.lock(3, 1, 1);
        store.add_node(3, 2, 2, 9);
        assert!(store.find(3, 1, 1).nodes.contains(&5));
        store.unlock(3, 1, 1);
    }
}
