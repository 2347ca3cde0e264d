//! Spawn registry - in-memory index of spawn points and their timing.
//!
//! The registry tracks:
//! - Known spawns: points whose despawn second is confirmed, ordered by the
//!   second of the hour at which they appear
//! - Despawn times keyed by spawn id
//! - Unknown points whose timing still has to be discovered
//! - Altitudes bucketed by rounded coordinates
//! - Cell points (more-points mode only): coordinates reported by map
//!   cells that may or may not be real spawns
//!
//! The registry holds no I/O. Database loading, altitude fetching and
//! snapshots live in `registry_service`, `altitude` and `snapshot`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::bounds::Bounds;
use crate::models::{point::Point, spawnpoint::Spawnpoint};
use crate::utils::{current_hour, round_coords};

/// Which flavour of registry is running.
///
/// `MorePoints` additionally explores coordinates listed by map cells and
/// marks every newly confirmed spawn in the known set right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    Standard,
    MorePoints,
}

/// When a known spawn appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub spawn_id: i64,

    /// Second of the hour at which the spawn appears
    pub spawn_seconds: i32,
}

/// Insertion-ordered map of known points.
///
/// A `None` schedule marks a point confirmed at runtime whose appearance
/// second is not computed until the next database load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(Point, Option<Schedule>)>", into = "Vec<(Point, Option<Schedule>)>")]
pub struct KnownPoints {
    entries: Vec<(Point, Option<Schedule>)>,
    index: HashMap<Point, usize>,
}

impl KnownPoints {
    /// Insert or overwrite. An existing point keeps its position.
    pub fn insert(&mut self, point: Point, schedule: Option<Schedule>) {
        match self.index.get(&point) {
            Some(&i) => self.entries[i].1 = schedule,
            None => {
                self.index.insert(point, self.entries.len());
                self.entries.push((point, schedule));
            }
        }
    }

    /// Stable sort by appearance second. Unscheduled points go last.
    fn sort_by_schedule(&mut self) {
        self.entries
            .sort_by_key(|(_, s)| s.map_or(i32::MAX, |s| s.spawn_seconds));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (p, _))| (*p, i))
            .collect();
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.index.contains_key(point)
    }

    pub fn last(&self) -> Option<&(Point, Option<Schedule>)> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Point, Option<Schedule>)> {
        self.entries.iter()
    }
}

impl From<Vec<(Point, Option<Schedule>)>> for KnownPoints {
    fn from(entries: Vec<(Point, Option<Schedule>)>) -> Self {
        let mut known = KnownPoints::default();
        for (point, schedule) in entries {
            known.insert(point, schedule);
        }
        known
    }
}

impl From<KnownPoints> for Vec<(Point, Option<Schedule>)> {
    fn from(known: KnownPoints) -> Self {
        known.entries
    }
}

/// What a database load needs to know about the configured map.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    pub bounds: &'a Bounds,
    pub stay_within_map: bool,
    pub last_migration: i64,
    pub alt_precision: u32,
}

impl LoadOptions<'_> {
    /// Whether rows should be limited to the map's bounding box.
    pub fn filter_bbox(&self) -> bool {
        self.bounds.is_polygon() || self.stay_within_map
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRegistry {
    pub(crate) mode: RegistryMode,
    pub(crate) known: KnownPoints,
    pub(crate) despawn_times: HashMap<i64, i32>,
    pub(crate) unknown: HashSet<Point>,
    pub(crate) altitudes: HashMap<Point, f64>,
    pub(crate) cell_points: HashSet<Point>,
}

impl SpawnRegistry {
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            known: KnownPoints::default(),
            despawn_times: HashMap::new(),
            unknown: HashSet::new(),
            altitudes: HashMap::new(),
            cell_points: HashSet::new(),
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Number of spawns with a known despawn time.
    pub fn len(&self) -> usize {
        self.despawn_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.despawn_times.is_empty()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }

    pub fn cells_count(&self) -> usize {
        match self.mode {
            RegistryMode::Standard => 0,
            RegistryMode::MorePoints => self.cell_points.len(),
        }
    }

    /// Every point the workers may visit.
    pub fn total_length(&self) -> usize {
        self.despawn_times.len() + self.unknown.len() + self.cells_count()
    }

    /// Merge spawn rows from the database.
    ///
    /// The known schedule is rebuilt from scratch and sorted by appearance
    /// second. Despawn times and unknown points accumulate. Altitudes are
    /// taken from the rows only while the altitude cache is still empty.
    pub fn load<I>(&mut self, rows: I, opts: LoadOptions<'_>)
    where
        I: IntoIterator<Item = Spawnpoint>,
    {
        let record_altitudes = self.altitudes.is_empty();
        let bbox = opts.bounds.bbox();
        let mut known = KnownPoints::default();

        for spawn in rows {
            let point = spawn.point();

            if opts.filter_bbox() && !bbox.contains(point) {
                continue;
            }
            if opts.bounds.is_polygon() && !opts.bounds.contains(point) {
                continue;
            }

            if record_altitudes {
                if let Some(alt) = spawn.alt {
                    self.altitudes
                        .insert(round_coords(point, opts.alt_precision), alt);
                }
            }

            let fresh = spawn.updated.is_some_and(|u| u > opts.last_migration);
            if !fresh {
                self.unknown.insert(point);
                continue;
            }

            self.despawn_times.insert(spawn.spawn_id, spawn.despawn_time);
            known.insert(
                point,
                Some(Schedule {
                    spawn_id: spawn.spawn_id,
                    spawn_seconds: spawn.spawn_seconds(),
                }),
            );
        }

        known.sort_by_schedule();
        self.known = known;
    }

    /// Scheduled spawns in appearance order.
    pub fn items(&self) -> Vec<(Point, Schedule)> {
        self.known
            .iter()
            .filter_map(|(p, s)| s.map(|s| (*p, s)))
            .collect()
    }

    /// True when the current second of the hour is past the last scheduled spawn.
    pub fn after_last(&self, now: i64) -> bool {
        match self.known.last() {
            Some((_, Some(schedule))) => now.rem_euclid(3600) > schedule.spawn_seconds as i64,
            _ => false,
        }
    }

    /// Epoch second at which `spawn_id` disappears, given it was seen at `seen`.
    ///
    /// `None` for an unknown spawn, or when the result does not fit in an `i64`.
    pub fn get_despawn_time(&self, spawn_id: i64, seen: i64) -> Option<i64> {
        let despawn_time = *self.despawn_times.get(&spawn_id)?;
        let despawn = current_hour(seen).checked_add(i64::from(despawn_time))?;
        if seen > despawn {
            despawn.checked_add(3600)
        } else {
            Some(despawn)
        }
    }

    /// Record a spawn whose despawn second has been confirmed.
    pub fn add_known(&mut self, spawn_id: i64, despawn_time: i32, point: Point) {
        self.despawn_times.insert(spawn_id, despawn_time);
        self.unknown.remove(&point);
        if self.mode == RegistryMode::MorePoints {
            // Keeps have_point() current until the next load computes a schedule
            self.known.insert(point, None);
            self.cell_points.remove(&point);
        }
    }

    pub fn add_unknown(&mut self, point: Point) {
        self.unknown.insert(point);
        if self.mode == RegistryMode::MorePoints {
            self.cell_points.remove(&point);
        }
    }

    /// Record a coordinate listed by a map cell.
    ///
    /// Returns whether the point was new. Always false in standard mode.
    pub fn add_cell_point(&mut self, point: Point) -> bool {
        if self.mode != RegistryMode::MorePoints || self.have_point(&point) {
            return false;
        }
        self.cell_points.insert(point)
    }

    pub fn have_point(&self, point: &Point) -> bool {
        self.cell_points.contains(point)
            || self.known.contains(point)
            || self.unknown.contains(point)
    }

    /// Points whose timing still needs to be discovered.
    ///
    /// Returns a copy, so callers may keep exploring while the registry changes.
    pub fn mysteries(&self) -> Vec<Point> {
        let mut points: Vec<Point> = self.unknown.iter().copied().collect();
        if self.mode == RegistryMode::MorePoints {
            points.extend(self.cell_points.iter().copied());
        }
        points
    }

    /// Cached altitude for an already rounded point.
    pub fn cached_altitude(&self, rounded: &Point) -> Option<f64> {
        self.altitudes.get(rounded).copied()
    }

    pub fn set_altitude(&mut self, rounded: Point, altitude: f64) {
        self.altitudes.insert(rounded, altitude);
    }

    pub fn has_altitudes(&self) -> bool {
        !self.altitudes.is_empty()
    }

    pub fn replace_altitudes(&mut self, altitudes: HashMap<Point, f64>) {
        self.altitudes = altitudes;
    }
}
