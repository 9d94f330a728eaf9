//! Grid-bucketed distance index.
//!
//! Structures are projected onto a flat grid whose cell edge is at least
//! the build radius. A radius query only visits the cell of the origin and
//! the surrounding ring(s), then confirms candidates with the haversine
//! distance.
//!
//! The east-west scale uses the cosine of the highest absolute latitude in
//! the set, so projected distances never exceed true ones and no neighbour
//! is skipped. Columns wrap around the globe: one turn of longitude is
//! split into a whole number of columns, so the cells east of 180° are the
//! cells west of -180°.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{Structure, StructureId};
use crate::error::PlanError;
use crate::geo::{haversine_meters, valid_threshold, METERS_PER_DEGREE};

/// Lower bound for the east-west scale near the poles.
const MIN_LNG_SCALE: f64 = 1e-6;

/// Shrinks the east-west scale so the small-angle projection error of
/// points at different latitudes stays on the safe side.
const PROJECTION_SLACK: f64 = 1e-6;

/// Smallest cell edge. Keeps grid coordinates well inside `i64` for any
/// positive threshold.
const MIN_CELL_METERS: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
struct Point {
    id: StructureId,
    lat: f64,
    lng: f64,
}

/// Grid geometry shared by build and query.
#[derive(Debug, Clone, Copy)]
struct Grid {
    /// North-south cell edge in meters.
    row_meters: f64,
    /// East-west cell edge in meters; `columns * col_meters` is one turn.
    col_meters: f64,
    lng_meters_per_degree: f64,
    /// Rows spanning pole to pole.
    rows: i64,
    /// Columns per turn of longitude, at least one.
    columns: i64,
}

impl Grid {
    fn new(cell_meters: f64, lng_meters_per_degree: f64) -> Self {
        let row_meters = cell_meters.max(MIN_CELL_METERS);
        let turn = 360.0 * lng_meters_per_degree;
        let columns = ((turn / row_meters).floor() as i64).max(1);
        Self {
            row_meters,
            col_meters: turn / columns as f64,
            lng_meters_per_degree,
            rows: (180.0 * METERS_PER_DEGREE / row_meters).ceil() as i64 + 1,
            columns,
        }
    }

    fn cell_of(&self, lat: f64, lng: f64) -> (i64, i64) {
        let row = (lat * METERS_PER_DEGREE / self.row_meters).floor() as i64;
        let col = ((lng + 180.0) * self.lng_meters_per_degree / self.col_meters).floor() as i64;
        (row, col.rem_euclid(self.columns))
    }

    /// Rings to visit north-south and east-west for `threshold_meters`.
    fn reach(&self, threshold_meters: f64) -> (i64, i64) {
        let row_reach = (threshold_meters / self.row_meters)
            .ceil()
            .clamp(1.0, self.rows as f64) as i64;
        let col_reach = (threshold_meters / self.col_meters)
            .ceil()
            .clamp(1.0, self.columns as f64) as i64;
        (row_reach, col_reach)
    }

    /// Column indices within `col_reach` of `col`, each once.
    fn columns_around(&self, col: i64, col_reach: i64) -> Vec<i64> {
        if 2 * col_reach + 1 >= self.columns {
            return (0..self.columns).collect();
        }
        (-col_reach..=col_reach)
            .map(|dc| (col + dc).rem_euclid(self.columns))
            .collect()
    }
}

/// Spatial lookup over a fixed set of structures.
#[derive(Debug, Clone)]
pub struct DistanceIndex {
    points: Vec<Point>,
    positions: BTreeMap<StructureId, usize>,
    cells: HashMap<(i64, i64), Vec<usize>>,
    grid: Grid,
}

impl DistanceIndex {
    /// Bucket `structures` into cells of at least `cell_meters`.
    ///
    /// Point order inside each cell follows input order, which keeps query
    /// results independent of hash iteration.
    pub fn build<'a, I>(structures: I, cell_meters: f64) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = &'a Structure>,
    {
        if !valid_threshold(cell_meters) {
            return Err(PlanError::InvalidThreshold(cell_meters));
        }

        let points: Vec<Point> = structures
            .into_iter()
            .map(|s| Point {
                id: s.id,
                lat: s.lat,
                lng: s.lng,
            })
            .collect();

        let max_abs_lat = points.iter().map(|p| p.lat.abs()).fold(0.0_f64, f64::max);
        let lng_meters_per_degree = (METERS_PER_DEGREE * max_abs_lat.to_radians().cos()
            * (1.0 - PROJECTION_SLACK))
            .max(MIN_LNG_SCALE);
        let grid = Grid::new(cell_meters, lng_meters_per_degree);

        let mut positions = BTreeMap::new();
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (pos, p) in points.iter().enumerate() {
            positions.insert(p.id, pos);
            cells.entry(grid.cell_of(p.lat, p.lng)).or_default().push(pos);
        }

        Ok(Self {
            points,
            positions,
            cells,
            grid,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of occupied grid cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Ids of every other indexed structure within `threshold_meters` of
    /// `id`. Unknown ids have no neighbours.
    pub fn neighbors(&self, id: StructureId, threshold_meters: f64) -> BTreeSet<StructureId> {
        let mut found = BTreeSet::new();
        let Some(&origin_pos) = self.positions.get(&id) else {
            return found;
        };
        if !valid_threshold(threshold_meters) {
            return found;
        }

        let origin = self.points[origin_pos];
        let mut check = |pos: usize| {
            if pos == origin_pos {
                return;
            }
            let p = self.points[pos];
            if haversine_meters(origin.lat, origin.lng, p.lat, p.lng) <= threshold_meters {
                found.insert(p.id);
            }
        };

        let (row, col) = self.grid.cell_of(origin.lat, origin.lng);
        let (row_reach, col_reach) = self.grid.reach(threshold_meters);
        let columns = self.grid.columns_around(col, col_reach);

        // Wide queries would visit more cells than there are points.
        let visits = (2 * row_reach as u128 + 1) * columns.len() as u128;
        if visits > self.points.len() as u128 {
            (0..self.points.len()).for_each(&mut check);
            return found;
        }

        for dr in -row_reach..=row_reach {
            for &c in &columns {
                if let Some(bucket) = self.cells.get(&(row + dr, c)) {
                    bucket.iter().for_each(|&pos| check(pos));
                }
            }
        }
        found
    }
}
