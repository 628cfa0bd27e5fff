// Uniform-cell spatial hash for neighbour queries.
//
// Each particle index goes into the cell `floor(coord / cell_size)` per
// axis. `neighbors` returns every index in the cube of cells within
// `ceil(radius / cell_size)` of the query point's cell. The cube covers the
// query sphere, so there are no false negatives; callers filter the false
// positives by true distance.
//
// There is no removal. The field clears and refills the grid whenever it
// rebuilds it.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub type CellKey = (i32, i32, i32);

/// Indices sharing one cell. Typical occupancy at the field's densities is
/// a handful, so most cells never spill to the heap.
pub type Cell = SmallVec<[u32; 8]>;

#[derive(Clone, Debug)]
pub struct SpatialHashGrid {
    cell_size: f32,
    cells: FxHashMap<CellKey, Cell>,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: FxHashMap::default(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_of(&self, x: f32, y: f32, z: f32) -> CellKey {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn insert(&mut self, index: u32, x: f32, y: f32, z: f32) {
        let key = self.cell_of(x, y, z);
        self.cells.entry(key).or_default().push(index);
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Visit every index in the candidate cube around the query point.
    pub fn for_each_candidate(&self, x: f32, y: f32, z: f32, radius: f32, mut f: impl FnMut(u32)) {
        let reach = (radius / self.cell_size).ceil().max(0.0) as i32;
        let (cx, cy, cz) = self.cell_of(x, y, z);
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    if let Some(cell) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        cell.iter().copied().for_each(&mut f);
                    }
                }
            }
        }
    }

    /// All indices in the candidate cube around the query point.
    pub fn neighbors(&self, x: f32, y: f32, z: f32, radius: f32) -> Vec<u32> {
        let mut out = Vec::new();
        self.for_each_candidate(x, y, z, radius, |i| out.push(i));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nictia_prng::FieldRng;

    #[test]
    fn floor_keys_handle_negative_coordinates() {
        let grid = SpatialHashGrid::new(0.6);
        assert_eq!(grid.cell_of(0.0, 0.59, 0.61), (0, 0, 1));
        assert_eq!(grid.cell_of(-0.01, -0.6, -0.61), (-1, -1, -2));
    }

    #[test]
    fn same_cell_and_adjacent_cells_are_found() {
        let mut grid = SpatialHashGrid::new(1.0);
        grid.insert(0, 0.5, 0.5, 0.5);
        grid.insert(1, 1.5, 0.5, 0.5);
        grid.insert(2, 5.5, 0.5, 0.5);
        let mut found = grid.neighbors(0.5, 0.5, 0.5, 1.0);
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut grid = SpatialHashGrid::new(0.6);
        grid.insert(3, 1.0, 1.0, 1.0);
        assert_eq!(grid.occupied_cells(), 1);
        grid.clear();
        assert!(grid.is_empty());
        assert!(grid.neighbors(1.0, 1.0, 1.0, 2.0).is_empty());
    }

    #[test]
    fn no_false_negatives_against_brute_force() {
        let mut rng = FieldRng::new(99);
        let points: Vec<[f32; 3]> = (0..800)
            .map(|_| {
                [
                    rng.range_f32(-4.0, 4.0),
                    rng.range_f32(-4.0, 4.0),
                    rng.range_f32(-4.0, 4.0),
                ]
            })
            .collect();
        let mut grid = SpatialHashGrid::new(0.6);
        for (i, p) in points.iter().enumerate() {
            grid.insert(i as u32, p[0], p[1], p[2]);
        }

        for _ in 0..50 {
            let q = [
                rng.range_f32(-4.0, 4.0),
                rng.range_f32(-4.0, 4.0),
                rng.range_f32(-4.0, 4.0),
            ];
            let radius = rng.range_f32(0.1, 2.5);
            let found = grid.neighbors(q[0], q[1], q[2], radius);
            for (i, p) in points.iter().enumerate() {
                let d = ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2))
                    .sqrt();
                if d <= radius {
                    assert!(found.contains(&(i as u32)), "missed {i} at {d} <= {radius}");
                }
            }
        }
    }
}
