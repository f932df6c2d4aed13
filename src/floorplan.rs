//! ASCII floorplans.
//!
//! One character per 1 m x 1 m cell: `#` is an obstacle, `.` open floor,
//! `s` the start position. Column index maps to `x`, row index to `y`
//! (rows read top to bottom, so `y` grows south). The interior must be
//! fully enclosed by obstacle cells.

use crate::core::{point::round3, Point};
use crate::error::{Result, SimError};
use std::collections::VecDeque;
use std::path::Path;

/// Axis-aligned obstacle, meters. `x`/`y` is the north-west corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone)]
pub struct Floorplan {
    pub width: f64,
    pub height: f64,
    pub start: Point,
    pub obstacles: Vec<Rect>,
}

/// A small fully-walled room, handy for tests and the demo run.
pub const BUILTIN_OFFICE: &str = "\
##############
#............#
#.....s......#
#....###.....#
#....###.....#
#............#
##############";

impl Floorplan {
    pub fn load(path: &Path) -> Result<Floorplan> {
        let drawing = std::fs::read_to_string(path)?;
        Floorplan::parse(&drawing)
    }

    /// Parse and validate a drawing. Unknown characters, a missing start
    /// marker, or an unenclosed interior are configuration errors.
    pub fn parse(drawing: &str) -> Result<Floorplan> {
        let rows: Vec<Vec<char>> = drawing
            .trim_matches('\n')
            .lines()
            .map(|line| line.trim_end().chars().collect())
            .collect();
        if rows.is_empty() {
            return Err(SimError::Floorplan("empty drawing".into()));
        }
        let height = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut start = None;
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, &ch) in row.iter().enumerate() {
                match ch {
                    '#' | '.' => {}
                    's' => {
                        if start.is_some() {
                            return Err(SimError::Floorplan(
                                "more than one start marker".into(),
                            ));
                        }
                        start = Some((col_idx, row_idx));
                    }
                    other => {
                        return Err(SimError::Floorplan(format!(
                            "unknown character {:?} at row {}, column {}",
                            other, row_idx, col_idx
                        )));
                    }
                }
            }
        }
        let (start_col, start_row) = start
            .ok_or_else(|| SimError::Floorplan("no start marker 's' in drawing".into()))?;

        let is_wall = |col: usize, row: usize| -> bool {
            rows.get(row).and_then(|r| r.get(col)) == Some(&'#')
        };

        // Flood fill from the start: reaching the edge of the drawing
        // means the interior leaks.
        let mut seen = vec![vec![false; width]; height];
        let mut queue = VecDeque::from([(start_col, start_row)]);
        seen[start_row][start_col] = true;
        while let Some((col, row)) = queue.pop_front() {
            if col == 0 || row == 0 || col == width - 1 || row == height - 1 {
                return Err(SimError::Floorplan(
                    "interior is not enclosed by obstacles".into(),
                ));
            }
            for (ncol, nrow) in [
                (col - 1, row),
                (col + 1, row),
                (col, row - 1),
                (col, row + 1),
            ] {
                if ncol < width && nrow < height && !seen[nrow][ncol] && !is_wall(ncol, nrow) {
                    seen[nrow][ncol] = true;
                    queue.push_back((ncol, nrow));
                }
            }
        }

        // Horizontal runs of '#' collapse into single rectangles.
        let mut obstacles = Vec::new();
        for (row_idx, row) in rows.iter().enumerate() {
            let mut col = 0;
            while col < row.len() {
                if row[col] == '#' {
                    let run_start = col;
                    while col < row.len() && row[col] == '#' {
                        col += 1;
                    }
                    obstacles.push(Rect {
                        x: run_start as f64,
                        y: row_idx as f64,
                        w: (col - run_start) as f64,
                        h: 1.0,
                    });
                } else {
                    col += 1;
                }
            }
        }

        Ok(Floorplan {
            width: width as f64,
            height: height as f64,
            start: Point::new(start_col as f64 + 0.5, start_row as f64 + 0.5),
            obstacles,
        })
    }

    /// Nearest obstacle (or outer wall) hit by a ray from `from` along
    /// `heading_deg`. Returns the bump point and the distance to it.
    pub fn next_bump(&self, from: Point, heading_deg: f64) -> (Point, f64) {
        let rad = (heading_deg - 90.0).to_radians();
        let (dx, dy) = (rad.cos(), rad.sin());

        let mut best = self.boundary_exit(from, dx, dy);
        for rect in &self.obstacles {
            if let Some(t) = ray_rect_entry(from, dx, dy, rect) {
                if t < best {
                    best = t;
                }
            }
        }
        let bump = Point::new(round3(from.x + dx * best), round3(from.y + dy * best));
        (bump, best)
    }

    /// Distance along the ray to the outer boundary.
    fn boundary_exit(&self, from: Point, dx: f64, dy: f64) -> f64 {
        let mut t = f64::INFINITY;
        if dx > 1e-12 {
            t = t.min((self.width - from.x) / dx);
        } else if dx < -1e-12 {
            t = t.min(-from.x / dx);
        }
        if dy > 1e-12 {
            t = t.min((self.height - from.y) / dy);
        } else if dy < -1e-12 {
            t = t.min(-from.y / dy);
        }
        t
    }
}

/// Slab test: distance along the ray at which it enters `rect`, if it
/// does, strictly ahead of the origin.
fn ray_rect_entry(from: Point, dx: f64, dy: f64, rect: &Rect) -> Option<f64> {
    let (mut t_near, mut t_far) = (f64::NEG_INFINITY, f64::INFINITY);

    for (origin, dir, lo, hi) in [
        (from.x, dx, rect.x, rect.x + rect.w),
        (from.y, dy, rect.y, rect.y + rect.h),
    ] {
        if dir.abs() < 1e-12 {
            if origin < lo || origin > hi {
                return None;
            }
        } else {
            let t1 = (lo - origin) / dir;
            let t2 = (hi - origin) / dir;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
        }
    }

    if t_near <= t_far && t_near > 1e-9 {
        Some(t_near)
    } else {
        None
    }
}
