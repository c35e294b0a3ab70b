//! Collision geometry seen by the movement core.
//!
//! The core never owns world state. It only asks "is this point blocked?"
//! through [`CollisionWorld`], which may be implemented by a closure, the
//! always-open [`OpenWorld`], or the tile-based [`TileGrid`] both binaries use.

use std::collections::HashSet;

use crate::config::WorldBounds;
use crate::error::CollisionQueryError;
use crate::math::Vector2;

/// Answers point-blocked queries. Must be free of side effects.
pub trait CollisionWorld {
    fn is_blocked(&self, point: Vector2) -> Result<bool, CollisionQueryError>;
}

impl<F> CollisionWorld for F
where
    F: Fn(Vector2) -> Result<bool, CollisionQueryError>,
{
    fn is_blocked(&self, point: Vector2) -> Result<bool, CollisionQueryError> {
        self(point)
    }
}

/// A world without obstacles.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWorld;

impl CollisionWorld for OpenWorld {
    fn is_blocked(&self, _point: Vector2) -> Result<bool, CollisionQueryError> {
        Ok(false)
    }
}

/// Rectangular grid of square tiles, some of which are walls.
#[derive(Debug, Clone)]
pub struct TileGrid {
    tile_size: f32,
    columns: i32,
    rows: i32,
    walls: HashSet<(i32, i32)>,
}

impl TileGrid {
    pub fn new(tile_size: f32, columns: i32, rows: i32) -> Self {
        Self {
            tile_size,
            columns,
            rows,
            walls: HashSet::new(),
        }
    }

    /// Builds a grid from ASCII rows where `#` marks a wall.
    pub fn from_rows(tile_size: f32, rows: &[&str]) -> Self {
        let columns = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0) as i32;
        let mut grid = Self::new(tile_size, columns, rows.len() as i32);

        for (row, line) in rows.iter().enumerate() {
            for (column, c) in line.chars().enumerate() {
                if c == '#' {
                    grid.set_wall(column as i32, row as i32);
                }
            }
        }

        grid
    }

    /// The arena both demo binaries load: a walled room with a few pillars.
    pub fn arena() -> Self {
        Self::from_rows(
            32.0,
            &[
                "#########################",
                "#.......................#",
                "#.......................#",
                "#...##..........##......#",
                "#...##..........##......#",
                "#.......................#",
                "#..........###..........#",
                "#..........###..........#",
                "#.......................#",
                "#...##..........##......#",
                "#...##..........##......#",
                "#.......................#",
                "#.......................#",
                "#########################",
            ],
        )
    }

    pub fn set_wall(&mut self, column: i32, row: i32) {
        self.walls.insert((column, row));
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn tile_at(&self, point: Vector2) -> (i32, i32) {
        (
            (point.x / self.tile_size).floor() as i32,
            (point.y / self.tile_size).floor() as i32,
        )
    }

    pub fn tile_center(&self, column: i32, row: i32) -> Vector2 {
        Vector2::new(
            (column as f32 + 0.5) * self.tile_size,
            (row as f32 + 0.5) * self.tile_size,
        )
    }

    pub fn is_wall(&self, column: i32, row: i32) -> bool {
        self.walls.contains(&(column, row))
    }

    pub fn contains_tile(&self, column: i32, row: i32) -> bool {
        column >= 0 && row >= 0 && column < self.columns && row < self.rows
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(
            0.0,
            0.0,
            self.columns as f32 * self.tile_size,
            self.rows as f32 * self.tile_size,
        )
    }

    /// Centers of every walkable tile, in row-major order.
    pub fn open_tiles(&self) -> Vec<Vector2> {
        let mut open = Vec::new();
        for row in 0..self.rows {
            for column in 0..self.columns {
                if !self.is_wall(column, row) {
                    open.push(self.tile_center(column, row));
                }
            }
        }
        open
    }
}

impl CollisionWorld for TileGrid {
    fn is_blocked(&self, point: Vector2) -> Result<bool, CollisionQueryError> {
        let (column, row) = self.tile_at(point);
        if !self.contains_tile(column, row) {
            return Err(CollisionQueryError::OutOfRange {
                x: point.x,
                y: point.y,
            });
        }
        Ok(self.is_wall(column, row))
    }
}
