//! In-memory grid state.
//!
//! The store is only ever written from confirmed server data: the bootstrap
//! snapshot and inbound update frames. Readers get an `Arc<Grid>` that the
//! store never mutates in place; writes clone on demand via `Arc::make_mut`.

use std::{ops::Index, sync::Arc};

use shared::{
    domain::{Cell, GridDimensions, Position},
    protocol::SnapshotEntry,
};

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    dimensions: GridDimensions,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(dimensions: GridDimensions) -> Self {
        Self {
            dimensions,
            cells: vec![Cell::default(); dimensions.cell_count()],
        }
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn cell(&self, position: Position) -> Option<&Cell> {
        self.offset(position).map(|offset| &self.cells[offset])
    }

    pub fn value(&self, position: Position) -> Option<&str> {
        self.cell(position).map(|cell| cell.value.as_str())
    }

    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        if row >= self.dimensions.rows {
            return None;
        }
        let start = row * self.dimensions.columns;
        Some(&self.cells[start..start + self.dimensions.columns])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        // chunks(0) panics; a zero-width grid has no rows worth yielding.
        self.cells.chunks(self.dimensions.columns.max(1))
    }

    /// Non-empty cells in row-major order.
    pub fn filled(&self) -> impl Iterator<Item = (Position, &Cell)> {
        let columns = self.dimensions.columns.max(1);
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_empty())
            .map(move |(offset, cell)| (Position::new(offset / columns, offset % columns), cell))
    }

    fn offset(&self, position: Position) -> Option<usize> {
        self.dimensions
            .contains(position)
            .then(|| position.row * self.dimensions.columns + position.column)
    }

    fn set(&mut self, position: Position, value: String) -> Result<bool, SyncError> {
        let offset = self.offset(position).ok_or(SyncError::OutOfBounds {
            position,
            dimensions: self.dimensions,
        })?;
        let cell = &mut self.cells[offset];
        if cell.value == value {
            return Ok(false);
        }
        cell.value = value;
        Ok(true)
    }
}

impl Index<usize> for Grid {
    type Output = [Cell];

    fn index(&self, row: usize) -> &Self::Output {
        match self.row(row) {
            Some(cells) => cells,
            None => panic!(
                "row {row} out of range for {} grid",
                self.dimensions
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct SnapshotReport {
    pub applied: usize,
    pub rejected: Vec<SyncError>,
}

#[derive(Debug, Clone)]
pub struct GridStore {
    grid: Arc<Grid>,
}

impl GridStore {
    pub fn initialize(rows: usize, columns: usize) -> Self {
        Self::with_dimensions(GridDimensions::new(rows, columns))
    }

    pub fn with_dimensions(dimensions: GridDimensions) -> Self {
        Self {
            grid: Arc::new(Grid::new(dimensions)),
        }
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.grid.dimensions()
    }

    /// Overlays `entries` onto the grid. Cells not mentioned keep their value;
    /// out-of-range entries are skipped and returned in the report.
    pub fn apply_snapshot<I>(&mut self, entries: I) -> SnapshotReport
    where
        I: IntoIterator<Item = SnapshotEntry>,
    {
        let mut report = SnapshotReport::default();
        for entry in entries {
            match self.apply_update(entry.position, entry.value) {
                Ok(_) => report.applied += 1,
                Err(err) => report.rejected.push(err),
            }
        }
        report
    }

    /// Writes one cell. Returns whether the stored value changed.
    pub fn apply_update(
        &mut self,
        position: Position,
        value: impl Into<String>,
    ) -> Result<bool, SyncError> {
        let value = value.into();
        let dimensions = self.dimensions();
        if !dimensions.contains(position) {
            return Err(SyncError::OutOfBounds {
                position,
                dimensions,
            });
        }
        if self.grid.value(position) == Some(value.as_str()) {
            return Ok(false);
        }
        Arc::make_mut(&mut self.grid).set(position, value)
    }

    pub fn read(&self) -> Arc<Grid> {
        Arc::clone(&self.grid)
    }
}

#[cfg(test)]
#[path = "tests/grid_store_tests.rs"]
mod tests;
