//! FDTD wave solver for the 2D acoustic wave equation.
//!
//! The solver advances a pressure/velocity leapfrog scheme over a dense
//! grid and accumulates every time step into a persistent response
//! buffer laid out `[t][y][x]`. Backends share the numerical scheme:
//! the CPU backend in [`cpu`] and the wgpu compute backend in [`wgpu`]
//! must agree within a small per-cell tolerance so callers can swap
//! them transparently.

mod cpu;
#[cfg(feature = "wgpu")]
mod wgpu;

pub use cpu::CpuSolver;
#[cfg(feature = "wgpu")]
pub use wgpu::WgpuSolver;

use glam::Vec2;

use crate::config::SimulationParams;
use crate::geometry::{Aabb, GeometryId};

/// One grid node of the simulation state.
///
/// `bx` and `by` are per-face boundary flags: 1 while the face is open
/// air, 0 where geometry covers the cell. The matching absorption
/// coefficient lives in the solver's boundary plane. 16 bytes, matching
/// the GPU buffer layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "wgpu", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct Cell {
    /// Air pressure.
    pub pressure: f32,
    /// x component of particle velocity, stored at the cell's +x face.
    pub vel_x: f32,
    /// y component of particle velocity, stored at the cell's +y face.
    pub vel_y: f32,
    /// Boundary flag for the x faces (1 = open).
    pub bx: u16,
    /// Boundary flag for the y faces (1 = open).
    pub by: u16,
}

impl Cell {
    /// A cell of open air at rest.
    pub const OPEN: Cell = Cell {
        pressure: 0.0,
        vel_x: 0.0,
        vel_y: 0.0,
        bx: 1,
        by: 1,
    };
}

impl Default for Cell {
    fn default() -> Self {
        Self::OPEN
    }
}

/// Per-cell boundary absorption, painted by geometry footprints.
///
/// 0 is fully reflective, values toward 1 increasingly absorptive.
/// Kept as a plain plane of floats; the two-flags-plus-coefficient
/// split is what the GPU transfers.
pub type BoundaryPlane = Vec<f32>;

/// Borrowed view over a completed response grid.
///
/// Indexing follows the solver layout: `t * plane + y * width + x`.
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    cells: &'a [Cell],
    width: u32,
    height: u32,
    response_length: usize,
}

impl<'a> ResponseView<'a> {
    pub(crate) fn new(cells: &'a [Cell], width: u32, height: u32, response_length: usize) -> Self {
        debug_assert_eq!(cells.len(), (width * height) as usize * response_length);
        Self {
            cells,
            width,
            height,
            response_length,
        }
    }

    /// Grid width in cells.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of time steps per cell.
    pub fn response_length(&self) -> usize {
        self.response_length
    }

    /// Cell state at `(x, y)` and time step `t`. Coordinates are
    /// clamped to the grid, never out of range.
    pub fn cell(&self, x: u32, y: u32, t: usize) -> &Cell {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let t = t.min(self.response_length - 1);
        let plane = (self.width * self.height) as usize;
        &self.cells[t * plane + y * self.width as usize + x]
    }

    /// Iterate the time series of one grid cell.
    pub fn time_series(&self, x: u32, y: u32) -> impl Iterator<Item = &'a Cell> + '_ {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let plane = (self.width * self.height) as usize;
        let start = y * self.width as usize + x;
        self.cells[start..].iter().step_by(plane)
    }

    /// The raw cell slice, plane-major.
    pub fn raw(&self) -> &'a [Cell] {
        self.cells
    }
}

/// Precompute the Gaussian source pulse injected at the listener cell.
///
/// The pulse is centered `2σ` after t=0 with `σ` tuned to the target
/// frequency, so injection effectively lasts only the first few steps.
pub(crate) fn gaussian_pulse(params: &SimulationParams) -> Vec<f32> {
    let sigma = 1.0 / (0.5 * std::f32::consts::PI * params.resolution.frequency());
    let delay = 2.0 * sigma;
    let dt = 1.0 / params.sampling_rate as f32;
    (0..params.response_length)
        .map(|i| {
            let t = i as f32 * dt;
            (-(t - delay) * (t - delay) / (sigma * sigma)).exp()
        })
        .collect()
}

/// Continuation state of an incremental solver run.
///
/// The listener cell is latched when a run begins and stays immutable
/// until the run completes; `cursor` is the next time step to compute.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunState {
    pub cursor: usize,
    pub listener_cell: Option<(u32, u32)>,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            cursor: 0,
            listener_cell: None,
        }
    }

    pub fn in_progress(&self, response_length: usize) -> bool {
        self.listener_cell.is_some() && self.cursor < response_length
    }
}

/// Common contract of the FDTD backends.
pub trait WaveSolver: Send {
    /// Derived constants of this solver instance.
    fn params(&self) -> &SimulationParams;

    /// Append a geometry record and queue its first paint. Returns
    /// `None` for bounds entirely outside the domain.
    fn add_geometry(&mut self, bounds: Aabb) -> Option<GeometryId>;

    /// Queue new bounds for `id`. Invalid ids are a no-op.
    fn update_geometry(&mut self, id: GeometryId, bounds: Aabb);

    /// Queue removal of `id`. Invalid ids and double removal are no-ops.
    fn remove_geometry(&mut self, id: GeometryId);

    /// True while `id` refers to applied, present geometry.
    fn is_geometry_valid(&self, id: GeometryId) -> bool;

    /// Apply all queued geometry changes in id order. Returns whether
    /// any boundary cell changed.
    fn process_geometry_updates(&mut self) -> bool;

    /// Begin a response run with the pulse injected at `listener`.
    ///
    /// If a previous incremental run has not finished, its remaining
    /// steps are force-completed first; a partial response is never
    /// dropped.
    fn generate_response(&mut self, listener: Vec2);

    /// Advance an in-progress run by at most the per-tick step budget.
    fn tick(&mut self);

    /// True while an incremental run still has steps left.
    fn run_in_progress(&self) -> bool;

    /// The completed response grid. Force-completes an unfinished run.
    fn response(&mut self) -> ResponseView<'_>;

    /// Number of time steps per response.
    fn response_length(&self) -> usize {
        self.params().response_length
    }

    /// Grid extent in cells.
    fn grid_size_in_cells(&self) -> (u32, u32) {
        (self.params().grid_width, self.params().grid_height)
    }

    /// Cell size in meters.
    fn cell_size(&self) -> f32 {
        self.params().cell_size
    }

    /// World position to clamped grid cell.
    fn to_grid_pos(&self, pos: Vec2) -> (u32, u32) {
        self.params().to_grid_pos(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    #[test]
    fn test_cell_layout() {
        assert_eq!(std::mem::size_of::<Cell>(), 16);
        let cell = Cell::default();
        assert_eq!(cell.bx, 1);
        assert_eq!(cell.by, 1);
    }

    #[test]
    fn test_gaussian_pulse_shape() {
        let params = SimulationParams::new(Vec2::new(5.0, 5.0), Resolution::Low).unwrap();
        let pulse = gaussian_pulse(&params);
        assert_eq!(pulse.len(), params.response_length);

        // Peak sits a few samples in, and the tail is effectively zero.
        let peak = pulse
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert!(*peak.1 > 0.99, "peak should reach the unit amplitude");
        assert!(peak.0 > 0 && peak.0 < 20, "peak should be near the start");
        assert!(pulse[params.response_length / 2] < 1e-6);
    }

    #[test]
    fn test_run_state() {
        let mut run = RunState::idle();
        assert!(!run.in_progress(100));
        run.listener_cell = Some((3, 3));
        assert!(run.in_progress(100));
        run.cursor = 100;
        assert!(!run.in_progress(100));
    }
}
