//! Simulation parameters and physics constants.
//!
//! All derived constants are fixed at construction time. Changing the
//! domain size or target frequency requires building a new solver.

use glam::Vec2;

use crate::error::{Result, SoundfieldError};

/// Physics and analysis constants shared by the solver and analyzer.
pub mod constants {
    /// Speed of sound in air at 20°C (m/s).
    pub const SPEED_OF_SOUND: f32 = 343.21;
    /// Density of air (kg/m³).
    pub const AIR_DENSITY: f32 = 1.2041;
    /// -110 dB converted to linear gain; anything below is inaudible.
    pub const AUDIBLE_THRESHOLD_GAIN: f32 = 3.16e-6;
    /// Number of grid cells per minimum wavelength.
    pub const POINTS_PER_WAVELENGTH: f32 = 3.5;
    /// Window over the first wavefront used for source directivity (s).
    pub const DRY_DIRECTION_ANALYSIS_LENGTH: f32 = 0.005;
    /// Window over the initial pulse used for occlusion (s).
    pub const DRY_GAIN_ANALYSIS_LENGTH: f32 = 0.01;
    /// Window over early reflections used for wet gain (s).
    pub const WET_GAIN_ANALYSIS_LENGTH: f32 = 0.080;
    /// Offset past the direct arrival before the Schroeder tail starts (s).
    pub const SCHROEDER_OFFSET_S: f32 = 0.01;
    /// Delay difference (in samples) below which two arrival times are
    /// treated as equal during direction analysis.
    pub const DELAY_CLOSE_THRESHOLD: i32 = 5;
    /// Seconds of tail collected past the longest direct path.
    pub const RESPONSE_TAIL_S: f32 = 0.25;
}

/// Target simulation frequency presets.
///
/// Higher resolutions resolve higher frequencies at the cost of a finer
/// grid and a higher sampling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Resolution {
    /// 275 Hz — cheapest, suitable for gameplay-scale domains.
    #[default]
    Low = 275,
    /// 375 Hz.
    Mid = 375,
    /// 500 Hz.
    High = 500,
    /// 750 Hz — reference quality.
    Extreme = 750,
}

impl Resolution {
    /// Target frequency in Hz.
    pub fn frequency(self) -> f32 {
        self as u32 as f32
    }
}

/// Derived constants for one acoustic domain.
///
/// The time step is derived from the cell size with a 1.5 safety factor,
/// which keeps the Courant number at 1/1.5 ≈ 0.667, below the 1/√2
/// stability bound of the 2D leapfrog scheme. Stability is therefore
/// structural; nothing checks it at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Target simulation frequency preset.
    pub resolution: Resolution,
    /// Domain extent in meters.
    pub domain_size: Vec2,
    /// Cell size (spatial step) in meters.
    pub cell_size: f32,
    /// Time step in seconds.
    pub dt: f32,
    /// Samples per second of the impulse response.
    pub sampling_rate: u32,
    /// Number of time steps collected per impulse response.
    pub response_length: usize,
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
}

impl SimulationParams {
    /// Derive all constants for a domain of `domain_size` meters.
    pub fn new(domain_size: Vec2, resolution: Resolution) -> Result<Self> {
        if domain_size.x <= 0.0 || domain_size.y <= 0.0 {
            return Err(SoundfieldError::InvalidConfig(format!(
                "domain size must be positive, got {domain_size:?}"
            )));
        }

        let min_wavelength = constants::SPEED_OF_SOUND / resolution.frequency();
        let cell_size = min_wavelength / constants::POINTS_PER_WAVELENGTH;
        let dt = cell_size / (constants::SPEED_OF_SOUND * 1.5);
        let sampling_rate = (1.0 / dt).round() as u32;

        let grid_width = (domain_size.x / cell_size).ceil() as u32;
        let grid_height = (domain_size.y / cell_size).ceil() as u32;

        let diagonal = domain_size.length();
        let response_secs = diagonal / (std::f32::consts::SQRT_2 * constants::SPEED_OF_SOUND)
            + constants::RESPONSE_TAIL_S;
        let response_length = (sampling_rate as f32 * response_secs).round() as usize;

        Ok(Self {
            resolution,
            domain_size,
            cell_size,
            dt,
            sampling_rate,
            response_length,
            grid_width,
            grid_height,
        })
    }

    /// Compute the Courant number (c · dt / dx).
    pub fn courant_number(&self) -> f32 {
        constants::SPEED_OF_SOUND * self.dt / self.cell_size
    }

    /// Check the CFL stability condition for the 2D scheme.
    pub fn is_stable(&self) -> bool {
        self.courant_number() <= 1.0 / std::f32::consts::SQRT_2
    }

    /// Number of cells in one grid plane.
    pub fn plane_size(&self) -> usize {
        (self.grid_width * self.grid_height) as usize
    }

    /// Convert a world position to a grid cell, clamped to grid bounds.
    pub fn to_grid_pos(&self, pos: Vec2) -> (u32, u32) {
        let x = (pos.x / self.cell_size).floor();
        let y = (pos.y / self.cell_size).floor();
        (
            (x.max(0.0) as u32).min(self.grid_width - 1),
            (y.max(0.0) as u32).min(self.grid_height - 1),
        )
    }

    /// Duration in seconds of one impulse response.
    pub fn response_secs(&self) -> f32 {
        self.response_length as f32 / self.sampling_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_resolution_constants() {
        let params = SimulationParams::new(Vec2::new(5.0, 5.0), Resolution::Low).unwrap();
        assert!(
            (params.cell_size - 0.35657).abs() < 1e-4,
            "cell size should be ~0.35657, got {}",
            params.cell_size
        );
        assert!(
            (params.dt - 0.0006926).abs() < 1e-6,
            "dt should be ~0.0006926, got {}",
            params.dt
        );
        assert_eq!(params.sampling_rate, 1444);
    }

    #[test]
    fn test_cell_size_shrinks_with_frequency() {
        let domain = Vec2::new(5.0, 5.0);
        let resolutions = [
            Resolution::Low,
            Resolution::Mid,
            Resolution::High,
            Resolution::Extreme,
        ];
        let sizes: Vec<f32> = resolutions
            .iter()
            .map(|&r| SimulationParams::new(domain, r).unwrap().cell_size)
            .collect();
        for pair in sizes.windows(2) {
            assert!(
                pair[1] < pair[0],
                "cell size must strictly decrease with frequency: {sizes:?}"
            );
        }
    }

    #[test]
    fn test_stability() {
        for res in [
            Resolution::Low,
            Resolution::Mid,
            Resolution::High,
            Resolution::Extreme,
        ] {
            let params = SimulationParams::new(Vec2::new(10.0, 10.0), res).unwrap();
            assert!(params.is_stable(), "{res:?} must satisfy the CFL bound");
        }
    }

    #[test]
    fn test_grid_pos_clamping() {
        let params = SimulationParams::new(Vec2::new(5.0, 5.0), Resolution::Low).unwrap();
        assert_eq!(params.to_grid_pos(Vec2::new(-10.0, -10.0)), (0, 0));
        let (x, y) = params.to_grid_pos(Vec2::new(100.0, 100.0));
        assert_eq!(x, params.grid_width - 1);
        assert_eq!(y, params.grid_height - 1);
    }

    #[test]
    fn test_invalid_domain_rejected() {
        assert!(SimulationParams::new(Vec2::new(0.0, 5.0), Resolution::Low).is_err());
        assert!(SimulationParams::new(Vec2::new(5.0, -1.0), Resolution::Low).is_err());
    }
}
