//! Perceptual analysis of simulated impulse responses.
//!
//! The analyzer reduces each cell's pressure time series to a handful
//! of rendering parameters: occlusion of the direct path, wet gain of
//! early reflections, reverberation time, and arrival directions. The
//! pulse is injected at the listener cell, so by reciprocity the series
//! at any cell describes a source placed there as heard by the
//! listener.
//!
//! Energies are normalized against a free-field calibration run so the
//! numbers are comparable across domain sizes and resolutions.

use glam::Vec2;
use rayon::prelude::*;

use crate::config::{constants, SimulationParams};
use crate::solver::{CpuSolver, ResponseView, WaveSolver};

/// Delay value marking a cell where the pulse never rose above the
/// audibility threshold.
const SILENT: usize = usize::MAX;

/// Perceptual parameters for a source at one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerResult {
    /// Direct-path energy relative to the free field, distance
    /// factored out. 1 in an empty domain, toward 0 behind obstacles.
    pub occlusion: f32,
    /// Gain of the early-reflection window, distance factored out.
    pub wet_gain: f32,
    /// Reverberation time in seconds (60 dB decay of the tail).
    pub rt60: f32,
    /// How much low-frequency content survives the direct path.
    /// Diffraction passes lows around obstacles that block highs, so
    /// this rises as occlusion falls.
    pub lowpass_intensity: f32,
    /// Unit vector the first wavefront arrived from, in world space.
    /// Zero when no direction could be resolved.
    pub direction: Vec2,
    /// Net intensity flux direction at the cell over the first
    /// wavefront, indicating which way a source there radiates toward
    /// the listener.
    pub source_directivity: Vec2,
}

impl Default for AnalyzerResult {
    fn default() -> Self {
        Self {
            occlusion: 0.0,
            wet_gain: 0.0,
            rt60: 0.0,
            lowpass_intensity: 1.0,
            direction: Vec2::ZERO,
            source_directivity: Vec2::ZERO,
        }
    }
}

/// Impulse-response analyzer for one acoustic domain.
pub struct Analyzer {
    params: SimulationParams,
    /// Distance-normalized free-field dry energy, the unit for
    /// occlusion and wet gain.
    e_free: f32,
    results: Vec<AnalyzerResult>,
    delays: Vec<usize>,
}

impl Analyzer {
    /// Create an analyzer, running the free-field calibration solve.
    pub fn new(params: SimulationParams) -> Self {
        let e_free = Self::calibrate(params);
        tracing::debug!(e_free, "free-field calibration complete");
        Self {
            params,
            e_free,
            results: vec![AnalyzerResult::default(); params.plane_size()],
            delays: vec![SILENT; params.plane_size()],
        }
    }

    /// Measure the dry energy of an unobstructed pulse at a reference
    /// distance, times that distance. In 2D the product is constant
    /// over distance, so it serves as the free-field unit.
    fn calibrate(params: SimulationParams) -> f32 {
        let center = params.domain_size * 0.5;
        // Probe 1 m toward +x, pulled in for domains smaller than that.
        let probe_dist = 1.0f32.min(params.domain_size.x * 0.25).max(params.cell_size);
        let probe = center + Vec2::new(probe_dist, 0.0);

        let mut solver = CpuSolver::new(params);
        solver.generate_response(center);
        let view = solver.response();

        let (px, py) = params.to_grid_pos(probe);
        let series: Vec<f32> = view.time_series(px, py).map(|c| c.pressure).collect();
        let onset = onset_delay(&series);
        if onset == SILENT {
            tracing::warn!("calibration pulse inaudible at probe; using unit energy");
            return 1.0;
        }
        let dry = window_energy(&series, onset, dry_gain_samples(&params));
        dry * probe_dist
    }

    fn dry_direction_samples(&self) -> usize {
        samples(&self.params, constants::DRY_DIRECTION_ANALYSIS_LENGTH)
    }

    fn wet_gain_samples(&self) -> usize {
        samples(&self.params, constants::WET_GAIN_ANALYSIS_LENGTH)
    }

    /// Analyze a completed response. `listener` is the world position
    /// the pulse was injected at.
    pub fn analyze(&mut self, view: &ResponseView<'_>, listener: Vec2) {
        let width = self.params.grid_width as usize;
        let (lx, ly) = self.params.to_grid_pos(listener);
        let cell_size = self.params.cell_size;
        let dry_samples = dry_gain_samples(&self.params);
        let direction_samples = self.dry_direction_samples();
        let wet_samples = self.wet_gain_samples();
        let schroeder_offset = samples(&self.params, constants::SCHROEDER_OFFSET_S);
        let dt = 1.0 / self.params.sampling_rate as f32;
        let e_free = self.e_free;

        self.results
            .par_chunks_mut(width)
            .zip(self.delays.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (result_row, delay_row))| {
                for x in 0..width {
                    let series: Vec<f32> = view
                        .time_series(x as u32, y as u32)
                        .map(|c| c.pressure)
                        .collect();
                    let onset = onset_delay(&series);
                    delay_row[x] = onset;
                    if onset == SILENT {
                        result_row[x] = AnalyzerResult::default();
                        continue;
                    }

                    // Distance from the listener, floored to one cell
                    // so the listener's own cell stays finite.
                    let dx = x as f32 - lx as f32;
                    let dy = y as f32 - ly as f32;
                    let r = (cell_size * (dx * dx + dy * dy).sqrt()).max(cell_size);

                    let dry = window_energy(&series, onset, dry_samples);
                    let wet = window_energy(&series, onset + dry_samples, wet_samples);
                    let occlusion = dry * r / e_free;
                    let wet_gain = (wet * r / e_free).sqrt();

                    let mut flux = Vec2::ZERO;
                    for t in onset..(onset + direction_samples).min(series.len()) {
                        let cell = view.cell(x as u32, y as u32, t);
                        flux += cell.pressure * Vec2::new(cell.vel_x, cell.vel_y);
                    }

                    result_row[x] = AnalyzerResult {
                        occlusion,
                        wet_gain,
                        rt60: schroeder_rt60(&series, onset + schroeder_offset, dt),
                        lowpass_intensity: 1.0 - occlusion.clamp(0.0, 1.0),
                        direction: Vec2::ZERO,
                        source_directivity: flux.normalize_or_zero(),
                    };
                }
            });

        self.fill_directions();
    }

    /// Second pass: arrival directions from the gradient of the delay
    /// field. A component is dropped when its two neighbors arrived
    /// within [`constants::DELAY_CLOSE_THRESHOLD`] samples of each
    /// other, which happens at wavefront ridges where the gradient is
    /// meaningless.
    fn fill_directions(&mut self) {
        let width = self.params.grid_width as usize;
        let height = self.params.grid_height as usize;
        let delays = &self.delays;
        // One cell is ~1.5 samples of travel time, so the gradient is
        // sampled a few cells out to clear the closeness threshold on
        // a genuine wavefront.
        let radius = 3usize;

        let delta = |a: usize, b: usize| -> f32 {
            let (da, db) = (delays[a], delays[b]);
            if da == SILENT || db == SILENT {
                return 0.0;
            }
            let diff = da as i64 - db as i64;
            if diff.unsigned_abs() < constants::DELAY_CLOSE_THRESHOLD as u64 {
                return 0.0;
            }
            diff as f32
        };

        self.results
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, result) in row.iter_mut().enumerate() {
                    if delays[y * width + x] == SILENT {
                        continue;
                    }
                    let xm = x.saturating_sub(radius);
                    let xp = (x + radius).min(width - 1);
                    let ym = y.saturating_sub(radius);
                    let yp = (y + radius).min(height - 1);
                    // Toward decreasing delay: the way the wavefront
                    // came from.
                    let gx = delta(y * width + xm, y * width + xp);
                    let gy = delta(ym * width + x, yp * width + x);
                    result.direction = Vec2::new(gx, gy).normalize_or_zero();
                }
            });
    }

    /// Result for a source at a world position, clamped to the domain.
    pub fn result_at(&self, pos: Vec2) -> AnalyzerResult {
        let (x, y) = self.params.to_grid_pos(pos);
        self.results[y as usize * self.params.grid_width as usize + x as usize]
    }

    /// Onset delay in samples for a source at a world position, or
    /// `None` where the pulse was inaudible.
    pub fn delay_at(&self, pos: Vec2) -> Option<usize> {
        let (x, y) = self.params.to_grid_pos(pos);
        let d = self.delays[y as usize * self.params.grid_width as usize + x as usize];
        (d != SILENT).then_some(d)
    }

    /// The full result plane, row-major.
    pub fn results(&self) -> &[AnalyzerResult] {
        &self.results
    }
}

fn samples(params: &SimulationParams, seconds: f32) -> usize {
    (params.sampling_rate as f32 * seconds).round() as usize
}

fn dry_gain_samples(params: &SimulationParams) -> usize {
    samples(params, constants::DRY_GAIN_ANALYSIS_LENGTH)
}

/// First sample index where the response rises above the audibility
/// threshold, or [`SILENT`].
fn onset_delay(series: &[f32]) -> usize {
    series
        .iter()
        .position(|p| p.abs() > constants::AUDIBLE_THRESHOLD_GAIN)
        .unwrap_or(SILENT)
}

/// Sum of squared pressure over `len` samples starting at `start`,
/// clipped to the series.
fn window_energy(series: &[f32], start: usize, len: usize) -> f32 {
    let start = start.min(series.len());
    let end = (start + len).min(series.len());
    series[start..end].iter().map(|p| p * p).sum()
}

/// Reverberation time from backward-integrated energy decay.
///
/// The Schroeder curve is fitted with least squares over its usable
/// range (down to -60 dB) and extrapolated to a full 60 dB decay.
/// Returns 0 when the tail carries no energy or does not decay.
fn schroeder_rt60(series: &[f32], start: usize, dt: f32) -> f32 {
    if start + 2 > series.len() {
        return 0.0;
    }
    let mut schroeder: Vec<f64> = series[start..].iter().map(|&p| (p as f64).powi(2)).collect();
    for i in (0..schroeder.len() - 1).rev() {
        schroeder[i] += schroeder[i + 1];
    }
    let total = schroeder[0];
    if total <= 0.0 {
        return 0.0;
    }

    // Least-squares fit of dB over time, stopping at the -60 dB floor.
    let mut n = 0.0f64;
    let (mut sum_t, mut sum_d, mut sum_tt, mut sum_td) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for (i, &s) in schroeder.iter().enumerate() {
        if s <= 0.0 {
            break;
        }
        let db = 10.0 * (s / total).log10();
        if db < -60.0 {
            break;
        }
        let t = i as f64 * dt as f64;
        n += 1.0;
        sum_t += t;
        sum_d += db;
        sum_tt += t * t;
        sum_td += t * db;
    }
    if n < 2.0 {
        return 0.0;
    }
    let denom = n * sum_tt - sum_t * sum_t;
    if denom <= 0.0 {
        return 0.0;
    }
    let slope = (n * sum_td - sum_t * sum_d) / denom;
    if slope >= 0.0 {
        return 0.0;
    }
    (-60.0 / slope) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::geometry::Aabb;
    use crate::materials::Material;

    fn analyzed_empty() -> (Analyzer, SimulationParams) {
        let params = SimulationParams::new(Vec2::new(6.0, 6.0), Resolution::Low).unwrap();
        let listener = Vec2::new(3.0, 3.0);
        let mut solver = CpuSolver::new(params);
        solver.generate_response(listener);
        let mut analyzer = Analyzer::new(params);
        analyzer.analyze(&solver.response(), listener);
        (analyzer, params)
    }

    #[test]
    fn test_free_field_occlusion_near_unity() {
        let (analyzer, _) = analyzed_empty();
        // Same distance and geometry as the calibration probe.
        let result = analyzer.result_at(Vec2::new(4.0, 3.0));
        assert!(
            (result.occlusion - 1.0).abs() < 0.3,
            "free-field occlusion should sit near 1, got {}",
            result.occlusion
        );
    }

    #[test]
    fn test_delay_grows_with_distance() {
        let (analyzer, _) = analyzed_empty();
        let near = analyzer.delay_at(Vec2::new(3.8, 3.0)).unwrap();
        let far = analyzer.delay_at(Vec2::new(5.5, 3.0)).unwrap();
        assert!(far > near, "farther sources must arrive later: {near} vs {far}");
    }

    #[test]
    fn test_direction_points_back_at_listener() {
        let (analyzer, _) = analyzed_empty();
        // East of the listener, the wavefront arrives from the west.
        let result = analyzer.result_at(Vec2::new(5.0, 3.0));
        assert!(
            result.direction.x < -0.5,
            "direction should point toward the listener, got {:?}",
            result.direction
        );
    }

    #[test]
    fn test_obstacle_lowers_occlusion() {
        let params = SimulationParams::new(Vec2::new(6.0, 6.0), Resolution::Low).unwrap();
        let listener = Vec2::new(1.0, 3.0);
        let source = Vec2::new(5.0, 3.0);

        let mut open = CpuSolver::new(params);
        open.generate_response(listener);
        let mut analyzer = Analyzer::new(params);
        analyzer.analyze(&open.response(), listener);
        let unblocked = analyzer.result_at(source);

        let mut blocked = CpuSolver::new(params);
        blocked.add_geometry(Aabb::new(
            Vec2::new(3.0, 3.0),
            0.8,
            3.0,
            Material::Default.absorption(),
        ));
        blocked.process_geometry_updates();
        blocked.generate_response(listener);
        analyzer.analyze(&blocked.response(), listener);
        let occluded = analyzer.result_at(source);

        assert!(
            occluded.occlusion < unblocked.occlusion,
            "a wall must reduce direct energy: {} !< {}",
            occluded.occlusion,
            unblocked.occlusion
        );
        assert!(
            occluded.lowpass_intensity > unblocked.lowpass_intensity,
            "stronger occlusion must filter more highs"
        );
    }

    #[test]
    fn test_silent_inside_geometry() {
        let params = SimulationParams::new(Vec2::new(6.0, 6.0), Resolution::Low).unwrap();
        let listener = Vec2::new(1.0, 3.0);
        let mut solver = CpuSolver::new(params);
        solver.add_geometry(Aabb::new(
            Vec2::new(4.5, 4.5),
            1.5,
            1.5,
            Material::Default.absorption(),
        ));
        solver.process_geometry_updates();
        solver.generate_response(listener);

        let mut analyzer = Analyzer::new(params);
        analyzer.analyze(&solver.response(), listener);
        assert!(analyzer.delay_at(Vec2::new(4.5, 4.5)).is_none());
        assert_eq!(
            analyzer.result_at(Vec2::new(4.5, 4.5)),
            AnalyzerResult::default()
        );
    }

    #[test]
    fn test_rt60_nonnegative_and_finite() {
        let (analyzer, params) = analyzed_empty();
        for result in analyzer.results() {
            assert!(result.rt60.is_finite());
            assert!(result.rt60 >= 0.0);
            // An open domain with absorbing edges cannot ring for
            // longer than a few response lengths.
            assert!(result.rt60 < params.response_secs() * 100.0);
        }
    }

    #[test]
    fn test_schroeder_of_pure_decay() {
        // Exponential decay with a known rate: -27.28 dB/s in energy.
        let dt = 1.0 / 1000.0;
        let series: Vec<f32> = (0..4000)
            .map(|i| (-(i as f32) * dt * std::f32::consts::PI).exp())
            .collect();
        let rt = schroeder_rt60(&series, 0, dt);
        let expected = 60.0 / (20.0 * std::f32::consts::PI * std::f32::consts::LOG10_E);
        assert!(
            (rt - expected).abs() / expected < 0.15,
            "rt60 {} should approximate {}",
            rt,
            expected
        );
    }
}
