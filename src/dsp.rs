//! Interface to an external audio DSP engine.
//!
//! The crate never touches raw audio samples; it hands an implementor
//! of [`AudioDsp`] the per-source [`AnalyzerResult`] plus positions and
//! orientations, and the implementor does the actual convolution,
//! spatialization and mixing. Everything here is types and a trait.

use glam::Vec2;

use crate::analyzer::AnalyzerResult;

/// Identifier for a registered sound emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmitterId(pub u32);

/// Radiation pattern applied to a source before the simulated
/// directivity is mixed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceDirectivityPattern {
    /// Uniform radiation in all directions.
    #[default]
    Omni,
    /// Heart-shaped pattern favoring the emitter's forward vector.
    Cardioid,
}

/// Output bus of the DSP engine. The dry bus carries unprocessed
/// direct sound; the lettered buses carry reverb tails of increasing
/// decay time, fed proportionally to each source's `rt60`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReverbBus {
    Dry,
    A,
    B,
    C,
}

impl ReverbBus {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            ReverbBus::Dry => 0,
            ReverbBus::A => 1,
            ReverbBus::B => 2,
            ReverbBus::C => 3,
        }
    }
}

/// Configuration handed to a DSP engine at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DspConfig {
    /// Audio engine sampling rate, usually 44100 or 48000.
    pub sampling_rate: u32,
    /// Maximum length of one audio callback in frames, usually a
    /// power of two.
    pub max_callback_length: usize,
    /// Number of callbacks over which parameter changes are smoothed.
    pub smoothing_factor: u32,
    /// How much the reverberant buses contribute to the final mix.
    pub wet_gain_ratio: f32,
    /// Whether the DSP spatializes sources itself or leaves panning
    /// to the caller.
    pub use_spatialization: bool,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 48_000,
            max_callback_length: 4096,
            smoothing_factor: 2,
            wet_gain_ratio: 1.0,
            use_spatialization: true,
        }
    }
}

/// Contract of an external audio DSP engine (consumed, not implemented
/// by this crate).
pub trait AudioDsp {
    /// Update the listener's position and facing.
    fn set_listener_pos(&mut self, pos: Vec2, forward: Vec2);

    /// Register a new emitter, returning its id.
    fn register_emitter(&mut self, pos: Vec2, forward: Vec2) -> EmitterId;

    /// Move or reorient an emitter. Unknown ids are a no-op.
    fn update_emitter(&mut self, id: EmitterId, pos: Vec2, forward: Vec2);

    /// Unregister an emitter. Unknown ids are a no-op.
    fn remove_emitter(&mut self, id: EmitterId);

    /// Choose the emitter's base radiation pattern.
    fn set_emitter_directivity_pattern(&mut self, id: EmitterId, pattern: SourceDirectivityPattern);

    /// Feed one emitter's dry samples along with its current acoustic
    /// parameters. `samples` is interleaved with `channel_count`
    /// channels.
    fn send_source(
        &mut self,
        id: EmitterId,
        result: &AnalyzerResult,
        samples: &[f32],
        channel_count: usize,
    );

    /// Fetch the mixed output of one bus for the current callback.
    fn get_output(&mut self, bus: ReverbBus) -> &[f32];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_indices_are_dense() {
        let buses = [ReverbBus::Dry, ReverbBus::A, ReverbBus::B, ReverbBus::C];
        for (expected, bus) in buses.iter().enumerate() {
            assert_eq!(bus.index(), expected);
        }
        assert_eq!(buses.len(), ReverbBus::COUNT);
    }

    #[test]
    fn test_default_config_sane() {
        let config = DspConfig::default();
        assert!(config.max_callback_length.is_power_of_two());
        assert!(config.wet_gain_ratio > 0.0);
    }
}
