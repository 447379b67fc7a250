//! # Soundfield
//!
//! Geometry-aware room acoustics for real-time applications.
//!
//! A 2D FDTD (Finite-Difference Time-Domain) solver propagates a pulse
//! from the listener through the walkable plane of a scene, an analyzer
//! reduces each cell's impulse response to perceptual parameters
//! (occlusion, wet gain, RT60, arrival direction), and a scheduler
//! re-simulates only when the listener crosses a grid cell or geometry
//! changes, publishing results as immutable snapshots.
//!
//! ```no_run
//! use glam::Vec2;
//! use soundfield::{AcousticDomain, Aabb, Material, Resolution, SimulationParams};
//!
//! # fn main() -> soundfield::Result<()> {
//! let params = SimulationParams::new(Vec2::new(10.0, 10.0), Resolution::Low)?;
//! let mut domain = AcousticDomain::new(params);
//!
//! let wall = domain.add_geometry(Aabb::new(
//!     Vec2::new(5.0, 5.0),
//!     2.0,
//!     0.3,
//!     Material::BrickUnglazed.absorption(),
//! ));
//! assert!(wall.is_some());
//! domain.set_listener_pos(Vec2::new(2.0, 2.0));
//! domain.update();
//!
//! let heard = domain.snapshot().result_at(Vec2::new(8.0, 8.0));
//! println!("occlusion behind the wall: {}", heard.occlusion);
//! # Ok(())
//! # }
//! ```
//!
//! The CPU solver is always available; the `wgpu` feature adds a
//! numerically equivalent GPU compute backend.

pub mod analyzer;
pub mod config;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod materials;
pub mod scheduler;
pub mod solver;

pub use analyzer::{Analyzer, AnalyzerResult};
pub use config::{constants, Resolution, SimulationParams};
pub use dsp::{AudioDsp, DspConfig, EmitterId, ReverbBus, SourceDirectivityPattern};
pub use error::{Result, SoundfieldError};
pub use geometry::{Aabb, GeometryId};
pub use materials::Material;
pub use scheduler::{AcousticDomain, AcousticSnapshot, BackgroundScheduler, SchedulerState};
pub use solver::{Cell, CpuSolver, ResponseView, WaveSolver};

#[cfg(feature = "wgpu")]
pub use solver::WgpuSolver;
