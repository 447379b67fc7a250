//! wgpu compute backend for the FDTD solver.
//!
//! The whole time-indexed response grid lives in one GPU storage buffer
//! and each dispatch writes plane `t` from plane `t - 1`, mirroring the
//! CPU backend's arithmetic operation for operation. Host transfers
//! happen only when geometry is painted (small rect dispatches) and
//! when the finished response is read back.

use std::sync::Arc;

use glam::Vec2;
use wgpu::util::DeviceExt;

use crate::config::SimulationParams;
use crate::error::{Result, SoundfieldError};
use crate::geometry::{Aabb, BoundaryEdit, GeometryId, GeometryStore};

use super::{gaussian_pulse, Cell, ResponseView, RunState, WaveSolver};

/// WGSL shader for clearing plane 0 and stepping the wave equation.
const WGSL_STEP_SHADER: &str = r#"
struct Cell {
    pressure: f32,
    vel_x: f32,
    vel_y: f32,
    // Boundary flags: bx in the low 16 bits, by in the high 16 bits.
    b: u32,
}

struct StepParams {
    width: u32,
    height: u32,
    t: u32,
    listener_x: u32,
    listener_y: u32,
    courant: f32,
    pulse: f32,
    _pad: u32,
}

@group(0) @binding(0) var<uniform> params: StepParams;
@group(0) @binding(1) var<storage, read_write> grid: array<Cell>;
@group(0) @binding(2) var<storage, read> absorption: array<f32>;

fn bx_of(i: u32) -> f32 { return f32(grid[i].b & 0xffffu); }
fn by_of(i: u32) -> f32 { return f32(grid[i].b >> 16u); }

// New x-velocity at the face between (x, y) and (x + 1, y), read from
// the plane starting at `prev`. Faces against closed cells or the
// domain edge follow the locally reacting boundary condition with the
// edge fully absorbing.
fn face_vx(prev: u32, x: i32, y: i32) -> f32 {
    var p_c = 0.0;
    var p_n = 0.0;
    var b = 0.0;
    var beta = 1.0;
    var v = 0.0;
    let has_c = x >= 0;
    let has_n = x + 1 < i32(params.width);
    if (has_c) {
        let cell = u32(y) * params.width + u32(x);
        p_c = grid[prev + cell].pressure;
        v = grid[prev + cell].vel_x;
        if (has_n) {
            p_n = grid[prev + cell + 1u].pressure;
            b = bx_of(prev + cell) * bx_of(prev + cell + 1u);
            beta = max(absorption[cell], absorption[cell + 1u]);
        }
    } else if (has_n) {
        p_n = grid[prev + u32(y) * params.width].pressure;
    }
    let grad = p_n - p_c;
    return b * (v - params.courant * grad) - (1.0 - b) * beta * grad;
}

// New y-velocity at the face between (x, y) and (x, y + 1).
fn face_vy(prev: u32, x: i32, y: i32) -> f32 {
    var p_c = 0.0;
    var p_n = 0.0;
    var b = 0.0;
    var beta = 1.0;
    var v = 0.0;
    let has_c = y >= 0;
    let has_n = y + 1 < i32(params.height);
    if (has_c) {
        let cell = u32(y) * params.width + u32(x);
        p_c = grid[prev + cell].pressure;
        v = grid[prev + cell].vel_y;
        if (has_n) {
            let n = cell + params.width;
            p_n = grid[prev + n].pressure;
            b = by_of(prev + cell) * by_of(prev + n);
            beta = max(absorption[cell], absorption[n]);
        }
    } else if (has_n) {
        p_n = grid[prev + u32(x)].pressure;
    }
    let grad = p_n - p_c;
    return b * (v - params.courant * grad) - (1.0 - b) * beta * grad;
}

// Step 0: clear pressure and velocity in plane 0, keep boundary flags.
@compute @workgroup_size(256)
fn clear_plane(@builtin(global_invocation_id) gid: vec3u) {
    let i = gid.x;
    if (i >= params.width * params.height) {
        return;
    }
    grid[i].pressure = 0.0;
    grid[i].vel_x = 0.0;
    grid[i].vel_y = 0.0;
}

// Write plane t from plane t - 1.
@compute @workgroup_size(16, 16)
fn step(@builtin(global_invocation_id) gid: vec3u) {
    let x = gid.x;
    let y = gid.y;
    if (x >= params.width || y >= params.height) {
        return;
    }
    let plane = params.width * params.height;
    let prev = (params.t - 1u) * plane;
    let ci = prev + y * params.width + x;
    let c = grid[ci];

    let xi = i32(x);
    let yi = i32(y);
    let vx_r = face_vx(prev, xi, yi);
    let vx_l = face_vx(prev, xi - 1, yi);
    let vy_u = face_vy(prev, xi, yi);
    let vy_d = face_vy(prev, xi, yi - 1);

    let divergence = (vx_r - vx_l) + (vy_u - vy_d);
    let open = bx_of(ci) * by_of(ci);
    var pressure = open * (c.pressure - params.courant * divergence);
    if (x == params.listener_x && y == params.listener_y) {
        pressure = pressure + params.pulse;
    }

    var out: Cell;
    out.pressure = pressure;
    out.vel_x = vx_r;
    out.vel_y = vy_u;
    out.b = c.b;
    grid[params.t * plane + y * params.width + x] = out;
}
"#;

/// Separate shader for geometry rects (absorption is written here).
const WGSL_RECT_SHADER: &str = r#"
struct Cell {
    pressure: f32,
    vel_x: f32,
    vel_y: f32,
    b: u32,
}

struct RectParams {
    // Inclusive footprint bounds.
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    width: u32,
    // 1 restores open air, 0 closes the cells.
    open: u32,
    absorption: f32,
    _pad: u32,
}

@group(0) @binding(0) var<uniform> rect: RectParams;
@group(0) @binding(1) var<storage, read_write> grid: array<Cell>;
@group(0) @binding(2) var<storage, read_write> absorption: array<f32>;

@compute @workgroup_size(16, 16)
fn paint_rect(@builtin(global_invocation_id) gid: vec3u) {
    let x = rect.min_x + gid.x;
    let y = rect.min_y + gid.y;
    if (x > rect.max_x || y > rect.max_y) {
        return;
    }
    let i = y * rect.width + x;
    grid[i].b = rect.open | (rect.open << 16u);
    absorption[i] = rect.absorption;
}
"#;

/// Uniforms for the step shader (must match the WGSL struct layout).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct StepParams {
    width: u32,
    height: u32,
    t: u32,
    listener_x: u32,
    listener_y: u32,
    courant: f32,
    pulse: f32,
    _pad: u32,
}

/// Uniforms for the rect shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RectParams {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    width: u32,
    open: u32,
    absorption: f32,
    _pad: u32,
}

/// GPU FDTD solver. Created asynchronously; all stepping is
/// fire-and-forget queue submission until the response is read back.
pub struct WgpuSolver {
    params: SimulationParams,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    step_pipeline: wgpu::ComputePipeline,
    clear_pipeline: wgpu::ComputePipeline,
    step_bind_group_layout: wgpu::BindGroupLayout,
    rect_pipeline: wgpu::ComputePipeline,
    rect_bind_group_layout: wgpu::BindGroupLayout,
    /// Full time-indexed response grid, GPU resident.
    grid_buffer: wgpu::Buffer,
    absorption_buffer: wgpu::Buffer,
    /// Host mirror, refreshed on readback.
    response: Vec<Cell>,
    /// True while the GPU grid is newer than the host mirror.
    host_stale: bool,
    geometry: GeometryStore,
    pulse: Vec<f32>,
    run: RunState,
    time_steps_per_tick: Option<usize>,
}

impl WgpuSolver {
    /// Create a solver on the best available adapter.
    pub async fn new(params: SimulationParams) -> Result<Self> {
        let plane = params.plane_size();
        let grid_bytes = (plane * params.response_length * std::mem::size_of::<Cell>()) as u64;
        let limits = wgpu::Limits::default();
        if grid_bytes > limits.max_storage_buffer_binding_size as u64 {
            return Err(SoundfieldError::InvalidConfig(format!(
                "response grid of {} bytes exceeds the GPU storage binding limit",
                grid_bytes
            )));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                SoundfieldError::BackendUnavailable("No WebGPU adapter found".to_string())
            })?;

        let info = adapter.get_info();
        tracing::info!("wgpu solver backend: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Soundfield Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                },
                None,
            )
            .await
            .map_err(|e| SoundfieldError::BackendError(format!("Failed to create device: {}", e)))?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let step_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Step Shader"),
            source: wgpu::ShaderSource::Wgsl(WGSL_STEP_SHADER.into()),
        });

        let step_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Step Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let step_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Step Pipeline Layout"),
            bind_group_layouts: &[&step_bind_group_layout],
            push_constant_ranges: &[],
        });

        let step_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Step Pipeline"),
            layout: Some(&step_pipeline_layout),
            module: &step_module,
            entry_point: "step",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let clear_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Clear Plane Pipeline"),
            layout: Some(&step_pipeline_layout),
            module: &step_module,
            entry_point: "clear_plane",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let rect_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Rect Shader"),
            source: wgpu::ShaderSource::Wgsl(WGSL_RECT_SHADER.into()),
        });

        let rect_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Rect Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let rect_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Rect Pipeline Layout"),
            bind_group_layouts: &[&rect_bind_group_layout],
            push_constant_ranges: &[],
        });

        let rect_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Rect Pipeline"),
            layout: Some(&rect_pipeline_layout),
            module: &rect_module,
            entry_point: "paint_rect",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let response = vec![Cell::OPEN; plane * params.response_length];
        let grid_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Response Grid"),
            contents: bytemuck::cast_slice(&response),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });

        let absorption = vec![0.0f32; plane];
        let absorption_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Absorption Plane"),
            contents: bytemuck::cast_slice(&absorption),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            pulse: gaussian_pulse(&params),
            params,
            device,
            queue,
            step_pipeline,
            clear_pipeline,
            step_bind_group_layout,
            rect_pipeline,
            rect_bind_group_layout,
            grid_buffer,
            absorption_buffer,
            response,
            host_stale: false,
            geometry: GeometryStore::new(),
            run: RunState::idle(),
            time_steps_per_tick: None,
        })
    }

    /// Spread each response run across ticks, advancing at most
    /// `steps` time steps per [`WaveSolver::tick`].
    pub fn with_time_steps_per_tick(mut self, steps: usize) -> Self {
        self.time_steps_per_tick = Some(steps.max(1));
        self
    }

    fn step_params(&self, t: usize) -> StepParams {
        let (listener_x, listener_y) = self.run.listener_cell.unwrap_or((0, 0));
        StepParams {
            width: self.params.grid_width,
            height: self.params.grid_height,
            t: t as u32,
            listener_x,
            listener_y,
            courant: self.params.courant_number(),
            pulse: self.pulse[t],
            _pad: 0,
        }
    }

    fn dispatch_step(&self, t: usize) {
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Step Params"),
                contents: bytemuck::bytes_of(&self.step_params(t)),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Step Bind Group"),
            layout: &self.step_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.grid_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.absorption_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Step Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Step Pass"),
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &bind_group, &[]);
            if t == 0 {
                pass.set_pipeline(&self.clear_pipeline);
                let plane = self.params.plane_size() as u32;
                pass.dispatch_workgroups(plane.div_ceil(256), 1, 1);
            } else {
                pass.set_pipeline(&self.step_pipeline);
                pass.dispatch_workgroups(
                    self.params.grid_width.div_ceil(16),
                    self.params.grid_height.div_ceil(16),
                    1,
                );
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn dispatch_rect(&self, bounds: Aabb, open: bool) -> bool {
        let Some(rect) = bounds.footprint(&self.params) else {
            return false;
        };
        let rect_params = RectParams {
            min_x: rect.min_x,
            min_y: rect.min_y,
            max_x: rect.max_x,
            max_y: rect.max_y,
            width: self.params.grid_width,
            open: open as u32,
            absorption: if open { 0.0 } else { bounds.absorption },
            _pad: 0,
        };

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Rect Params"),
                contents: bytemuck::bytes_of(&rect_params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Rect Bind Group"),
            layout: &self.rect_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.grid_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.absorption_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Rect Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Rect Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.rect_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                (rect.max_x - rect.min_x + 1).div_ceil(16),
                (rect.max_y - rect.min_y + 1).div_ceil(16),
                1,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        true
    }

    fn apply_edits(&mut self, edits: &[BoundaryEdit]) -> bool {
        let mut changed = false;
        for edit in edits {
            if let Some(bounds) = edit.erase {
                changed |= self.dispatch_rect(bounds, true);
            }
            if let Some(bounds) = edit.paint {
                changed |= self.dispatch_rect(bounds, false);
            }
        }
        if changed {
            self.host_stale = true;
        }
        changed
    }

    fn step(&mut self) {
        self.dispatch_step(self.run.cursor);
        self.run.cursor += 1;
        self.host_stale = true;
    }

    fn force_complete(&mut self) {
        while self.run.in_progress(self.params.response_length) {
            self.step();
        }
    }

    /// Copy the GPU grid into the host mirror.
    fn readback(&mut self) -> Result<()> {
        let size = (self.response.len() * std::mem::size_of::<Cell>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Response Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.grid_buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| SoundfieldError::TransferFailed("Map callback dropped".to_string()))?
            .map_err(|e| SoundfieldError::TransferFailed(format!("Map failed: {:?}", e)))?;

        let data = buffer_slice.get_mapped_range();
        self.response.copy_from_slice(bytemuck::cast_slice(&data));
        drop(data);
        staging.unmap();

        self.host_stale = false;
        Ok(())
    }

    /// Force-complete any unfinished run and refresh the host mirror.
    fn sync_host(&mut self) -> Result<()> {
        if self.run.in_progress(self.params.response_length) {
            tracing::warn!("response requested before the run completed; force-completing");
            self.force_complete();
        }
        if self.host_stale {
            self.readback()?;
        }
        Ok(())
    }

    /// Fallible variant of [`WaveSolver::response`]: surfaces a failed
    /// device-to-host transfer instead of serving the previous mirror.
    pub fn try_response(&mut self) -> Result<ResponseView<'_>> {
        self.sync_host()?;
        Ok(ResponseView::new(
            &self.response,
            self.params.grid_width,
            self.params.grid_height,
            self.params.response_length,
        ))
    }
}

impl WaveSolver for WgpuSolver {
    fn params(&self) -> &SimulationParams {
        &self.params
    }

    fn add_geometry(&mut self, bounds: Aabb) -> Option<GeometryId> {
        self.geometry.add(bounds, self.params.domain_size)
    }

    fn update_geometry(&mut self, id: GeometryId, bounds: Aabb) {
        self.geometry.update(id, bounds);
    }

    fn remove_geometry(&mut self, id: GeometryId) {
        self.geometry.remove(id);
    }

    fn is_geometry_valid(&self, id: GeometryId) -> bool {
        self.geometry.is_valid(id)
    }

    fn process_geometry_updates(&mut self) -> bool {
        let edits = self.geometry.drain_pending();
        self.apply_edits(&edits)
    }

    fn generate_response(&mut self, listener: Vec2) {
        if self.run.in_progress(self.params.response_length) {
            tracing::warn!(
                cursor = self.run.cursor,
                "finishing unfinished response run before starting a new one"
            );
            self.force_complete();
        }
        self.run = RunState {
            cursor: 0,
            listener_cell: Some(self.params.to_grid_pos(listener)),
        };
        if self.time_steps_per_tick.is_none() {
            self.force_complete();
        }
    }

    fn tick(&mut self) {
        let Some(budget) = self.time_steps_per_tick else {
            return;
        };
        for _ in 0..budget {
            if !self.run.in_progress(self.params.response_length) {
                break;
            }
            self.step();
        }
    }

    fn run_in_progress(&self) -> bool {
        self.run.in_progress(self.params.response_length)
    }

    fn response(&mut self) -> ResponseView<'_> {
        if let Err(e) = self.sync_host() {
            tracing::error!("response readback failed, serving stale data: {}", e);
            debug_assert!(false, "response readback failed: {e}");
        }
        ResponseView::new(
            &self.response,
            self.params.grid_width,
            self.params.grid_height,
            self.params.response_length,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::solver::CpuSolver;

    fn params() -> SimulationParams {
        SimulationParams::new(Vec2::new(5.0, 5.0), Resolution::Low).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires GPU
    async fn test_wgpu_solver_creation() {
        let solver = WgpuSolver::new(params()).await.unwrap();
        assert_eq!(solver.grid_size_in_cells(), (15, 15));
    }

    #[tokio::test]
    #[ignore] // Requires GPU
    async fn test_matches_cpu_backend() {
        let listener = Vec2::new(2.5, 2.5);
        let wall = Aabb::new(Vec2::new(3.5, 2.5), 0.8, 0.8, 0.95);

        let mut cpu = CpuSolver::new(params());
        cpu.add_geometry(wall);
        cpu.process_geometry_updates();
        cpu.generate_response(listener);

        let mut gpu = WgpuSolver::new(params()).await.unwrap();
        gpu.add_geometry(wall);
        gpu.process_geometry_updates();
        gpu.generate_response(listener);

        let cpu_view = cpu.response();
        let gpu_view = gpu.try_response().unwrap();
        for (a, b) in cpu_view.raw().iter().zip(gpu_view.raw()) {
            assert!(
                (a.pressure - b.pressure).abs() < 1e-4,
                "backends must agree: {} vs {}",
                a.pressure,
                b.pressure
            );
            assert_eq!(a.bx, b.bx);
            assert_eq!(a.by, b.by);
        }
    }
}
