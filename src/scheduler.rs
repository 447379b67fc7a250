//! Simulation scheduling and snapshot publication.
//!
//! An [`AcousticDomain`] owns one solver and one analyzer and moves
//! between `Idle` and `Simulating`. A run starts when the listener
//! crosses a grid-cell boundary, when geometry mutations are pending,
//! or when an incremental run was left unfinished. Finished analysis is
//! published as a whole new [`AcousticSnapshot`] behind an `Arc`, so
//! readers never observe a grid that is partially overwritten.
//!
//! Two ways to drive a domain:
//! - cooperatively, calling [`AcousticDomain::tick`] once per host tick
//!   with a budgeted solver so each tick's cost stays bounded;
//! - on a dedicated thread via [`BackgroundScheduler`], which blocks on
//!   a dirty flag and republishes after every recompute.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use glam::Vec2;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::analyzer::{Analyzer, AnalyzerResult};
use crate::config::SimulationParams;
use crate::geometry::{Aabb, GeometryId};
use crate::solver::{CpuSolver, WaveSolver};

/// Scheduler state of one acoustic domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing to do; the published snapshot is current.
    Idle,
    /// A response run is in flight.
    Simulating,
}

/// Immutable published analysis state.
///
/// A snapshot is built in full before it becomes reachable, and is
/// never mutated afterward. Readers keep their `Arc` for as long as
/// they like; publication swaps the reference, not the contents.
#[derive(Debug, Clone)]
pub struct AcousticSnapshot {
    params: SimulationParams,
    listener: Vec2,
    results: Vec<AnalyzerResult>,
    version: u64,
}

impl AcousticSnapshot {
    fn empty(params: SimulationParams) -> Self {
        Self {
            params,
            listener: Vec2::ZERO,
            results: vec![AnalyzerResult::default(); params.plane_size()],
            version: 0,
        }
    }

    /// Analysis result for a source at a world position, clamped to
    /// the domain.
    pub fn result_at(&self, pos: Vec2) -> AnalyzerResult {
        let (x, y) = self.params.to_grid_pos(pos);
        self.results[y as usize * self.params.grid_width as usize + x as usize]
    }

    /// Listener position this snapshot was simulated for.
    pub fn listener(&self) -> Vec2 {
        self.listener
    }

    /// Monotonic publication counter; 0 before the first publish.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

/// One acoustic domain: solver + analyzer + scheduling state.
pub struct AcousticDomain {
    solver: Box<dyn WaveSolver>,
    analyzer: Analyzer,
    listener: Vec2,
    listener_cell: (u32, u32),
    listener_dirty: bool,
    /// Listener latched when the current run started.
    run_listener: Vec2,
    state: SchedulerState,
    snapshot: Arc<AcousticSnapshot>,
    version: u64,
}

impl AcousticDomain {
    /// Create a domain over a full-solve CPU solver.
    pub fn new(params: SimulationParams) -> Self {
        Self::with_solver(Box::new(CpuSolver::new(params)))
    }

    /// Create a domain over any solver backend. Runs the analyzer's
    /// free-field calibration, so construction is not cheap.
    pub fn with_solver(solver: Box<dyn WaveSolver>) -> Self {
        let params = *solver.params();
        let listener = Vec2::ZERO;
        Self {
            analyzer: Analyzer::new(params),
            listener,
            listener_cell: params.to_grid_pos(listener),
            // Dirty from the start so the first tick publishes a field.
            listener_dirty: true,
            run_listener: listener,
            state: SchedulerState::Idle,
            snapshot: Arc::new(AcousticSnapshot::empty(params)),
            version: 0,
            solver,
        }
    }

    pub fn params(&self) -> &SimulationParams {
        self.solver.params()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Latch a new listener position. Marks the domain dirty only when
    /// the position crosses into a different grid cell; sub-cell moves
    /// cannot change the simulated field.
    pub fn set_listener_pos(&mut self, pos: Vec2) {
        self.listener = pos;
        let cell = self.solver.params().to_grid_pos(pos);
        if cell != self.listener_cell {
            self.listener_cell = cell;
            self.listener_dirty = true;
        }
    }

    pub fn listener_pos(&self) -> Vec2 {
        self.listener
    }

    pub fn add_geometry(&mut self, bounds: Aabb) -> Option<GeometryId> {
        self.solver.add_geometry(bounds)
    }

    pub fn update_geometry(&mut self, id: GeometryId, bounds: Aabb) {
        self.solver.update_geometry(id, bounds);
    }

    pub fn remove_geometry(&mut self, id: GeometryId) {
        self.solver.remove_geometry(id);
    }

    pub fn is_geometry_valid(&self, id: GeometryId) -> bool {
        self.solver.is_geometry_valid(id)
    }

    /// The latest published snapshot. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<AcousticSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Advance the state machine by one cooperative tick.
    ///
    /// In `Idle`, applies pending geometry and starts a run if any
    /// trigger fired. In `Simulating`, advances the solver by its step
    /// budget and publishes once the run completes.
    pub fn tick(&mut self) {
        match self.state {
            SchedulerState::Idle => {
                let geometry_changed = self.solver.process_geometry_updates();
                if geometry_changed || self.listener_dirty || self.solver.run_in_progress() {
                    self.listener_dirty = false;
                    self.run_listener = self.listener;
                    self.solver.generate_response(self.run_listener);
                    self.state = SchedulerState::Simulating;
                    self.try_finish();
                }
            }
            SchedulerState::Simulating => {
                self.solver.tick();
                self.try_finish();
            }
        }
    }

    /// Run ticks until the domain settles back to `Idle`. Returns true
    /// if a new snapshot was published.
    pub fn update(&mut self) -> bool {
        let before = self.version;
        self.tick();
        while self.state == SchedulerState::Simulating {
            self.tick();
        }
        self.version != before
    }

    fn try_finish(&mut self) {
        if self.solver.run_in_progress() {
            return;
        }
        let params = *self.solver.params();
        let view = self.solver.response();
        self.analyzer.analyze(&view, self.run_listener);
        self.version += 1;
        self.snapshot = Arc::new(AcousticSnapshot {
            params,
            listener: self.run_listener,
            results: self.analyzer.results().to_vec(),
            version: self.version,
        });
        self.state = SchedulerState::Idle;
        tracing::debug!(version = self.version, "published acoustic snapshot");
    }
}

enum Command {
    AddGeometry(Aabb),
    UpdateGeometry(GeometryId, Aabb),
    RemoveGeometry(GeometryId),
    SetListener(Vec2),
}

struct Shared {
    snapshot: RwLock<Arc<AcousticSnapshot>>,
    dirty: Mutex<bool>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// Background-thread scheduler.
///
/// A worker thread owns the [`AcousticDomain`] and blocks on a dirty
/// flag; callers enqueue geometry and listener commands and read the
/// latest snapshot without ever waiting on a recompute. Geometry ids
/// are allocated on the caller side from a counter that mirrors the
/// worker's arena, so `add_geometry` can answer without blocking;
/// bounds are validated with the same check the arena applies.
pub struct BackgroundScheduler {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Command>,
    worker: Option<thread::JoinHandle<()>>,
    params: SimulationParams,
    next_id: u32,
    /// Caller-side validity mirror, indexed by id.
    valid: Vec<bool>,
    listener_cell: (u32, u32),
}

impl BackgroundScheduler {
    /// Spawn the worker. Calibration runs on the calling thread so the
    /// scheduler is ready as soon as this returns.
    pub fn new(params: SimulationParams) -> Self {
        let domain = AcousticDomain::new(params);
        let shared = Arc::new(Shared {
            snapshot: RwLock::new(domain.snapshot()),
            // Dirty so the worker publishes an initial field.
            dirty: Mutex::new(true),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let (sender, receiver) = mpsc::channel();
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || worker_loop(domain, shared, receiver))
        };
        Self {
            shared,
            sender,
            worker: Some(worker),
            params,
            next_id: 0,
            valid: Vec::new(),
            listener_cell: params.to_grid_pos(Vec2::ZERO),
        }
    }

    fn send(&self, command: Command) {
        // The worker outlives all sends except during shutdown, where
        // dropping the command is fine.
        let _ = self.sender.send(command);
        let mut dirty = self.shared.dirty.lock();
        *dirty = true;
        self.shared.wake.notify_one();
    }

    /// Queue a geometry add and hand out its id immediately.
    pub fn add_geometry(&mut self, bounds: Aabb) -> Option<GeometryId> {
        if !bounds.overlaps_domain(self.params.domain_size) {
            return None;
        }
        let id = GeometryId(self.next_id);
        self.next_id += 1;
        self.valid.push(true);
        self.send(Command::AddGeometry(bounds));
        Some(id)
    }

    pub fn update_geometry(&mut self, id: GeometryId, bounds: Aabb) {
        if !self.is_geometry_valid(id) {
            return;
        }
        self.send(Command::UpdateGeometry(id, bounds));
    }

    pub fn remove_geometry(&mut self, id: GeometryId) {
        if !self.is_geometry_valid(id) {
            return;
        }
        self.valid[id.0 as usize] = false;
        self.send(Command::RemoveGeometry(id));
    }

    pub fn is_geometry_valid(&self, id: GeometryId) -> bool {
        self.valid.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Latch a new listener position; wakes the worker only when the
    /// position crosses into a different grid cell.
    pub fn set_listener_pos(&mut self, pos: Vec2) {
        let cell = self.params.to_grid_pos(pos);
        if cell == self.listener_cell {
            return;
        }
        self.listener_cell = cell;
        self.send(Command::SetListener(pos));
    }

    /// The latest published snapshot. Never blocks on a recompute;
    /// only the reference swap is guarded.
    pub fn snapshot(&self) -> Arc<AcousticSnapshot> {
        self.shared.snapshot.read().clone()
    }

    /// Block the calling thread until at least `version` has been
    /// published. Test and setup helper, not for the audio path.
    pub fn wait_for_version(&self, version: u64) {
        while self.snapshot().version() < version {
            thread::yield_now();
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let mut dirty = self.shared.dirty.lock();
            *dirty = true;
            self.shared.wake.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut domain: AcousticDomain,
    shared: Arc<Shared>,
    receiver: mpsc::Receiver<Command>,
) {
    loop {
        {
            let mut dirty = shared.dirty.lock();
            while !*dirty && !shared.shutdown.load(Ordering::Acquire) {
                shared.wake.wait(&mut dirty);
            }
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            *dirty = false;
        }

        while let Ok(command) = receiver.try_recv() {
            match command {
                Command::AddGeometry(bounds) => {
                    domain.add_geometry(bounds);
                }
                Command::UpdateGeometry(id, bounds) => domain.update_geometry(id, bounds),
                Command::RemoveGeometry(id) => domain.remove_geometry(id),
                Command::SetListener(pos) => domain.set_listener_pos(pos),
            }
        }

        if domain.update() {
            *shared.snapshot.write() = domain.snapshot();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::materials::Material;

    fn params() -> SimulationParams {
        SimulationParams::new(Vec2::new(5.0, 5.0), Resolution::Low).unwrap()
    }

    fn wall() -> Aabb {
        Aabb::new(Vec2::new(2.5, 2.5), 1.0, 1.0, Material::Default.absorption())
    }

    #[test]
    fn test_first_tick_publishes() {
        let mut domain = AcousticDomain::new(params());
        assert_eq!(domain.snapshot().version(), 0);
        assert!(domain.update());
        let snapshot = domain.snapshot();
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.listener(), Vec2::ZERO);
    }

    #[test]
    fn test_idle_until_triggered() {
        let mut domain = AcousticDomain::new(params());
        domain.update();
        // Nothing dirty: stays idle, no new snapshot.
        assert!(!domain.update());
        assert_eq!(domain.state(), SchedulerState::Idle);
        // Sub-cell listener moves do not trigger either.
        let pos = domain.listener_pos() + Vec2::splat(1e-4);
        domain.set_listener_pos(pos);
        assert!(!domain.update());
    }

    #[test]
    fn test_listener_cell_cross_triggers() {
        let mut domain = AcousticDomain::new(params());
        domain.update();
        domain.set_listener_pos(Vec2::new(2.5, 2.5));
        assert!(domain.update());
        assert_eq!(domain.snapshot().listener(), Vec2::new(2.5, 2.5));
    }

    #[test]
    fn test_geometry_change_triggers() {
        let mut domain = AcousticDomain::new(params());
        domain.update();
        let id = domain.add_geometry(wall()).unwrap();
        assert!(domain.is_geometry_valid(id));
        assert!(domain.update());
        domain.remove_geometry(id);
        assert!(!domain.is_geometry_valid(id));
        assert!(domain.update());
    }

    #[test]
    fn test_budgeted_domain_spreads_work() {
        let solver = CpuSolver::new(params()).with_time_steps_per_tick(10);
        let mut domain = AcousticDomain::with_solver(Box::new(solver));
        domain.tick();
        assert_eq!(domain.state(), SchedulerState::Simulating);
        let mut ticks = 1;
        while domain.state() == SchedulerState::Simulating {
            domain.tick();
            ticks += 1;
            assert!(ticks < 10_000, "run must terminate");
        }
        assert!(ticks > 2, "a budgeted run should span several ticks");
        assert_eq!(domain.snapshot().version(), 1);
    }

    #[test]
    fn test_snapshots_are_immutable_references() {
        let mut domain = AcousticDomain::new(params());
        domain.update();
        let first = domain.snapshot();
        let probe = Vec2::new(3.5, 2.5);
        let before = first.result_at(probe);

        domain.add_geometry(wall());
        domain.set_listener_pos(Vec2::new(1.0, 1.0));
        domain.update();

        // The old snapshot is untouched by the new publication.
        assert_eq!(first.result_at(probe), before);
        assert!(domain.snapshot().version() > first.version());
    }

    #[test]
    fn test_background_scheduler_publishes() {
        let mut scheduler = BackgroundScheduler::new(params());
        scheduler.wait_for_version(1);

        let id = scheduler.add_geometry(wall()).unwrap();
        assert!(scheduler.is_geometry_valid(id));
        let version = scheduler.snapshot().version();
        scheduler.wait_for_version(version + 1);

        scheduler.remove_geometry(id);
        assert!(!scheduler.is_geometry_valid(id));
        scheduler.remove_geometry(id); // no-op
    }

    #[test]
    fn test_background_scheduler_listener_gating() {
        let mut scheduler = BackgroundScheduler::new(params());
        scheduler.wait_for_version(1);
        let version = scheduler.snapshot().version();

        scheduler.set_listener_pos(Vec2::new(3.3, 3.3));
        scheduler.wait_for_version(version + 1);
        assert_eq!(scheduler.snapshot().listener(), Vec2::new(3.3, 3.3));
    }
}
