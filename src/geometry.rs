//! Dynamic geometry bookkeeping for the wave solver.
//!
//! Geometry records live in an arena indexed by a stable integer id.
//! Records are never deleted or reindexed; removal marks them absent so
//! ids stay valid forever. Mutations are queued as pending changes and
//! applied in id order once per simulation tick, which coalesces rapid
//! bursts of updates into a single boundary rewrite.

use std::collections::BTreeMap;

use glam::Vec2;

use crate::config::SimulationParams;

/// Stable identifier for a geometry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeometryId(pub u32);

/// An axis-aligned box footprint with an absorption coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Center position in world space (meters).
    pub position: Vec2,
    /// Extent along x (meters).
    pub width: f32,
    /// Extent along y (meters).
    pub height: f32,
    /// Absorption coefficient, see [`crate::materials::Material`].
    pub absorption: f32,
}

impl Aabb {
    /// The designated "no footprint" sentinel. Always skipped when
    /// painting or erasing boundaries.
    pub const EMPTY: Aabb = Aabb {
        position: Vec2::ZERO,
        width: 0.0,
        height: 0.0,
        absorption: 0.0,
    };

    /// Create a box centered at `position`.
    pub fn new(position: Vec2, width: f32, height: f32, absorption: f32) -> Self {
        Self {
            position,
            width,
            height,
            absorption,
        }
    }

    /// True if this box has no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    fn min(&self) -> Vec2 {
        self.position - Vec2::new(self.width, self.height) * 0.5
    }

    fn max(&self) -> Vec2 {
        self.position + Vec2::new(self.width, self.height) * 0.5
    }

    /// True if any part of this box overlaps the domain `[0, size]`.
    pub fn overlaps_domain(&self, domain_size: Vec2) -> bool {
        let min = self.min();
        let max = self.max();
        !self.is_empty() && max.x > 0.0 && max.y > 0.0 && min.x < domain_size.x && min.y < domain_size.y
    }

    /// Inclusive cell range covered by this box, clamped to the grid.
    /// Returns `None` for the empty sentinel.
    pub fn footprint(&self, params: &SimulationParams) -> Option<CellRect> {
        if self.is_empty() {
            return None;
        }
        let (min_x, min_y) = params.to_grid_pos(self.min());
        let (max_x, max_y) = params.to_grid_pos(self.max());
        Some(CellRect {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }
}

/// An inclusive rectangle of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Kind of a queued geometry change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    /// Paint the new bounds (add and update share this path).
    Update,
    /// Restore the default admittance over the last painted bounds.
    Remove,
}

#[derive(Debug, Clone, Copy)]
struct PendingChange {
    kind: PendingKind,
    bounds: Aabb,
}

#[derive(Debug, Clone, Copy)]
struct GeometryRecord {
    present: bool,
    /// Bounds currently painted into the solver grid. `Aabb::EMPTY`
    /// when nothing has been painted for this record yet.
    painted: Aabb,
}

/// One applied change, expressed as the erase-then-paint discipline.
///
/// The erase footprint is always restored to the default admittance
/// before the paint footprint is written, so a shape that shrinks or
/// moves never leaves stale absorption behind.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryEdit {
    /// Footprint to restore to the default open admittance.
    pub erase: Option<Aabb>,
    /// Footprint to paint with its absorption coefficient.
    pub paint: Option<Aabb>,
}

/// Arena of geometry records plus the pending-change log.
#[derive(Debug, Default)]
pub struct GeometryStore {
    records: Vec<GeometryRecord>,
    pending: BTreeMap<GeometryId, PendingChange>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and queue its first paint. Returns `None` if the
    /// bounds lie entirely outside the domain.
    pub fn add(&mut self, bounds: Aabb, domain_size: Vec2) -> Option<GeometryId> {
        if !bounds.overlaps_domain(domain_size) {
            return None;
        }
        let id = GeometryId(self.records.len() as u32);
        self.records.push(GeometryRecord {
            present: false,
            painted: Aabb::EMPTY,
        });
        self.pending.insert(
            id,
            PendingChange {
                kind: PendingKind::Update,
                bounds,
            },
        );
        Some(id)
    }

    /// Queue an update. Unknown or removed ids are ignored; a pending
    /// remove wins over any later mutation.
    pub fn update(&mut self, id: GeometryId, bounds: Aabb) {
        if !self.is_valid(id) {
            return;
        }
        self.pending.insert(
            id,
            PendingChange {
                kind: PendingKind::Update,
                bounds,
            },
        );
    }

    /// Queue a removal. Unknown ids are ignored; double-removal is a
    /// no-op.
    pub fn remove(&mut self, id: GeometryId) {
        if !self.is_valid(id) {
            return;
        }
        self.pending.insert(
            id,
            PendingChange {
                kind: PendingKind::Remove,
                bounds: Aabb::EMPTY,
            },
        );
    }

    /// True if `id` was ever allocated.
    fn exists(&self, id: GeometryId) -> bool {
        (id.0 as usize) < self.records.len()
    }

    /// True while the record is logically present in the scene.
    /// Reflects queued changes immediately: valid right after `add`,
    /// invalid right after `remove`, before either is applied.
    pub fn is_valid(&self, id: GeometryId) -> bool {
        if !self.exists(id) {
            return false;
        }
        match self.pending.get(&id) {
            Some(p) => p.kind == PendingKind::Update,
            None => self.records[id.0 as usize].present,
        }
    }

    /// Bounds currently painted for `id`, if any.
    pub fn painted_bounds(&self, id: GeometryId) -> Option<Aabb> {
        let rec = self.records.get(id.0 as usize)?;
        if rec.present {
            Some(rec.painted)
        } else {
            None
        }
    }

    /// True if any change is waiting to be applied.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of allocated records (present or not).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drain all pending changes in id order, updating record state and
    /// yielding the boundary edits the solver must apply. Returns an
    /// empty vec when nothing was pending.
    pub fn drain_pending(&mut self) -> Vec<BoundaryEdit> {
        let pending = std::mem::take(&mut self.pending);
        let mut edits = Vec::with_capacity(pending.len());
        for (id, change) in pending {
            let rec = &mut self.records[id.0 as usize];
            let old = if rec.painted.is_empty() {
                None
            } else {
                Some(rec.painted)
            };
            match change.kind {
                PendingKind::Remove => {
                    rec.present = false;
                    rec.painted = Aabb::EMPTY;
                    edits.push(BoundaryEdit {
                        erase: old,
                        paint: None,
                    });
                }
                PendingKind::Update => {
                    rec.present = true;
                    rec.painted = change.bounds;
                    let paint = if change.bounds.is_empty() {
                        None
                    } else {
                        Some(change.bounds)
                    };
                    edits.push(BoundaryEdit { erase: old, paint });
                }
            }
        }
        edits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Vec2 {
        Vec2::new(10.0, 10.0)
    }

    fn bx(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), 1.0, 1.0, 0.99)
    }

    #[test]
    fn test_ids_monotonic() {
        let mut store = GeometryStore::new();
        let a = store.add(bx(2.0, 2.0), domain()).unwrap();
        let b = store.add(bx(3.0, 3.0), domain()).unwrap();
        let c = store.add(bx(4.0, 4.0), domain()).unwrap();
        assert!(a < b && b < c, "ids must be strictly increasing");
    }

    #[test]
    fn test_out_of_domain_rejected() {
        let mut store = GeometryStore::new();
        assert!(store.add(bx(50.0, 50.0), domain()).is_none());
        assert!(store.add(bx(-50.0, 2.0), domain()).is_none());
        // Partially overlapping is fine.
        assert!(store.add(bx(0.0, 0.0), domain()).is_some());
    }

    #[test]
    fn test_validity_lifecycle() {
        let mut store = GeometryStore::new();
        let id = store.add(bx(2.0, 2.0), domain()).unwrap();
        assert!(store.is_valid(id), "valid immediately after add");
        store.drain_pending();
        assert!(store.is_valid(id));
        store.remove(id);
        assert!(!store.is_valid(id), "invalid immediately after remove");
        store.drain_pending();
        assert!(!store.is_valid(id));
        // Double removal and late updates stay no-ops.
        store.remove(id);
        store.update(id, bx(5.0, 5.0));
        assert!(!store.has_pending());
        assert!(!store.is_valid(id));
    }

    #[test]
    fn test_coalescing_keeps_one_entry_per_id() {
        let mut store = GeometryStore::new();
        let id = store.add(bx(2.0, 2.0), domain()).unwrap();
        store.drain_pending();
        store.update(id, bx(3.0, 3.0));
        store.update(id, bx(4.0, 4.0));
        let edits = store.drain_pending();
        assert_eq!(edits.len(), 1, "burst of updates must coalesce");
        assert_eq!(edits[0].paint.unwrap().position, Vec2::new(4.0, 4.0));
        assert_eq!(edits[0].erase.unwrap().position, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn test_pending_remove_wins() {
        let mut store = GeometryStore::new();
        let id = store.add(bx(2.0, 2.0), domain()).unwrap();
        store.drain_pending();
        store.remove(id);
        store.update(id, bx(5.0, 5.0));
        let edits = store.drain_pending();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].paint.is_none(), "remove cannot be overwritten");
        assert!(!store.is_valid(id));
    }

    #[test]
    fn test_update_then_move_erases_old_footprint() {
        let mut store = GeometryStore::new();
        let id = store.add(bx(2.0, 2.0), domain()).unwrap();
        store.drain_pending();
        store.update(id, bx(7.0, 7.0));
        let edits = store.drain_pending();
        let edit = &edits[0];
        assert_eq!(edit.erase.unwrap().position, Vec2::new(2.0, 2.0));
        assert_eq!(edit.paint.unwrap().position, Vec2::new(7.0, 7.0));
    }

    #[test]
    fn test_invalid_id_noop() {
        let mut store = GeometryStore::new();
        store.update(GeometryId(42), bx(1.0, 1.0));
        store.remove(GeometryId(42));
        assert!(!store.has_pending());
    }
}
