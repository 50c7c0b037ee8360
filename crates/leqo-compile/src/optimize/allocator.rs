//! Greedy interval-graph colouring.
//!
//! Logical qubits are integer handles with half-open live intervals on the
//! topological timeline. The allocator sweeps the event-sorted endpoints:
//! an end releases its slot into a min-heap, a start takes the lowest free
//! slot (or mints a fresh one). Releases at time *t* happen before starts
//! at *t*, so `[a, t)` and `[t, b)` can share. Ties between simultaneous
//! starts go to the longest remaining lifetime. Pinned handles always get
//! their pinned slot; pinned slots are never handed to unpinned handles.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

/// Half-open live interval of one logical qubit. `death == None` means the
/// qubit is observable until program end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub birth: usize,
    pub death: Option<usize>,
}

impl Interval {
    /// An interval covering the whole program.
    pub fn unbounded(birth: usize) -> Self {
        Self { birth, death: None }
    }
}

/// The slot assignment produced by the allocator.
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    /// Slot per handle, indexed by handle.
    pub slots: Vec<u32>,
    /// Width of the global register.
    pub register_size: u32,
}

/// Colour the intervals; `pins` forces specific handles onto specific slots.
pub fn allocate(
    intervals: &[Interval],
    pins: &FxHashMap<usize, u32>,
) -> Result<SlotAssignment, String> {
    let pinned_slots: FxHashSet<u32> = pins.values().copied().collect();

    // Start events: by birth, longest remaining lifetime first, then handle.
    let mut starts: Vec<usize> = (0..intervals.len()).collect();
    starts.sort_by_key(|&handle| {
        (
            intervals[handle].birth,
            Reverse(intervals[handle].death.map_or(usize::MAX, |death| death)),
            handle,
        )
    });

    // End events: by death, then handle.
    let mut ends: Vec<(usize, usize)> = intervals
        .iter()
        .enumerate()
        .filter_map(|(handle, interval)| interval.death.map(|death| (death, handle)))
        .collect();
    ends.sort_unstable();

    let mut free: BinaryHeap<Reverse<u32>> = BinaryHeap::new();
    let mut next_fresh: u32 = 0;
    let mut active: FxHashMap<u32, usize> = FxHashMap::default();
    let mut slots: Vec<Option<u32>> = vec![None; intervals.len()];
    let mut register_size: u32 = 0;

    let mut pending_end = 0;
    for &handle in &starts {
        let now = intervals[handle].birth;

        // Release everything that died at or before this instant.
        while pending_end < ends.len() && ends[pending_end].0 <= now {
            let (_, dead) = ends[pending_end];
            if let Some(slot) = slots[dead] {
                active.remove(&slot);
                if !pinned_slots.contains(&slot) {
                    free.push(Reverse(slot));
                }
            }
            pending_end += 1;
        }

        let slot = match pins.get(&handle) {
            Some(&pin) => {
                if let Some(&occupant) = active.get(&pin) {
                    return Err(format!(
                        "slot {pin} is pinned for two interfering qubits ({occupant} and {handle})"
                    ));
                }
                pin
            }
            None => match free.pop() {
                Some(Reverse(slot)) => slot,
                None => {
                    while pinned_slots.contains(&next_fresh) {
                        next_fresh += 1;
                    }
                    let slot = next_fresh;
                    next_fresh += 1;
                    slot
                }
            },
        };

        active.insert(slot, handle);
        slots[handle] = Some(slot);
        register_size = register_size.max(slot + 1);
    }

    let slots = slots
        .into_iter()
        .map(|slot| slot.expect("every interval receives a slot"))
        .collect();

    Ok(SlotAssignment {
        slots,
        register_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(birth: usize, death: usize) -> Interval {
        Interval {
            birth,
            death: Some(death),
        }
    }

    #[test]
    fn test_disjoint_intervals_share_slot() {
        let intervals = [bounded(0, 1), bounded(1, 2)];
        let result = allocate(&intervals, &FxHashMap::default()).unwrap();
        assert_eq!(result.slots, vec![0, 0]);
        assert_eq!(result.register_size, 1);
    }

    #[test]
    fn test_overlapping_intervals_get_distinct_slots() {
        let intervals = [bounded(0, 3), bounded(1, 2), bounded(2, 4)];
        let result = allocate(&intervals, &FxHashMap::default()).unwrap();
        assert_ne!(result.slots[0], result.slots[1]);
        // handle 1 dies at 2, handle 2 starts at 2: its slot is reused
        assert_eq!(result.slots[2], result.slots[1]);
        assert_eq!(result.register_size, 2);
    }

    #[test]
    fn test_lowest_slot_reused_first() {
        let intervals = [bounded(0, 2), bounded(0, 1), bounded(2, 3), bounded(2, 3)];
        let result = allocate(&intervals, &FxHashMap::default()).unwrap();
        // at t=2 both slots are free again; the lowest goes first
        assert_eq!(result.slots[2], 0);
        assert_eq!(result.slots[3], 1);
    }

    #[test]
    fn test_longest_lifetime_tiebreak() {
        let intervals = [bounded(0, 1), Interval::unbounded(0)];
        let result = allocate(&intervals, &FxHashMap::default()).unwrap();
        // the unbounded interval is placed first and takes slot 0
        assert_eq!(result.slots[1], 0);
        assert_eq!(result.slots[0], 1);
    }

    #[test]
    fn test_unbounded_never_released() {
        let intervals = [Interval::unbounded(0), bounded(1, 2), bounded(2, 3)];
        let result = allocate(&intervals, &FxHashMap::default()).unwrap();
        assert_eq!(result.slots[0], 0);
        assert_eq!(result.slots[1], 1);
        assert_eq!(result.slots[2], 1);
        assert_eq!(result.register_size, 2);
    }

    #[test]
    fn test_pinned_slots_respected() {
        let intervals = [Interval::unbounded(0), Interval::unbounded(0), bounded(0, 1)];
        let pins = FxHashMap::from_iter([(0, 0), (1, 1)]);
        let result = allocate(&intervals, &pins).unwrap();
        assert_eq!(result.slots[0], 0);
        assert_eq!(result.slots[1], 1);
        // the unpinned qubit is placed around the pins
        assert_eq!(result.slots[2], 2);
    }

    #[test]
    fn test_pin_conflict_is_infeasible() {
        let intervals = [Interval::unbounded(0), Interval::unbounded(0)];
        let pins = FxHashMap::from_iter([(0, 0), (1, 0)]);
        assert!(allocate(&intervals, &pins).is_err());
    }

    #[test]
    fn test_sequential_pins_on_same_slot_allowed() {
        let intervals = [bounded(0, 1), bounded(1, 2)];
        let pins = FxHashMap::from_iter([(0, 3), (1, 3)]);
        let result = allocate(&intervals, &pins).unwrap();
        assert_eq!(result.slots, vec![3, 3]);
        assert_eq!(result.register_size, 4);
    }

    #[test]
    fn test_deterministic() {
        let intervals = [
            bounded(0, 5),
            bounded(0, 2),
            bounded(2, 4),
            bounded(3, 6),
            Interval::unbounded(4),
        ];
        let first = allocate(&intervals, &FxHashMap::default()).unwrap();
        let second = allocate(&intervals, &FxHashMap::default()).unwrap();
        assert_eq!(first.slots, second.slots);
    }
}
