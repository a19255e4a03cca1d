//! Position ↔ identifier mapping for one axis.
//!
//! An `AxisIndex` maintains the bijection between live 1-based positions and
//! a prefix of minted identifiers. Identifiers are opaque, monotonic, and
//! never reused; positions shift under structural edits, identifiers do not.
//!
//! Representation: an ordered list of segments, each a run of identifiers
//! contiguous in position space, plus a reverse index from identifier to
//! (segment, offset). Position lookup is a binary search over segment start
//! positions; identifier lookup is a hash probe. A single segment is the
//! steady state; splits only appear when an insert lands inside a run.

use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// Opaque identifier minted by an `AxisIndex`.
pub trait AxisId: Copy + Eq + Ord + Hash + fmt::Debug {
    fn from_raw(raw: u32) -> Self;
    fn raw(self) -> u32;
}

/// Stable identity of a row. Never reused within a sheet's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u32);

/// Stable identity of a column. Never reused within a sheet's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColId(u32);

impl AxisId for RowId {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

impl AxisId for ColId {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// A run of identifiers contiguous in position space.
#[derive(Debug)]
struct Segment<I> {
    /// Stable handle; survives reordering of the segment list.
    key: u32,
    /// 1-based position of `ids[0]`.
    start_pos: u32,
    ids: Vec<I>,
}

#[derive(Debug, Clone, Copy)]
struct IdLoc {
    seg_key: u32,
    offset: u32,
}

pub struct AxisIndex<I> {
    segments: Vec<Segment<I>>,
    /// segment key → index in `segments`. Rebuilt on structural edits.
    seg_slots: FxHashMap<u32, u32>,
    /// Reverse index: identifier → (segment, offset).
    locs: FxHashMap<I, IdLoc>,
    next_id: u32,
    next_seg_key: u32,
    total: u32,
}

impl<I: AxisId> AxisIndex<I> {
    /// Create an axis with `initial` live positions.
    pub fn new(initial: u32) -> Self {
        let mut index = Self {
            segments: Vec::new(),
            seg_slots: FxHashMap::default(),
            locs: FxHashMap::default(),
            next_id: 0,
            next_seg_key: 0,
            total: 0,
        };
        if initial > 0 {
            index.insert(1, initial);
        }
        index
    }

    /// Number of live positions (equivalently, live identifiers).
    pub fn max_pos(&self) -> u32 {
        self.total
    }

    pub fn total_ids(&self) -> u32 {
        self.total
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_live(&self, id: I) -> bool {
        self.locs.contains_key(&id)
    }

    /// Identifier at position `pos`, or `None` when out of range.
    pub fn pos_to_id(&self, pos: u32) -> Option<I> {
        if pos == 0 || pos > self.total {
            return None;
        }
        let seg_idx = self
            .segments
            .partition_point(|s| s.start_pos <= pos)
            .checked_sub(1)?;
        let seg = &self.segments[seg_idx];
        seg.ids.get((pos - seg.start_pos) as usize).copied()
    }

    /// Current position of `id`, or `None` when retired or foreign.
    pub fn id_to_pos(&self, id: I) -> Option<u32> {
        let loc = self.locs.get(&id)?;
        let seg_idx = *self.seg_slots.get(&loc.seg_key)? as usize;
        Some(self.segments[seg_idx].start_pos + loc.offset)
    }

    /// Mint `count` fresh identifiers occupying positions
    /// `at_pos..at_pos + count - 1`. Former positions `>= at_pos` shift by
    /// `+count`. `at_pos` beyond `max_pos + 1` appends at the end.
    pub fn insert(&mut self, at_pos: u32, count: u32) -> Vec<I> {
        if count == 0 {
            return Vec::new();
        }
        let at_pos = at_pos.clamp(1, self.total + 1);

        let minted: Vec<I> = (0..count)
            .map(|k| I::from_raw(self.next_id + k))
            .collect();
        self.next_id += count;

        if at_pos == self.total + 1 {
            // Append: extend the last run instead of creating a new segment.
            if let Some(last) = self.segments.last_mut() {
                let key = last.key;
                let base = last.ids.len() as u32;
                for (k, &id) in minted.iter().enumerate() {
                    last.ids.push(id);
                    self.locs.insert(
                        id,
                        IdLoc {
                            seg_key: key,
                            offset: base + k as u32,
                        },
                    );
                }
                self.total += count;
                return minted;
            }
        }

        let seg_idx = self.segments.partition_point(|s| s.start_pos < at_pos);
        // Does the insert land strictly inside the previous run?
        let split = seg_idx
            .checked_sub(1)
            .filter(|&i| {
                let s = &self.segments[i];
                at_pos < s.start_pos + s.ids.len() as u32
            });

        if let Some(prev_idx) = split {
            let cut = (at_pos - self.segments[prev_idx].start_pos) as usize;
            let tail: Vec<I> = self.segments[prev_idx].ids.split_off(cut);
            let tail_key = self.next_seg_key;
            self.next_seg_key += 1;
            for (k, &id) in tail.iter().enumerate() {
                self.locs.insert(
                    id,
                    IdLoc {
                        seg_key: tail_key,
                        offset: k as u32,
                    },
                );
            }
            // Tentative start keeps the list ordered until `renumber` runs.
            self.segments.insert(
                prev_idx + 1,
                Segment {
                    key: tail_key,
                    start_pos: at_pos,
                    ids: tail,
                },
            );
        }

        let new_key = self.next_seg_key;
        self.next_seg_key += 1;
        for (k, &id) in minted.iter().enumerate() {
            self.locs.insert(
                id,
                IdLoc {
                    seg_key: new_key,
                    offset: k as u32,
                },
            );
        }
        let insert_at = self.segments.partition_point(|s| s.start_pos < at_pos);
        self.segments.insert(
            insert_at,
            Segment {
                key: new_key,
                start_pos: at_pos,
                ids: minted.clone(),
            },
        );

        self.total += count;
        self.renumber();
        minted
    }

    /// Retire the identifiers at positions `[from, to]` (inclusive). Former
    /// positions `> to` shift down. Returns the retired identifiers in
    /// position order; an empty or out-of-range span retires nothing.
    pub fn remove(&mut self, from: u32, to: u32) -> Vec<I> {
        if from == 0 || from > to || from > self.total {
            return Vec::new();
        }
        let to = to.min(self.total);

        let mut retired = Vec::with_capacity((to - from + 1) as usize);
        for seg in &mut self.segments {
            let seg_start = seg.start_pos;
            let seg_end = seg_start + seg.ids.len() as u32 - 1;
            if seg_end < from || seg_start > to {
                continue;
            }
            let lo = from.max(seg_start) - seg_start;
            let hi = to.min(seg_end) - seg_start;
            let drained: Vec<I> = seg.ids.drain(lo as usize..=hi as usize).collect();
            for id in &drained {
                self.locs.remove(id);
            }
            // Identifiers after the gap close up within the run.
            for (k, id) in seg.ids.iter().enumerate().skip(lo as usize) {
                if let Some(loc) = self.locs.get_mut(id) {
                    loc.offset = k as u32;
                }
            }
            retired.extend(drained);
        }
        self.segments.retain(|s| !s.ids.is_empty());
        self.total -= retired.len() as u32;
        self.renumber();
        retired
    }

    /// Recompute segment start positions and the key → slot table.
    fn renumber(&mut self) {
        self.seg_slots.clear();
        let mut pos = 1;
        for (idx, seg) in self.segments.iter_mut().enumerate() {
            seg.start_pos = pos;
            pos += seg.ids.len() as u32;
            self.seg_slots.insert(seg.key, idx as u32);
        }
    }
}

impl<I: AxisId> fmt::Debug for AxisIndex<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisIndex")
            .field("total", &self.total)
            .field("segments", &self.segments.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: u32) -> AxisIndex<RowId> {
        AxisIndex::new(n)
    }

    #[test]
    fn fresh_axis_is_one_segment() {
        let a = axis(5);
        assert_eq!(a.max_pos(), 5);
        assert_eq!(a.segment_count(), 1);
        for pos in 1..=5 {
            let id = a.pos_to_id(pos).unwrap();
            assert_eq!(a.id_to_pos(id), Some(pos));
        }
        assert_eq!(a.pos_to_id(0), None);
        assert_eq!(a.pos_to_id(6), None);
    }

    #[test]
    fn insert_shifts_and_mints() {
        let mut a = axis(3);
        let before = a.pos_to_id(2).unwrap();
        let minted = a.insert(2, 2);
        assert_eq!(minted.len(), 2);
        assert_eq!(a.max_pos(), 5);
        assert_eq!(a.pos_to_id(2), Some(minted[0]));
        assert_eq!(a.pos_to_id(3), Some(minted[1]));
        // The old occupant of position 2 moved down by the insert count.
        assert_eq!(a.id_to_pos(before), Some(4));
    }

    #[test]
    fn insert_beyond_end_appends() {
        let mut a = axis(2);
        let minted = a.insert(99, 1);
        assert_eq!(a.id_to_pos(minted[0]), Some(3));
        assert_eq!(a.segment_count(), 1);
    }

    #[test]
    fn insert_at_one_shifts_entire_axis() {
        let mut a = axis(3);
        let old: Vec<_> = (1..=3).map(|p| a.pos_to_id(p).unwrap()).collect();
        a.insert(1, 1);
        for (i, id) in old.iter().enumerate() {
            assert_eq!(a.id_to_pos(*id), Some(i as u32 + 2));
        }
    }

    #[test]
    fn remove_retires_terminally() {
        let mut a = axis(5);
        let doomed = a.pos_to_id(3).unwrap();
        let survivor = a.pos_to_id(4).unwrap();
        let retired = a.remove(2, 3);
        assert_eq!(retired.len(), 2);
        assert!(retired.contains(&doomed));
        assert_eq!(a.id_to_pos(doomed), None);
        assert!(!a.is_live(doomed));
        assert_eq!(a.id_to_pos(survivor), Some(2));
        assert_eq!(a.max_pos(), 3);
    }

    #[test]
    fn remove_everything_empties_axis() {
        let mut a = axis(4);
        let retired = a.remove(1, 4);
        assert_eq!(retired.len(), 4);
        assert_eq!(a.max_pos(), 0);
        assert_eq!(a.segment_count(), 0);
        assert_eq!(a.pos_to_id(1), None);
    }

    #[test]
    fn remove_clamps_and_ignores_empty_span() {
        let mut a = axis(3);
        assert!(a.remove(5, 9).is_empty());
        assert!(a.remove(2, 1).is_empty());
        assert_eq!(a.remove(2, 99).len(), 2);
        assert_eq!(a.max_pos(), 1);
    }

    #[test]
    fn insert_then_remove_is_positional_noop() {
        let mut a = axis(6);
        let old: Vec<_> = (1..=6).map(|p| a.pos_to_id(p).unwrap()).collect();
        let minted = a.insert(3, 2);
        let retired = a.remove(3, 4);
        assert_eq!(retired, minted);
        for (i, id) in old.iter().enumerate() {
            assert_eq!(a.id_to_pos(*id), Some(i as u32 + 1));
        }
        for id in minted {
            assert!(!a.is_live(id));
        }
    }

    #[test]
    fn ids_are_never_reused() {
        let mut a = axis(2);
        let first = a.insert(1, 1);
        a.remove(1, 1);
        let second = a.insert(1, 1);
        assert_ne!(first[0], second[0]);
    }

    #[test]
    fn middle_insert_splits_segment() {
        let mut a = axis(10);
        assert_eq!(a.segment_count(), 1);
        a.insert(5, 1);
        assert_eq!(a.segment_count(), 3);
        // The bijection survives the split.
        for pos in 1..=11 {
            let id = a.pos_to_id(pos).unwrap();
            assert_eq!(a.id_to_pos(id), Some(pos));
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Edit {
            Insert { at: u32, count: u32 },
            Remove { from: u32, to: u32 },
        }

        fn edits() -> impl Strategy<Value = Vec<Edit>> {
            prop::collection::vec(
                prop_oneof![
                    (1u32..40, 1u32..5).prop_map(|(at, count)| Edit::Insert { at, count }),
                    (1u32..40, 0u32..6).prop_map(|(from, len)| Edit::Remove {
                        from,
                        to: from + len,
                    }),
                ],
                0..24,
            )
        }

        proptest! {
            #[test]
            fn bijection_holds_under_arbitrary_edits(script in edits()) {
                let mut a = AxisIndex::<RowId>::new(8);
                for edit in script {
                    match edit {
                        Edit::Insert { at, count } => { a.insert(at, count); }
                        Edit::Remove { from, to } => { a.remove(from, to); }
                    }
                    // posToId(p) = id ⇔ idToPos(id) = p, for every live p.
                    for pos in 1..=a.max_pos() {
                        let id = a.pos_to_id(pos).unwrap();
                        prop_assert_eq!(a.id_to_pos(id), Some(pos));
                    }
                    prop_assert_eq!(a.pos_to_id(a.max_pos() + 1), None);
                    prop_assert_eq!(a.total_ids(), a.max_pos());
                }
            }
        }
    }
}
