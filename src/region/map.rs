//! `RegionMap`: a total function from a region to values
//!
//! Represented as a disjoint tiling of rectangles, each carrying one value.
//! Pieces are kept in canonical key-major order: all hash slices of one key
//! sub-range before the next key sub-range. Visit order follows piece order;
//! the coordinator's per-shard log labels depend on it.

use crate::region::space::{KeyRange, Region};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionMap<T> {
    pieces: Vec<(Region, T)>,
}

fn canonical_cmp(a: &Region, b: &Region) -> Ordering {
    a.keys.cmp(&b.keys).then_with(|| a.hash_beg.cmp(&b.hash_beg))
}

/// The union of `a` and `b` if it forms a rectangle, else `None`.
fn try_join(a: &Region, b: &Region) -> Option<Region> {
    if a.hash_beg == b.hash_beg && a.hash_end == b.hash_end {
        if a.keys.precedes(&b.keys) {
            return Some(Region::new(
                a.hash_beg,
                a.hash_end,
                KeyRange::new(a.keys.left.clone(), b.keys.right.clone()),
            ));
        }
        if b.keys.precedes(&a.keys) {
            return Some(Region::new(
                a.hash_beg,
                a.hash_end,
                KeyRange::new(b.keys.left.clone(), a.keys.right.clone()),
            ));
        }
    }
    if a.keys == b.keys {
        if a.hash_end == b.hash_beg {
            return Some(Region::new(a.hash_beg, b.hash_end, a.keys.clone()));
        }
        if b.hash_end == a.hash_beg {
            return Some(Region::new(b.hash_beg, a.hash_end, a.keys.clone()));
        }
    }
    None
}

/// `piece` minus `cut`, where `cut` is a non-empty sub-rectangle of `piece`.
/// Splits key-major: full-width key bands above and below the cut, then hash
/// strips beside it.
fn subtract(piece: &Region, cut: &Region) -> Vec<Region> {
    let mut out = Vec::new();
    if piece.keys.left < cut.keys.left {
        out.push(Region::new(
            piece.hash_beg,
            piece.hash_end,
            KeyRange::new(piece.keys.left.clone(), Some(cut.keys.left.clone())),
        ));
    }
    if let Some(cut_right) = &cut.keys.right {
        let extends = match &piece.keys.right {
            None => true,
            Some(piece_right) => piece_right > cut_right,
        };
        if extends {
            out.push(Region::new(
                piece.hash_beg,
                piece.hash_end,
                KeyRange::new(cut_right.clone(), piece.keys.right.clone()),
            ));
        }
    }
    if piece.hash_beg < cut.hash_beg {
        out.push(Region::new(piece.hash_beg, cut.hash_beg, cut.keys.clone()));
    }
    if cut.hash_end < piece.hash_end {
        out.push(Region::new(cut.hash_end, piece.hash_end, cut.keys.clone()));
    }
    out
}

impl<T> RegionMap<T> {
    /// The constant map: `value` everywhere on `region`.
    pub fn new(region: Region, value: T) -> Self {
        assert!(!region.is_empty(), "region map over an empty region");
        Self {
            pieces: vec![(region, value)],
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Region, T)> {
        self.pieces.iter()
    }

    fn sort(&mut self) {
        self.pieces.sort_by(|a, b| canonical_cmp(&a.0, &b.0));
    }

    /// Call `f` on every piece of the map restricted to `region`, in
    /// canonical order. Pieces outside `region` are skipped; pieces
    /// straddling its boundary are clipped.
    pub fn visit<F>(&self, region: &Region, mut f: F)
    where
        F: FnMut(&Region, &T),
    {
        for (piece_region, value) in &self.pieces {
            let clipped = piece_region.intersection(region);
            if !clipped.is_empty() {
                f(&clipped, value);
            }
        }
    }
}

impl<T: Clone> RegionMap<T> {
    /// Split pieces along the boundary of `region` so that every piece is
    /// either inside it or disjoint from it.
    fn refine(&mut self, region: &Region) {
        let mut refined = Vec::with_capacity(self.pieces.len());
        for (piece_region, value) in self.pieces.drain(..) {
            let clipped = piece_region.intersection(region);
            if clipped.is_empty() || clipped == piece_region {
                refined.push((piece_region, value));
                continue;
            }
            for rest in subtract(&piece_region, &clipped) {
                refined.push((rest, value.clone()));
            }
            refined.push((clipped, value));
        }
        self.pieces = refined;
        self.sort();
    }

    /// Mutable visit over `region`, splitting pieces at its boundary so the
    /// mutation never leaks outside.
    pub fn visit_mut<F>(&mut self, region: &Region, mut f: F)
    where
        F: FnMut(&Region, &mut T),
    {
        self.refine(region);
        for (piece_region, value) in &mut self.pieces {
            if !piece_region.intersection(region).is_empty() {
                f(piece_region, value);
            }
        }
    }

    /// Derive a new map over `region` by transforming each value.
    pub fn map<U, F>(&self, region: &Region, mut f: F) -> RegionMap<U>
    where
        F: FnMut(&T) -> U,
    {
        let mut pieces = Vec::new();
        self.visit(region, |clipped, value| {
            pieces.push((clipped.clone(), f(value)));
        });
        RegionMap { pieces }
    }

    /// Derive a new map over `region` where each piece expands into a whole
    /// sub-map. The sub-maps must tile their input pieces.
    pub fn map_multi<U, F>(&self, region: &Region, mut f: F) -> RegionMap<U>
    where
        F: FnMut(&Region, &T) -> RegionMap<U>,
    {
        let mut pieces = Vec::new();
        self.visit(region, |clipped, value| {
            let sub = f(clipped, value);
            pieces.extend(sub.pieces);
        });
        let mut out = RegionMap { pieces };
        out.pieces.sort_by(|a, b| canonical_cmp(&a.0, &b.0));
        out
    }
}

impl<T: Clone + PartialEq> RegionMap<T> {
    /// Build a map from fragments in arbitrary order, coalescing adjacent
    /// rectangles that carry equal values. The fragments must be disjoint.
    pub fn from_unordered_fragments(fragments: Vec<(Region, T)>) -> Self {
        let mut map = RegionMap { pieces: fragments };
        map.pieces.retain(|(region, _)| !region.is_empty());
        map.sort();
        map.coalesce();
        map
    }

    /// Overwrite `region` with `value`, then re-coalesce.
    pub fn update(&mut self, region: &Region, value: T) {
        assert!(!region.is_empty(), "updating an empty region");
        self.refine(region);
        self.pieces
            .retain(|(piece_region, _)| piece_region.intersection(region).is_empty());
        self.pieces.push((region.clone(), value));
        self.sort();
        self.coalesce();
    }

    fn coalesce(&mut self) {
        loop {
            let mut merged = false;
            'scan: for i in 0..self.pieces.len() {
                for j in (i + 1)..self.pieces.len() {
                    if self.pieces[i].1 != self.pieces[j].1 {
                        continue;
                    }
                    if let Some(joined) = try_join(&self.pieces[i].0, &self.pieces[j].0) {
                        self.pieces[i].0 = joined;
                        self.pieces.remove(j);
                        merged = true;
                        break 'scan;
                    }
                }
            }
            if !merged {
                break;
            }
        }
        self.sort();
    }
}
