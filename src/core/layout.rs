// This module provides MemoryLayout, the shape/offset algebra every non-scalar Value owns.
// A layout is described in physical order by its allocated extent, the active region
// inside it (size and per-dimension offset, which models padding and sub-views), and a
// dimension order that maps physical dimensions to logical ones. The value IR never
// assumes row-major contiguity: all element access goes through entry_offset or
// logical_entry_offset. The module also hosts the coordinate odometer shared by every
// per-element operation, which visits the active region with the last dimension varying
// fastest. Emission order and running reductions such as max/min depend on this order.

//! Multi-dimensional memory layouts and coordinate iteration.

use super::error::{EmitError, EmitResult};

/// Shape and offset mapping of a (possibly padded or permuted) allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    /// Allocated size per physical dimension.
    extent: Vec<usize>,
    /// Size of the active region per physical dimension.
    active_size: Vec<usize>,
    /// Start of the active region per physical dimension.
    offset: Vec<usize>,
    /// `dimension_order[physical] = logical`.
    dimension_order: Vec<usize>,
}

impl MemoryLayout {
    /// Contiguous, row-major layout with the given active size.
    pub fn new(size: impl Into<Vec<usize>>) -> Self {
        let size = size.into();
        let rank = size.len();
        Self {
            extent: size.clone(),
            active_size: size,
            offset: vec![0; rank],
            dimension_order: (0..rank).collect(),
        }
    }

    /// Single-element layout used for scalars.
    pub fn scalar() -> Self {
        Self::new([1])
    }

    /// Active region of `active_size` starting at `offset` inside an allocation of `extent`.
    pub fn padded(
        active_size: impl Into<Vec<usize>>,
        extent: impl Into<Vec<usize>>,
        offset: impl Into<Vec<usize>>,
    ) -> EmitResult<Self> {
        let active_size = active_size.into();
        let extent = extent.into();
        let offset = offset.into();
        let rank = active_size.len();
        if extent.len() != rank || offset.len() != rank {
            return Err(EmitError::size_mismatch(format!(
                "layout ranks differ: active {}, extent {}, offset {}",
                rank,
                extent.len(),
                offset.len()
            )));
        }
        for dim in 0..rank {
            if offset[dim] + active_size[dim] > extent[dim] {
                return Err(EmitError::invalid_argument(format!(
                    "active region exceeds extent in dimension {}: {} + {} > {}",
                    dim, offset[dim], active_size[dim], extent[dim]
                )));
            }
        }
        Ok(Self {
            extent,
            active_size,
            offset,
            dimension_order: (0..rank).collect(),
        })
    }

    /// Reorders how physical dimensions map onto logical ones.
    pub fn with_dimension_order(mut self, order: impl Into<Vec<usize>>) -> EmitResult<Self> {
        let order = order.into();
        let rank = self.num_dimensions();
        let mut seen = vec![false; rank];
        if order.len() != rank {
            return Err(EmitError::size_mismatch(format!(
                "dimension order has {} entries for a rank-{} layout",
                order.len(),
                rank
            )));
        }
        for &dim in &order {
            if dim >= rank || seen[dim] {
                return Err(EmitError::invalid_argument(format!(
                    "dimension order {:?} is not a permutation",
                    order
                )));
            }
            seen[dim] = true;
        }
        self.dimension_order = order;
        Ok(self)
    }

    pub fn num_dimensions(&self) -> usize {
        self.active_size.len()
    }

    /// Active size in physical dimension order.
    pub fn active_size(&self) -> &[usize] {
        &self.active_size
    }

    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    pub fn dimension_order(&self) -> &[usize] {
        &self.dimension_order
    }

    /// Active size in logical dimension order.
    pub fn logical_active_size(&self) -> Vec<usize> {
        let mut logical = vec![0; self.num_dimensions()];
        for (physical, &size) in self.active_size.iter().enumerate() {
            logical[self.dimension_order[physical]] = size;
        }
        logical
    }

    /// Number of allocated elements, padding included.
    pub fn memory_size(&self) -> usize {
        self.extent.iter().product()
    }

    /// Number of elements in the active region.
    pub fn num_elements(&self) -> usize {
        self.active_size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// True when the active region covers the whole allocation.
    pub fn is_contiguous(&self) -> bool {
        self.active_size == self.extent
    }

    /// True when this is exactly the single-element scalar layout.
    pub fn is_scalar(&self) -> bool {
        *self == Self::scalar()
    }

    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.num_dimensions()];
        for dim in (0..self.num_dimensions().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.extent[dim + 1];
        }
        strides
    }

    /// Physical element offset of a coordinate in the active region (physical order).
    pub fn entry_offset(&self, coordinate: &[usize]) -> usize {
        debug_assert_eq!(coordinate.len(), self.num_dimensions());
        self.strides()
            .iter()
            .zip(coordinate.iter().zip(&self.offset))
            .map(|(stride, (coord, start))| (coord + start) * stride)
            .sum()
    }

    /// Maps a physical-order coordinate to logical order.
    pub fn logical_coordinates(&self, physical: &[usize]) -> Vec<usize> {
        let mut logical = vec![0; physical.len()];
        for (dim, &coord) in physical.iter().enumerate() {
            logical[self.dimension_order[dim]] = coord;
        }
        logical
    }

    /// Maps a logical-order coordinate to physical order.
    pub fn physical_coordinates(&self, logical: &[usize]) -> Vec<usize> {
        self.dimension_order.iter().map(|&dim| logical[dim]).collect()
    }

    /// Physical element offset of a logical coordinate.
    pub fn logical_entry_offset(&self, logical: &[usize]) -> usize {
        self.entry_offset(&self.physical_coordinates(logical))
    }

    /// Every physical coordinate of the active region, last dimension fastest.
    pub fn coordinates(&self) -> CoordinateIter {
        CoordinateIter::new(self.active_size.clone())
    }
}

/// Advances `coordinate` within `max`, last dimension fastest.
///
/// Returns `false` once the outermost dimension overflows; the coordinate is
/// then back at all zeros.
pub fn increment_coordinate(coordinate: &mut [usize], max: &[usize]) -> bool {
    debug_assert_eq!(coordinate.len(), max.len());
    for dim in (0..coordinate.len()).rev() {
        coordinate[dim] += 1;
        if coordinate[dim] < max[dim] {
            return true;
        }
        coordinate[dim] = 0;
    }
    false
}

/// Odometer over an active size.
#[derive(Debug, Clone)]
pub struct CoordinateIter {
    max: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl CoordinateIter {
    pub fn new(max: Vec<usize>) -> Self {
        let next = if max.iter().any(|&size| size == 0) {
            None
        } else {
            Some(vec![0; max.len()])
        };
        Self { max, next }
    }
}

impl Iterator for CoordinateIter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut following = current.clone();
        if increment_coordinate(&mut following, &self.max) {
            self.next = Some(following);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_order() {
        let layout = MemoryLayout::new([2, 3]);
        let coords: Vec<_> = layout.coordinates().collect();
        assert_eq!(
            coords,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2]
            ]
        );
    }

    #[test]
    fn test_empty_and_rank_zero() {
        assert_eq!(MemoryLayout::new([3, 0]).coordinates().count(), 0);
        assert_eq!(MemoryLayout::new(Vec::new()).coordinates().count(), 1);
        assert_eq!(MemoryLayout::scalar().coordinates().count(), 1);
    }

    #[test]
    fn test_increment_coordinate_carry() {
        let mut coord = vec![0, 2];
        assert!(increment_coordinate(&mut coord, &[2, 3]));
        assert_eq!(coord, vec![1, 0]);

        let mut coord = vec![1, 2];
        assert!(!increment_coordinate(&mut coord, &[2, 3]));
        assert_eq!(coord, vec![0, 0]);
    }

    #[test]
    fn test_padded_offsets() {
        // 2x2 active window at (1, 1) inside a 4x4 allocation
        let layout = MemoryLayout::padded([2, 2], [4, 4], [1, 1]).unwrap();
        assert!(!layout.is_contiguous());
        assert_eq!(layout.memory_size(), 16);
        assert_eq!(layout.num_elements(), 4);

        let offsets: Vec<_> = layout.coordinates().map(|c| layout.entry_offset(&c)).collect();
        assert_eq!(offsets, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_padded_rejects_overflow() {
        let err = MemoryLayout::padded([3], [4], [2]).unwrap_err();
        assert!(err.is_input());
        let err = MemoryLayout::padded([3, 1], [4], [0]).unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn test_dimension_order() {
        // physical [3, 2] storing logical [2, 3] column-major
        let layout = MemoryLayout::new([3, 2]).with_dimension_order([1, 0]).unwrap();
        assert_eq!(layout.logical_active_size(), vec![2, 3]);
        assert_eq!(layout.logical_coordinates(&[2, 1]), vec![1, 2]);
        assert_eq!(layout.logical_entry_offset(&[1, 2]), 5);
        assert_eq!(layout.logical_entry_offset(&[1, 0]), 1);

        assert!(MemoryLayout::new([3, 2]).with_dimension_order([0, 0]).is_err());
    }

    #[test]
    fn test_scalar_layout() {
        assert!(MemoryLayout::scalar().is_scalar());
        assert!(!MemoryLayout::new([1, 1]).is_scalar());
        assert!(MemoryLayout::scalar().is_contiguous());
    }
}
