//! Splitting of a fence's coordinate list into contiguous parts.
//!
//! Every part except possibly the last holds exactly `per_part =
//! ceil(len / n)` coordinates. The scheduler relies on this: part `i` always
//! starts at coordinate `i * per_part`, so its bytes start at
//! `i * per_part * trace_bytes` in the output buffer.

use core::num::NonZeroUsize;

/// Number of parts used when nothing else is configured.
pub const DEFAULT_PARTS: NonZeroUsize = NonZeroUsize::new(4).unwrap();

/// Decides how many parts a fence of a given length is split into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionPolicy {
    /// Always aim for exactly this many parts.
    Fixed(NonZeroUsize),
    /// Aim for parts of about `traces` coordinates, but never more than
    /// `max_parts` parts.
    TargetChunkSize {
        traces: NonZeroUsize,
        max_parts: NonZeroUsize,
    },
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_PARTS)
    }
}

impl PartitionPolicy {
    /// Target part count `n` for a fence of `len` coordinates.
    pub fn parts_for(&self, len: usize) -> NonZeroUsize {
        match *self {
            Self::Fixed(parts) => parts,
            Self::TargetChunkSize { traces, max_parts } => {
                let wanted = len.div_ceil(traces.get()).clamp(1, max_parts.get());
                NonZeroUsize::new(wanted).unwrap_or(NonZeroUsize::MIN)
            }
        }
    }

    /// Splits `items` according to this policy.
    pub fn split<'a, T>(&self, items: &'a [T]) -> Partition<'a, T> {
        partition(items, self.parts_for(items.len()))
    }
}

/// One contiguous part of a fence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chunk<'a, T> {
    /// Zero-based part index.
    pub index: usize,
    /// Position of the first item in the full list.
    pub start: usize,
    pub items: &'a [T],
}

impl<T> Chunk<'_, T> {
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of splitting a list into parts.
#[derive(Clone, Debug)]
pub struct Partition<'a, T> {
    per_part: usize,
    chunks: Vec<Chunk<'a, T>>,
}

impl<'a, T> Partition<'a, T> {
    /// Size of every part but the last.
    pub const fn per_part(&self) -> usize {
        self.per_part
    }

    /// Number of parts actually produced. May be less than requested for
    /// short lists, and is zero for an empty list.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Highest valid part index, or `None` if there are no parts.
    pub fn max_index(&self) -> Option<usize> {
        self.chunks.len().checked_sub(1)
    }

    pub fn chunks(&self) -> &[Chunk<'a, T>] {
        &self.chunks
    }

    /// Byte offset of part `index` in a buffer holding `unit_bytes` per item.
    pub const fn byte_offset(&self, index: usize, unit_bytes: usize) -> usize {
        index * self.per_part * unit_bytes
    }
}

impl<'a, T> IntoIterator for Partition<'a, T> {
    type Item = Chunk<'a, T>;
    type IntoIter = std::vec::IntoIter<Chunk<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

/// Splits `items` into at most `parts` contiguous chunks of
/// `ceil(items.len() / parts)` items, the last one possibly shorter.
pub fn partition<T>(items: &[T], parts: NonZeroUsize) -> Partition<'_, T> {
    let per_part = items.len().div_ceil(parts.get());
    if per_part == 0 {
        return Partition {
            per_part,
            chunks: Vec::new(),
        };
    }

    let chunks = items
        .chunks(per_part)
        .enumerate()
        .map(|(index, items)| Chunk {
            index,
            start: index * per_part,
            items,
        })
        .collect();

    Partition { per_part, chunks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn sizes<T>(partition: &Partition<'_, T>) -> Vec<usize> {
        partition.chunks().iter().map(Chunk::len).collect()
    }

    #[test]
    fn ten_coordinates_in_four_parts() {
        let coords: Vec<u32> = (0..10).collect();
        let partition = partition(&coords, nz(4));

        assert_eq!(partition.per_part(), 3);
        assert_eq!(sizes(&partition), [3, 3, 3, 1]);
        assert_eq!(partition.max_index(), Some(3));
        assert_eq!(partition.chunks()[3].start, 9);
        assert_eq!(partition.chunks()[3].items, &[9]);
        // 50 samples * 4 bytes per trace
        assert_eq!(partition.byte_offset(3, 200), 1800);
    }

    #[test]
    fn short_lists_produce_fewer_parts() {
        let coords = [0u8; 5];
        let partition = partition(&coords, nz(4));
        // ceil(5/4) = 2 per part -> 3 parts
        assert_eq!(sizes(&partition), [2, 2, 1]);

        let partition = super::partition(&coords[..1], nz(8));
        assert_eq!(sizes(&partition), [1]);
    }

    #[test]
    fn empty_list_has_no_parts() {
        let coords: [u8; 0] = [];
        let partition = partition(&coords, nz(4));
        assert!(partition.is_empty());
        assert_eq!(partition.max_index(), None);
    }

    #[test]
    fn sizes_sum_to_len_and_only_last_is_short() {
        for n in 1..=9 {
            for len in 0..=40 {
                let coords = vec![0u8; len];
                let partition = partition(&coords, nz(n));
                let sizes = sizes(&partition);

                assert_eq!(sizes.iter().sum::<usize>(), len, "n={n} len={len}");
                assert!(sizes.len() <= n, "n={n} len={len}");

                let per_part = len.div_ceil(n);
                let short = sizes.iter().filter(|&&s| s < per_part).count();
                assert!(short <= 1, "n={n} len={len} sizes={sizes:?}");
                if let Some((last, rest)) = sizes.split_last() {
                    assert!(rest.iter().all(|&s| s == per_part));
                    assert!(*last >= 1 && *last <= per_part);
                }

                for chunk in partition.chunks() {
                    assert_eq!(chunk.start, chunk.index * partition.per_part());
                }
            }
        }
    }

    #[test]
    fn fixed_policy_ignores_length() {
        let policy = PartitionPolicy::default();
        assert_eq!(policy.parts_for(0), nz(4));
        assert_eq!(policy.parts_for(1_000_000), nz(4));
    }

    #[test]
    fn target_chunk_size_policy_scales_with_length() {
        let policy = PartitionPolicy::TargetChunkSize {
            traces: nz(100),
            max_parts: nz(8),
        };
        assert_eq!(policy.parts_for(0), nz(1));
        assert_eq!(policy.parts_for(50), nz(1));
        assert_eq!(policy.parts_for(250), nz(3));
        assert_eq!(policy.parts_for(100_000), nz(8));

        let coords = vec![0u8; 250];
        assert_eq!(sizes(&policy.split(&coords)), [84, 84, 82]);
    }
}
