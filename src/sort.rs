//! Stable LSD radix sort over `u32` keys. The keys are sorted in place, and the resulting
//! permutation is applied to any number of parallel attribute arrays, so a particle's key,
//! attributes and slot stay in correspondence.
//!
//! Each digit pass is: per-chunk histograms (parallel), then a scatter (parallel) in which
//! every chunk writes into its own output segments. Segments are laid out digit-major,
//! chunk-minor, and each chunk preserves its own order, which makes the sort stable.

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    context::ComputeContext,
    error::{ModelError, SortError},
};

pub const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;
const DIGIT_MASK: u32 = RADIX as u32 - 1;

/// Keys handled per work item in the counting passes.
const CHUNK_SIZE: usize = 4_096;

/// An attribute array that can follow a sort.
pub trait Permute: Send {
    fn len(&self) -> usize;

    /// Reorder the first `order.len()` elements so that new slot `i` holds what was at
    /// `order[i]`.
    fn permute(&mut self, order: &[u32]);
}

impl<T: Copy + Send + Sync> Permute for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn permute(&mut self, order: &[u32]) {
        let src: &[T] = self;
        let gathered: Vec<T> = order.par_iter().map(|&i| src[i as usize]).collect();
        self[..order.len()].copy_from_slice(&gathered);
    }
}

pub struct RadixSort {
    ctx: Arc<ComputeContext>,
    capacity: usize,
    /// Source slot of each sorted slot.
    order: Vec<u32>,
    keys_tmp: Vec<u32>,
    order_tmp: Vec<u32>,
}

impl RadixSort {
    pub fn new(ctx: Arc<ComputeContext>, capacity: usize) -> Result<Self, ModelError> {
        let mut order = Vec::new();
        let mut keys_tmp = Vec::new();
        let mut order_tmp = Vec::new();

        for buf in [&mut order, &mut keys_tmp, &mut order_tmp] {
            buf.try_reserve_exact(capacity)?;
        }

        Ok(Self {
            ctx,
            capacity,
            order,
            keys_tmp,
            order_tmp,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sort `keys` ascending and apply the same permutation to each attribute array.
    /// Attribute arrays may be longer than `keys`; only their first `keys.len()` elements
    /// take part.
    pub fn sort(
        &mut self,
        keys: &mut [u32],
        attributes: &mut [&mut dyn Permute],
    ) -> Result<(), SortError> {
        let n = keys.len();
        if n > self.capacity {
            return Err(SortError::CapacityTooSmall {
                capacity: self.capacity,
                len: n,
            });
        }
        for (index, attr) in attributes.iter().enumerate() {
            if attr.len() < n {
                return Err(SortError::AttributeTooShort {
                    index,
                    len: attr.len(),
                    required: n,
                });
            }
        }
        if n < 2 {
            return Ok(());
        }

        let ctx = Arc::clone(&self.ctx);

        self.order.clear();
        self.order.extend(0..n as u32);
        self.keys_tmp.resize(n, 0);
        self.order_tmp.resize(n, 0);

        // Only visit digits that can be non-zero.
        let max_key = ctx.run_pass("sort_max_key", || keys.par_iter().copied().max().unwrap_or(0));
        let key_bits = u32::BITS - max_key.leading_zeros();
        let num_passes = key_bits.div_ceil(RADIX_BITS);

        let mut changed = false;
        for pass in 0..num_passes {
            let shift = pass * RADIX_BITS;

            let histograms: Vec<[u32; RADIX]> = ctx.run_pass("sort_count", || {
                keys.par_chunks(CHUNK_SIZE)
                    .map(|chunk| {
                        let mut hist = [0; RADIX];
                        for k in chunk {
                            hist[((k >> shift) & DIGIT_MASK) as usize] += 1;
                        }
                        hist
                    })
                    .collect()
            });

            // Every key shares this digit; the pass would be the identity.
            if histograms
                .iter()
                .fold([0; RADIX], |mut acc, h| {
                    for d in 0..RADIX {
                        acc[d] += h[d];
                    }
                    acc
                })
                .iter()
                .any(|&c| c as usize == n)
            {
                continue;
            }

            let mut key_segs = split_segments(&mut self.keys_tmp[..n], &histograms);
            let mut order_segs = split_segments(&mut self.order_tmp[..n], &histograms);
            let order = &self.order[..n];
            let src_keys = &*keys;

            ctx.run_pass("sort_scatter", || {
                key_segs
                    .par_iter_mut()
                    .zip(order_segs.par_iter_mut())
                    .zip(src_keys.par_chunks(CHUNK_SIZE))
                    .zip(order.par_chunks(CHUNK_SIZE))
                    .for_each(|(((key_seg, order_seg), key_chunk), order_chunk)| {
                        let mut next = [0usize; RADIX];
                        for (&k, &o) in key_chunk.iter().zip(order_chunk) {
                            let digit = ((k >> shift) & DIGIT_MASK) as usize;
                            key_seg[digit][next[digit]] = k;
                            order_seg[digit][next[digit]] = o;
                            next[digit] += 1;
                        }
                    });
            });

            keys.copy_from_slice(&self.keys_tmp[..n]);
            std::mem::swap(&mut self.order, &mut self.order_tmp);
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let order = &self.order[..n];
        ctx.run_pass("sort_permute", || {
            for attr in attributes.iter_mut() {
                attr.permute(order);
            }
        });

        Ok(())
    }
}

/// Cut `out` into one segment per (chunk, digit), sized by the chunk's histogram, in
/// digit-major, chunk-minor order. Returned per chunk, indexed by digit.
fn split_segments<'a>(out: &'a mut [u32], histograms: &[[u32; RADIX]]) -> Vec<Vec<&'a mut [u32]>> {
    let mut per_chunk: Vec<Vec<&'a mut [u32]>> = histograms
        .iter()
        .map(|_| Vec::with_capacity(RADIX))
        .collect();

    let mut rest = out;
    for d in 0..RADIX {
        for (segs, hist) in per_chunk.iter_mut().zip(histograms) {
            let (seg, tail) = std::mem::take(&mut rest).split_at_mut(hist[d] as usize);
            segs.push(seg);
            rest = tail;
        }
    }
    per_chunk
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn sorter(capacity: usize) -> RadixSort {
        let ctx = Arc::new(ComputeContext::new(Some(4)).unwrap());
        RadixSort::new(ctx, capacity).unwrap()
    }

    #[test]
    fn sorts_and_carries_attributes() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 20_000;

        let mut keys: Vec<u32> = (0..n).map(|_| rng.random_range(0..27_001)).collect();
        let original = keys.clone();
        let mut ids: Vec<u32> = (0..n as u32).collect();
        let mut payload: Vec<[f32; 4]> = keys.iter().map(|&k| [k as f32, 0., 0., 1.]).collect();

        let mut s = sorter(n);
        s.sort(&mut keys, &mut [&mut ids, &mut payload]).unwrap();

        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        for i in 0..n {
            assert_eq!(original[ids[i] as usize], keys[i]);
            assert_eq!(payload[i][0], keys[i] as f32);
        }
    }

    #[test]
    fn stable_under_equal_keys() {
        let mut keys: Vec<u32> = vec![3, 1, 3, 0, 1, 3, 0, 70_000, 1];
        let mut ids: Vec<u32> = (0..keys.len() as u32).collect();

        let mut s = sorter(16);
        s.sort(&mut keys, &mut [&mut ids]).unwrap();

        assert_eq!(keys, vec![0, 0, 1, 1, 1, 3, 3, 3, 70_000]);
        assert_eq!(ids, vec![3, 6, 1, 4, 8, 0, 2, 5, 7]);
    }

    #[test]
    fn stable_across_chunks() {
        // Few distinct keys spread over several chunks, so every chunk writes into every
        // digit's segment.
        let n = 3 * CHUNK_SIZE + 123;
        let mut keys: Vec<u32> = (0..n as u32).map(|i| (i * 7_919) % 5 * 300).collect();
        let mut ids: Vec<u32> = (0..n as u32).collect();

        let mut s = sorter(n);
        s.sort(&mut keys, &mut [&mut ids]).unwrap();

        for w in keys.windows(2).zip(ids.windows(2)) {
            let (k, i) = w;
            assert!(k[0] <= k[1]);
            if k[0] == k[1] {
                assert!(i[0] < i[1]);
            }
        }
        for (k, &i) in keys.iter().zip(&ids) {
            assert_eq!(*k, (i * 7_919) % 5 * 300);
        }
    }

    #[test]
    fn sorted_input_is_untouched() {
        let mut keys: Vec<u32> = (0..10_000).map(|i| i / 7).collect();
        let expected_keys = keys.clone();
        let mut attr: Vec<f32> = (0..10_000).map(|i| i as f32 * 0.5).collect();
        let expected_attr = attr.clone();

        let mut s = sorter(10_000);
        s.sort(&mut keys, &mut [&mut attr]).unwrap();
        s.sort(&mut keys, &mut [&mut attr]).unwrap();

        assert_eq!(keys, expected_keys);
        assert_eq!(attr, expected_attr);
    }

    #[test]
    fn longer_attributes_keep_their_tail() {
        let mut keys = vec![2, 0, 1];
        let mut attr = vec![20, 0, 10, 99, 98];

        let mut s = sorter(8);
        s.sort(&mut keys, &mut [&mut attr]).unwrap();
        assert_eq!(attr, vec![0, 10, 20, 99, 98]);
    }

    #[test]
    fn rejects_undersized_buffers() {
        let mut s = sorter(2);
        let mut keys = vec![2, 1, 0];
        assert_eq!(
            s.sort(&mut keys, &mut []),
            Err(SortError::CapacityTooSmall { capacity: 2, len: 3 })
        );

        let mut s = sorter(8);
        let mut short = vec![0u8; 2];
        assert_eq!(
            s.sort(&mut keys, &mut [&mut short]),
            Err(SortError::AttributeTooShort {
                index: 0,
                len: 2,
                required: 3
            })
        );
    }
}
