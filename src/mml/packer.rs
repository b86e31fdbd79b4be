//! Subsequence packing of data blocks.
//!
//! Finding the shortest common supersequence is NP-complete, so this only
//! handles the case where one whole block appears inside another. A block
//! found that way is emitted as an alias into the longer block.

/// Where a sequence was found inside another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRef {
    /// Index of the containing sequence in the input.
    pub base: usize,
    /// Element offset of the match within the containing sequence.
    pub offset: usize,
}

/// For each input sequence, find a longer (or equally long but later in
/// length order) sequence that contains it.
///
/// Candidates are tried from longest to shortest and every start offset is
/// tested in order; the first match wins. Sequences that sort after one
/// another never alias in both directions, so the result has no cycles.
pub fn subseq_pack<T: PartialEq>(seqs: &[&[T]]) -> Vec<Option<PackedRef>> {
    let mut by_len: Vec<usize> = (0..seqs.len()).collect();
    by_len.sort_by_key(|&i| seqs[i].len());

    let mut out = vec![None; seqs.len()];
    for (rank, &key) in by_len.iter().enumerate() {
        let needle = seqs[key];
        if needle.is_empty() {
            continue;
        }
        out[key] = by_len[rank + 1..].iter().rev().find_map(|&candidate| {
            let hay = seqs[candidate];
            hay.windows(needle.len())
                .position(|w| w == needle)
                .map(|offset| PackedRef {
                    base: candidate,
                    offset,
                })
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contained_block_aliases_into_longer() {
        let a: &[u8] = &[3, 4];
        let b: &[u8] = &[1, 2, 3, 4, 5];
        let packed = subseq_pack(&[a, b]);
        assert_eq!(packed[0], Some(PackedRef { base: 1, offset: 2 }));
        assert_eq!(packed[1], None);
    }

    #[test]
    fn unrelated_blocks_stay() {
        let a: &[u8] = &[9, 9];
        let b: &[u8] = &[1, 2, 3];
        assert_eq!(subseq_pack(&[a, b]), vec![None, None]);
    }

    #[test]
    fn longest_candidate_wins() {
        let short: &[u8] = &[7];
        let mid: &[u8] = &[7, 8];
        let long: &[u8] = &[6, 6, 7, 8, 9];
        let packed = subseq_pack(&[short, mid, long]);
        assert_eq!(packed[0], Some(PackedRef { base: 2, offset: 2 }));
        assert_eq!(packed[1], Some(PackedRef { base: 2, offset: 2 }));
        assert_eq!(packed[2], None);
    }

    #[test]
    fn first_offset_wins() {
        let a: &[u8] = &[1];
        let b: &[u8] = &[0, 1, 0, 1];
        assert_eq!(subseq_pack(&[a, b])[0], Some(PackedRef { base: 1, offset: 1 }));
    }

    #[test]
    fn identical_blocks_alias_one_way() {
        let a: &[u8] = &[5, 6];
        let b: &[u8] = &[5, 6];
        let packed = subseq_pack(&[a, b]);
        assert_eq!(packed[0], Some(PackedRef { base: 1, offset: 0 }));
        assert_eq!(packed[1], None);
    }

    #[test]
    fn empty_input() {
        let seqs: [&[u8]; 0] = [];
        assert!(subseq_pack(&seqs).is_empty());
        let empty: &[u8] = &[];
        assert_eq!(subseq_pack(&[empty]), vec![None]);
    }

    #[test]
    fn deterministic() {
        let blocks: Vec<Vec<u16>> = vec![vec![1, 2], vec![2, 3, 4], vec![1, 2, 3, 4], vec![4]];
        let refs: Vec<&[u16]> = blocks.iter().map(Vec::as_slice).collect();
        assert_eq!(subseq_pack(&refs), subseq_pack(&refs));
    }
}
