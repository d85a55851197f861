//! Command reduction.
//!
//! The parser's traceback is locally optimal per arrival chain, but some
//! savings only become visible once whole command boundaries are known.
//! One reducer pass walks the final parse left to right, maintaining the
//! running literal count and the rep offset in effect, and greedily applies
//! rewrites:
//!
//! 1. absorb a trailing literal into the following match when lengthening
//!    the match is free;
//! 2. switch a with-offset match to the rep offset when the payload allows;
//! 3. switch a match to the following match's offset so the follower
//!    becomes a rep (with a partial variant that shortens the match and
//!    turns the residual into literals);
//! 4. turn a short match back into literals when merging the surrounding
//!    runs is cheaper;
//! 5. join back-to-back matches sharing one extendable offset.
//!
//! The driver re-runs the pass until it reports no change, bounded at 20
//! iterations.

use crate::compressor::Zx0Compressor;
use crate::cost::{literal_run_bits, match_command_bits, match_len_bits};
use crate::parser::FinalMatch;
use crate::{MIN_ENCODED_MATCH_SIZE, MIN_OFFSET};

/// Matches shorter than this are candidates for conversion to literals.
const SHORT_MATCH_LIMIT: usize = 9;

/// Bit cost of a literal-run command including its byte-aligned payload.
#[inline]
fn literal_total_bits(run_len: usize) -> u32 {
    literal_run_bits(run_len as u32) + 8 * run_len as u32
}

/// Bit cost of `next` given the rep offset in effect and whether it follows
/// at least one literal.
#[inline]
fn next_command_bits(next: FinalMatch, rep_in_effect: u32, follows_literal: bool) -> u32 {
    let is_rep = follows_literal && next.offset == rep_in_effect;
    match_command_bits(next.offset, next.length as u32, is_rep)
}

impl Zx0Compressor {
    /// One reducer pass over the block's final parse.
    ///
    /// Returns whether the pass strictly decreased the parse's bit cost.
    /// Cost-neutral rewrites (which only shrink the command count) are
    /// applied without reporting a change, so the outer loop terminates.
    pub(crate) fn reduce_commands(
        &mut self,
        input: &[u8],
        block_start: usize,
        block_end: usize,
        initial_rep_offset: usize,
    ) -> bool {
        let block_len = block_end - block_start;
        let mut did_reduce = false;
        let mut rep = initial_rep_offset as u32;
        let mut num_literals = 0usize;
        let mut i = 0usize;

        while i < block_len {
            let current = self.best[i];
            if current.length < 0 {
                i += 1;
                continue;
            }
            if current.length == 0 {
                num_literals += 1;
                i += 1;
                continue;
            }

            let mut offset = current.offset;
            let mut len = current.length as usize;

            // Rule 1: pull preceding literals into the match while the
            // length code grows by no more than the 8 payload bits saved.
            while num_literals >= 2 {
                let p = block_start + i;
                if p <= offset as usize || input[p - 1] != input[p - 1 - offset as usize] {
                    break;
                }
                let is_rep = offset == rep;
                let growth = match_len_bits(len as u32 + 1, is_rep)
                    - match_len_bits(len as u32, is_rep);
                if growth > 8 {
                    break;
                }
                self.best[i - 1] = FinalMatch {
                    offset,
                    length: len as i32 + 1,
                };
                self.best[i] = FinalMatch {
                    offset: 0,
                    length: -1,
                };
                i -= 1;
                len += 1;
                num_literals -= 1;
                let saving = 8 + literal_run_bits(num_literals as u32 + 1)
                    - literal_run_bits(num_literals as u32);
                if growth < saving {
                    did_reduce = true;
                }
            }

            let p = block_start + i;

            // Locate the next command.
            let mut j = i + len;
            let mut gap = 0usize;
            while j < block_len && self.best[j].length == 0 {
                gap += 1;
                j += 1;
            }
            let next = if j < block_len && self.best[j].length > 0 {
                Some(self.best[j])
            } else {
                None
            };

            // Rule 5: join with a back-to-back follower.
            if gap == 0 {
                if let Some(m2) = next {
                    let len2 = m2.length as usize;
                    let joined_ok = (0..len2)
                        .all(|t| input[p + len + t] == input[p + len + t - offset as usize]);
                    if joined_ok {
                        let is_rep = num_literals > 0 && offset == rep;
                        let old = match_command_bits(offset, len as u32, is_rep)
                            + match_command_bits(m2.offset, len2 as u32, false);
                        let new = match_command_bits(offset, (len + len2) as u32, is_rep);
                        if new <= old {
                            if new < old {
                                did_reduce = true;
                            }
                            self.best[i] = FinalMatch {
                                offset,
                                length: (len + len2) as i32,
                            };
                            self.best[j] = FinalMatch {
                                offset: 0,
                                length: -1,
                            };
                            continue;
                        }
                    }
                }
            }

            // Rule 2: substitute the rep offset for this match's offset.
            if let Some(m2) = next {
                if num_literals > 0
                    && offset != rep
                    && rep as usize >= MIN_OFFSET
                    && p >= rep as usize
                    && (0..len).all(|t| input[p + t] == input[p + t - rep as usize])
                {
                    let follows = gap > 0;
                    let old = match_command_bits(offset, len as u32, false)
                        + next_command_bits(m2, offset, follows);
                    let new = match_command_bits(rep, len as u32, true)
                        + next_command_bits(m2, rep, follows);
                    if new < old {
                        offset = rep;
                        self.best[i].offset = rep;
                        did_reduce = true;
                    }
                }
            }

            // Rule 3: adopt the follower's offset so it becomes a rep.
            if let Some(m2) = next {
                if m2.offset != offset && p >= m2.offset as usize {
                    let o2 = m2.offset as usize;
                    let self_bits = |off: u32, l: usize| {
                        let is_rep = num_literals > 0 && off == rep;
                        match_command_bits(off, l as u32, is_rep)
                    };
                    let full_ok = (0..len).all(|t| input[p + t] == input[p + t - o2]);

                    if full_ok && gap > 0 {
                        let old = self_bits(offset, len)
                            + next_command_bits(m2, offset, true);
                        let new = self_bits(m2.offset, len)
                            + match_command_bits(m2.offset, m2.length as u32, true);
                        if new < old {
                            offset = m2.offset;
                            self.best[i].offset = offset;
                            did_reduce = true;
                        }
                    } else if !full_ok {
                        let mut keep = 0usize;
                        while keep < len && input[p + keep] == input[p + keep - o2] {
                            keep += 1;
                        }
                        if keep >= MIN_ENCODED_MATCH_SIZE {
                            let tail = len - keep;
                            let old = self_bits(offset, len)
                                + literal_total_bits(gap)
                                + next_command_bits(m2, offset, gap > 0);
                            let new = self_bits(m2.offset, keep)
                                + literal_total_bits(tail + gap)
                                + match_command_bits(m2.offset, m2.length as u32, true);
                            if new < old {
                                self.best[i] = FinalMatch {
                                    offset: m2.offset,
                                    length: keep as i32,
                                };
                                for t in keep..len {
                                    self.best[i + t] = FinalMatch::default();
                                }
                                offset = m2.offset;
                                len = keep;
                                did_reduce = true;
                            }
                        }
                    }
                }
            }

            // Rule 4: short match back to literals, merging surrounding runs.
            if len < SHORT_MATCH_LIMIT {
                let is_rep = num_literals > 0 && offset == rep;
                let merged = num_literals + len + gap;
                let (old_next, new_next) = match next {
                    Some(m2) => (
                        next_command_bits(m2, offset, gap > 0),
                        next_command_bits(m2, rep, true),
                    ),
                    None => (0, 0),
                };
                let old = literal_total_bits(num_literals)
                    + match_command_bits(offset, len as u32, is_rep)
                    + literal_total_bits(gap)
                    + old_next;
                let new = literal_total_bits(merged) + new_next;
                if new < old {
                    for t in 0..len {
                        self.best[i + t] = FinalMatch::default();
                    }
                    did_reduce = true;
                    continue;
                }
            }

            i += len;
            rep = offset;
            num_literals = 0;
        }

        did_reduce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::Zx0Compressor;

    fn set_parse(compressor: &mut Zx0Compressor, parse: &[(u32, i32)]) {
        for (i, &(offset, length)) in parse.iter().enumerate() {
            compressor.best[i] = FinalMatch { offset, length };
        }
    }

    fn parse_of(compressor: &Zx0Compressor, len: usize) -> Vec<(u32, i32)> {
        compressor.best[..len]
            .iter()
            .map(|fm| (fm.offset, fm.length))
            .collect()
    }

    #[test]
    fn test_absorbs_literal_into_following_match() {
        let input = b"ababab";
        let mut compressor = Zx0Compressor::default();
        // Three literals, then a length-3 match at offset 2. The literal at
        // position 2 also matches at offset 2, and lengthening the match
        // from 3 to 4 keeps the same length code.
        set_parse(&mut compressor, &[(0, 0), (0, 0), (0, 0), (2, 3), (0, 0), (0, 0)]);

        assert!(compressor.reduce_commands(input, 0, input.len(), 1));
        assert_eq!(compressor.best[2].offset, 2);
        assert_eq!(compressor.best[2].length, 4);
        assert_eq!(compressor.best[3].length, -1);

        // Idempotence: a second pass reports no change and changes nothing.
        let before = parse_of(&compressor, input.len());
        assert!(!compressor.reduce_commands(input, 0, input.len(), 1));
        assert_eq!(parse_of(&compressor, input.len()), before);
    }

    #[test]
    fn test_joins_back_to_back_matches() {
        let input = b"abababab";
        let mut compressor = Zx0Compressor::default();
        // Two adjacent offset-2 matches; the second is forced non-rep by
        // the format, so the joined match is strictly cheaper.
        set_parse(
            &mut compressor,
            &[(0, 0), (0, 0), (2, 3), (0, 0), (0, 0), (2, 3), (0, 0), (0, 0)],
        );

        assert!(compressor.reduce_commands(input, 0, input.len(), 1));
        assert_eq!(compressor.best[2].offset, 2);
        assert_eq!(compressor.best[2].length, 6);
        assert_eq!(compressor.best[5].length, -1);

        assert!(!compressor.reduce_commands(input, 0, input.len(), 1));
    }

    #[test]
    fn test_converts_costly_short_match_to_literals() {
        // A length-2 match at a large offset costs more than two literal
        // bytes once the surrounding runs merge.
        let mut input = vec![0u8; 600];
        for (i, byte) in input.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        input[580] = input[0];
        input[581] = input[1];
        let mut compressor = Zx0Compressor::default();
        let mut parse = vec![(0u32, 0i32); 600];
        parse[580] = (580, 2);
        set_parse(&mut compressor, &parse);

        assert!(compressor.reduce_commands(&input, 0, input.len(), 1));
        assert_eq!(compressor.best[580].length, 0);
        assert!(!compressor.reduce_commands(&input, 0, input.len(), 1));
    }

    #[test]
    fn test_substitutes_rep_offset() {
        // After the offset-4 match, the offset-8 match's payload "xyz" is
        // also present at offset 4; switching to the rep offset drops the
        // explicit offset bits and makes the last match a rep as well.
        let input = b"wxyzwxyzQxyzRxyz";
        let mut compressor = Zx0Compressor::default();
        let mut parse = vec![(0u32, 0i32); 16];
        parse[4] = (4, 4); // "wxyz" at 4
        parse[9] = (8, 3); // "xyz" at 9, offset 8
        parse[13] = (4, 3); // "xyz" at 13, offset 4
        set_parse(&mut compressor, &parse);

        assert!(compressor.reduce_commands(input, 0, input.len(), 1));
        assert_eq!(compressor.best[9].offset, 4);
        assert_eq!(compressor.best[9].length, 3);
        assert!(!compressor.reduce_commands(input, 0, input.len(), 1));
    }
}
