//! Match table augmentation.
//!
//! The hash-chain enumerator misses two-byte matches and some near offsets
//! that are cheap to reach as rep matches. Both augment passes walk a
//! per-bigram chain of earlier occurrences threaded over the window:
//!
//! - pass A (before parser pass 1) adds speculative entries for unseen
//!   chain offsets at positions with spare slots;
//! - pass B (between the parser passes) digs further back at positions
//!   whose best known match is still short, consults a small offset
//!   recency cache to avoid re-checking covered offsets, and feeds every
//!   confirmed new offset to the rep-insertion helper.
//!
//! Augmented entries carry the speculative depth bit and the score-penalty
//! flag so the parser can weigh them against enumerated matches.

use crate::compressor::Zx0Compressor;
use crate::matchfinder::{DEPTH_SPECULATIVE, Match, NMATCHES_PER_INDEX};
use crate::MIN_ENCODED_MATCH_SIZE;

/// Number of bigram-chain entries examined per position and pass.
const MAX_AUGMENT_STEPS: usize = 64;

/// Cap on augmented match extension.
const AUGMENT_MAX_LEN: usize = 128;

/// Pass B only digs at positions whose best known match is shorter.
const SHORT_MATCH_LEN: usize = 8;

/// Size of the offset recency cache (power of two).
pub(crate) const OFFSET_CACHE_SIZE: usize = 2048;

const NO_POS: i32 = -1;

#[inline]
fn bigram(input: &[u8], pos: usize) -> usize {
    (input[pos] as usize) << 8 | input[pos + 1] as usize
}

impl Zx0Compressor {
    /// Pass A: thread bigram chains over the window and add speculative
    /// entries for unseen offsets.
    pub(crate) fn augment_pass_a(
        &mut self,
        input: &[u8],
        window_start: usize,
        block_start: usize,
        block_end: usize,
        max_offset: usize,
    ) {
        self.bigram_head.fill(NO_POS);

        // Seed the chains with the retained window prefix.
        for pos in window_start..block_start {
            let bg = bigram(input, pos);
            self.bigram_next[pos] = self.bigram_head[bg];
            self.bigram_head[bg] = pos as i32;
        }

        for p in block_start..block_end {
            if p + 1 >= block_end {
                break;
            }
            let bg = bigram(input, p);
            let base = (p - block_start) * NMATCHES_PER_INDEX;
            let mut filled = self.filled_slots(base);

            if filled < NMATCHES_PER_INDEX - 1 {
                let mut chain = self.bigram_head[bg];
                let mut steps = 0;
                while chain >= 0 && steps < MAX_AUGMENT_STEPS && filled < NMATCHES_PER_INDEX - 1 {
                    let candidate = chain as usize;
                    chain = self.bigram_next[candidate];
                    steps += 1;

                    let offset = p - candidate;
                    if offset > max_offset {
                        break;
                    }
                    if self.offset_covered(base, filled, offset) {
                        continue;
                    }

                    let cap = AUGMENT_MAX_LEN.min(block_end - p);
                    let mut len = 0;
                    while len < cap && input[p + len] == input[candidate + len] {
                        len += 1;
                    }
                    if len >= MIN_ENCODED_MATCH_SIZE {
                        self.matches[base + filled] = Match {
                            offset: offset as u32,
                            length: len as u16,
                            flags: 1,
                            depth: DEPTH_SPECULATIVE,
                        };
                        filled += 1;
                    }
                }
            }

            self.bigram_next[p] = self.bigram_head[bg];
            self.bigram_head[bg] = p as i32;
        }
    }

    /// Pass B: at positions with only short matches, walk further back along
    /// the bigram chain; confirmed new offsets also trigger rep insertion.
    pub(crate) fn augment_pass_b(
        &mut self,
        input: &[u8],
        block_start: usize,
        block_end: usize,
        max_offset: usize,
        n_arrivals: usize,
    ) {
        for p in block_start..block_end {
            if p + 1 >= block_end {
                break;
            }
            let base = (p - block_start) * NMATCHES_PER_INDEX;
            let mut filled = self.filled_slots(base);
            if filled >= NMATCHES_PER_INDEX - 1 {
                continue;
            }
            let best_len = (0..filled)
                .map(|s| self.matches[base + s].length as usize)
                .max()
                .unwrap_or(0);
            if best_len >= SHORT_MATCH_LEN {
                continue;
            }

            let mut chain = self.bigram_next[p];
            let mut steps = 0;
            while chain >= 0 && steps < MAX_AUGMENT_STEPS && filled < NMATCHES_PER_INDEX - 1 {
                let candidate = chain as usize;
                chain = self.bigram_next[candidate];
                steps += 1;

                let offset = p - candidate;
                if offset > max_offset {
                    break;
                }

                let cache_idx = offset & (OFFSET_CACHE_SIZE - 1);
                if self.offset_cache[cache_idx] == p as i32 {
                    // An existing slot may cover this offset; lengthen a
                    // shorter speculative entry with the exact same offset
                    // in place.
                    for s in 0..filled {
                        let held = self.matches[base + s];
                        if held.covers_offset(offset as u32) {
                            if held.offset == offset as u32
                                && held.depth & DEPTH_SPECULATIVE != 0
                            {
                                let cap = AUGMENT_MAX_LEN.min(block_end - p);
                                let mut len = 0;
                                while len < cap && input[p + len] == input[candidate + len] {
                                    len += 1;
                                }
                                if len > held.length as usize {
                                    self.matches[base + s].length = len as u16;
                                }
                            }
                            break;
                        }
                    }
                    continue;
                }
                if self.offset_covered(base, filled, offset) {
                    continue;
                }

                let cap = AUGMENT_MAX_LEN.min(block_end - p);
                let mut len = 0;
                while len < cap && input[p + len] == input[candidate + len] {
                    len += 1;
                }
                if len < MIN_ENCODED_MATCH_SIZE {
                    continue;
                }

                // Only commit a genuinely new offset when at least one of the
                // next few positions would also benefit from it.
                let scan_end = (p + 3).min(block_end - 1);
                let confirmed = (p + 1..=scan_end).any(|q| input[q] == input[q - offset]);
                if !confirmed {
                    continue;
                }

                self.matches[base + filled] = Match {
                    offset: offset as u32,
                    length: len as u16,
                    flags: 1,
                    depth: DEPTH_SPECULATIVE,
                };
                filled += 1;
                self.offset_cache[cache_idx] = p as i32;
                self.insert_forward_reps(input, p, offset, block_start, block_end, n_arrivals);
            }
        }
    }

    fn filled_slots(&self, base: usize) -> usize {
        (0..NMATCHES_PER_INDEX)
            .take_while(|s| self.matches[base + s].length != 0)
            .count()
    }

    fn offset_covered(&self, base: usize, filled: usize, offset: usize) -> bool {
        (0..filled).any(|s| self.matches[base + s].covers_offset(offset as u32))
    }
}
