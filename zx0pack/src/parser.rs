//! Forward multi-arrival parser.
//!
//! The parser sweeps each block left to right carrying, per input position,
//! the lowest-cost DP states ("arrivals") distinguished by their most recent
//! rep offset. Every live arrival is extended by one literal, by truncations
//! of the position's table matches, and by rep matches reusing the arrival's
//! rep offset; destination arrival sets stay sorted by (cost, score) and
//! never hold two states with the same rep offset.
//!
//! The first pass runs at half capacity and feeds the rep-insertion helper,
//! which back-fills the match table with offsets that open rep chains; the
//! second pass runs at full capacity on the enriched table and its cheapest
//! arrival at the block end is traced back into the final parse.

use crate::compressor::Zx0Compressor;
use crate::cost::{TOKEN_SIZE, literal_run_bits, match_len_bits, offset_bits};
use crate::matchfinder::{DEPTH_MASK, DEPTH_SPECULATIVE, Match, NMATCHES_PER_INDEX};
use crate::{MIN_ENCODED_MATCH_SIZE, MIN_OFFSET};

/// Arrival slots kept per input position on the final pass.
pub(crate) const NARRIVALS_PER_POSITION: usize = 16;

/// Above this length the parser considers only the full match, not shorter
/// truncations of it.
pub(crate) const LEAVE_ALONE_MATCH_SIZE: usize = 120;

/// A table match at least this long ends candidate enumeration for its
/// position.
const SKIP_SLOTS_MATCH_SIZE: usize = 512;

/// Cap on rep-insertion match extension.
const LCP_MAX: usize = 32767;

/// Recursion bound of the rep-insertion helper.
const MAX_FORWARD_REP_DEPTH: u32 = 9;

/// Back-pointer of an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Unused slot.
    Empty,
    /// Block-start sentinel.
    Start,
    /// Predecessor arrival: position and slot index within it.
    Prev { pos: u32, slot: u16 },
}

/// One DP state at an input position.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Arrival {
    /// Accumulated bit cost from the block start.
    pub cost: u32,
    /// Secondary tiebreak approximating weighted decoder command count.
    pub score: u32,
    /// Offset a rep-match emitted next would reuse.
    pub rep_offset: u32,
    /// Position where `rep_offset` was last established.
    pub rep_pos: u32,
    pub from: Step,
    /// 0 when this arrival was reached via a literal.
    pub match_len: u16,
    /// Consecutive literals ending at this arrival.
    pub num_literals: u32,
}

impl Arrival {
    pub(crate) const EMPTY: Self = Self {
        cost: u32::MAX,
        score: u32::MAX,
        rep_offset: 0,
        rep_pos: 0,
        from: Step::Empty,
        match_len: 0,
        num_literals: 0,
    };

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.from != Step::Empty
    }
}

/// Rep-insertion dedup marks for one position.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Visited {
    /// Offset this position was last byte-checked against.
    pub inner: u32,
    /// Offset this position was last evaluated as a rep target for.
    pub outer: u32,
}

/// One slot of the final parse.
///
/// `length == 0` marks a literal position, `length == -1` a position
/// consumed by an earlier multi-byte match (reducer scratch), and
/// `length >= MIN_ENCODED_MATCH_SIZE` with a non-zero offset a match.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FinalMatch {
    pub offset: u32,
    pub length: i32,
}

/// Insert `cand` into one position's arrival set, keeping it sorted by
/// (cost, score) with unique rep offsets.
///
/// With-offset candidates compare against the second-worst held cost so one
/// slot stays available for the same-offset rep arrival produced from the
/// same source.
fn insert_arrival(dest: &mut [Arrival], n_arrivals: usize, cand: Arrival, is_with_offset: bool) {
    let cap_idx = if is_with_offset {
        n_arrivals - 2
    } else {
        n_arrivals - 1
    };
    if cand.cost > dest[cap_idx].cost {
        return;
    }

    let mut n = 0;
    while n < n_arrivals {
        let held = &dest[n];
        if !held.is_live() || held.cost > cand.cost {
            break;
        }
        if held.cost == cand.cost && held.score >= cand.score {
            break;
        }
        n += 1;
    }
    if n >= n_arrivals {
        return;
    }

    // Rep-offset uniqueness: a better (or equally expensive) state with the
    // same rep offset wins; a worse one is overwritten by the shift below.
    for (i, held) in dest.iter().enumerate().take(n_arrivals) {
        if !held.is_live() {
            break;
        }
        if held.rep_offset == cand.rep_offset && (i < n || held.cost == cand.cost) {
            return;
        }
        if i >= n && held.cost > cand.cost {
            break;
        }
    }

    let mut z = n;
    while z < n_arrivals - 1 && dest[z].is_live() && dest[z].rep_offset != cand.rep_offset {
        z += 1;
    }
    let mut i = z;
    while i > n {
        dest[i] = dest[i - 1];
        i -= 1;
    }
    dest[n] = cand;
}

impl Zx0Compressor {
    /// Run one forward pass over `block_start..block_end`.
    ///
    /// `n_arrivals` is the effective arrival-set capacity for this pass;
    /// `insert_forward_reps` enables the rep-insertion helper (pass 1 only).
    /// `first_block` marks the stream's first block, whose first command
    /// must be a literal run: matches from the start sentinel are skipped
    /// there (they only exist in dictionary mode).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn optimize_forward(
        &mut self,
        input: &[u8],
        block_start: usize,
        block_end: usize,
        n_arrivals: usize,
        insert_forward_reps: bool,
        first_block: bool,
        cur_rep_offset: usize,
    ) {
        let block_len = block_end - block_start;
        self.arrivals[..(block_len + 1) * NARRIVALS_PER_POSITION].fill(Arrival::EMPTY);
        self.arrivals[0] = Arrival {
            cost: 0,
            score: 0,
            rep_offset: cur_rep_offset as u32,
            rep_pos: block_start as u32,
            from: Step::Start,
            match_len: 0,
            num_literals: 0,
        };

        for p in block_start..block_end {
            let src_base = (p - block_start) * NARRIVALS_PER_POSITION;
            if !self.arrivals[src_base].is_live() {
                continue;
            }

            // Literal extension into p + 1.
            let dest_base = (p + 1 - block_start) * NARRIVALS_PER_POSITION;
            for j in 0..n_arrivals {
                let src = self.arrivals[src_base + j];
                if !src.is_live() {
                    break;
                }
                let cost = src.cost
                    + 8
                    + literal_run_bits(src.num_literals + 1)
                    - literal_run_bits(src.num_literals);
                let cand = Arrival {
                    cost,
                    score: src.score + 1,
                    rep_offset: src.rep_offset,
                    rep_pos: src.rep_pos,
                    from: Step::Prev {
                        pos: p as u32,
                        slot: j as u16,
                    },
                    match_len: 0,
                    num_literals: src.num_literals + 1,
                };
                insert_arrival(
                    &mut self.arrivals[dest_base..dest_base + NARRIVALS_PER_POSITION],
                    n_arrivals,
                    cand,
                    false,
                );
            }

            // Match extensions. The stream's first command must be a
            // literal run, so the first block never starts with a match.
            if first_block && p == block_start {
                continue;
            }
            let match_base = (p - block_start) * NMATCHES_PER_INDEX;
            for mi in 0..NMATCHES_PER_INDEX {
                let m = self.matches[match_base + mi];
                if m.length == 0 {
                    break;
                }
                let raw_len = m.length as usize;
                let offset = m.offset as usize;

                if insert_forward_reps {
                    self.insert_forward_reps(input, p, offset, block_start, block_end, n_arrivals);
                }

                self.try_match_lengths(p, offset, raw_len, m.flags, block_start, block_end, n_arrivals);

                let depth = (m.depth & DEPTH_MASK) as usize;
                if depth > 0 && raw_len > depth {
                    let alt_offset = offset - depth;
                    let alt_len = raw_len - depth;
                    if alt_offset >= MIN_OFFSET && alt_len >= MIN_ENCODED_MATCH_SIZE {
                        self.try_match_lengths(
                            p, alt_offset, alt_len, m.flags, block_start, block_end, n_arrivals,
                        );
                    }
                }

                if raw_len >= SKIP_SLOTS_MATCH_SIZE {
                    break;
                }
            }
        }
    }

    /// Extend arrivals at `p` with every considered truncation of a match.
    #[allow(clippy::too_many_arguments)]
    fn try_match_lengths(
        &mut self,
        p: usize,
        offset: usize,
        length: usize,
        flags: u8,
        block_start: usize,
        block_end: usize,
        n_arrivals: usize,
    ) {
        let max_k = length.min(block_end - p);
        if max_k < MIN_ENCODED_MATCH_SIZE {
            return;
        }
        let min_k = if length >= LEAVE_ALONE_MATCH_SIZE {
            max_k
        } else {
            MIN_ENCODED_MATCH_SIZE
        };

        let src_base = (p - block_start) * NARRIVALS_PER_POSITION;
        for k in min_k..=max_k {
            let dest_base = (p + k - block_start) * NARRIVALS_PER_POSITION;
            let with_offset_bits =
                TOKEN_SIZE + match_len_bits(k as u32, false) + offset_bits(offset as u32);
            let rep_bits = TOKEN_SIZE + match_len_bits(k as u32, true);

            for j in 0..n_arrivals {
                let src = self.arrivals[src_base + j];
                if !src.is_live() {
                    break;
                }
                let from = Step::Prev {
                    pos: p as u32,
                    slot: j as u16,
                };

                // With-offset extension; skipped when the source would reach
                // the same offset more cheaply as a rep.
                if src.num_literals == 0 || src.rep_offset as usize != offset {
                    let cand = Arrival {
                        cost: src.cost + with_offset_bits,
                        score: src.score + 3 + u32::from(flags & 1),
                        rep_offset: offset as u32,
                        rep_pos: p as u32,
                        from,
                        match_len: k as u16,
                        num_literals: 0,
                    };
                    insert_arrival(
                        &mut self.arrivals[dest_base..dest_base + NARRIVALS_PER_POSITION],
                        n_arrivals,
                        cand,
                        true,
                    );
                }

                // Rep extension: same offset, source must follow a literal.
                if src.num_literals > 0 && src.rep_offset as usize == offset {
                    let cand = Arrival {
                        cost: src.cost + rep_bits,
                        score: src.score + 2,
                        rep_offset: src.rep_offset,
                        rep_pos: src.rep_pos,
                        from,
                        match_len: k as u16,
                        num_literals: 0,
                    };
                    insert_arrival(
                        &mut self.arrivals[dest_base..dest_base + NARRIVALS_PER_POSITION],
                        n_arrivals,
                        cand,
                        false,
                    );
                }
            }
        }
    }

    /// Project a discovered match offset onto positions where another parse
    /// branch established a different rep offset, injecting synthetic table
    /// entries that let the final pass discover rep chains.
    ///
    /// Bounded work-queue equivalent of a depth-9 recursion.
    pub(crate) fn insert_forward_reps(
        &mut self,
        input: &[u8],
        pos: usize,
        match_offset: usize,
        block_start: usize,
        block_end: usize,
        n_arrivals: usize,
    ) {
        let mut queue: Vec<(usize, u32)> = vec![(pos, 0)];

        while let Some((p, depth)) = queue.pop() {
            if depth >= MAX_FORWARD_REP_DEPTH {
                continue;
            }
            let src_base = (p - block_start) * NARRIVALS_PER_POSITION;

            for j in 0..n_arrivals {
                let arrival = self.arrivals[src_base + j];
                if !arrival.is_live() {
                    break;
                }
                if arrival.num_literals == 0 {
                    continue;
                }
                let rep_offset = arrival.rep_offset as usize;
                if rep_offset == 0 || rep_offset == match_offset {
                    continue;
                }

                let q = arrival.rep_pos as usize;
                if q <= block_start || q + 1 >= block_end {
                    continue;
                }
                let visited = &mut self.visited[q - block_start];
                if visited.outer == match_offset as u32 {
                    continue;
                }
                visited.outer = match_offset as u32;

                // Positions with real matches are covered by enumeration.
                if self.matches[(q - block_start) * NMATCHES_PER_INDEX].length != 0 {
                    continue;
                }
                if self.visited[q - block_start].inner == match_offset as u32 {
                    continue;
                }
                if q < match_offset || input[q] != input[q - match_offset] {
                    continue;
                }
                self.visited[q - block_start].inner = match_offset as u32;

                // Greedy extension with the run table as a lower-bound skip.
                let max_len = LCP_MAX.min(block_end - q);
                let mut len = (self.rle[q - match_offset].min(self.rle[q]) as usize).min(max_len);
                while len < max_len && input[q + len] == input[q - match_offset + len] {
                    len += 1;
                }
                if len < MIN_ENCODED_MATCH_SIZE {
                    continue;
                }

                let q_base = (q - block_start) * NMATCHES_PER_INDEX;
                let mut inserted = false;
                for s in 0..NMATCHES_PER_INDEX - 1 {
                    let slot = &mut self.matches[q_base + s];
                    if slot.length == 0 {
                        *slot = Match {
                            offset: match_offset as u32,
                            length: len as u16,
                            flags: 0,
                            depth: 0,
                        };
                        inserted = true;
                        break;
                    }
                    if slot.offset == match_offset as u32 {
                        // This extension is byte-verified; lengthen a shorter
                        // speculative entry in place.
                        if (slot.length as usize) < len && slot.depth & DEPTH_SPECULATIVE != 0 {
                            slot.length = len as u16;
                            slot.depth = 0;
                        }
                        break;
                    }
                }
                if inserted {
                    queue.push((q, depth + 1));
                }
            }
        }
    }

    /// Trace the cheapest arrival at `block_end` back into `best`.
    pub(crate) fn traceback(&mut self, block_start: usize, block_end: usize) {
        let block_len = block_end - block_start;
        self.best[..block_len].fill(FinalMatch::default());

        let mut pos = block_end;
        let mut slot = 0usize;
        loop {
            let arrival = self.arrivals[(pos - block_start) * NARRIVALS_PER_POSITION + slot];
            match arrival.from {
                Step::Start => break,
                Step::Empty => {
                    debug_assert!(false, "traceback reached an empty arrival slot");
                    break;
                }
                Step::Prev { pos: fp, slot: fs } => {
                    let fp = fp as usize;
                    if arrival.match_len > 0 {
                        self.best[fp - block_start] = FinalMatch {
                            offset: arrival.rep_offset,
                            length: i32::from(arrival.match_len),
                        };
                    }
                    pos = fp;
                    slot = fs as usize;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(cost: u32, score: u32, rep_offset: u32) -> Arrival {
        Arrival {
            cost,
            score,
            rep_offset,
            rep_pos: 0,
            from: Step::Start,
            match_len: 0,
            num_literals: 0,
        }
    }

    fn live_slots(dest: &[Arrival]) -> Vec<(u32, u32, u32)> {
        dest.iter()
            .take_while(|a| a.is_live())
            .map(|a| (a.cost, a.score, a.rep_offset))
            .collect()
    }

    #[test]
    fn test_insert_keeps_cost_order() {
        let mut dest = [Arrival::EMPTY; 4];
        insert_arrival(&mut dest, 4, arrival(30, 0, 3), false);
        insert_arrival(&mut dest, 4, arrival(10, 0, 1), false);
        insert_arrival(&mut dest, 4, arrival(20, 0, 2), false);
        assert_eq!(live_slots(&dest), vec![(10, 0, 1), (20, 0, 2), (30, 0, 3)]);
    }

    #[test]
    fn test_insert_score_tiebreak() {
        let mut dest = [Arrival::EMPTY; 4];
        insert_arrival(&mut dest, 4, arrival(10, 5, 1), false);
        insert_arrival(&mut dest, 4, arrival(10, 2, 2), false);
        assert_eq!(live_slots(&dest), vec![(10, 2, 2), (10, 5, 1)]);
    }

    #[test]
    fn test_insert_rep_offset_uniqueness() {
        let mut dest = [Arrival::EMPTY; 4];
        insert_arrival(&mut dest, 4, arrival(10, 0, 7), false);
        // Worse cost, same rep offset: dropped.
        insert_arrival(&mut dest, 4, arrival(20, 0, 7), false);
        assert_eq!(live_slots(&dest), vec![(10, 0, 7)]);

        // Better cost, same rep offset: replaces the held state.
        insert_arrival(&mut dest, 4, arrival(5, 0, 7), false);
        assert_eq!(live_slots(&dest), vec![(5, 0, 7)]);
    }

    #[test]
    fn test_insert_drops_tail_when_full() {
        let mut dest = [Arrival::EMPTY; 3];
        insert_arrival(&mut dest, 3, arrival(10, 0, 1), false);
        insert_arrival(&mut dest, 3, arrival(20, 0, 2), false);
        insert_arrival(&mut dest, 3, arrival(30, 0, 3), false);
        insert_arrival(&mut dest, 3, arrival(15, 0, 4), false);
        assert_eq!(live_slots(&dest), vec![(10, 0, 1), (15, 0, 4), (20, 0, 2)]);
    }

    #[test]
    fn test_with_offset_reserves_last_slot() {
        let mut dest = [Arrival::EMPTY; 3];
        insert_arrival(&mut dest, 3, arrival(10, 0, 1), false);
        insert_arrival(&mut dest, 3, arrival(20, 0, 2), false);
        // dest[cap_idx = 1].cost == 20, so a with-offset candidate costing
        // more is rejected even though the last slot is free.
        insert_arrival(&mut dest, 3, arrival(25, 0, 3), true);
        assert_eq!(live_slots(&dest), vec![(10, 0, 1), (20, 0, 2)]);
        // A literal/rep candidate of the same cost is accepted there.
        insert_arrival(&mut dest, 3, arrival(25, 0, 3), false);
        assert_eq!(live_slots(&dest), vec![(10, 0, 1), (20, 0, 2), (25, 0, 3)]);
    }
}
