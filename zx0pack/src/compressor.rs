//! Block driver and compressor context.
//!
//! All per-block scratch arrays are owned here and allocated once per
//! compressor at their maximum sizes; compressing reuses them block after
//! block. Only the rep offset, the bit-emission cursor and any unterminated
//! literal run carry across block boundaries, which is what forces blocks
//! to be emitted in order.

use crate::augment::OFFSET_CACHE_SIZE;
use crate::config::Zx0Config;
use crate::emit::EmitContext;
use crate::error::{Result, Zx0Error};
use crate::matchfinder::{Match, MatchFinder, NMATCHES_PER_INDEX};
use crate::parser::{Arrival, FinalMatch, NARRIVALS_PER_POSITION, Visited};
use crate::rle::build_rle_table;
use crate::stats::Zx0Stats;
use crate::{BLOCK_SIZE, INITIAL_REP_OFFSET, MIN_OFFSET, max_compressed_size};

/// Reducer iteration bound per block.
const MAX_REDUCE_PASSES: usize = 20;

/// Per-block progress report passed to the compression callback.
#[derive(Debug, Clone, Copy)]
pub struct Zx0Progress {
    /// Payload bytes fully emitted so far.
    pub processed: usize,
    /// Total payload bytes to compress.
    pub total: usize,
    /// Compressed bytes written so far.
    pub written: usize,
}

/// A reusable ZX0 compressor.
///
/// Construction allocates the full working set (dominated by the arrival
/// table, `BLOCK_SIZE x NARRIVALS_PER_POSITION` states); `compress` may be
/// called any number of times.
pub struct Zx0Compressor {
    pub(crate) config: Zx0Config,
    pub(crate) finder: MatchFinder,
    pub(crate) arrivals: Vec<Arrival>,
    pub(crate) matches: Vec<Match>,
    pub(crate) best: Vec<FinalMatch>,
    pub(crate) visited: Vec<Visited>,
    pub(crate) rle: Vec<u32>,
    pub(crate) bigram_head: Vec<i32>,
    pub(crate) bigram_next: Vec<i32>,
    pub(crate) offset_cache: Vec<i32>,
    pub(crate) stats: Zx0Stats,
}

impl Zx0Compressor {
    /// Create a compressor for the given configuration.
    pub fn new(config: Zx0Config) -> Self {
        Self {
            config,
            finder: MatchFinder::new(),
            arrivals: vec![Arrival::EMPTY; (BLOCK_SIZE + 1) * NARRIVALS_PER_POSITION],
            matches: vec![Match::default(); BLOCK_SIZE * NMATCHES_PER_INDEX],
            best: vec![FinalMatch::default(); BLOCK_SIZE],
            visited: vec![Visited::default(); BLOCK_SIZE],
            rle: Vec::new(),
            bigram_head: vec![-1; 1 << 16],
            bigram_next: Vec::new(),
            offset_cache: vec![-1; OFFSET_CACHE_SIZE],
            stats: Zx0Stats::default(),
        }
    }

    /// The configuration this compressor was built with.
    pub fn config(&self) -> &Zx0Config {
        &self.config
    }

    /// Statistics for the most recent `compress` call.
    pub fn stats(&self) -> &Zx0Stats {
        &self.stats
    }

    /// Compress `input` into a ZX0 stream.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.compress_with_progress(input, |_| {})
    }

    /// Compress `input`, reporting progress after each emitted block.
    pub fn compress_with_progress<F>(&mut self, input: &[u8], mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(Zx0Progress),
    {
        let dictionary = self.config.dictionary_size;
        if dictionary > input.len() {
            return Err(Zx0Error::DictionaryTooLarge {
                dictionary_size: dictionary,
                input_size: input.len(),
            });
        }
        if self.config.max_window < MIN_OFFSET {
            return Err(Zx0Error::InvalidWindow {
                window: self.config.max_window,
                min: MIN_OFFSET,
            });
        }
        let max_offset = self.config.effective_max_offset();
        let payload = input.len() - dictionary;

        self.stats.reset();
        self.stats.input_size = payload as u64;
        build_rle_table(input, &mut self.rle);
        self.stats.record_rle_runs(&self.rle);
        self.finder.reset(input.len());
        self.bigram_next.clear();
        self.bigram_next.resize(input.len(), -1);
        self.offset_cache.fill(-1);

        let mut ctx = EmitContext::new(max_compressed_size(payload));
        let mut cur_rep_offset = INITIAL_REP_OFFSET;
        let mut carried_literals = 0usize;
        let mut pos = dictionary;
        let mut first_block = true;

        if payload == 0 {
            self.emit_end_of_data(&mut ctx)?;
            return Ok(self.finish(ctx));
        }

        while pos < input.len() {
            let block_end = (pos + BLOCK_SIZE).min(input.len());
            let block_len = block_end - pos;
            let window_start = pos.saturating_sub(max_offset);

            self.matches[..block_len * NMATCHES_PER_INDEX].fill(Match::default());
            self.visited[..block_len].fill(Visited::default());

            self.finder.skip_bytes(input, pos);
            self.finder.find_all_matches(
                input,
                max_offset,
                pos,
                block_end,
                &self.rle,
                &mut self.matches[..block_len * NMATCHES_PER_INDEX],
            );

            self.augment_pass_a(input, window_start, pos, block_end, max_offset);
            self.optimize_forward(
                input,
                pos,
                block_end,
                NARRIVALS_PER_POSITION / 2,
                true,
                first_block,
                cur_rep_offset,
            );
            self.augment_pass_b(
                input,
                pos,
                block_end,
                max_offset,
                NARRIVALS_PER_POSITION / 2,
            );
            self.optimize_forward(
                input,
                pos,
                block_end,
                NARRIVALS_PER_POSITION,
                false,
                first_block,
                cur_rep_offset,
            );
            self.traceback(pos, block_end);

            let mut passes = 0;
            while self.reduce_commands(input, pos, block_end, cur_rep_offset) {
                passes += 1;
                if passes >= MAX_REDUCE_PASSES {
                    break;
                }
            }

            let is_last_block = block_end == input.len();
            let emitted = self.emit_block(
                &mut ctx,
                input,
                pos,
                block_end,
                is_last_block,
                cur_rep_offset,
                max_offset,
                carried_literals,
            )?;
            cur_rep_offset = emitted.rep_offset;
            if emitted.emitted_any {
                carried_literals = 0;
                pos = block_end - emitted.trailing_literals;
            } else {
                carried_literals += block_len;
                pos = block_end;
            }

            first_block = false;
            progress(Zx0Progress {
                processed: pos - dictionary,
                total: payload,
                written: ctx.len(),
            });
        }

        Ok(self.finish(ctx))
    }

    fn finish(&mut self, ctx: EmitContext) -> Vec<u8> {
        self.stats.output_size = ctx.len() as u64;
        self.stats.safe_distance = ctx.safe_distance();
        ctx.into_vec()
    }
}

impl Default for Zx0Compressor {
    fn default() -> Self {
        Self::new(Zx0Config::default())
    }
}
