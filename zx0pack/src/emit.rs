//! ZX0 bitstream emission.
//!
//! The wire format interleaves bit-packed codes with byte-aligned payloads:
//! command bits and Elias codes fill "reservoir" bytes allocated in place in
//! the output, while literal bytes and the low offset byte are appended
//! byte-aligned. A partially filled reservoir byte therefore stays open
//! while later payload bytes are written past it.
//!
//! A with-offset match embeds the first bit of its length code in the free
//! LSB of the raw offset byte; [`EmitContext`] models that with an explicit
//! pending first-bit slot claimed by the next Elias code.

use crate::compressor::Zx0Compressor;
use crate::error::{Result, Zx0Error};
use crate::MIN_OFFSET;

/// High-offset Elias value reserved for the end-of-data sentinel.
const EOD_OFFSET_VALUE: u32 = 256;

/// Bit-level output state for one compressed stream.
pub(crate) struct EmitContext {
    out: Vec<u8>,
    limit: usize,
    /// Open reservoir byte: index and shift of the next bit to fill.
    bit_anchor: Option<(usize, u8)>,
    /// Byte whose LSB is claimed by the next Elias code's first bit.
    pending_first_bit: Option<usize>,
    /// True at the very start of the stream; the first literal run emits no
    /// leading token bit.
    pub(crate) first_command: bool,
    /// Whether the last emitted command was a literal run.
    pub(crate) after_literals: bool,
    /// Payload bytes represented by the commands emitted so far.
    uncompressed: u64,
    /// Running maximum of (uncompressed - compressed) at command ends.
    max_delta: i64,
    /// Logical stream bits emitted (reservoir padding excluded).
    bits_written: u64,
}

impl EmitContext {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            out: Vec::new(),
            limit,
            bit_anchor: None,
            pending_first_bit: None,
            first_command: true,
            after_literals: false,
            uncompressed: 0,
            max_delta: 0,
            bits_written: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.out.len()
    }

    /// Logical bits emitted so far; the spare bits of an open reservoir
    /// byte do not count.
    #[cfg(test)]
    pub(crate) fn bits_written(&self) -> u64 {
        self.bits_written
    }

    fn check_capacity(&self) -> Result<()> {
        if self.out.len() >= self.limit {
            return Err(Zx0Error::output_overflow(self.limit));
        }
        Ok(())
    }

    pub(crate) fn push_byte(&mut self, byte: u8) -> Result<()> {
        self.check_capacity()?;
        self.out.push(byte);
        self.bits_written += 8;
        Ok(())
    }

    /// Write one bit MSB-first into the open reservoir byte, allocating a
    /// fresh zero-filled byte at the write cursor when none is open.
    pub(crate) fn write_bit(&mut self, bit: u8) -> Result<()> {
        debug_assert!(bit <= 1);
        match self.bit_anchor.take() {
            None => {
                self.check_capacity()?;
                self.out.push(bit << 7);
                self.bit_anchor = Some((self.out.len() - 1, 6));
            }
            Some((idx, shift)) => {
                self.out[idx] |= bit << shift;
                if shift > 0 {
                    self.bit_anchor = Some((idx, shift - 1));
                }
            }
        }
        self.bits_written += 1;
        Ok(())
    }

    /// Write a control bit, honoring a pending first-bit redirection.
    fn write_code_bit(&mut self, bit: u8) -> Result<()> {
        if let Some(idx) = self.pending_first_bit.take() {
            self.out[idx] |= bit;
            return Ok(());
        }
        self.write_bit(bit)
    }

    /// Emit the interlaced Elias-gamma code for `value` (>= 1): one (0, bit)
    /// pair per mantissa bit below the MSB, then a terminating 1. Mantissa
    /// bits are complemented when `invert` is set; control bits never are.
    pub(crate) fn write_elias(&mut self, value: u32, invert: bool) -> Result<()> {
        debug_assert!(value >= 1);
        let bits = 32 - value.leading_zeros();
        for i in (0..bits - 1).rev() {
            self.write_code_bit(0)?;
            let bit = ((value >> i) & 1) as u8 ^ u8::from(invert);
            self.write_bit(bit)?;
        }
        self.write_code_bit(1)
    }

    /// Claim the LSB of the most recently pushed byte for the next Elias
    /// code's first bit.
    fn redirect_first_bit_here(&mut self) {
        self.pending_first_bit = Some(self.out.len() - 1);
    }

    fn note_command(&mut self, payload_bytes: usize) {
        self.uncompressed += payload_bytes as u64;
        let delta = self.uncompressed as i64 - self.out.len() as i64;
        self.max_delta = self.max_delta.max(delta);
    }

    /// Minimum extra headroom for single-buffer in-place decompression.
    pub(crate) fn safe_distance(&self) -> u64 {
        let final_delta = self.uncompressed as i64 - self.out.len() as i64;
        (self.max_delta - final_delta).max(0) as u64
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.out
    }
}

/// Result of emitting one block.
pub(crate) struct BlockEmit {
    /// Whether any command was emitted (false only for an all-literal,
    /// non-final block, whose bytes the driver carries forward).
    pub emitted_any: bool,
    /// Trailing in-block literal bytes withheld for the next block.
    pub trailing_literals: usize,
    /// Rep offset in effect after the block.
    pub rep_offset: usize,
}

impl Zx0Compressor {
    /// Serialize the block's final parse.
    ///
    /// `carried_literals` bytes immediately before `block_start` belong to a
    /// literal run no earlier block could terminate; they are flushed as
    /// part of this block's first literal run.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn emit_block(
        &mut self,
        ctx: &mut EmitContext,
        input: &[u8],
        block_start: usize,
        block_end: usize,
        is_last_block: bool,
        rep_offset_in: usize,
        max_offset: usize,
        carried_literals: usize,
    ) -> Result<BlockEmit> {
        let block_len = block_end - block_start;
        let mut rep = rep_offset_in;
        let mut num_literals = carried_literals;
        let mut literal_start = block_start - carried_literals;
        let mut emitted_any = false;
        let mut i = 0usize;

        while i < block_len {
            let fm = self.best[i];
            if fm.length <= 0 {
                debug_assert!(fm.length == 0, "emitter walked into a consumed slot");
                if num_literals == 0 {
                    literal_start = block_start + i;
                }
                num_literals += 1;
                i += 1;
                continue;
            }

            if num_literals > 0 {
                self.flush_literals(ctx, input, literal_start, num_literals)?;
                emitted_any = true;
                num_literals = 0;
            }

            let offset = fm.offset as usize;
            let len = fm.length as usize;
            if offset < MIN_OFFSET || offset > max_offset {
                return Err(Zx0Error::invalid_offset(offset, MIN_OFFSET, max_offset));
            }

            if offset == rep && ctx.after_literals {
                // Rep match: 0 token, then the length (value + 2 encoding).
                ctx.write_bit(0)?;
                ctx.write_elias(len as u32, false)?;
                self.stats.rep_matches += 1;
            } else {
                if ctx.first_command {
                    return Err(Zx0Error::FirstCommandNotLiteral);
                }
                // With-offset match: 1 token, Elias high offset, raw low
                // byte whose LSB starts the length code.
                ctx.write_bit(1)?;
                ctx.write_elias((((offset - 1) >> 7) + 1) as u32, self.config.inverted)?;
                let low = ((offset - 1) & 0x7f) as u32;
                ctx.push_byte((((255 - low) << 1) & 0xff) as u8)?;
                ctx.redirect_first_bit_here();
                ctx.write_elias((len - 1) as u32, false)?;
                rep = offset;
            }
            ctx.first_command = false;
            ctx.after_literals = false;
            ctx.note_command(len);
            emitted_any = true;
            self.stats.offsets.record(offset as u64);
            self.stats.match_lens.record(len as u64);
            self.stats.commands += 1;

            i += len;
        }

        if !is_last_block {
            if !emitted_any {
                // A full block without a single match: keep the bytes in the
                // running literal run and let a later block terminate it.
                return Ok(BlockEmit {
                    emitted_any: false,
                    trailing_literals: 0,
                    rep_offset: rep,
                });
            }
            return Ok(BlockEmit {
                emitted_any: true,
                trailing_literals: num_literals,
                rep_offset: rep,
            });
        }

        if num_literals > 0 {
            self.flush_literals(ctx, input, literal_start, num_literals)?;
        }
        self.emit_end_of_data(ctx)?;
        Ok(BlockEmit {
            emitted_any: true,
            trailing_literals: 0,
            rep_offset: rep,
        })
    }

    fn flush_literals(
        &mut self,
        ctx: &mut EmitContext,
        input: &[u8],
        literal_start: usize,
        num_literals: usize,
    ) -> Result<()> {
        if ctx.after_literals && !ctx.first_command {
            // Two adjacent literal runs cannot be represented.
            return Err(Zx0Error::FirstCommandNotLiteral);
        }
        if !ctx.first_command {
            ctx.write_bit(0)?;
        }
        ctx.write_elias(num_literals as u32, false)?;
        for t in 0..num_literals {
            ctx.push_byte(input[literal_start + t])?;
        }
        ctx.first_command = false;
        ctx.after_literals = true;
        ctx.note_command(num_literals);
        self.stats.literal_runs.record(num_literals as u64);
        self.stats.commands += 1;
        Ok(())
    }

    /// Terminate the stream: a with-offset token whose high-offset value is
    /// the reserved sentinel.
    pub(crate) fn emit_end_of_data(&self, ctx: &mut EmitContext) -> Result<()> {
        ctx.write_bit(1)?;
        ctx.write_elias(EOD_OFFSET_VALUE, self.config.inverted)?;
        ctx.first_command = false;
        ctx.after_literals = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bits_msb_first() {
        let mut ctx = EmitContext::new(16);
        for bit in [1, 0, 1, 0, 1, 0, 1, 0] {
            ctx.write_bit(bit).unwrap();
        }
        assert_eq!(ctx.into_vec(), vec![0xAA]);
    }

    #[test]
    fn test_reservoir_stays_open_across_payload_bytes() {
        let mut ctx = EmitContext::new(16);
        ctx.write_bit(1).unwrap();
        ctx.push_byte(0x41).unwrap();
        ctx.write_bit(1).unwrap();
        // Both bits land in byte 0, around the payload byte.
        assert_eq!(ctx.into_vec(), vec![0b1100_0000, 0x41]);
    }

    #[test]
    fn test_write_elias_one_is_single_terminator() {
        let mut ctx = EmitContext::new(16);
        ctx.write_elias(1, false).unwrap();
        assert_eq!(ctx.into_vec(), vec![0b1000_0000]);
    }

    #[test]
    fn test_write_elias_pairs() {
        // 4 = 100b: pairs (0,0) (0,0), then terminator 1.
        let mut ctx = EmitContext::new(16);
        ctx.write_elias(4, false).unwrap();
        assert_eq!(ctx.into_vec(), vec![0b0000_1000]);

        // Inverted: mantissa bits complement to 1.
        let mut ctx = EmitContext::new(16);
        ctx.write_elias(4, true).unwrap();
        assert_eq!(ctx.into_vec(), vec![0b0101_1000]);
    }

    #[test]
    fn test_first_bit_redirection() {
        let mut ctx = EmitContext::new(16);
        ctx.push_byte(0b1111_1110).unwrap();
        ctx.redirect_first_bit_here();
        // elias(1) is a lone 1 bit; it must land in the pushed byte's LSB.
        ctx.write_elias(1, false).unwrap();
        assert_eq!(ctx.into_vec(), vec![0xFF]);

        let mut ctx = EmitContext::new(16);
        ctx.push_byte(0b0000_0000).unwrap();
        ctx.redirect_first_bit_here();
        // elias(2): control 0 (redirected), mantissa 0, terminator 1.
        ctx.write_elias(2, false).unwrap();
        assert_eq!(ctx.into_vec(), vec![0x00, 0b0100_0000]);
    }

    #[test]
    fn test_output_limit() {
        let mut ctx = EmitContext::new(1);
        ctx.push_byte(0).unwrap();
        assert!(matches!(
            ctx.push_byte(0),
            Err(Zx0Error::OutputOverflow { limit: 1 })
        ));
    }

    #[test]
    fn test_safe_distance_monotone_stream() {
        let mut ctx = EmitContext::new(64);
        ctx.push_byte(0).unwrap();
        ctx.note_command(16);
        ctx.push_byte(0).unwrap();
        ctx.note_command(16);
        // 32 payload bytes in 2 compressed bytes; worst delta was at the
        // end, so no extra headroom is needed beyond the final layout.
        assert_eq!(ctx.safe_distance(), 0);
    }
}
