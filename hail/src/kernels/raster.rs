// Functional model of the raster kernel
//
// Mirrors the PL IP: an on-chip indexed framebuffer, a colormap
// BRAM, a direct-mapped texture column cache and a single-slot flat
// cache, driven by the mode register. Execution happens inside the
// START write; the caller's DONE poll completes on its first read.
//
// Austin Shafer - 2025
use super::{KernelPort, RegFile};
use crate::cmd::{
    DrawCommand, CMD_BYTES, CMD_COLUMN, CMD_SPAN, COLUMN_BYTES, FLAT_BYTES, LIGHT_LEVELS,
    SCREEN_HEIGHT, SCREEN_WIDTH,
};
use crate::regs::{self, Control};
use utils::log;

/// Slots in the direct-mapped texture column cache
const TEX_CACHE_SLOTS: usize = 256;
/// Bytes in the colormap BRAM
const COLORMAP_BYTES: usize = LIGHT_LEVELS * 256;

pub struct RasterKernel {
    rk_regs: RegFile,
    /// 32 x 256 lighting table
    rk_colormap: Box<[u8]>,
    /// The on-chip 320x200 indexed framebuffer. Persists across
    /// frames; cleared only by CLEAR_FB
    rk_fb: Box<[u8]>,
    /// Texture column cache, 256 slots of 128 bytes, tag = tex_off,
    /// index = (tex_off >> 7) & 0xff
    rk_tex_tags: [u32; TEX_CACHE_SLOTS],
    rk_tex_valid: [bool; TEX_CACHE_SLOTS],
    rk_tex_data: Box<[u8]>,
    /// Single-slot cache of the active 64x64 flat
    rk_flat_tag: u32,
    rk_flat_valid: bool,
    rk_flat: Box<[u8]>,
}

impl RasterKernel {
    pub fn new() -> Self {
        Self {
            rk_regs: RegFile::new(),
            rk_colormap: vec![0; COLORMAP_BYTES].into_boxed_slice(),
            rk_fb: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
            rk_tex_tags: [0; TEX_CACHE_SLOTS],
            rk_tex_valid: [false; TEX_CACHE_SLOTS],
            rk_tex_data: vec![0; TEX_CACHE_SLOTS * COLUMN_BYTES].into_boxed_slice(),
            rk_flat_tag: 0,
            rk_flat_valid: false,
            rk_flat: vec![0; FLAT_BYTES].into_boxed_slice(),
        }
    }

    fn exec(&mut self) {
        match self.rk_regs.get(regs::REG_MODE) {
            regs::MODE_LOAD_COLORMAP => self.load_colormap(),
            regs::MODE_CLEAR_FB => self.clear_fb(),
            regs::MODE_DRAW_BATCH => self.draw_batch(),
            regs::MODE_DMA_OUT => self.dma_out(),
            regs::MODE_DRAW_AND_DMA => {
                self.draw_batch();
                self.dma_out();
            }
            other => log::error!("raster kernel: ignoring unknown mode {}", other),
        }
    }

    /// Burst the colormap image from DDR and drop both texture caches
    fn load_colormap(&mut self) {
        let src = self.rk_regs.ptr(regs::REG_CMAP_PTR_LO) as *const u8;
        unsafe {
            std::ptr::copy_nonoverlapping(src, self.rk_colormap.as_mut_ptr(), COLORMAP_BYTES);
        }
        for valid in self.rk_tex_valid.iter_mut() {
            *valid = false;
        }
        self.rk_flat_valid = false;
    }

    fn clear_fb(&mut self) {
        for px in self.rk_fb.iter_mut() {
            *px = 0;
        }
        self.rk_flat_valid = false;
    }

    /// Fetch and execute the command stream
    ///
    /// Commands are pulled from the 128-bit wide command region in
    /// sub-batches of 64. Each record is rebuilt from its two words
    /// by bit-range extraction; the region is only byte aligned, so
    /// nothing here reinterprets it in place.
    fn draw_batch(&mut self) {
        let count = utils::partial_min(
            self.rk_regs.get(regs::REG_CMD_COUNT) as usize,
            crate::cmd::MAX_COMMANDS,
        );
        let cmd_base = self.rk_regs.ptr(regs::REG_SRC_PTR_LO) as *const u8;
        let atlas_base = self.rk_regs.ptr(regs::REG_ATLAS_PTR_LO) as *const u8;

        let mut fetched = [0; 64 * CMD_BYTES];
        let mut consumed = 0;
        while consumed < count {
            let take = utils::partial_min(64, count - consumed);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    cmd_base.add(consumed * CMD_BYTES),
                    fetched.as_mut_ptr(),
                    take * CMD_BYTES,
                );
            }

            for i in 0..take {
                let rec = &fetched[i * CMD_BYTES..(i + 1) * CMD_BYTES];
                let mut word = [0; 16];
                word.copy_from_slice(&rec[0..16]);
                let lo = u128::from_le_bytes(word);
                word.copy_from_slice(&rec[16..32]);
                let hi = u128::from_le_bytes(word);

                let cmd = DrawCommand::decode_words(lo, hi);
                match cmd.kind {
                    CMD_COLUMN => self.draw_column(&cmd, atlas_base),
                    CMD_SPAN => self.draw_span(&cmd, atlas_base),
                    other => log::error!("raster kernel: bad command kind {}", other),
                }
            }
            consumed += take;
        }
    }

    /// Draw one vertical texture strip
    fn draw_column(&mut self, cmd: &DrawCommand, atlas_base: *const u8) {
        // The PS clamps at queue time, but malformed commands must
        // still behave predictably
        let x = cmd.x1 as usize;
        if x >= SCREEN_WIDTH {
            return;
        }
        let y1 = utils::partial_min(cmd.y1 as usize, SCREEN_HEIGHT - 1);
        let y2 = utils::partial_min(cmd.y2 as usize, SCREEN_HEIGHT - 1);
        if y1 > y2 {
            return;
        }
        let light = utils::partial_min(cmd.light as usize, LIGHT_LEVELS - 1) * 256;

        let slot = ((cmd.tex_off >> 7) & 0xff) as usize;
        if !(self.rk_tex_valid[slot] && self.rk_tex_tags[slot] == cmd.tex_off) {
            // Miss: one 8-word burst from the atlas fills the slot
            unsafe {
                std::ptr::copy_nonoverlapping(
                    atlas_base.add(cmd.tex_off as usize),
                    self.rk_tex_data.as_mut_ptr().add(slot * COLUMN_BYTES),
                    COLUMN_BYTES,
                );
            }
            self.rk_tex_tags[slot] = cmd.tex_off;
            self.rk_tex_valid[slot] = true;
        }

        // Local copy of the column so the walk stays a tight II=1 loop
        let mut column = [0; COLUMN_BYTES];
        column.copy_from_slice(&self.rk_tex_data[slot * COLUMN_BYTES..(slot + 1) * COLUMN_BYTES]);

        let mut frac = cmd.frac;
        for y in y1..=y2 {
            let texel = column[((frac >> 16) & 127) as usize] as usize;
            self.rk_fb[y * SCREEN_WIDTH + x] = self.rk_colormap[light + texel];
            frac = frac.wrapping_add(cmd.step);
        }
    }

    /// Draw one horizontal flat span
    fn draw_span(&mut self, cmd: &DrawCommand, atlas_base: *const u8) {
        let y = cmd.y1 as usize;
        if y >= SCREEN_HEIGHT {
            return;
        }
        let x1 = cmd.x1 as usize;
        let x2 = utils::partial_min(cmd.x2 as usize, SCREEN_WIDTH - 1);
        if x1 > x2 {
            return;
        }
        let light = utils::partial_min(cmd.light as usize, LIGHT_LEVELS - 1) * 256;

        if !(self.rk_flat_valid && self.rk_flat_tag == cmd.tex_off) {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    atlas_base.add(cmd.tex_off as usize),
                    self.rk_flat.as_mut_ptr(),
                    FLAT_BYTES,
                );
            }
            self.rk_flat_tag = cmd.tex_off;
            self.rk_flat_valid = true;
        }

        let mut pos = cmd.frac;
        for x in x1..=x2 {
            // 64x64 tap from the packed fixed-point position
            let spot = ((pos >> 26) | ((pos >> 4) & 0x0fc0)) & 0xfff;
            let texel = self.rk_flat[spot as usize] as usize;
            self.rk_fb[y * SCREEN_WIDTH + x] = self.rk_colormap[light + texel];
            pos = pos.wrapping_add(cmd.step);
        }
    }

    /// Write the indexed frame out to DDR
    ///
    /// A rows value of 0 means the whole frame. The view-only 168
    /// row stride leaves the PS-drawn rows below it untouched in the
    /// destination.
    fn dma_out(&mut self) {
        let mut rows = self.rk_regs.get(regs::REG_ROWS) as usize;
        if rows == 0 || rows > SCREEN_HEIGHT {
            rows = SCREEN_HEIGHT;
        }
        let dst = self.rk_regs.ptr(regs::REG_FB_PTR_LO) as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(self.rk_fb.as_ptr(), dst, rows * SCREEN_WIDTH);
        }
    }
}

impl KernelPort for RasterKernel {
    fn read_reg(&mut self, offset: u32) -> u32 {
        match offset {
            regs::REG_CTRL => self.rk_regs.ctrl(),
            other => self.rk_regs.get(other),
        }
    }

    fn write_reg(&mut self, offset: u32, val: u32) {
        if offset == regs::REG_CTRL {
            if Control::from_bits_truncate(val).contains(Control::START) {
                self.rk_regs.set_done(false);
                self.exec();
                self.rk_regs.set_done(true);
            }
            return;
        }
        self.rk_regs.set(offset, val);
    }
}
