// Functional model of the present kernel
//
// Expands the indexed source frame through the RGB palette, scales
// it 5x nearest-neighbor (or passes it through at native width),
// optionally sharpens, and packs 128-bit output words across one or
// four write lanes.
//
// Austin Shafer - 2025
use super::{KernelPort, RegFile};
use crate::cmd::{SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::mem::PALETTE_OFFSET;
use crate::regs::{self, Control, PixelFormat};
use utils::log;

/// Bytes in the RGB palette BRAM
const PALETTE_BYTES: usize = 256 * 3;

pub struct PresentKernel {
    pk_regs: RegFile,
    /// Raw 256 x 3 palette
    pk_pal: Box<[u8]>,
    /// Palette expanded to packed XRGB words
    pk_pal32: Box<[u32]>,
    /// The equivalent R5G6B5 table
    pk_pal16: Box<[u16]>,
}

/// One channel of the five-tap sharpen ring
///
/// out = c + ((c - avg(neighbors)) * strength) >> 8, saturated
fn sharpen_channel(c: u8, left: u8, right: u8, above: u8, below: u8, strength: i32) -> u8 {
    let center = c as i32;
    let avg = (left as i32 + right as i32 + above as i32 + below as i32) / 4;
    let out = center + (((center - avg) * strength) >> 8);
    utils::partial_max(utils::partial_min(out, 255), 0) as u8
}

fn pack_xrgb(rgb: [u8; 3]) -> u32 {
    ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32
}

fn pack_565(rgb: [u8; 3]) -> u16 {
    (((rgb[0] as u16) >> 3) << 11) | (((rgb[1] as u16) >> 2) << 5) | ((rgb[2] as u16) >> 3)
}

impl PresentKernel {
    pub fn new() -> Self {
        Self {
            pk_regs: RegFile::new(),
            pk_pal: vec![0; PALETTE_BYTES].into_boxed_slice(),
            pk_pal32: vec![0; 256].into_boxed_slice(),
            pk_pal16: vec![0; 256].into_boxed_slice(),
        }
    }

    fn exec(&mut self) {
        match self.pk_regs.get(regs::REG_MODE) {
            // Scalar 0 on this kernel refreshes the palette from the
            // tail of the colormap image
            regs::MODE_LOAD_COLORMAP => self.load_palette(),
            regs::MODE_PRESENT => self.present(),
            other => log::error!("present kernel: ignoring unknown mode {}", other),
        }
    }

    fn load_palette(&mut self) {
        let src = self.pk_regs.ptr(regs::REG_CMAP_PTR_LO) as *const u8;
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.add(PALETTE_OFFSET),
                self.pk_pal.as_mut_ptr(),
                PALETTE_BYTES,
            );
        }
        for i in 0..256 {
            let rgb = [self.pk_pal[i * 3], self.pk_pal[i * 3 + 1], self.pk_pal[i * 3 + 2]];
            self.pk_pal32[i] = pack_xrgb(rgb);
            self.pk_pal16[i] = pack_565(rgb);
        }
    }

    fn pal_rgb(&self, idx: u8) -> [u8; 3] {
        let base = idx as usize * 3;
        [self.pk_pal[base], self.pk_pal[base + 1], self.pk_pal[base + 2]]
    }

    /// Expand one source row to sharpened RGB triples
    ///
    /// The ring taps the rows above and below, clamped at the frame
    /// edges, after palette expansion and before packing.
    fn sharpen_row(&self, rows: [&[u8]; 3], strength: i32, out: &mut [[u8; 3]; SCREEN_WIDTH]) {
        let [above, center, below] = rows;
        for x in 0..SCREEN_WIDTH {
            let left = if x == 0 { 0 } else { x - 1 };
            let right = utils::partial_min(x + 1, SCREEN_WIDTH - 1);
            let c = self.pal_rgb(center[x]);
            let l = self.pal_rgb(center[left]);
            let r = self.pal_rgb(center[right]);
            let u = self.pal_rgb(above[x]);
            let d = self.pal_rgb(below[x]);
            for ch in 0..3 {
                out[x][ch] = sharpen_channel(c[ch], l[ch], r[ch], u[ch], d[ch], strength);
            }
        }
    }

    /// The two-stage expand/pack presentation loop
    fn present(&mut self) {
        let src_base = self.pk_regs.ptr(regs::REG_SRC_PTR_LO) as *const u8;
        let mut rows = self.pk_regs.get(regs::REG_PRESENT_ROWS) as usize;
        if rows == 0 || rows > SCREEN_HEIGHT {
            rows = SCREEN_HEIGHT;
        }
        let scale = if self.pk_regs.get(regs::REG_PRESENT_SCALE) == 5 {
            5
        } else {
            1
        };
        let lanes = if self.pk_regs.get(regs::REG_PRESENT_LANES) == 4 {
            4
        } else {
            1
        };
        let format = PixelFormat::from_scalar(self.pk_regs.get(regs::REG_PRESENT_FORMAT));
        let stride_bytes = self.pk_regs.get(regs::REG_PRESENT_STRIDE) as usize;
        let strength = (self.pk_regs.get(regs::REG_SHARPEN_STRENGTH) & 0xff) as i32;
        let sharpen = self.pk_regs.get(regs::REG_SHARPEN_EN) != 0 && strength != 0;

        let bpp = format.bpp();
        let px_per_word = 16 / bpp;
        let row_words = SCREEN_WIDTH * scale * bpp / 16;
        // Support display surfaces wider than the logical output
        let stride_words = utils::partial_max(row_words, (stride_bytes + 15) / 16);
        let lane_ptrs = [
            self.pk_regs.ptr(regs::REG_FB_PTR_LO),
            self.pk_regs.ptr(regs::REG_LANE1_PTR_LO),
            self.pk_regs.ptr(regs::REG_LANE2_PTR_LO),
            self.pk_regs.ptr(regs::REG_LANE3_PTR_LO),
        ];

        let mut row32 = [0u32; SCREEN_WIDTH];
        let mut row16 = [0u16; SCREEN_WIDTH];
        let mut sharp = [[0u8; 3]; SCREEN_WIDTH];
        let mut row_bytes = vec![0; row_words * 16];

        for sy in 0..rows {
            let center = unsafe {
                std::slice::from_raw_parts(src_base.add(sy * SCREEN_WIDTH), SCREEN_WIDTH)
            };

            // Stage one: produce the 320-element packed color row
            if sharpen {
                let above_y = if sy == 0 { 0 } else { sy - 1 };
                let below_y = utils::partial_min(sy + 1, rows - 1);
                let (above, below) = unsafe {
                    (
                        std::slice::from_raw_parts(
                            src_base.add(above_y * SCREEN_WIDTH),
                            SCREEN_WIDTH,
                        ),
                        std::slice::from_raw_parts(
                            src_base.add(below_y * SCREEN_WIDTH),
                            SCREEN_WIDTH,
                        ),
                    )
                };
                self.sharpen_row([above, center, below], strength, &mut sharp);
                for x in 0..SCREEN_WIDTH {
                    match format {
                        PixelFormat::Xrgb8888 => row32[x] = pack_xrgb(sharp[x]),
                        PixelFormat::Rgb565 => row16[x] = pack_565(sharp[x]),
                    }
                }
            } else {
                for x in 0..SCREEN_WIDTH {
                    match format {
                        PixelFormat::Xrgb8888 => row32[x] = self.pk_pal32[center[x] as usize],
                        PixelFormat::Rgb565 => row16[x] = self.pk_pal16[center[x] as usize],
                    }
                }
            }

            // Stage two: pack output words, expanding by the running
            // divide. Splitting this from stage one keeps the packed
            // word update free of the loop-carried source index.
            let mut q = 0;
            let mut r = 0;
            for w in 0..row_words {
                let word = &mut row_bytes[w * 16..(w + 1) * 16];
                for px in 0..px_per_word {
                    match format {
                        PixelFormat::Xrgb8888 => {
                            word[px * 4..(px + 1) * 4].copy_from_slice(&row32[q].to_le_bytes())
                        }
                        PixelFormat::Rgb565 => {
                            word[px * 2..(px + 1) * 2].copy_from_slice(&row16[q].to_le_bytes())
                        }
                    }
                    r += 1;
                    if r >= scale {
                        r -= scale;
                        q += 1;
                    }
                }
            }

            // Each source row lands on `scale` consecutive output
            // rows. In four-lane mode each lane owns a disjoint
            // quarter of the row's word range.
            for rep in 0..scale {
                let word_base = (sy * scale + rep) * stride_words;
                for w in 0..row_words {
                    let lane = if lanes == 4 { w / (row_words / 4) } else { 0 };
                    let dst = (lane_ptrs[lane] + ((word_base + w) * 16) as u64) as *mut u8;
                    unsafe {
                        std::ptr::copy_nonoverlapping(row_bytes[w * 16..].as_ptr(), dst, 16);
                    }
                }
            }
        }
    }
}

impl KernelPort for PresentKernel {
    fn read_reg(&mut self, offset: u32) -> u32 {
        match offset {
            regs::REG_CTRL => self.pk_regs.ctrl(),
            other => self.pk_regs.get(other),
        }
    }

    fn write_reg(&mut self, offset: u32, val: u32) {
        if offset == regs::REG_CTRL {
            if Control::from_bits_truncate(val).contains(Control::START) {
                self.pk_regs.set_done(false);
                self.exec();
                self.pk_regs.set_done(true);
            }
            return;
        }
        self.pk_regs.set(offset, val);
    }
}
