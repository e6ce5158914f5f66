// The AXI-Lite register map shared by both kernels
//
// The raster and present IPs expose the same control protocol and
// the same pointer register layout. Scalar meaning past 0x48 is
// kernel specific.
//
// Austin Shafer - 2025
#![allow(dead_code)]

use crate::{HailError, Result};

bitflags! {
    /// The kernel control register
    ///
    /// START is written by the PS to kick one invocation. DONE and
    /// IDLE are read back while polling for completion.
    pub struct Control: u32 {
        const START = 1 << 0;
        const DONE  = 1 << 1;
        const IDLE  = 1 << 2;
    }
}

// Byte offsets of the per-kernel registers
pub const REG_CTRL: u32 = 0x00;
pub const REG_FB_PTR_LO: u32 = 0x10;
pub const REG_FB_PTR_HI: u32 = 0x14;
pub const REG_ATLAS_PTR_LO: u32 = 0x1C;
pub const REG_ATLAS_PTR_HI: u32 = 0x20;
pub const REG_CMAP_PTR_LO: u32 = 0x28;
pub const REG_CMAP_PTR_HI: u32 = 0x2C;
pub const REG_SRC_PTR_LO: u32 = 0x34;
pub const REG_SRC_PTR_HI: u32 = 0x38;
pub const REG_MODE: u32 = 0x40;
pub const REG_CMD_COUNT: u32 = 0x48;
pub const REG_ROWS: u32 = 0x4C;
// Output pointers for write lanes 1..3. Lane 0 is REG_FB_PTR
pub const REG_LANE1_PTR_LO: u32 = 0x50;
pub const REG_LANE1_PTR_HI: u32 = 0x54;
pub const REG_LANE2_PTR_LO: u32 = 0x58;
pub const REG_LANE2_PTR_HI: u32 = 0x5C;
pub const REG_LANE3_PTR_LO: u32 = 0x60;
pub const REG_LANE3_PTR_HI: u32 = 0x64;
// Present kernel scalars
pub const REG_PRESENT_SCALE: u32 = 0x68;
pub const REG_PRESENT_ROWS: u32 = 0x6C;
pub const REG_PRESENT_LANES: u32 = 0x70;
pub const REG_PRESENT_FORMAT: u32 = 0x74;
pub const REG_PRESENT_STRIDE: u32 = 0x78;
pub const REG_SHARPEN_EN: u32 = 0x7C;
pub const REG_SHARPEN_STRENGTH: u32 = 0x80;

/// Size of the model register files, in 32-bit words
pub const REG_FILE_WORDS: usize = 64;

// On-wire mode scalars. Scalar 0 is overloaded: the raster kernel
// loads its colormap BRAM, the present kernel loads the RGB palette
// that sits in the same DDR image.
pub const MODE_LOAD_COLORMAP: u32 = 0;
pub const MODE_CLEAR_FB: u32 = 1;
pub const MODE_DRAW_BATCH: u32 = 2;
pub const MODE_DMA_OUT: u32 = 3;
pub const MODE_DRAW_AND_DMA: u32 = 4;
pub const MODE_PRESENT: u32 = 5;

/// Output pixel format of the present kernel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bpp XRGB, four bytes per pixel
    Xrgb8888,
    /// 16-bpp R5G6B5, two bytes per pixel
    Rgb565,
}

impl PixelFormat {
    pub fn to_scalar(&self) -> u32 {
        match self {
            PixelFormat::Xrgb8888 => 0,
            PixelFormat::Rgb565 => 1,
        }
    }

    pub fn from_scalar(val: u32) -> PixelFormat {
        match val {
            1 => PixelFormat::Rgb565,
            _ => PixelFormat::Xrgb8888,
        }
    }

    /// Bytes per output pixel
    pub fn bpp(&self) -> usize {
        match self {
            PixelFormat::Xrgb8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// One kernel invocation, in tagged form
///
/// This is the PS-side view of the duck-typed mode register. Payload
/// fields are spread into their scalar registers when the mode is
/// programmed, right before START is written.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Mode {
    /// Burst the 8 KiB colormap image into the raster kernel
    LoadColormap,
    /// Zero the on-chip indexed framebuffer
    ClearFb,
    /// Execute `count` commands
    DrawBatch { count: u32 },
    /// Write the indexed framebuffer out to DDR. `rows` of 0 means
    /// the full 200 row frame
    DmaOut { rows: u32 },
    /// DrawBatch immediately followed by DmaOut in one handshake
    DrawAndDma { count: u32, rows: u32 },
    /// Expand, upscale and pack the indexed source frame
    Present {
        scale: u32,
        rows: u32,
        lanes: u32,
        format: PixelFormat,
        stride_bytes: u32,
    },
    /// Refresh the present kernel's RGB palette from the colormap image
    LoadPalette,
}

impl Mode {
    pub fn to_scalar(&self) -> u32 {
        match self {
            Mode::LoadColormap => MODE_LOAD_COLORMAP,
            Mode::ClearFb => MODE_CLEAR_FB,
            Mode::DrawBatch { .. } => MODE_DRAW_BATCH,
            Mode::DmaOut { .. } => MODE_DMA_OUT,
            Mode::DrawAndDma { .. } => MODE_DRAW_AND_DMA,
            Mode::Present { .. } => MODE_PRESENT,
            // Scalar 0 is reused, the present kernel interprets it
            // as a palette refresh
            Mode::LoadPalette => MODE_LOAD_COLORMAP,
        }
    }

    /// Validate the payload against the submission contract
    pub fn validate(&self) -> Result<()> {
        match *self {
            Mode::DrawBatch { count } | Mode::DrawAndDma { count, .. } => {
                if count as usize > crate::cmd::MAX_COMMANDS {
                    return Err(HailError::INVALID);
                }
            }
            Mode::Present { scale, lanes, .. } => {
                if scale != 1 && scale != 5 {
                    return Err(HailError::INVALID);
                }
                if lanes != 1 && lanes != 4 {
                    return Err(HailError::INVALID);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
