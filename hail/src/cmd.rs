// The draw command wire format and the PS staging batch
//
// Austin Shafer - 2025
use serde::{Deserialize, Serialize};

/// Width of the indexed frame in pixels
pub const SCREEN_WIDTH: usize = 320;
/// Height of the indexed frame in pixels
pub const SCREEN_HEIGHT: usize = 200;
/// Rows of the frame holding the 3D view. The band below this is
/// drawn directly by the PS (status bar and friends)
pub const VIEW_ROWS: usize = 168;
/// Number of light levels in the colormap
pub const LIGHT_LEVELS: usize = 32;
/// Bytes in one encoded command
pub const CMD_BYTES: usize = 32;
/// Capacity of one batch. Sized so a full batch exactly fills the
/// 128 KiB command region
pub const MAX_COMMANDS: usize = 4096;
/// Bytes the raster kernel fetches for one texture column
pub const COLUMN_BYTES: usize = 128;
/// Bytes in one 64x64 flat
pub const FLAT_BYTES: usize = 4096;

/// Command kinds, byte 0 of the record
pub const CMD_COLUMN: u8 = 0;
pub const CMD_SPAN: u8 = 1;

/// One rasterization command, the wire contract between PS and PL
///
/// Encodes to exactly 32 little-endian bytes, which the kernel reads
/// back as two 128-bit words. Q16.16 values travel as raw u32 bits;
/// every walk over them is a wrapping add.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawCommand {
    /// CMD_COLUMN or CMD_SPAN
    pub kind: u8,
    /// Light level, 0..31
    pub light: u8,
    /// Column X, or span start X
    pub x1: u16,
    /// Span end X. Unused for columns
    pub x2: u16,
    /// Column start Y, or span row Y
    pub y1: u16,
    /// Column end Y. Unused for spans
    pub y2: u16,
    /// Q16.16 texture coordinate, or packed span position
    pub frac: u32,
    /// Q16.16 increment per pixel, or packed span step
    pub step: u32,
    /// Byte offset of the texture in the atlas, 16 byte aligned
    pub tex_off: u32,
}

impl DrawCommand {
    /// Serialize into the 32-byte wire record
    pub fn encode(&self, out: &mut [u8; CMD_BYTES]) {
        out[0] = self.kind;
        out[1] = self.light;
        out[2..4].copy_from_slice(&self.x1.to_le_bytes());
        out[4..6].copy_from_slice(&self.x2.to_le_bytes());
        out[6..8].copy_from_slice(&self.y1.to_le_bytes());
        out[8..10].copy_from_slice(&self.y2.to_le_bytes());
        out[10] = 0;
        out[11] = 0;
        out[12..16].copy_from_slice(&self.frac.to_le_bytes());
        out[16..20].copy_from_slice(&self.step.to_le_bytes());
        out[20..24].copy_from_slice(&self.tex_off.to_le_bytes());
        for b in out[24..32].iter_mut() {
            *b = 0;
        }
    }

    /// Rebuild a command from the two 128-bit words the kernel
    /// fetches from the command region
    ///
    /// The record may be byte aligned in DDR, so the kernel never
    /// reinterprets it in place as wide words. Both words arrive here
    /// already assembled little-endian; fields come out by bit-range
    /// extraction.
    pub fn decode_words(lo: u128, hi: u128) -> DrawCommand {
        DrawCommand {
            kind: (lo & 0xff) as u8,
            light: ((lo >> 8) & 0xff) as u8,
            x1: ((lo >> 16) & 0xffff) as u16,
            x2: ((lo >> 32) & 0xffff) as u16,
            y1: ((lo >> 48) & 0xffff) as u16,
            y2: ((lo >> 64) & 0xffff) as u16,
            frac: ((lo >> 96) & 0xffff_ffff) as u32,
            step: (hi & 0xffff_ffff) as u32,
            tex_off: ((hi >> 32) & 0xffff_ffff) as u32,
        }
    }
}

/// The PS-local staging batch
///
/// Commands are encoded straight into a cached staging buffer here.
/// The PL-visible command region is mapped non-cacheable, so nothing
/// writes into it per command; flush_batch() copies the staged bytes
/// over in one contiguous memcpy.
pub struct CommandBatch {
    /// Encoded records, cb_count * CMD_BYTES valid bytes
    cb_buf: Vec<u8>,
    cb_count: usize,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self {
            cb_buf: vec![0; MAX_COMMANDS * CMD_BYTES],
            cb_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cb_count
    }

    pub fn is_empty(&self) -> bool {
        self.cb_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.cb_count >= MAX_COMMANDS
    }

    pub fn clear(&mut self) {
        self.cb_count = 0;
    }

    /// The staged wire bytes, sized to the current command count
    pub fn as_bytes(&self) -> &[u8] {
        &self.cb_buf[..self.cb_count * CMD_BYTES]
    }

    /// Decode the staged record at `index`. Test and debug helper
    pub fn get(&self, index: usize) -> DrawCommand {
        assert!(index < self.cb_count);
        let base = index * CMD_BYTES;
        let mut lo = [0; 16];
        let mut hi = [0; 16];
        lo.copy_from_slice(&self.cb_buf[base..base + 16]);
        hi.copy_from_slice(&self.cb_buf[base + 16..base + 32]);
        DrawCommand::decode_words(u128::from_le_bytes(lo), u128::from_le_bytes(hi))
    }

    fn append(&mut self, cmd: &DrawCommand) {
        assert!(self.cb_count < MAX_COMMANDS);
        let base = self.cb_count * CMD_BYTES;
        let mut rec = [0; CMD_BYTES];
        cmd.encode(&mut rec);
        self.cb_buf[base..base + CMD_BYTES].copy_from_slice(&rec);
        self.cb_count += 1;
    }

    /// Stage one column command
    ///
    /// Clamps to screen bounds so the kernel's inner loop can assume
    /// in-range parameters. Returns false if the command degenerated
    /// to nothing and was dropped.
    pub fn queue_column(
        &mut self,
        x: i32,
        y1: i32,
        y2: i32,
        frac: u32,
        step: u32,
        tex_off: u32,
        light: u8,
    ) -> bool {
        if x < 0 || x >= SCREEN_WIDTH as i32 {
            return false;
        }
        let y1 = utils::partial_max(y1, 0);
        let y2 = utils::partial_min(y2, SCREEN_HEIGHT as i32 - 1);
        if y1 > y2 {
            return false;
        }

        self.append(&DrawCommand {
            kind: CMD_COLUMN,
            light: utils::partial_min(light, (LIGHT_LEVELS - 1) as u8),
            x1: x as u16,
            x2: 0,
            y1: y1 as u16,
            y2: y2 as u16,
            frac: frac,
            step: step,
            tex_off: tex_off,
        });
        return true;
    }

    /// Stage one span command
    pub fn queue_span(
        &mut self,
        y: i32,
        x1: i32,
        x2: i32,
        pos: u32,
        step: u32,
        tex_off: u32,
        light: u8,
    ) -> bool {
        if y < 0 || y >= SCREEN_HEIGHT as i32 {
            return false;
        }
        let x1 = utils::partial_max(x1, 0);
        let x2 = utils::partial_min(x2, SCREEN_WIDTH as i32 - 1);
        if x1 > x2 {
            return false;
        }

        self.append(&DrawCommand {
            kind: CMD_SPAN,
            light: utils::partial_min(light, (LIGHT_LEVELS - 1) as u8),
            x1: x1 as u16,
            x2: x2 as u16,
            y1: y as u16,
            y2: 0,
            frac: pos,
            step: step,
            tex_off: tex_off,
        });
        return true;
    }
}
