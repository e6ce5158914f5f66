// Shared DDR memory windows
//
// These are the regions both sides of the pipeline agree on: the PS
// writes commands/atlas/palette, the PL writes frame output. Window
// bases are runtime relocatable through the environment.
//
// Austin Shafer - 2025
#![allow(dead_code)]
extern crate nix;

use nix::fcntl::{open, OFlag};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::close;

use crate::{HailError, Result};
use utils::log;

/// Size of the packed-color output region (1600x1000 at 4 B or 2 B)
pub const FB_OUT_SIZE: usize = 8 << 20;
/// Size of the composed indexed frame region
pub const VIDEO_BUF_SIZE: usize = 0x10000;
/// Size of the command region, MAX_COMMANDS * 32 B
pub const CMD_BUF_SIZE: usize = 0x20000;
/// Size of the texture atlas region
pub const TEX_ATLAS_SIZE: usize = 16 << 20;
/// Colormap image (32 * 256 B) plus the 768 B RGB palette right
/// after it, rounded up to whole pages
pub const COLORMAP_SIZE: usize = 0x3000;
/// Byte offset of the RGB palette inside the colormap image
pub const PALETTE_OFFSET: usize = 32 * 256;
/// Size of the on-chip backed raster-to-present handoff region
pub const SHARED_BRAM_SIZE: usize = 0x10000;

// Default physical bases, all overridable from the environment
const FB_OUT_PHYS: u64 = 0x1e00_0000;
const VIDEO_BUF_PHYS: u64 = 0x1d00_0000;
const CMD_BUF_PHYS: u64 = 0x1d02_0000;
const COLORMAP_PHYS: u64 = 0x1d04_0000;
const TEX_ATLAS_PHYS: u64 = 0x1c00_0000;
const SHARED_BRAM_PHYS: u64 = 0x4000_0000;

enum WindowBacking {
    /// Process-local memory for the functional-model kernels. The
    /// Vec is held only to keep the allocation alive.
    Anon(Vec<u8>),
    /// A /dev/mem mapping of a physical window
    Mapped,
}

/// One shared memory window
///
/// `dev_addr` is the address the device sees: the physical base when
/// mapped, or the process virtual address in model mode (the model
/// kernels dereference their pointer registers just like an AXI
/// master would).
pub struct MemWindow {
    mw_ptr: *mut u8,
    mw_len: usize,
    mw_dev_addr: u64,
    mw_back: WindowBacking,
}

// WARNING
// While this is safe according to the language, the windows are only
// safe under the single-writer contract: the PS writes the command,
// atlas and colormap windows, the PL writes the output windows, and
// the opposite side reads only after a fence.
unsafe impl Send for MemWindow {}
unsafe impl Sync for MemWindow {}

impl MemWindow {
    /// Create an anonymous window for the model backing
    pub fn new_anon(len: usize) -> MemWindow {
        let mut backing = vec![0; len];
        let ptr = backing.as_mut_ptr();

        MemWindow {
            mw_ptr: ptr,
            mw_len: len,
            mw_dev_addr: ptr as u64,
            mw_back: WindowBacking::Anon(backing),
        }
    }

    /// Map a physical window through /dev/mem
    ///
    /// `phys` must be page aligned. Fails with INIT_FAILED if the
    /// region cannot be mapped, which is fatal for the pipeline.
    pub fn map_phys(phys: u64, len: usize) -> Result<MemWindow> {
        let fd = open("/dev/mem", OFlag::O_RDWR | OFlag::O_SYNC, Mode::empty()).map_err(|e| {
            log::error!("Could not open /dev/mem: {:?}", e);
            HailError::INIT_FAILED
        })?;

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                phys as libc::off_t,
            )
        };
        close(fd).ok();

        let ptr = ptr.map_err(|e| {
            log::error!("Could not map window at {:#x}: {:?}", phys, e);
            HailError::INIT_FAILED
        })?;

        Ok(MemWindow {
            mw_ptr: ptr as *mut u8,
            mw_len: len,
            mw_dev_addr: phys,
            mw_back: WindowBacking::Mapped,
        })
    }

    pub fn len(&self) -> usize {
        self.mw_len
    }

    /// The address to program into a kernel pointer register
    pub fn dev_addr(&self) -> u64 {
        self.mw_dev_addr
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.mw_ptr
    }

    /// Copy `src` into the window at byte offset `off`
    ///
    /// One contiguous copy; the window may be mapped non-cacheable,
    /// so callers must stage locally and never write fields in place.
    pub fn write_bulk(&self, off: usize, src: &[u8]) {
        assert!(off + src.len() <= self.mw_len);
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.mw_ptr.add(off), src.len());
        }
    }

    /// Copy window bytes at `off` into `dst`
    pub fn read_bulk(&self, off: usize, dst: &mut [u8]) {
        assert!(off + dst.len() <= self.mw_len);
        unsafe {
            std::ptr::copy_nonoverlapping(self.mw_ptr.add(off), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Fill `len` bytes at `off` with `val`
    pub fn fill(&self, off: usize, len: usize, val: u8) {
        assert!(off + len <= self.mw_len);
        unsafe {
            std::ptr::write_bytes(self.mw_ptr.add(off), val, len);
        }
    }
}

impl Drop for MemWindow {
    fn drop(&mut self) {
        if let WindowBacking::Mapped = self.mw_back {
            unsafe {
                munmap(self.mw_ptr as *mut _, self.mw_len).ok();
            }
        }
    }
}

/// Parse a hex base address from the environment
fn env_base(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(val) => {
            let trimmed = val.trim_start_matches("0x");
            match u64::from_str_radix(trimmed, 16) {
                Ok(base) => base,
                Err(_) => {
                    log::error!("Ignoring unparsable base in ${}: {}", name, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

/// The full set of shared windows
pub struct DdrMap {
    dm_fb_out: MemWindow,
    dm_video: MemWindow,
    dm_cmd: MemWindow,
    dm_atlas: MemWindow,
    dm_colormap: MemWindow,
    dm_shared: MemWindow,
}

impl DdrMap {
    /// Anonymous windows for the in-process kernel models
    pub fn new_model() -> DdrMap {
        DdrMap {
            dm_fb_out: MemWindow::new_anon(FB_OUT_SIZE),
            dm_video: MemWindow::new_anon(VIDEO_BUF_SIZE),
            dm_cmd: MemWindow::new_anon(CMD_BUF_SIZE),
            dm_atlas: MemWindow::new_anon(TEX_ATLAS_SIZE),
            dm_colormap: MemWindow::new_anon(COLORMAP_SIZE),
            dm_shared: MemWindow::new_anon(SHARED_BRAM_SIZE),
        }
    }

    /// Map the physical windows for real PL kernels
    ///
    /// Bases come from the environment when set; FB_SCANOUT_PHYS
    /// overrides the scanout destination.
    pub fn new_phys() -> Result<DdrMap> {
        let fb_base = env_base("FB_SCANOUT_PHYS", env_base("SQUALL_FB_OUT", FB_OUT_PHYS));

        Ok(DdrMap {
            dm_fb_out: MemWindow::map_phys(fb_base, FB_OUT_SIZE)?,
            dm_video: MemWindow::map_phys(
                env_base("SQUALL_VIDEO_BUF", VIDEO_BUF_PHYS),
                VIDEO_BUF_SIZE,
            )?,
            dm_cmd: MemWindow::map_phys(env_base("SQUALL_CMD_BUF", CMD_BUF_PHYS), CMD_BUF_SIZE)?,
            dm_atlas: MemWindow::map_phys(
                env_base("SQUALL_TEX_ATLAS", TEX_ATLAS_PHYS),
                TEX_ATLAS_SIZE,
            )?,
            dm_colormap: MemWindow::map_phys(
                env_base("SQUALL_COLORMAP", COLORMAP_PHYS),
                COLORMAP_SIZE,
            )?,
            dm_shared: MemWindow::map_phys(
                env_base("SQUALL_SHARED_BRAM", SHARED_BRAM_PHYS),
                SHARED_BRAM_SIZE,
            )?,
        })
    }

    pub fn fb_out(&self) -> &MemWindow {
        &self.dm_fb_out
    }

    pub fn video(&self) -> &MemWindow {
        &self.dm_video
    }

    pub fn cmd(&self) -> &MemWindow {
        &self.dm_cmd
    }

    pub fn atlas(&self) -> &MemWindow {
        &self.dm_atlas
    }

    pub fn colormap(&self) -> &MemWindow {
        &self.dm_colormap
    }

    pub fn shared(&self) -> &MemWindow {
        &self.dm_shared
    }
}
