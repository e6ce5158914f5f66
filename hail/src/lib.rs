// The hail raster pipeline
//
// One PS driver pair and one PL kernel pair around a shared memory
// map and a 32 byte command ABI. The kernels run either as real PL
// behind volatile MMIO or as in-process functional models, selected
// at init; everything above the KernelPort seam is identical.
//
// Austin Shafer - 2025
#[macro_use]
extern crate bitflags;
extern crate utils;

mod atlas;
mod cmd;
mod driver;
mod kernels;
mod mem;
mod perf;
mod regs;

#[cfg(test)]
mod tests;

pub use atlas::AtlasManager;
pub use cmd::{
    CommandBatch, DrawCommand, CMD_BYTES, CMD_COLUMN, CMD_SPAN, COLUMN_BYTES, FLAT_BYTES,
    LIGHT_LEVELS, MAX_COMMANDS, SCREEN_HEIGHT, SCREEN_WIDTH, VIEW_ROWS,
};
pub use driver::{PresentParams, PresentSource, Presenter, Raster, Routing};
pub use kernels::{KernelPort, MmioPort, PresentKernel, RasterKernel};
pub use mem::{DdrMap, MemWindow, COLORMAP_SIZE, PALETTE_OFFSET, TEX_ATLAS_SIZE};
pub use perf::{PerfCounters, PerfSnapshot};
pub use regs::{Control, Mode, PixelFormat};

use std::sync::Arc;
use thiserror::Error;

/// Default AXI-Lite base of the raster kernel
pub const RASTER_BASE_DEFAULT: u64 = 0x43c0_0000;
/// Default AXI-Lite base of the present kernel
pub const PRESENT_BASE_DEFAULT: u64 = 0x43c1_0000;

#[allow(non_camel_case_types)]
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum HailError {
    #[error("A memory region or control surface could not be mapped")]
    INIT_FAILED,
    #[error("The kernel did not signal within its polling budget")]
    TIMEOUT,
    #[error("Invalid submission parameters")]
    INVALID,
}

pub type Result<T> = std::result::Result<T, HailError>;

/// What the kernel pair runs on
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KernelBacking {
    /// In-process functional models over anonymous memory
    Model,
    /// Live PL kernels behind /dev/mem mappings
    Mmio,
}

/// Pipeline creation parameters
#[derive(Debug, Copy, Clone)]
pub struct CreateInfo {
    pub backing: KernelBacking,
    pub raster_base: u64,
    pub present_base: u64,
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        CreateInfoBuilder {
            cb_info: CreateInfo {
                backing: KernelBacking::Model,
                raster_base: RASTER_BASE_DEFAULT,
                present_base: PRESENT_BASE_DEFAULT,
            },
        }
    }
}

pub struct CreateInfoBuilder {
    cb_info: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn backing(mut self, backing: KernelBacking) -> Self {
        self.cb_info.backing = backing;
        self
    }

    pub fn raster_base(mut self, base: u64) -> Self {
        self.cb_info.raster_base = base;
        self
    }

    pub fn present_base(mut self, base: u64) -> Self {
        self.cb_info.present_base = base;
        self
    }

    pub fn build(self) -> CreateInfo {
        self.cb_info
    }
}

/// Create the driver pair over one shared memory map
///
/// The Raster half belongs on the engine thread, the Presenter half
/// on the present worker. They share only the window map and the
/// perf record.
pub fn create(info: &CreateInfo) -> Result<(Raster, Presenter)> {
    let (map, raster_port, present_port): (
        DdrMap,
        Box<dyn KernelPort>,
        Box<dyn KernelPort>,
    ) = match info.backing {
        KernelBacking::Model => (
            DdrMap::new_model(),
            Box::new(RasterKernel::new()),
            Box::new(PresentKernel::new()),
        ),
        KernelBacking::Mmio => (
            DdrMap::new_phys()?,
            Box::new(MmioPort::new(info.raster_base)?),
            Box::new(MmioPort::new(info.present_base)?),
        ),
    };

    let map = Arc::new(map);
    let perf = Arc::new(PerfCounters::new());
    let raster = Raster::new(raster_port, map.clone(), perf.clone());
    let presenter = Presenter::new(present_port, map, perf);
    Ok((raster, presenter))
}
