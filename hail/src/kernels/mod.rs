// The PL kernel pair
//
// Both kernels sit behind the same register port seam. On real
// hardware the port is a volatile AXI-Lite mapping; in model mode it
// is an in-process functional kernel that executes the programmed
// mode synchronously when START is written.
//
// Austin Shafer - 2025
pub mod mmio;
pub mod present;
pub mod raster;

pub use mmio::MmioPort;
pub use present::PresentKernel;
pub use raster::RasterKernel;

use crate::regs::{self, Control, REG_FILE_WORDS};
use crate::{HailError, Result};

/// Register-level access to one kernel
///
/// This is the only seam the PS driver talks through, so swapping a
/// functional model for live PL is a matter of which port gets boxed
/// at init.
pub trait KernelPort: Send {
    fn read_reg(&mut self, offset: u32) -> u32;
    fn write_reg(&mut self, offset: u32, val: u32);
}

/// Polling budget for waiting on IDLE before a submission
pub const IDLE_POLL_BUDGET: usize = 100_000;
/// Polling budget for waiting on DONE after a submission
pub const DONE_POLL_BUDGET: usize = 1_000_000;

/// Program a 64-bit pointer into a lo/hi register pair
pub fn write_ptr(port: &mut dyn KernelPort, lo_off: u32, addr: u64) {
    port.write_reg(lo_off, addr as u32);
    port.write_reg(lo_off + 4, (addr >> 32) as u32);
}

/// Kick one kernel invocation
pub fn start(port: &mut dyn KernelPort) {
    port.write_reg(regs::REG_CTRL, Control::START.bits());
}

/// Spread a tagged mode into its scalar registers
///
/// The payload registers are written first so the mode scalar is
/// never observed with stale parameters.
pub fn program_mode(port: &mut dyn KernelPort, mode: &crate::regs::Mode) {
    use crate::regs::Mode;

    match *mode {
        Mode::DrawBatch { count } => {
            port.write_reg(regs::REG_CMD_COUNT, count);
        }
        Mode::DmaOut { rows } => {
            port.write_reg(regs::REG_ROWS, rows);
        }
        Mode::DrawAndDma { count, rows } => {
            port.write_reg(regs::REG_CMD_COUNT, count);
            port.write_reg(regs::REG_ROWS, rows);
        }
        Mode::Present {
            scale,
            rows,
            lanes,
            format,
            stride_bytes,
        } => {
            port.write_reg(regs::REG_PRESENT_SCALE, scale);
            port.write_reg(regs::REG_PRESENT_ROWS, rows);
            port.write_reg(regs::REG_PRESENT_LANES, lanes);
            port.write_reg(regs::REG_PRESENT_FORMAT, format.to_scalar());
            port.write_reg(regs::REG_PRESENT_STRIDE, stride_bytes);
        }
        Mode::LoadColormap | Mode::ClearFb | Mode::LoadPalette => {}
    }
    port.write_reg(regs::REG_MODE, mode.to_scalar());
}

/// Spin until the kernel reports IDLE
pub fn wait_for_idle(port: &mut dyn KernelPort) -> Result<()> {
    for _ in 0..IDLE_POLL_BUDGET {
        let ctrl = Control::from_bits_truncate(port.read_reg(regs::REG_CTRL));
        if ctrl.contains(Control::IDLE) {
            return Ok(());
        }
        std::hint::spin_loop();
    }
    Err(HailError::TIMEOUT)
}

/// Spin until the kernel reports DONE
pub fn wait_for_done(port: &mut dyn KernelPort) -> Result<()> {
    for _ in 0..DONE_POLL_BUDGET {
        let ctrl = Control::from_bits_truncate(port.read_reg(regs::REG_CTRL));
        if ctrl.contains(Control::DONE) {
            return Ok(());
        }
        std::hint::spin_loop();
    }
    Err(HailError::TIMEOUT)
}

/// The model kernels' register file
///
/// Holds the raw scalar registers plus the DONE latch. The models
/// are never busy from the caller's point of view (execution happens
/// inside the START write), so IDLE always reads back set.
pub(crate) struct RegFile {
    rf_regs: [u32; REG_FILE_WORDS],
    rf_done: bool,
}

impl RegFile {
    pub fn new() -> Self {
        Self {
            rf_regs: [0; REG_FILE_WORDS],
            rf_done: false,
        }
    }

    pub fn get(&self, offset: u32) -> u32 {
        self.rf_regs[(offset / 4) as usize]
    }

    pub fn set(&mut self, offset: u32, val: u32) {
        self.rf_regs[(offset / 4) as usize] = val;
    }

    /// Assemble the 64-bit pointer in a lo/hi register pair
    pub fn ptr(&self, lo_off: u32) -> u64 {
        (self.get(lo_off) as u64) | ((self.get(lo_off + 4) as u64) << 32)
    }

    pub fn ctrl(&self) -> u32 {
        let mut ctrl = Control::IDLE;
        if self.rf_done {
            ctrl |= Control::DONE;
        }
        ctrl.bits()
    }

    pub fn set_done(&mut self, done: bool) {
        self.rf_done = done;
    }
}
