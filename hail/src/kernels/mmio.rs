// Volatile AXI-Lite register access for live PL kernels
//
// Austin Shafer - 2025
use super::KernelPort;
use crate::mem::MemWindow;
use crate::Result;

/// Length of one kernel's register aperture
const REG_APERTURE: usize = 0x1000;

/// A /dev/mem mapped kernel control surface
pub struct MmioPort {
    mp_win: MemWindow,
}

impl MmioPort {
    pub fn new(base: u64) -> Result<MmioPort> {
        Ok(MmioPort {
            mp_win: MemWindow::map_phys(base, REG_APERTURE)?,
        })
    }
}

impl KernelPort for MmioPort {
    fn read_reg(&mut self, offset: u32) -> u32 {
        unsafe {
            std::ptr::read_volatile(self.mp_win.as_ptr().add(offset as usize) as *const u32)
        }
    }

    fn write_reg(&mut self, offset: u32, val: u32) {
        unsafe {
            std::ptr::write_volatile(self.mp_win.as_ptr().add(offset as usize) as *mut u32, val);
        }
    }
}
