// The PS side of the pipeline: command submission and present
// invocation
//
// The Raster half is owned by the engine thread, the Presenter half
// by the present worker. Neither takes locks; the split mirrors the
// two kernels, each single-issue.
//
// Austin Shafer - 2025
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use crate::atlas::AtlasManager;
use crate::cmd::{CommandBatch, SCREEN_HEIGHT, SCREEN_WIDTH, VIEW_ROWS};
use crate::kernels::{self, KernelPort};
use crate::mem::{DdrMap, COLORMAP_SIZE, PALETTE_OFFSET};
use crate::perf::{PerfCounters, PerfSnapshot};
use crate::regs::{self, Mode, PixelFormat};
use crate::Result;
use utils::log;
use utils::timing::StopWatch;

/// How the indexed frame travels from raster to present
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Routing {
    /// The raster kernel DMAs the 168 view rows into the composed
    /// DDR frame; the present kernel reads that same frame, so HUD
    /// rows the PS drew below the view come along for free
    Composite,
    /// The raster kernel writes all 200 rows into the shared
    /// on-chip backed region and present reads from there. The HUD
    /// band is overlaid on the packed output afterwards
    SharedHandoff,
}

/// Which frame the present kernel reads
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentSource {
    /// The PS-visible composed indexed frame
    Composite,
    /// The raster-to-present handoff region
    Shared,
}

/// One present invocation's parameters
#[derive(Debug, Copy, Clone)]
pub struct PresentParams {
    /// 1 for native 320 width, 5 for the 1600 wide upscale
    pub pp_scale: u32,
    /// Source rows to consume, 0 for the whole frame
    pub pp_rows: u32,
    /// Output write lanes, 1 or 4
    pub pp_lanes: u32,
    pub pp_format: PixelFormat,
    /// Destination stride in bytes, for surfaces wider than the
    /// logical output
    pub pp_stride_bytes: u32,
    pub pp_sharpen: bool,
    pub pp_sharpen_strength: u8,
    pub pp_source: PresentSource,
}

impl Default for PresentParams {
    fn default() -> Self {
        Self {
            pp_scale: 5,
            pp_rows: 0,
            pp_lanes: 4,
            pp_format: PixelFormat::Xrgb8888,
            pp_stride_bytes: 0,
            pp_sharpen: false,
            pp_sharpen_strength: 0,
            pp_source: PresentSource::Composite,
        }
    }
}

/// The command builder and submission state machine
pub struct Raster {
    r_port: Box<dyn KernelPort>,
    r_map: Arc<DdrMap>,
    /// The PS-cached staging batch. One contiguous copy moves it
    /// into the non-cacheable command region on flush
    r_batch: CommandBatch,
    r_atlas: AtlasManager,
    r_perf: Arc<PerfCounters>,
    /// A submission is outstanding on the kernel
    r_in_flight: bool,
    r_routing: Routing,
    /// A colormap image is resident in DDR, so the invalidation
    /// path has something to reload
    r_colormap_loaded: bool,
}

impl Raster {
    pub(crate) fn new(
        mut port: Box<dyn KernelPort>,
        map: Arc<DdrMap>,
        perf: Arc<PerfCounters>,
    ) -> Self {
        // The stable pointers are programmed once up front. Routing
        // rewrites only the output pointer and row count.
        kernels::write_ptr(&mut *port, regs::REG_ATLAS_PTR_LO, map.atlas().dev_addr());
        kernels::write_ptr(&mut *port, regs::REG_CMAP_PTR_LO, map.colormap().dev_addr());
        kernels::write_ptr(&mut *port, regs::REG_SRC_PTR_LO, map.cmd().dev_addr());

        let mut ret = Self {
            r_port: port,
            r_map: map,
            r_batch: CommandBatch::new(),
            r_atlas: AtlasManager::new(perf.clone()),
            r_perf: perf,
            r_in_flight: false,
            r_routing: Routing::Composite,
            r_colormap_loaded: false,
        };
        ret.set_routing(Routing::Composite);
        ret
    }

    /// The shared window set, for composing HUD bytes and reading
    /// output back
    pub fn ddr(&self) -> &Arc<DdrMap> {
        &self.r_map
    }

    pub fn routing(&self) -> Routing {
        self.r_routing
    }

    /// Point the kernel's output at the routing mode's destination
    ///
    /// Policy lives with the orchestrator; this only rewrites the
    /// output pointer and the DMA row count.
    pub fn set_routing(&mut self, routing: Routing) {
        self.wait_for_batch();
        let dst = match routing {
            Routing::Composite => self.r_map.video().dev_addr(),
            Routing::SharedHandoff => self.r_map.shared().dev_addr(),
        };
        kernels::write_ptr(&mut *self.r_port, regs::REG_FB_PTR_LO, dst);
        self.r_routing = routing;
    }

    fn dma_rows(&self) -> u32 {
        match self.r_routing {
            // View rows only: the PS writes HUD bytes straight into
            // rows 168..199 of the composed frame and they must
            // survive the DMA
            Routing::Composite => VIEW_ROWS as u32,
            Routing::SharedHandoff => SCREEN_HEIGHT as u32,
        }
    }

    /// Fence the previous frame and start a new batch
    ///
    /// Never clears the indexed framebuffer; HUD persistence in the
    /// on-chip frame depends on that.
    pub fn start_frame(&mut self) {
        self.wait_for_batch();
        self.r_batch.clear();
    }

    /// Stage one column command, flushing mid-frame when full
    pub fn queue_column(
        &mut self,
        x: i32,
        y1: i32,
        y2: i32,
        frac: u32,
        step: u32,
        tex_off: u32,
        light: u8,
    ) {
        if self.r_batch.is_full() {
            PerfCounters::count(&self.r_perf.pc_mid_frame_flushes);
            self.flush_batch();
        }
        if self.r_batch.queue_column(x, y1, y2, frac, step, tex_off, light) {
            PerfCounters::count(&self.r_perf.pc_queued_columns);
        }
    }

    /// Stage one span command, flushing mid-frame when full
    pub fn queue_span(
        &mut self,
        y: i32,
        x1: i32,
        x2: i32,
        pos: u32,
        step: u32,
        tex_off: u32,
        light: u8,
    ) {
        if self.r_batch.is_full() {
            PerfCounters::count(&self.r_perf.pc_mid_frame_flushes);
            self.flush_batch();
        }
        if self.r_batch.queue_span(y, x1, x2, pos, step, tex_off, light) {
            PerfCounters::count(&self.r_perf.pc_queued_spans);
        }
    }

    /// Async submit of the staged batch
    ///
    /// Fences the previous submission (the kernel must be done with
    /// the command region before we overwrite it), copies the staged
    /// bytes over in one memcpy, and kicks the combined draw+DMA
    /// without waiting for it.
    pub fn flush_batch(&mut self) {
        if self.r_batch.is_empty() {
            return;
        }
        self.wait_for_batch();

        let count = self.r_batch.len();
        self.r_map.cmd().write_bulk(0, self.r_batch.as_bytes());
        PerfCounters::count(&self.r_perf.pc_flushes);
        PerfCounters::add(
            &self.r_perf.pc_cmd_upload_bytes,
            self.r_batch.as_bytes().len() as u64,
        );
        PerfCounters::observe_max(&self.r_perf.pc_max_batch, count as u64);

        // Publish the staged writes before the kernel starts reading
        fence(Ordering::SeqCst);
        let mode = Mode::DrawAndDma {
            count: count as u32,
            rows: self.dma_rows(),
        };
        if let Err(e) = self.submit(&mode) {
            log::error!("could not submit batch of {}: {:?}", count, e);
        }
        self.r_batch.clear();
    }

    /// Block until the in-flight submission completes
    ///
    /// Idempotent when nothing is in flight. A timeout is logged and
    /// the in-flight flag cleared so the pipeline stays unstuck; the
    /// next submission re-arms the kernel.
    pub fn wait_for_batch(&mut self) {
        if !self.r_in_flight {
            return;
        }

        let mut stop = StopWatch::new();
        stop.start();
        if kernels::wait_for_done(&mut *self.r_port).is_err() {
            log::error!("raster kernel never signaled done, dropping the submission");
        }
        self.r_in_flight = false;
        stop.end();
        PerfCounters::add(
            &self.r_perf.pc_pl_wait_ns,
            stop.get_duration().as_nanos() as u64,
        );
    }

    fn submit(&mut self, mode: &Mode) -> Result<()> {
        mode.validate()?;
        kernels::program_mode(&mut *self.r_port, mode);
        kernels::wait_for_idle(&mut *self.r_port)?;
        kernels::start(&mut *self.r_port);
        self.r_in_flight = true;
        Ok(())
    }

    /// Reload the resident colormap, which also drops the kernel's
    /// texture and flat caches
    fn invalidate_device_caches(&mut self) {
        if !self.r_colormap_loaded {
            // Nothing was ever fetched through the caches
            return;
        }
        if self.submit(&Mode::LoadColormap).is_ok() {
            self.wait_for_batch();
        }
    }

    /// Upload the colormap + palette image and load it into the
    /// raster kernel
    ///
    /// `image` is the 32x256 colormap with the 768 byte RGB palette
    /// immediately after it. The present kernel picks the palette up
    /// from the same DDR image on its next load_palette().
    pub fn load_colormap(&mut self, image: &[u8]) {
        assert!(image.len() >= PALETTE_OFFSET + 768 && image.len() <= COLORMAP_SIZE);

        self.wait_for_batch();
        self.r_map.colormap().write_bulk(0, image);
        fence(Ordering::SeqCst);
        if self.submit(&Mode::LoadColormap).is_ok() {
            self.wait_for_batch();
        }
        self.r_colormap_loaded = true;
    }

    /// Synchronously clear the on-chip indexed framebuffer and drop
    /// every atlas-bound cache on both sides
    ///
    /// This is the level-transition entry point: the atlas cursor
    /// rewinds and all cached offsets die with it.
    pub fn clear_framebuffer(&mut self) {
        self.wait_for_batch();
        if self.submit(&Mode::ClearFb).is_ok() {
            self.wait_for_batch();
        }
        self.r_atlas.reset();
        self.invalidate_device_caches();
    }

    /// Copy a texture payload into the atlas, or find it already
    /// there. Returns the atlas byte offset for tex_off
    pub fn upload_texture(&mut self, key: u64, data: &[u8]) -> u32 {
        let (offset, wrapped) = self.r_atlas.upload(key, data, self.r_map.atlas());
        if wrapped {
            // Every offset the kernel may have cached now aliases
            // new payloads
            self.wait_for_batch();
            self.invalidate_device_caches();
        }
        offset
    }

    pub fn perf(&self) -> &Arc<PerfCounters> {
        &self.r_perf
    }

    pub fn sample_perf(&self) -> PerfSnapshot {
        self.r_perf.sample_and_reset()
    }
}

/// The present invocation half, owned by the present worker
pub struct Presenter {
    p_port: Box<dyn KernelPort>,
    p_map: Arc<DdrMap>,
    p_perf: Arc<PerfCounters>,
    /// Host palette tables for the CPU fast path and HUD overlay
    p_pal32: Box<[u32]>,
    p_pal16: Box<[u16]>,
}

impl Presenter {
    pub(crate) fn new(
        mut port: Box<dyn KernelPort>,
        map: Arc<DdrMap>,
        perf: Arc<PerfCounters>,
    ) -> Self {
        kernels::write_ptr(&mut *port, regs::REG_CMAP_PTR_LO, map.colormap().dev_addr());
        // All four lanes address the same logical frame; each lane
        // writes its own disjoint word range
        let out = map.fb_out().dev_addr();
        kernels::write_ptr(&mut *port, regs::REG_FB_PTR_LO, out);
        kernels::write_ptr(&mut *port, regs::REG_LANE1_PTR_LO, out);
        kernels::write_ptr(&mut *port, regs::REG_LANE2_PTR_LO, out);
        kernels::write_ptr(&mut *port, regs::REG_LANE3_PTR_LO, out);

        Self {
            p_port: port,
            p_map: map,
            p_perf: perf,
            p_pal32: vec![0; 256].into_boxed_slice(),
            p_pal16: vec![0; 256].into_boxed_slice(),
        }
    }

    pub fn ddr(&self) -> &Arc<DdrMap> {
        &self.p_map
    }

    /// Refresh both the kernel's palette BRAM and our host tables
    /// from the resident colormap image
    ///
    /// Must run after every palette change and before the present
    /// that consumes it.
    pub fn load_palette(&mut self) {
        fence(Ordering::SeqCst);
        kernels::program_mode(&mut *self.p_port, &Mode::LoadPalette);
        if kernels::wait_for_idle(&mut *self.p_port).is_ok() {
            kernels::start(&mut *self.p_port);
            if kernels::wait_for_done(&mut *self.p_port).is_err() {
                log::error!("present kernel palette load timed out");
            }
        }

        let mut pal = [0; 768];
        self.p_map.colormap().read_bulk(PALETTE_OFFSET, &mut pal);
        for i in 0..256 {
            let (r, g, b) = (
                pal[i * 3] as u32,
                pal[i * 3 + 1] as u32,
                pal[i * 3 + 2] as u32,
            );
            self.p_pal32[i] = (r << 16) | (g << 8) | b;
            self.p_pal16[i] = (((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)) as u16;
        }
    }

    /// Run one PL present invocation
    pub fn present(&mut self, params: &PresentParams) {
        let mut stop = StopWatch::new();
        stop.start();

        let src = match params.pp_source {
            PresentSource::Composite => self.p_map.video().dev_addr(),
            PresentSource::Shared => self.p_map.shared().dev_addr(),
        };
        kernels::write_ptr(&mut *self.p_port, regs::REG_SRC_PTR_LO, src);
        self.p_port
            .write_reg(regs::REG_SHARPEN_EN, params.pp_sharpen as u32);
        self.p_port.write_reg(
            regs::REG_SHARPEN_STRENGTH,
            params.pp_sharpen_strength as u32,
        );

        let mode = Mode::Present {
            scale: params.pp_scale,
            rows: params.pp_rows,
            lanes: params.pp_lanes,
            format: params.pp_format,
            stride_bytes: params.pp_stride_bytes,
        };
        if mode.validate().is_err() {
            log::error!("rejecting malformed present parameters: {:?}", params);
            return;
        }
        fence(Ordering::SeqCst);
        kernels::program_mode(&mut *self.p_port, &mode);
        if kernels::wait_for_idle(&mut *self.p_port).is_ok() {
            kernels::start(&mut *self.p_port);
            if kernels::wait_for_done(&mut *self.p_port).is_err() {
                log::error!("present kernel did not finish the frame");
            }
        }

        stop.end();
        PerfCounters::add(
            &self.p_perf.pc_present_scale_ns,
            stop.get_duration().as_nanos() as u64,
        );
    }

    /// Expand the source rows y0..y1 of an indexed frame onto the
    /// packed output region on the CPU
    fn expand_rows(&self, frame: &[u8], y0: usize, y1: usize, params: &PresentParams) {
        let scale = params.pp_scale as usize;
        let bpp = params.pp_format.bpp();
        let out_width = SCREEN_WIDTH * scale;
        let stride = utils::partial_max(params.pp_stride_bytes as usize, out_width * bpp);

        let mut row = vec![0; out_width * bpp];
        for sy in y0..y1 {
            for sx in 0..SCREEN_WIDTH {
                let idx = frame[sy * SCREEN_WIDTH + sx] as usize;
                for rep in 0..scale {
                    let px = (sx * scale + rep) * bpp;
                    match params.pp_format {
                        PixelFormat::Xrgb8888 => {
                            row[px..px + 4].copy_from_slice(&self.p_pal32[idx].to_le_bytes())
                        }
                        PixelFormat::Rgb565 => {
                            row[px..px + 2].copy_from_slice(&self.p_pal16[idx].to_le_bytes())
                        }
                    }
                }
            }
            // Vertical replication is a straight memcpy of the
            // expanded row
            for rep in 0..scale {
                self.p_map.fb_out().write_bulk((sy * scale + rep) * stride, &row);
            }
        }
    }

    /// The CPU fast path: palette expansion plus vertical memcpy
    /// replication, no PL involved
    pub fn present_cpu(&mut self, frame: &[u8], params: &PresentParams) {
        let mut stop = StopWatch::new();
        stop.start();

        let mut rows = params.pp_rows as usize;
        if rows == 0 || rows > SCREEN_HEIGHT {
            rows = SCREEN_HEIGHT;
        }
        self.expand_rows(frame, 0, rows, params);

        stop.end();
        PerfCounters::add(
            &self.p_perf.pc_present_scale_ns,
            stop.get_duration().as_nanos() as u64,
        );
    }

    /// Paint the PS-drawn HUD band over the packed output
    ///
    /// Used in shared-handoff routing, where the present source
    /// never sees the composed DDR frame.
    pub fn overlay_hud(&mut self, frame: &[u8], params: &PresentParams) {
        self.expand_rows(frame, VIEW_ROWS, SCREEN_HEIGHT, params);
    }
}
