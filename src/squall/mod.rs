// The squall present orchestrator
//
// This is the top layer of the storm. It owns the engine-side
// Raster driver, spawns the present worker, and in lieu of a game
// engine drives a built-in benchmark scene through the full
// pipeline: atlas upload, batched columns and spans, DMA, upscale
// and present.
//
// Austin Shafer - 2025
pub mod config;
pub mod present;

use std::sync::Arc;
use std::thread;

use config::{Config, OutputMode};
use present::{FrameQueue, HeadlessSink, PresentWorker, FRAME_BYTES};

use hail::{
    KernelBacking, PresentParams, PresentSource, Raster, Routing, LIGHT_LEVELS, PALETTE_OFFSET,
    SCREEN_HEIGHT, SCREEN_WIDTH, VIEW_ROWS,
};
use utils::{anyhow, log, Context, Result};

/// Atlas byte count of the benchmark wall texture (one column)
const BENCH_COLUMN_BYTES: usize = 128;
/// Atlas byte count of the benchmark floor flat
const BENCH_FLAT_BYTES: usize = 4096;

pub struct Squall {
    sq_config: Config,
    sq_raster: Raster,
    sq_queue: Arc<FrameQueue>,
    sq_worker: Option<thread::JoinHandle<()>>,
}

/// Build the colormap + palette image for the benchmark scene
///
/// Grayscale palette with a colormap that darkens indices as the
/// light level rises, which is enough to see lighting in the output.
fn bench_colormap_image() -> Vec<u8> {
    let mut image = vec![0; PALETTE_OFFSET + 768];
    for level in 0..LIGHT_LEVELS {
        for idx in 0..256 {
            let lit = idx * (LIGHT_LEVELS - level) / LIGHT_LEVELS;
            image[level * 256 + idx] = lit as u8;
        }
    }
    for idx in 0..256 {
        let base = PALETTE_OFFSET + idx * 3;
        image[base] = idx as u8;
        image[base + 1] = idx as u8;
        image[base + 2] = idx as u8;
    }
    image
}

impl Squall {
    /// Bring the pipeline up and spawn the present worker
    pub fn spin() -> Result<Squall> {
        let cfg = Config::from_env();

        if cfg.c_output == OutputMode::Screen {
            // The scanout surface belongs to the display boundary,
            // which is not compiled in here
            return Err(anyhow!(
                "screen output requested but no scanout surface is available"
            ));
        }

        let backing = if cfg.c_bench_sw {
            KernelBacking::Model
        } else {
            KernelBacking::Mmio
        };
        let info = hail::CreateInfo::builder()
            .backing(backing)
            .raster_base(cfg.c_raster_base)
            .present_base(cfg.c_present_base)
            .build();
        let (mut raster, presenter) =
            hail::create(&info).context("could not create the raster pipeline")?;
        raster.set_routing(cfg.c_routing);

        let params = PresentParams {
            pp_scale: cfg.c_scale,
            pp_rows: 0,
            pp_lanes: cfg.c_lanes,
            pp_format: cfg.c_format,
            pp_stride_bytes: cfg.stride_bytes(),
            pp_sharpen: cfg.c_sharpen_strength != 0,
            pp_sharpen_strength: cfg.c_sharpen_strength,
            pp_source: match cfg.c_routing {
                Routing::Composite => PresentSource::Composite,
                Routing::SharedHandoff => PresentSource::Shared,
            },
        };

        let queue = Arc::new(FrameQueue::new());
        let mut worker = PresentWorker::new(
            queue.clone(),
            presenter,
            params,
            cfg.c_pl_scale,
            cfg.c_hud_overlay,
            Box::new(HeadlessSink::new()),
        );
        let handle = thread::Builder::new()
            .name("present_worker".to_string())
            .spawn(move || worker.worker_thread())
            .unwrap();

        Ok(Squall {
            sq_config: cfg,
            sq_raster: raster,
            sq_queue: queue,
            sq_worker: Some(handle),
        })
    }

    /// Draw and present the benchmark frames, then shut down
    pub fn run_forever(&mut self) {
        self.sq_raster.load_colormap(&bench_colormap_image());

        // One wall column and one checkered floor flat in the atlas
        let column: Vec<u8> = (0..BENCH_COLUMN_BYTES).map(|i| (i * 2) as u8).collect();
        let flat: Vec<u8> = (0..BENCH_FLAT_BYTES)
            .map(|i| {
                let (row, col) = (i / 64, i % 64);
                if (row / 8 + col / 8) % 2 == 0 {
                    0xc0
                } else {
                    0x40
                }
            })
            .collect();
        let col_off = self.sq_raster.upload_texture(column.as_ptr() as u64, &column);
        let flat_off = self.sq_raster.upload_texture(flat.as_ptr() as u64, &flat);

        let mut snapshot = vec![0; FRAME_BYTES];
        for frame in 0..self.sq_config.c_bench_frames {
            self.sq_raster.start_frame();

            // A wall of columns across the view, scrolling slowly
            for x in 0..SCREEN_WIDTH as i32 {
                self.sq_raster.queue_column(
                    x,
                    0,
                    VIEW_ROWS as i32 - 1,
                    (frame as u32) << 14,
                    0x0001_8000,
                    col_off,
                    ((x as usize / 10) % LIGHT_LEVELS) as u8,
                );
            }
            // A floor of spans over the lower half of the view
            for y in (VIEW_ROWS / 2) as i32..VIEW_ROWS as i32 {
                self.sq_raster.queue_span(
                    y,
                    0,
                    SCREEN_WIDTH as i32 - 1,
                    (frame as u32).wrapping_mul(0x0400_0000),
                    0x0400_1000,
                    flat_off,
                    (y as usize % LIGHT_LEVELS) as u8,
                );
            }

            self.sq_raster.flush_batch();
            self.sq_raster.wait_for_batch();

            // Compose the HUD band the way the engine would: written
            // by the PS, never touched by the raster kernel
            self.compose_snapshot(&mut snapshot, frame);
            self.sq_queue.push(&snapshot, frame == 0);
            if self.sq_config.c_sync_present {
                self.sq_queue.wait_drained();
            }
        }

        self.sq_queue.shutdown();
        if let Some(worker) = self.sq_worker.take() {
            if worker.join().is_err() {
                log::error!("the present worker panicked before shutdown");
            }
        }

        let snap = self.sq_raster.sample_perf();
        println!("perf: {:?}", snap);
    }

    /// Read back the routed frame and lay the HUD band into it
    fn compose_snapshot(&mut self, snapshot: &mut [u8], frame: u32) {
        let ddr = self.sq_raster.ddr().clone();
        match self.sq_raster.routing() {
            Routing::Composite => {
                // Legacy side channel: HUD bytes go straight into
                // the composed DDR frame below the 168 DMA rows
                let mut hud = [0; (SCREEN_HEIGHT - VIEW_ROWS) * SCREEN_WIDTH];
                for (i, px) in hud.iter_mut().enumerate() {
                    *px = ((i + frame as usize) % 255) as u8;
                }
                ddr.video().write_bulk(VIEW_ROWS * SCREEN_WIDTH, &hud);
                ddr.video().read_bulk(0, snapshot);
            }
            Routing::SharedHandoff => {
                ddr.shared().read_bulk(0, snapshot);
                for (i, px) in snapshot[VIEW_ROWS * SCREEN_WIDTH..].iter_mut().enumerate() {
                    *px = ((i + frame as usize) % 255) as u8;
                }
            }
        }
    }
}
