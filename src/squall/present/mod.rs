// The present orchestrator
//
// A bounded queue of indexed frame snapshots decouples the engine
// thread from the present worker. The engine pays one 64 KiB copy
// per frame and blocks only when three frames are already pending;
// the worker owns the Presenter and the display boundary.
//
// Austin Shafer - 2025
use std::sync::{Arc, Condvar, Mutex};

use hail::{MemWindow, PixelFormat, PresentParams, PresentSource, Presenter};
use hail::{SCREEN_HEIGHT, SCREEN_WIDTH};
use utils::log;
use utils::Result;

/// Snapshot slots between the engine and the worker
pub const QUEUE_DEPTH: usize = 3;
/// Bytes in one indexed frame snapshot
pub const FRAME_BYTES: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

/// The display boundary
///
/// Everything past the packed output region lives behind this:
/// a TCP viewer, a scanout surface, or nothing at all. A failed
/// present is logged by the worker and the loop continues.
pub trait DisplaySink: Send {
    fn present_frame(
        &mut self,
        fb: &MemWindow,
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
    ) -> Result<()>;
}

/// A sink that counts frames and drops them
pub struct HeadlessSink {
    pub hs_frames: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self { hs_frames: 0 }
    }
}

impl DisplaySink for HeadlessSink {
    fn present_frame(
        &mut self,
        _fb: &MemWindow,
        _width: usize,
        _height: usize,
        _stride: usize,
        _format: PixelFormat,
    ) -> Result<()> {
        self.hs_frames += 1;
        Ok(())
    }
}

struct FrameSlot {
    fs_pixels: Box<[u8]>,
    /// The palette changed since the previous snapshot; the worker
    /// must refresh the present kernel before consuming this frame
    fs_palette_dirty: bool,
}

struct QueueState {
    qs_slots: Vec<FrameSlot>,
    qs_head: usize,
    qs_count: usize,
    qs_shutdown: bool,
}

/// The bounded snapshot queue
pub struct FrameQueue {
    fq_state: Mutex<QueueState>,
    fq_not_full: Condvar,
    fq_not_empty: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        let slots = (0..QUEUE_DEPTH)
            .map(|_| FrameSlot {
                fs_pixels: vec![0; FRAME_BYTES].into_boxed_slice(),
                fs_palette_dirty: false,
            })
            .collect();

        Self {
            fq_state: Mutex::new(QueueState {
                qs_slots: slots,
                qs_head: 0,
                qs_count: 0,
                qs_shutdown: false,
            }),
            fq_not_full: Condvar::new(),
            fq_not_empty: Condvar::new(),
        }
    }

    /// Engine side: snapshot a frame into the next free slot
    ///
    /// Blocks while the queue is full, which is the natural
    /// backpressure on an engine outrunning the display.
    pub fn push(&self, frame: &[u8], palette_dirty: bool) {
        let mut state = self.fq_state.lock().unwrap();
        while state.qs_count == QUEUE_DEPTH && !state.qs_shutdown {
            state = self.fq_not_full.wait(state).unwrap();
        }
        if state.qs_shutdown {
            return;
        }

        let idx = (state.qs_head + state.qs_count) % QUEUE_DEPTH;
        state.qs_slots[idx].fs_pixels.copy_from_slice(frame);
        state.qs_slots[idx].fs_palette_dirty = palette_dirty;
        state.qs_count += 1;
        self.fq_not_empty.notify_one();
    }

    /// Worker side: copy the oldest snapshot out
    ///
    /// Returns the slot's palette-dirty flag, or None once the queue
    /// is shut down and drained.
    pub fn pop(&self, out: &mut [u8]) -> Option<bool> {
        let mut state = self.fq_state.lock().unwrap();
        while state.qs_count == 0 && !state.qs_shutdown {
            state = self.fq_not_empty.wait(state).unwrap();
        }
        if state.qs_count == 0 {
            return None;
        }

        let slot = &state.qs_slots[state.qs_head];
        out.copy_from_slice(&slot.fs_pixels);
        let dirty = slot.fs_palette_dirty;
        state.qs_head = (state.qs_head + 1) % QUEUE_DEPTH;
        state.qs_count -= 1;
        self.fq_not_full.notify_one();
        Some(dirty)
    }

    /// Engine side: block until the worker has drained every
    /// pending snapshot. Used by the synchronous present mode
    pub fn wait_drained(&self) {
        let mut state = self.fq_state.lock().unwrap();
        while state.qs_count != 0 && !state.qs_shutdown {
            state = self.fq_not_full.wait(state).unwrap();
        }
    }

    pub fn shutdown(&self) {
        let mut state = self.fq_state.lock().unwrap();
        state.qs_shutdown = true;
        self.fq_not_full.notify_all();
        self.fq_not_empty.notify_all();
    }
}

/// The worker half of the orchestrator
///
/// Owns the Presenter and the sink. The routing policy is baked
/// into the PresentParams it was spawned with; toggling a mode from
/// the engine side means respawning with new params.
pub struct PresentWorker {
    pw_queue: Arc<FrameQueue>,
    pw_presenter: Presenter,
    pw_params: PresentParams,
    /// Invoke the PL present kernel instead of expanding on the CPU
    pw_use_pl: bool,
    /// Paint the HUD band over the packed output in handoff mode
    pw_hud_overlay: bool,
    pw_sink: Box<dyn DisplaySink>,
}

impl PresentWorker {
    pub fn new(
        queue: Arc<FrameQueue>,
        presenter: Presenter,
        params: PresentParams,
        use_pl: bool,
        hud_overlay: bool,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            pw_queue: queue,
            pw_presenter: presenter,
            pw_params: params,
            pw_use_pl: use_pl,
            pw_hud_overlay: hud_overlay,
            pw_sink: sink,
        }
    }

    /// Consume snapshots until shutdown
    pub fn worker_thread(&mut self) {
        let mut frame = vec![0; FRAME_BYTES];
        let params = self.pw_params;

        while let Some(palette_dirty) = self.pw_queue.pop(&mut frame) {
            // The palette image in DDR is already current; the
            // kernel BRAM refresh must land before this frame's
            // present consumes it
            if palette_dirty {
                self.pw_presenter.load_palette();
            }

            if self.pw_use_pl {
                if params.pp_source == PresentSource::Composite {
                    // Publish the snapshot as the composed frame the
                    // kernel reads
                    self.pw_presenter.ddr().video().write_bulk(0, &frame);
                }
                self.pw_presenter.present(&params);
                if params.pp_source == PresentSource::Shared && self.pw_hud_overlay {
                    self.pw_presenter.overlay_hud(&frame, &params);
                }
            } else {
                self.pw_presenter.present_cpu(&frame, &params);
            }

            let scale = params.pp_scale as usize;
            let bpp = params.pp_format.bpp();
            let width = SCREEN_WIDTH * scale;
            let stride =
                utils::partial_max(params.pp_stride_bytes as usize, width * bpp);
            let ddr = self.pw_presenter.ddr().clone();
            if let Err(e) = self.pw_sink.present_frame(
                ddr.fb_out(),
                width,
                SCREEN_HEIGHT * scale,
                stride,
                params.pp_format,
            ) {
                // A lost client is not fatal, skip transmission and
                // keep consuming frames
                log::error!("display sink dropped a frame: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn queue_orders_and_drains() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = queue.clone();

        let handle = thread::spawn(move || {
            let mut out = vec![0; FRAME_BYTES];
            let mut seen = Vec::new();
            while let Some(_) = consumer.pop(&mut out) {
                seen.push(out[0]);
            }
            seen
        });

        let mut frame = vec![0; FRAME_BYTES];
        // More pushes than slots, so the engine side must block and
        // resume at least once
        for i in 0..8 {
            frame[0] = i;
            queue.push(&frame, false);
        }
        queue.wait_drained();
        queue.shutdown();

        let seen = handle.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn shutdown_unblocks_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = queue.clone();

        let handle = thread::spawn(move || {
            let mut out = vec![0; FRAME_BYTES];
            consumer.pop(&mut out)
        });

        queue.shutdown();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn palette_dirty_flag_travels_with_its_frame() {
        let queue = FrameQueue::new();
        let frame = vec![0; FRAME_BYTES];
        queue.push(&frame, true);
        queue.push(&frame, false);

        let mut out = vec![0; FRAME_BYTES];
        assert_eq!(queue.pop(&mut out), Some(true));
        assert_eq!(queue.pop(&mut out), Some(false));
    }
}
