// Runtime configuration from the environment
//
// Everything here mirrors a register or a routing decision; the
// front end that parses arguments just pokes this struct.
//
// Austin Shafer - 2025
use hail::{PixelFormat, Routing};
use utils::log;

/// Where finished frames go
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// No display surface, frames are counted and dropped
    Headless,
    /// A scanout surface is required; init fails if it cannot be
    /// opened
    Screen,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Force the software raster path instead of live PL
    pub c_bench_sw: bool,
    /// AXI-Lite bases for the two kernels
    pub c_raster_base: u64,
    pub c_present_base: u64,
    /// Route the indexed frame through the on-chip handoff region
    pub c_routing: Routing,
    /// Overlay the HUD band on the packed output in handoff mode
    pub c_hud_overlay: bool,
    /// Run the upscale on the PL instead of the CPU fast path
    pub c_pl_scale: bool,
    /// Present kernel write lanes, 1 or 4
    pub c_lanes: u32,
    /// Upscale factor, 1 (native 320) or 5 (1600 wide)
    pub c_scale: u32,
    pub c_format: PixelFormat,
    /// Five-tap sharpen strength, 0 disables
    pub c_sharpen_strength: u8,
    /// Engine blocks until the worker drained its frame
    pub c_sync_present: bool,
    pub c_output: OutputMode,
    /// Frames the built-in benchmark submits before shutdown
    pub c_bench_frames: u32,
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => val != "0" && val != "off" && val != "false",
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(val) => val.parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_hex(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(val) => u64::from_str_radix(val.trim_start_matches("0x"), 16).unwrap_or(default),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Config {
        let mut raster_base = env_hex("RASTER_BASE", hail::RASTER_BASE_DEFAULT);
        let mut present_base = env_hex("PRESENT_BASE", hail::PRESENT_BASE_DEFAULT);
        if env_bool("SWAP_IPS", false) {
            std::mem::swap(&mut raster_base, &mut present_base);
        }

        // COMPOSITE forces the legacy composed-frame source and wins
        // over the handoff default
        let composite = env_bool("COMPOSITE", true);
        let handoff = env_bool("SHARED_BRAM_HANDOFF", true);
        let routing = if composite || !handoff {
            Routing::Composite
        } else {
            Routing::SharedHandoff
        };

        // Lanes other than 1 are clamped to 4
        let lanes = match env_u32("SQUALL_PL_LANES", 4) {
            1 => 1,
            _ => 4,
        };
        let scale = match std::env::var("SQUALL_RES").as_deref() {
            Ok("native320") => 1,
            Ok("fullres") => 5,
            _ => match env_u32("SQUALL_SCALE", 5) {
                1 => 1,
                _ => 5,
            },
        };
        let format = match std::env::var("SQUALL_FORMAT").as_deref() {
            Ok("rgb565") => PixelFormat::Rgb565,
            _ => PixelFormat::Xrgb8888,
        };
        let output = match std::env::var("SQUALL_OUTPUT").as_deref() {
            Ok("screen") => OutputMode::Screen,
            Ok("tcp") => {
                // The viewer protocol lives outside this binary
                log::error!("tcp viewer output is not compiled in, running headless");
                OutputMode::Headless
            }
            Ok("headless") | Err(_) => OutputMode::Headless,
            Ok(other) => {
                log::error!("unknown output mode {}, running headless", other);
                OutputMode::Headless
            }
        };

        Config {
            c_bench_sw: !env_bool("SQUALL_HW", false),
            c_raster_base: raster_base,
            c_present_base: present_base,
            c_routing: routing,
            c_hud_overlay: env_bool("HUD_OVERLAY", true),
            c_pl_scale: env_bool("SQUALL_PL_SCALE", true),
            c_lanes: lanes,
            c_scale: scale,
            c_format: format,
            c_sharpen_strength: env_u32("SQUALL_SHARPEN", 0) as u8,
            c_sync_present: env_bool("SQUALL_SYNC_PRESENT", false),
            c_output: output,
            c_bench_frames: env_u32("SQUALL_BENCH_FRAMES", 120),
        }
    }

    /// Destination stride in bytes for the configured output
    pub fn stride_bytes(&self) -> u32 {
        (hail::SCREEN_WIDTH as u32) * self.c_scale * self.c_format.bpp() as u32
    }
}
