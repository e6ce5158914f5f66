// A hardware-assisted present orchestrator for the indexed raster
// pipeline
//
// Austin Shafer - 2025
mod squall;
use squall::Squall;

use std::time::SystemTime;

fn main() {
    let mut storm = match Squall::spin() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("squall: init failed: {:?}", e);
            std::process::exit(1);
        }
    };

    println!("Begin present loop...");
    let start = SystemTime::now();
    storm.run_forever();
    let end = SystemTime::now();

    println!("uptime: {}", end.duration_since(start).unwrap().as_secs_f32());
}
