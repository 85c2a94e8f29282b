//! Headless runner: builds a model from the saved config (or defaults), steps it, and logs
//! timings. Set `RUST_LOG=info` (or `debug`, for per-pass timings) to see output.

use std::{env, path::Path, sync::Arc, time::Instant};

use log::{info, warn};
use pbf_fluids::{config::SAVE_FILE, ComputeContext, Config, InteropBuffers, Scene, SimType};

const DEFAULT_NUM_STEPS: usize = 1_000;
/// Log a benchmark line every this many steps.
const BENCH_RATIO: usize = 100;

fn main() {
    env_logger::init();

    let path = Path::new(SAVE_FILE);
    let mut config = match Config::load(path) {
        Ok(cfg) => {
            info!("Loaded config from {SAVE_FILE}");
            cfg
        }
        Err(_) => Config::default(),
    };

    // `pbf_fluids [scene] [steps]`
    let mut args = env::args().skip(1);
    if let Some(scene) = args.next() {
        config.scene = Scene::from_name(&scene);
    }
    let num_steps = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_NUM_STEPS);

    let interop = match InteropBuffers::new(config.model.max_nb_particles, config.model.nb_cells()) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error allocating interop buffers: {e}");
            return;
        }
    };

    let ctx = ComputeContext::new(None).map(Arc::new);
    let mut model = SimType::PositionBasedFluids.create(ctx, config.clone(), interop.clone());
    if !model.is_init() {
        eprintln!("Model failed to initialize; exiting.");
        return;
    }
    if log::log_enabled!(log::Level::Debug) {
        let _ = model.enable_profiling(true);
    }

    // A camera off to the side, looking at the box.
    *interop.camera.write() = [0., 0., config.model.box_size * 2.];

    info!(
        "Running `{}` with {} particles for {num_steps} steps",
        config.scene.name(),
        model.nb_particles()
    );

    let start = Instant::now();
    let mut start_bench = Instant::now();

    for i in 0..num_steps {
        if let Err(e) = model.update() {
            warn!("Step {i} failed: {e}");
            break;
        }

        if i % BENCH_RATIO == BENCH_RATIO - 1 {
            let elapsed = start_bench.elapsed();
            info!(
                "Steps {}-{}: {:.3}ms/step",
                i + 1 - BENCH_RATIO,
                i,
                elapsed.as_secs_f64() * 1_000. / BENCH_RATIO as f64
            );
            start_bench = Instant::now();
        }
    }

    info!("Done in {:.2}s", start.elapsed().as_secs_f64());

    if let Err(e) = config.save(path) {
        eprintln!("Error saving config: {e}");
    }
}
