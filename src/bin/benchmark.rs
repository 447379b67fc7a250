//! Performance benchmark for soundfield.
//!
//! Run with: cargo run --bin benchmark --release

use std::time::Instant;

use glam::Vec2;
use soundfield::{
    AcousticDomain, Aabb, CpuSolver, Material, Resolution, SimulationParams, WaveSolver,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Soundfield performance evaluation");
    println!();

    // =========================================================================
    // Part 1: Full response solve throughput
    // =========================================================================
    println!("PART 1: Full response solve (CPU)");
    println!();
    println!(
        "{:<10} {:<10} {:>10} {:>8} {:>12} {:>12}",
        "Domain", "Res", "Cells", "Steps", "Solve (ms)", "Cells*Steps/s"
    );
    println!("{}", "-".repeat(68));

    let domains = [5.0f32, 10.0, 20.0, 40.0];
    let resolutions = [Resolution::Low, Resolution::Mid];

    for &extent in &domains {
        for &resolution in &resolutions {
            let params =
                SimulationParams::new(Vec2::splat(extent), resolution).expect("valid domain");
            let mut solver = CpuSolver::new(params);
            solver.add_geometry(Aabb::new(
                Vec2::splat(extent * 0.5),
                extent * 0.2,
                extent * 0.2,
                Material::Default.absorption(),
            ));
            solver.process_geometry_updates();

            let start = Instant::now();
            solver.generate_response(Vec2::splat(extent * 0.25));
            let elapsed = start.elapsed();

            let cells = params.plane_size();
            let throughput = (cells * params.response_length) as f64 / elapsed.as_secs_f64();
            println!(
                "{:<10} {:<10} {:>10} {:>8} {:>12.1} {:>12.0}",
                format!("{extent}x{extent}m"),
                format!("{resolution:?}"),
                cells,
                params.response_length,
                elapsed.as_secs_f64() * 1000.0,
                throughput
            );
        }
    }
    println!();

    // =========================================================================
    // Part 2: Full pipeline (solve + analyze + publish)
    // =========================================================================
    println!("PART 2: Scheduler cycle including analysis");
    println!();
    println!(
        "{:<10} {:>14} {:>12} {:>12}",
        "Domain", "Calibrate (ms)", "Cycle (ms)", "Cycles/s"
    );
    println!("{}", "-".repeat(52));

    for &extent in &[5.0f32, 10.0, 20.0] {
        let params = SimulationParams::new(Vec2::splat(extent), Resolution::Low).unwrap();

        let start = Instant::now();
        let mut domain = AcousticDomain::new(params);
        let calibrate_ms = start.elapsed().as_secs_f64() * 1000.0;

        domain.set_listener_pos(Vec2::splat(extent * 0.5));
        domain.update();

        let cycles = 5u32;
        let start = Instant::now();
        for i in 0..cycles {
            // Alternate between two cells so every cycle re-simulates.
            let offset = if i % 2 == 0 { 0.0 } else { 1.0 };
            domain.set_listener_pos(Vec2::splat(extent * 0.25 + offset));
            domain.update();
        }
        let elapsed = start.elapsed();
        let cycle_ms = elapsed.as_secs_f64() * 1000.0 / cycles as f64;

        println!(
            "{:<10} {:>14.1} {:>12.1} {:>12.2}",
            format!("{extent}x{extent}m"),
            calibrate_ms,
            cycle_ms,
            1000.0 / cycle_ms
        );
    }
    println!();

    // =========================================================================
    // Part 3: Budgeted per-tick cost
    // =========================================================================
    println!("PART 3: Incremental stepping cost per tick (10x10m, Low)");
    println!();

    let params = SimulationParams::new(Vec2::splat(10.0), Resolution::Low).unwrap();
    let tick_seconds = 1.0 / 60.0;
    println!(
        "{:<14} {:>12} {:>14} {:>12}",
        "Responses/s", "Steps/tick", "Tick (ms)", "Budget used"
    );
    println!("{}", "-".repeat(56));

    for &responses_per_second in &[1.0f32, 2.0, 5.0, 10.0] {
        let steps =
            CpuSolver::steps_per_tick_for_cadence(&params, responses_per_second, tick_seconds);
        let mut solver = CpuSolver::new(params).with_time_steps_per_tick(steps);
        solver.generate_response(Vec2::splat(5.0));

        let mut ticks = 0u32;
        let start = Instant::now();
        while solver.run_in_progress() {
            solver.tick();
            ticks += 1;
        }
        let elapsed = start.elapsed();
        let tick_ms = elapsed.as_secs_f64() * 1000.0 / ticks.max(1) as f64;

        println!(
            "{:<14} {:>12} {:>14.2} {:>11.0}%",
            responses_per_second,
            steps,
            tick_ms,
            tick_ms / (tick_seconds as f64 * 1000.0) * 100.0
        );
    }
    println!();
    println!("Benchmark complete.");
}
