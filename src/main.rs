use std::time::Instant;

use stadium_sim::{Config, Simulation};

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).unwrap();
            let value = serde_json::from_str(&content).unwrap();
            Config::from_value(value).unwrap()
        }
        None => Config::default(),
    };
    let dt = config.physics.delta_t_s;
    let mut sim = Simulation::new(&config).unwrap();

    let panel = sim.compute_safety_panel();
    println!(
        "Track: {:.0} m, curve radius {:.1} m, safe speed {:.1} km/h{}",
        sim.track().length(),
        panel.radius_m,
        panel.v_safe_kmh,
        if panel.is_unsafe { " (UNSAFE at design speed)" } else { "" },
    );

    println!("Simulating...");
    const NUM_FRAMES: u32 = 1000;
    loop {
        let start = Instant::now();
        for _ in 0..NUM_FRAMES {
            sim.step(dt);
        }
        let frame = start.elapsed() / NUM_FRAMES;
        let sample = sim.analytics().latest();
        println!(
            "Avg. frame: {:?} --> {:.0}x realtime, mean speed {:.1} m/s, {} collisions",
            frame,
            dt / frame.as_secs_f64(),
            sample.map(|s| s.mean_speed_mps).unwrap_or(0.0),
            sim.collision_events().len(),
        )
    }
}
