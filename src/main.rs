use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use signal_control::{EnvConfig, IntersectionEnv, SyntheticSimulator, NUM_ACTIONS};

const NUM_EPISODES: u64 = 3;

fn main() -> signal_control::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EnvConfig::from_path(path)?,
        None => EnvConfig::default(),
    };
    let mut env = IntersectionEnv::new(SyntheticSimulator::default(), config)?;
    let mut policy = StdRng::seed_from_u64(0);

    println!(
        "Simulating {} episodes of {} ticks...",
        NUM_EPISODES,
        env.config().horizon_ticks
    );
    for episode in 0..NUM_EPISODES {
        let start = Instant::now();
        env.reset(Some(episode))?;
        let mut decisions = 0;
        loop {
            let action = policy.gen_range(0..NUM_ACTIONS as u32);
            let step = env.step(action)?;
            decisions += 1;
            if step.terminated || step.truncated {
                break;
            }
        }
        let reward = env.history().rewards().last().unwrap_or_default();
        println!(
            "Episode {}: {} decisions in {:?}, total reward {:.1}",
            episode + 1,
            decisions,
            start.elapsed(),
            reward
        );
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let path = format!("training_stats_{}.csv", stamp);
    env.history().write_csv(std::fs::File::create(&path)?)?;
    println!("Wrote {}", path);
    Ok(())
}
