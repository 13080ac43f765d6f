use log::LevelFilter;
use railsim::*;
use std::path::PathBuf;
use structopt::StructOpt;

/// Railsim -- railway scenery simulation, headless runner
#[derive(StructOpt, Debug)]
#[structopt(name = "railsim")]
struct Opt {
    /// Verbose mode (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Scenario file (JSON)
    #[structopt(parse(from_os_str))]
    scenario: PathBuf,

    /// Number of ticks to run
    #[structopt(short = "t", long = "ticks", default_value = "0")]
    ticks: usize,

    /// Seed for random delays
    #[structopt(short = "s", long = "seed")]
    seed: Option<u64>,

    /// Save the resulting scenario to this file
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,
}

fn run(opt: &Opt) -> AppResult<()> {
    let mut sim = load_scenario(&opt.scenario, opt.seed)?;
    let events = sim.subscribe();
    sim.initialize();

    let step = eventsim::TIME_STEP.as_secs_f64();
    for _ in 0..opt.ticks {
        sim.tick(step);
    }

    for event in events.try_iter() {
        if event.name == EventName::Clock && opt.verbose == 0 {
            continue;
        }
        println!("{:?} {} {}", event.name, event.id, event.object);
    }
    println!("# {} at {}, score {}", sim.options.title, sim.current_time(), sim.options.current_score);
    for train in &sim.trains {
        println!("  {} {:?} at {} ({:.1} m/s)", train.descriptor(), train.status, train.train_head, train.speed);
    }

    if let Some(ref output) = opt.output {
        save_scenario(&sim, output)?;
    }
    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
    match run(&opt) {
        Ok(()) => {}
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        }
    }
}
