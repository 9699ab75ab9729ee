use std::time;

use rand::SeedableRng as _;

// Times one-by-one insertion against a batch build over the same kind of scene
fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let parsed = clap::Command::new(env!("CARGO_BIN_NAME"))
        .arg(
            clap::Arg::new("count")
                .long("count")
                .number_of_values(1)
                .value_parser(clap::value_parser!(usize))
                .default_value("100000"))
        .arg(
            clap::Arg::new("extent")
                .long("extent")
                .number_of_values(1)
                .value_parser(clap::value_parser!(f32))
                .default_value("1000"))
        .arg(
            clap::Arg::new("radius")
                .long("radius")
                .number_of_values(1)
                .value_parser(clap::value_parser!(f32))
                .default_value("10"))
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .number_of_values(1)
                .value_parser(clap::value_parser!(u64)))
        .arg(
            clap::Arg::new("config")
                .long("config")
                .number_of_values(1))
        .arg(
            clap::Arg::new("validate")
                .long("validate")
                .action(clap::ArgAction::SetTrue))
        .get_matches();

    let config = match parsed.get_one::<String>("config") {
        Some(path) => rt::load_config(path)?,
        None => rt::BvhConfig::default(),
    };

    // Defaults are declared above, so these are always present
    let count = *parsed.get_one::<usize>("count").unwrap();
    let extent = *parsed.get_one::<f32>("extent").unwrap();
    let radius = *parsed.get_one::<f32>("radius").unwrap();

    let mut rng = match parsed.get_one::<u64>("seed") {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(*seed),
        None => rand::rngs::StdRng::from_entropy(),
    };

    let mut inserted = rt::Bvh::with_config(config)?;

    let start = time::Instant::now();

    for sphere in rt::geom::scatter(&mut rng, count, extent, radius) {
        inserted.insert(sphere);
    }

    log::info!(
        "Inserted {} spheres in {:?} ({} leaves, depth {}, {} slots)",
        inserted.len(),
        start.elapsed(),
        inserted.leaf_count(),
        inserted.depth(),
        inserted.slots(),
    );

    let objects = rt::geom::scatter(&mut rng, count, extent, radius);

    let mut built = rt::Bvh::with_config(config)?;

    let start = time::Instant::now();

    built.build(objects);

    log::info!(
        "Built over {} spheres in {:?} ({} leaves, depth {}, {} slots)",
        built.len(),
        start.elapsed(),
        built.leaf_count(),
        built.depth(),
        built.slots(),
    );

    if *parsed.get_one::<bool>("validate").unwrap() {
        inserted.validate()?;
        built.validate()?;

        log::info!("Both trees passed validation");
    }

    Ok(())
}
