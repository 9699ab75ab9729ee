use rand::SeedableRng as _;

// Fires a single ray into a random scene and reports what it hits
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
                .default_value("1000"))
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .number_of_values(1)
                .value_parser(clap::value_parser!(u64))
                .default_value("0"))
        .arg(
            clap::Arg::new("origin")
                .long("origin")
                .number_of_values(3)
                .value_parser(clap::value_parser!(f32))
                .allow_hyphen_values(true)
                .required(true))
        .arg(
            clap::Arg::new("dir")
                .long("dir")
                .number_of_values(3)
                .value_parser(clap::value_parser!(f32))
                .allow_hyphen_values(true)
                .required(true))
        .arg(
            clap::Arg::new("config")
                .long("config")
                .number_of_values(1))
        .get_matches();

    let point = |name: &str| -> anyhow::Result<[f32; 3]> {
        let values = parsed
            .get_many::<f32>(name)
            .into_iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>();

        let [x, y, z] = values[..] else {
            anyhow::bail!("Flag --{} expects 3 float values", name);
        };

        Ok([x, y, z])
    };

    let config = match parsed.get_one::<String>("config") {
        Some(path) => rt::load_config(path)?,
        None => rt::BvhConfig::default(),
    };

    let objects = {
        let mut rng = rand::rngs::StdRng::seed_from_u64({
            *parsed.get_one::<u64>("seed").unwrap()
        });

        rt::geom::scatter(&mut rng, *parsed.get_one::<usize>("count").unwrap(), 1000., 10.)
    };

    let mut bvh = rt::Bvh::with_config(config)?;
        bvh.build(objects);

    let ray = bvh.ray(point("origin")?, point("dir")?)?;

    let mut tests = 0;

    let hit = bvh.nearest(&ray, |ray, sphere: &rt::Sphere| {
        tests += 1;

        sphere.intersect(ray).map(|t| (t, *sphere))
    });

    match hit {
        Some((t, sphere)) => log::info!(
            "Hit sphere at {:?} (radius {}) after {} at {:?}, {} objects tested",
            sphere.center, sphere.radius, t, ray.at(t), tests,
        ),
        None => log::info!("Missed everything, {} objects tested", tests),
    }

    Ok(())
}
