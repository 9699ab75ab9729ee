use std::{fs, path};

use rand::SeedableRng as _;

fn main() -> anyhow::Result<()> {
    use std::io::Write as _;

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let parsed = clap::Command::new(env!("CARGO_BIN_NAME"))
        .arg(
            clap::Arg::new("out")
                .long("out")
                .number_of_values(1)
                .required(true))
        .arg(
            clap::Arg::new("count")
                .long("count")
                .number_of_values(1)
                .value_parser(clap::value_parser!(usize))
                .required(true))
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
                .value_parser(clap::value_parser!(u64))
                .default_value("0"))
        .arg(
            clap::Arg::new("config")
                .long("config")
                .number_of_values(1))
        .arg(
            clap::Arg::new("incremental")
                .long("incremental")
                .action(clap::ArgAction::SetTrue))
        .get_matches();

    // Both are required, so we can safely unwrap
    let out = parsed
        .get_one::<String>("out")
        .map(path::PathBuf::from)
        .unwrap();

    let count = *parsed.get_one::<usize>("count").unwrap();

    let config = match parsed.get_one::<String>("config") {
        Some(path) => rt::load_config(path)?,
        None => rt::BvhConfig::default(),
    };

    let objects = {
        let mut rng = rand::rngs::StdRng::seed_from_u64({
            *parsed.get_one::<u64>("seed").unwrap()
        });

        rt::geom::scatter(
            &mut rng,
            count,
            *parsed.get_one::<f32>("extent").unwrap(),
            *parsed.get_one::<f32>("radius").unwrap(),
        )
    };

    let mut bvh = rt::Bvh::with_config(config)?;

    if *parsed.get_one::<bool>("incremental").unwrap() {
        for sphere in objects {
            bvh.try_insert(sphere)?;
        }
    } else {
        bvh.try_build(objects)?;
    }

    bvh.validate()?;

    let data = rt::BvhData::new(&bvh);

    fs::File::create(&out)?
        .write_all(serde_json::to_string(&data)?.as_bytes())?;

    log::info!(
        "Wrote {} nodes and {} indices to {}",
        data.uniforms.len(),
        data.indices.len(),
        out.display(),
    );

    Ok(())
}
