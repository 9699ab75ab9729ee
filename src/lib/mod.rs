pub mod bvh;
pub mod geom;

pub use bvh::{Aabb, Bounded, Bvh, BvhConfig, BvhData};
pub use geom::{Ray, Sphere};

use std::{fs, io, path};

// Partial documents are fine, missing fields fall back to their defaults
pub fn load_config<P: AsRef<path::Path>>(path: P) -> anyhow::Result<BvhConfig> {
    let reader = io::BufReader::new({
        fs::File::open(path.as_ref())?
    });

    let config: BvhConfig = serde_json::from_reader(reader)?;
        config.validate()?;

    log::debug!("Loaded {:?} from {}", config, path.as_ref().display());

    Ok(config)
}
