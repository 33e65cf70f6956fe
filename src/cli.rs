use kdtri::{
    KdTree, KdTreeConfig, Mesh, NormalMode, Ray, TriangleFlags,
    geometry::{FloatType, WorldPoint, WorldVector},
};

use log::info;
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

const RAY_COUNT: usize = 100_000;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mesh = Mesh::uv_sphere(WorldPoint::origin(), 1.0, 256, 512, TriangleFlags(1));
    info!("Generated sphere with {} triangles", mesh.triangles.len());

    let config = KdTreeConfig::builder().max_depth(32).build();
    let tree = KdTree::build(mesh.as_scene(), config)?;
    info!("Tree statistics:\n{}", tree.statistics());

    let mut rng = SmallRng::seed_from_u64(0);
    let mut cache = tree.query_cache();
    let mut hits = 0;
    let mut nodes_visited = 0;
    let mut triangles_tested = 0;

    for _ in 0..RAY_COUNT {
        let origin = random_direction(&mut rng) * 3.0;
        let target = random_direction(&mut rng) * 0.5;
        let ray = Ray::new(WorldPoint::from(origin), target - origin);

        if tree
            .intersect(&ray, TriangleFlags::ALL, NormalMode::Smooth, &mut cache)
            .is_some()
        {
            hits += 1;
        }
        nodes_visited += cache.stats().nodes_visited;
        triangles_tested += cache.stats().triangles_tested;
    }

    info!(
        "{} rays, {} hits; avg {:.1} nodes visited, {:.1} triangles tested per ray",
        RAY_COUNT,
        hits,
        nodes_visited as f64 / RAY_COUNT as f64,
        triangles_tested as f64 / RAY_COUNT as f64,
    );

    Ok(())
}

fn random_direction(rng: &mut SmallRng) -> WorldVector {
    loop {
        let v = WorldVector::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let norm_squared: FloatType = v.norm_squared();
        if norm_squared > 1e-6 && norm_squared <= 1.0 {
            return v / norm_squared.sqrt();
        }
    }
}
