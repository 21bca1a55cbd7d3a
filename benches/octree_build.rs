use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use glam::Vec3;

use svoview::math::{Ray, Triangle};
use svoview::scene::Scene;
use svoview::voxel::svo::OctreeBuilder;

/// Tessellated sphere, `rings` x `segments` quads
fn sphere(radius: f32, rings: u32, segments: u32) -> Vec<Triangle> {
    let point = |ring: u32, segment: u32| {
        let theta = std::f32::consts::PI * ring as f32 / rings as f32;
        let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
        Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()) * radius
    };

    let mut triangles = Vec::new();
    for ring in 0..rings {
        for segment in 0..segments {
            let a = point(ring, segment);
            let b = point(ring + 1, segment);
            let c = point(ring + 1, segment + 1);
            let d = point(ring, segment + 1);
            triangles.push(Triangle::new([a, b, c], 0));
            triangles.push(Triangle::new([a, c, d], 0));
        }
    }
    triangles
}

fn bench_sphere_build(c: &mut Criterion) {
    let triangles = sphere(1.0, 32, 64);
    let mut group = c.benchmark_group("octree_build_sphere");
    group.sample_size(10);

    for level in [6u32, 8, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            let builder = OctreeBuilder::new(level).unwrap();
            b.iter(|| builder.build(black_box(&triangles)).unwrap());
        });
    }
    group.finish();
}

fn bench_scene_cube(c: &mut Criterion) {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/scene_cube.obj");
    let scene = Scene::load(&path).unwrap();
    let builder = OctreeBuilder::new(7).unwrap();

    c.bench_function("octree_build_scene_cube_7", |b| {
        b.iter(|| builder.build(black_box(&scene.mesh.triangles)).unwrap());
    });
}

fn bench_raycast(c: &mut Criterion) {
    let octree = OctreeBuilder::new(8).unwrap().build(&sphere(1.0, 32, 64)).unwrap();
    let rays: Vec<Ray> = (0..256)
        .map(|i| {
            let angle = i as f32 * 0.0245;
            let origin = Vec3::new(angle.cos() * 3.0, 0.3, angle.sin() * 3.0);
            Ray::new(origin, (-origin).normalize())
        })
        .collect();

    c.bench_function("octree_raycast_256", |b| {
        b.iter(|| {
            rays.iter()
                .filter(|ray| octree.raycast(black_box(ray)).is_some())
                .count()
        });
    });
}

criterion_group!(benches, bench_sphere_build, bench_scene_cube, bench_raycast);
criterion_main!(benches);
