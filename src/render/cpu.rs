//! Software backend: the octree tracer and path tracer on the rayon pool.
//!
//! Runs the same traversal and light transport as the compute shaders. Used by
//! the headless renderer and by tests that need a device without a GPU.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::backend::{Fenced, RenderBackend, TraceJob};
use super::image::CpuImage;
use crate::core::types::Result;
use crate::math::Ray;
use crate::math::sampling::{SampleRng, cosine_hemisphere};
use crate::scene::{Lighting, SceneSnapshot};
use crate::voxel::svo::{Octree, RayHit};

/// Fraction of a voxel a bounce origin is pushed off the surface
const SURFACE_OFFSET: f32 = 1e-2;

#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }

    /// Interactive-tracer shading of a whole frame at the snapshot's size
    pub fn render_preview(&self, octree: &Octree, snapshot: &SceneSnapshot) -> Result<CpuImage> {
        let (width, height) = (snapshot.width, snapshot.height);
        let pixels = (0..width * height)
            .into_par_iter()
            .map(|i| {
                let ndc = pixel_ndc(i % width, i / width, width, height, Vec2::splat(0.5));
                let ray = snapshot.camera.ray(ndc);
                shade_primary(octree, &ray, &snapshot.lighting, snapshot).extend(1.0).to_array()
            })
            .collect();
        CpuImage::from_pixels(width, height, pixels)
    }
}

impl RenderBackend for CpuBackend {
    type Octree = Arc<Octree>;
    type Image = CpuImage;
    type Job = CpuTraceJob;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn upload_octree(&self, octree: &Arc<Octree>) -> Result<Fenced<Arc<Octree>>> {
        Ok(Fenced::ready(octree.clone()))
    }

    fn begin_path_trace(&self, snapshot: &SceneSnapshot, octree: Arc<Arc<Octree>>) -> Result<CpuTraceJob> {
        Ok(CpuTraceJob::new(snapshot.clone(), octree))
    }

    fn maintain(&self) {}

    fn check_device(&self) -> Result<()> {
        Ok(())
    }
}

/// Accumulating path trace held in host memory
pub struct CpuTraceJob {
    snapshot: SceneSnapshot,
    octree: Arc<Arc<Octree>>,
    /// Radiance sums, one per pixel
    accum: Vec<Vec3>,
    samples: u32,
}

impl CpuTraceJob {
    pub fn new(snapshot: SceneSnapshot, octree: Arc<Arc<Octree>>) -> Self {
        let accum = vec![Vec3::ZERO; snapshot.pixel_count()];
        Self {
            snapshot,
            octree,
            accum,
            samples: 0,
        }
    }

    fn average_into(&self, pixels: &mut [[f32; 4]]) {
        let scale = 1.0 / self.samples.max(1) as f32;
        pixels
            .par_iter_mut()
            .zip(self.accum.par_iter())
            .for_each(|(out, sum)| *out = (*sum * scale).extend(1.0).to_array());
    }
}

impl TraceJob for CpuTraceJob {
    type Image = CpuImage;

    fn snapshot(&self) -> &SceneSnapshot {
        &self.snapshot
    }

    fn samples_done(&self) -> u32 {
        self.samples
    }

    fn trace_batch(&mut self, samples: u32) -> Result<()> {
        let octree: &Octree = &self.octree;
        let snapshot = &self.snapshot;
        let first = self.samples;
        self.accum.par_iter_mut().enumerate().for_each(|(i, sum)| {
            for sample in first..first + samples {
                *sum += trace_path(octree, snapshot, i as u32, sample);
            }
        });
        self.samples += samples;
        Ok(())
    }

    fn resolve(&mut self, recycled: Option<CpuImage>) -> Result<Fenced<CpuImage>> {
        let (width, height) = (self.snapshot.width, self.snapshot.height);
        let mut image = match recycled {
            Some(image) if image.width() == width && image.height() == height => image,
            _ => CpuImage::new(width, height),
        };
        self.average_into(image.pixels_mut());
        Ok(Fenced::ready(image))
    }

    fn read_back(&mut self) -> Result<CpuImage> {
        let mut image = CpuImage::new(self.snapshot.width, self.snapshot.height);
        self.average_into(image.pixels_mut());
        Ok(image)
    }
}

/// NDC of a point inside pixel (x, y); `offset` is the position within the pixel
pub fn pixel_ndc(x: u32, y: u32, width: u32, height: u32, offset: Vec2) -> Vec2 {
    Vec2::new(
        (x as f32 + offset.x) / width as f32 * 2.0 - 1.0,
        1.0 - (y as f32 + offset.y) / height as f32 * 2.0,
    )
}

/// Voxel normal turned to the side the ray arrived from
fn shading_normal(hit: &RayHit) -> Vec3 {
    let normal = hit.voxel.normal();
    if normal.dot(hit.face_normal) > 0.0 { normal } else { hit.face_normal }
}

/// Direct sun plus ambient shading of the first hit, sky on miss
pub fn shade_primary(octree: &Octree, ray: &Ray, lighting: &Lighting, snapshot: &SceneSnapshot) -> Vec3 {
    let Some(hit) = octree.raycast(ray) else {
        return lighting.sky_color();
    };
    let normal = shading_normal(&hit);
    let n_dot_l = normal.dot(lighting.sun_direction()).max(0.0);
    let mut color = hit.voxel.color() * (Vec3::splat(lighting.ambient) + lighting.sun_radiance() * n_dot_l);
    if hit.voxel.is_emissive() {
        color += snapshot.emission(hit.voxel.material_id);
    }
    color
}

/// One path-traced radiance sample for a pixel
pub fn trace_path(octree: &Octree, snapshot: &SceneSnapshot, pixel_index: u32, sample_index: u32) -> Vec3 {
    let lighting = &snapshot.lighting;
    let mut rng = SampleRng::new(pixel_index, sample_index);
    let jitter = Vec2::new(rng.next_f32(), rng.next_f32());
    let x = pixel_index % snapshot.width;
    let y = pixel_index / snapshot.width;
    let mut ray = snapshot.camera.ray(pixel_ndc(x, y, snapshot.width, snapshot.height, jitter));

    let sun_direction = lighting.sun_direction();
    let offset = octree.voxel_size() * SURFACE_OFFSET;
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;

    for bounce in 0..=snapshot.max_bounces {
        let Some(hit) = octree.raycast(&ray) else {
            radiance += throughput * lighting.sky_color();
            break;
        };
        if hit.voxel.is_emissive() {
            radiance += throughput * snapshot.emission(hit.voxel.material_id);
        }

        let albedo = hit.voxel.color();
        let normal = shading_normal(&hit);
        let origin = hit.position + hit.face_normal * offset;

        let n_dot_l = normal.dot(sun_direction);
        if n_dot_l > 0.0 && octree.raycast(&Ray::new(origin, sun_direction)).is_none() {
            radiance += throughput * albedo * lighting.sun_radiance() * n_dot_l;
        }

        if bounce == snapshot.max_bounces {
            break;
        }
        // cosine-weighted sampling cancels the cosine and pdf terms
        throughput *= albedo;
        let direction = cosine_hemisphere(normal, rng.next_f32(), rng.next_f32());
        ray = Ray::new(origin, direction);
    }
    radiance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::Camera;
    use crate::math::Triangle;
    use crate::scene::{Material, SceneSettings};
    use crate::voxel::svo::OctreeBuilder;

    /// Large horizontal quad at y = 0
    fn floor() -> Arc<Octree> {
        let a = Vec3::new(-1.0, 0.0, -1.0);
        let b = Vec3::new(1.0, 0.0, -1.0);
        let c = Vec3::new(1.0, 0.0, 1.0);
        let d = Vec3::new(-1.0, 0.0, 1.0);
        let triangles = [Triangle::new([a, c, b], 0), Triangle::new([a, d, c], 0)];
        Arc::new(OctreeBuilder::new(4).unwrap().build(&triangles).unwrap())
    }

    fn looking_down(settings: &SceneSettings) -> SceneSnapshot {
        let camera = Camera::look_at(Vec3::new(0.0, 2.0, 0.01), Vec3::ZERO, Vec3::Y);
        SceneSnapshot::capture(settings, &camera, 8, 8)
    }

    #[test]
    fn test_miss_returns_sky() {
        let octree = floor();
        let snapshot = looking_down(&SceneSettings::default());
        let up = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y);
        let sky = snapshot.lighting.sky_color();
        assert_eq!(shade_primary(&octree, &up, &snapshot.lighting, &snapshot), sky);
    }

    #[test]
    fn test_lit_floor_is_brighter_than_ambient() {
        let octree = floor();
        let snapshot = looking_down(&SceneSettings::default());
        let down = Ray::new(Vec3::new(0.1, 1.0, 0.1), -Vec3::Y);
        let color = shade_primary(&octree, &down, &snapshot.lighting, &snapshot);
        assert!(color.x > snapshot.lighting.ambient);
    }

    #[test]
    fn test_samples_are_deterministic() {
        let octree = floor();
        let snapshot = looking_down(&SceneSettings::default());
        let a = trace_path(&octree, &snapshot, 27, 3);
        let b = trace_path(&octree, &snapshot, 27, 3);
        assert_eq!(a, b);
        assert!(a.is_finite());
    }

    #[test]
    fn test_emissive_voxels_glow() {
        let mut settings = SceneSettings::default();
        settings.lighting.sun_intensity = 0.0;
        settings.lighting.sky_color = [0.0; 3];
        settings.materials[0] = Material {
            albedo: Vec3::ONE,
            emission: Vec3::splat(5.0),
        };
        let a = Vec3::new(-1.0, 0.0, -1.0);
        let b = Vec3::new(1.0, 0.0, -1.0);
        let c = Vec3::new(1.0, 0.0, 1.0);
        let d = Vec3::new(-1.0, 0.0, 1.0);
        let triangles = [Triangle::new([a, c, b], 0), Triangle::new([a, d, c], 0)];
        let octree = OctreeBuilder::new(4)
            .unwrap()
            .build_with_emission(&triangles, |m| settings.is_emissive(m))
            .unwrap();

        let snapshot = looking_down(&settings);
        let center = (snapshot.height / 2) * snapshot.width + snapshot.width / 2;
        let sample = trace_path(&octree, &snapshot, center, 0);
        assert!(sample.x >= 5.0);
    }

    #[test]
    fn test_job_accumulates_and_recycles() {
        let backend = CpuBackend::new();
        let octree = backend.upload_octree(&floor()).unwrap().try_into_ready().unwrap();
        let snapshot = looking_down(&SceneSettings::default());
        let mut job = backend.begin_path_trace(&snapshot, Arc::new(octree)).unwrap();

        job.trace_batch(2).unwrap();
        job.trace_batch(2).unwrap();
        assert_eq!(job.samples_done(), 4);

        let first = job.resolve(None).unwrap().try_into_ready().unwrap();
        assert!(!first.is_blank());
        let again = job.resolve(Some(first.clone())).unwrap().try_into_ready().unwrap();
        assert_eq!(again, first);
        assert_eq!(job.read_back().unwrap(), first);

        // wrong size is replaced, not reused
        let resized = job.resolve(Some(CpuImage::new(2, 2))).unwrap().try_into_ready().unwrap();
        assert_eq!((resized.width(), resized.height()), (8, 8));
    }

    #[test]
    fn test_preview_sees_floor_and_sky() {
        let octree = floor();
        let settings = SceneSettings::default();
        let camera = Camera::look_at(Vec3::new(0.0, 1.5, 1.0), Vec3::ZERO, Vec3::Y);
        let snapshot = SceneSnapshot::capture(&settings, &camera, 16, 16);
        let image = CpuBackend::new().render_preview(&octree, &snapshot).unwrap();
        let sky = settings.lighting.sky_color();
        let top = image.pixel(8, 0).unwrap();
        assert_eq!(Vec3::new(top[0], top[1], top[2]), sky);
        let bottom = image.pixel(8, 15).unwrap();
        assert_ne!(Vec3::new(bottom[0], bottom[1], bottom[2]), sky);
    }
}
