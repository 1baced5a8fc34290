//! Synthetic scans and reference helpers for tests and benchmarks.
//!
//! Generators are deterministic (fixed grids or a seeded LCG) so results can
//! be compared across runs without pulling a random number crate into the
//! library.

use nalgebra::Vector3;

use crate::point::Point3D;

/// Half-cube point cloud: three orthogonal planes (XY, YZ, ZX) of side
/// `length`, sampled every `interval`.
///
/// Produces `3 * (length / interval + 1)^2` points.
pub fn make_half_cubic_pcd(length: f64, interval: f64) -> Vec<Vector3<f64>> {
    let per_line = (length / interval) as usize + 1;
    let mut points = Vec::with_capacity(3 * per_line * per_line);

    for i in 0..per_line {
        for j in 0..per_line {
            let u = interval * j as f64;
            let v = interval * i as f64;

            points.push(Vector3::new(u, v, 0.0));
            points.push(Vector3::new(0.0, u, v));
            points.push(Vector3::new(u, 0.0, v));
        }
    }

    points
}

/// Half-cube scan as [`Point3D`]s belonging to `index_frame`.
///
/// `alpha_timestamp` increases linearly with the point index, mimicking a
/// sweep from scan start to scan end. A negative `index_frame` leaves the
/// points unassigned.
pub fn make_half_cubic_scan(length: f64, interval: f64, index_frame: i32) -> Vec<Point3D> {
    let cloud = make_half_cubic_pcd(length, interval);
    let last = cloud.len().saturating_sub(1).max(1) as f64;

    cloud
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let point = Point3D::from_raw(p, i as f64 / last);
            point.with_frame(index_frame).unwrap_or(point)
        })
        .collect()
}

/// Square XY plane at height `z`.
pub fn make_xy_plane(size: f64, interval: f64, z: f64) -> Vec<Vector3<f64>> {
    let n = (size / interval) as usize + 1;
    let mut points = Vec::with_capacity(n * n);

    for i in 0..n {
        for j in 0..n {
            points.push(Vector3::new(interval * j as f64, interval * i as f64, z));
        }
    }

    points
}

/// Points spread uniformly within `±spread` of `center` on each axis.
pub fn make_clustered_points(
    center: [f64; 3],
    spread: f64,
    count: usize,
    seed: u64,
) -> Vec<Vector3<f64>> {
    let mut rng = Lcg::new(seed);
    (0..count)
        .map(|_| {
            Vector3::new(
                center[0] + (rng.next_unit() * 2.0 - 1.0) * spread,
                center[1] + (rng.next_unit() * 2.0 - 1.0) * spread,
                center[2] + (rng.next_unit() * 2.0 - 1.0) * spread,
            )
        })
        .collect()
}

/// Random points uniformly distributed inside a sphere.
pub fn make_random_sphere(
    center: [f64; 3],
    radius: f64,
    num_points: usize,
    seed: u64,
) -> Vec<Vector3<f64>> {
    let mut rng = Lcg::new(seed);
    let mut points = Vec::with_capacity(num_points);

    while points.len() < num_points {
        // Rejection sampling in the unit cube
        let d = Vector3::new(
            rng.next_unit() * 2.0 - 1.0,
            rng.next_unit() * 2.0 - 1.0,
            rng.next_unit() * 2.0 - 1.0,
        );
        let r2 = d.norm_squared();
        if r2 > 1.0 || r2 == 0.0 {
            continue;
        }
        let r = rng.next_unit().cbrt() * radius;
        points.push(Vector3::new(center[0], center[1], center[2]) + d * (r / r2.sqrt()));
    }

    points
}

/// Exhaustive k-nearest search, nearest first, ties in input order.
pub fn brute_force_nearest(
    points: &[Vector3<f64>],
    query: &Vector3<f64>,
    k: usize,
) -> Vec<Vector3<f64>> {
    let mut by_distance: Vec<_> = points
        .iter()
        .map(|p| ((p - query).norm_squared(), *p))
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
    by_distance.into_iter().take(k).map(|(_, p)| p).collect()
}

struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}
