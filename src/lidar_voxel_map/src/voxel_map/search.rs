//! Neighbor queries over the voxel hash map.
//!
//! # Algorithm
//!
//! A query point is mapped to its voxel, then every voxel within
//! `neighbor_radius_voxels` (Chebyshev distance) is looked up in the hash
//! table, i.e. a cube of `(2r + 1)^3` cells. When that cube has more cells
//! than the map has occupied voxels, the occupied voxels are scanned and
//! filtered by Chebyshev distance instead, so the cost never exceeds the
//! size of the map. Points stored in those cells are the only candidates, so the search is approximate: a true nearest neighbor
//! outside the cube is never returned. Correspondences that far away are
//! rejected by the registration step anyway.
//!
//! The k nearest candidates are kept in a bounded max-heap ordered by
//! `(squared distance, insertion sequence)`, which makes ties resolve to the
//! earliest inserted point.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Vector3;
use rayon::prelude::*;

use super::{Voxel, VoxelBlock, VoxelHashMap};
use crate::error::KeyRangeError;

/// A stored point considered by a query.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_sq: f64,
    sequence: u64,
    point: Vector3<f64>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl VoxelHashMap {
    /// Visit every stored point in the voxel cube around `center`.
    fn for_each_candidate<F>(&self, center: Voxel, query: &Vector3<f64>, mut visit: F)
    where
        F: FnMut(Candidate),
    {
        let radius = self.config.neighbor_radius_voxels;
        let mut visit_block = |block: &VoxelBlock| {
            for (point, sequence) in block.iter_sequenced() {
                visit(Candidate {
                    distance_sq: (point - query).norm_squared(),
                    sequence,
                    point: *point,
                });
            }
        };

        if cube_cells(radius) > self.voxels.len() as u128 {
            self.voxels
                .iter()
                .filter(|(voxel, _)| voxel.chebyshev_distance(&center) <= radius)
                .for_each(|(_, block)| visit_block(block));
        } else {
            center
                .neighborhood(radius)
                .filter_map(|voxel| self.voxels.get(&voxel))
                .for_each(visit_block);
        }
    }

    fn nearest_candidates(
        &self,
        query: &Vector3<f64>,
        k: usize,
    ) -> Result<Vec<Candidate>, KeyRangeError> {
        let center = self.voxel_of(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.for_each_candidate(center, query, |candidate| {
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        });

        Ok(heap.into_sorted_vec())
    }

    /// The `k` stored points closest to `query`, nearest first.
    ///
    /// # Arguments
    /// * `query` - Map-frame coordinate to search around
    /// * `k` - Maximum number of neighbors to return
    ///
    /// # Returns
    /// Up to `k` points ordered by distance; equidistant points come back in
    /// insertion order.
    ///
    /// Only voxels within `neighbor_radius_voxels` of the query's voxel are
    /// searched. Fewer than `k` points (possibly none) is a normal result near
    /// the map boundary or before the map is populated.
    pub fn query_nearest(
        &self,
        query: &Vector3<f64>,
        k: usize,
    ) -> Result<Vec<Vector3<f64>>, KeyRangeError> {
        Ok(self
            .nearest_candidates(query, k)?
            .into_iter()
            .map(|c| c.point)
            .collect())
    }

    /// Like [`query_nearest`](Self::query_nearest), also returning the
    /// Euclidean distance of each neighbor.
    pub fn query_nearest_with_distances(
        &self,
        query: &Vector3<f64>,
        k: usize,
    ) -> Result<Vec<(Vector3<f64>, f64)>, KeyRangeError> {
        Ok(self
            .nearest_candidates(query, k)?
            .into_iter()
            .map(|c| (c.point, c.distance_sq.sqrt()))
            .collect())
    }

    /// All stored points within `radius` of `query`, nearest first.
    ///
    /// The same voxel cube as [`query_nearest`](Self::query_nearest) bounds
    /// the search, so a radius larger than the cube does not widen it. A
    /// negative or NaN `radius` matches nothing.
    pub fn query_radius(
        &self,
        query: &Vector3<f64>,
        radius: f64,
    ) -> Result<Vec<Vector3<f64>>, KeyRangeError> {
        let center = self.voxel_of(query)?;
        if radius.is_nan() || radius < 0.0 {
            return Ok(Vec::new());
        }
        let radius_sq = radius * radius;

        let mut found = Vec::new();
        self.for_each_candidate(center, query, |candidate| {
            if candidate.distance_sq <= radius_sq {
                found.push(candidate);
            }
        });
        found.sort_unstable();

        Ok(found.into_iter().map(|c| c.point).collect())
    }

    /// Run [`query_nearest`](Self::query_nearest) for every query in parallel.
    ///
    /// Results are in the same order as `queries`. Fails if any query point
    /// is outside the representable range.
    pub fn query_nearest_batch(
        &self,
        queries: &[Vector3<f64>],
        k: usize,
    ) -> Result<Vec<Vec<Vector3<f64>>>, KeyRangeError> {
        queries
            .par_iter()
            .map(|query| self.query_nearest(query, k))
            .collect()
    }
}

/// Number of cells in the `(2r + 1)^3` neighbor cube.
fn cube_cells(radius: u32) -> u128 {
    let side = 2 * u128::from(radius) + 1;
    side * side * side
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{brute_force_nearest, make_random_sphere};
    use crate::voxel_map::VoxelMapBuilder;
    use approx::assert_relative_eq;

    fn map_with(voxel_size: f64, max_points: usize, radius: u32) -> VoxelHashMap {
        VoxelMapBuilder::new()
            .voxel_size(voxel_size)
            .max_points_per_voxel(max_points)
            .neighbor_radius_voxels(radius)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_map_returns_nothing() {
        let map = map_with(1.0, 10, 1);
        let result = map.query_nearest(&Vector3::new(3.0, 2.0, 1.0), 5).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_round_trip_radius_zero() {
        let mut map = map_with(0.5, 10, 0);
        let p = Vector3::new(1.23, -4.56, 7.89);
        map.insert(&p).unwrap();

        let result = map.query_nearest_with_distances(&p, 1).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, p);
        assert_eq!(result[0].1, 0.0);
    }

    #[test]
    fn test_first_seen_scenario_query() {
        let mut map = map_with(1.0, 2, 1);
        map.insert(&Vector3::new(0.1, 0.1, 0.1)).unwrap();
        map.insert(&Vector3::new(0.2, 0.2, 0.2)).unwrap();
        map.insert(&Vector3::new(0.9, 0.9, 0.9)).unwrap();

        let result = map.query_nearest(&Vector3::zeros(), 1).unwrap();
        assert_eq!(result, vec![Vector3::new(0.1, 0.1, 0.1)]);

        let result = map.query_nearest(&Vector3::zeros(), 5).unwrap();
        assert_eq!(
            result,
            vec![Vector3::new(0.1, 0.1, 0.1), Vector3::new(0.2, 0.2, 0.2)]
        );
    }

    #[test]
    fn test_k_zero() {
        let mut map = map_with(1.0, 10, 1);
        map.insert(&Vector3::new(0.5, 0.5, 0.5)).unwrap();
        assert!(map.query_nearest(&Vector3::zeros(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_results_sorted_and_bounded_by_k() {
        let mut map = map_with(1.0, 50, 1);
        for i in 0..30 {
            let t = i as f64 * 0.09;
            map.insert(&Vector3::new(t, 0.5, 0.5)).unwrap();
        }

        let result = map
            .query_nearest_with_distances(&Vector3::new(1.0, 0.5, 0.5), 4)
            .unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_relative_eq!(result[0].0.x, 0.99, epsilon = 1e-9);
    }

    #[test]
    fn test_ties_resolve_by_insertion_order() {
        let mut map = map_with(1.0, 10, 1);
        // Four points at distance 1 from the query, in different voxels
        let first = Vector3::new(1.5, 0.5, 0.5);
        let second = Vector3::new(-0.5, 0.5, 0.5);
        let third = Vector3::new(0.5, 1.5, 0.5);
        let fourth = Vector3::new(0.5, 0.5, -0.5);
        for p in [first, second, third, fourth] {
            map.insert(&p).unwrap();
        }

        let query = Vector3::new(0.5, 0.5, 0.5);
        assert_eq!(map.query_nearest(&query, 2).unwrap(), vec![first, second]);
        assert_eq!(
            map.query_nearest(&query, 4).unwrap(),
            vec![first, second, third, fourth]
        );
    }

    #[test]
    fn test_radius_bound_excludes_far_voxels() {
        let mut map = map_with(1.0, 10, 1);
        // Query voxel (0,0,0); (2,0,0) is two cells away
        let near = Vector3::new(1.9, 0.5, 0.5);
        let far = Vector3::new(2.01, 0.5, 0.5);
        map.insert(&near).unwrap();
        map.insert(&far).unwrap();

        let query = Vector3::new(0.99, 0.5, 0.5);
        let result = map.query_nearest(&query, 10).unwrap();
        assert_eq!(result, vec![near]);

        // Even as the only stored point, an out-of-cube point is not found
        let mut map = map_with(1.0, 10, 0);
        map.insert(&Vector3::new(1.01, 0.5, 0.5)).unwrap();
        assert!(map.query_nearest(&query, 1).unwrap().is_empty());
    }

    #[test]
    fn test_matches_brute_force_within_cube() {
        let voxel_size = 0.5;
        let radius = 2;
        let mut map = map_with(voxel_size, 1_000, radius);
        let cloud = make_random_sphere([0.0, 0.0, 0.0], 5.0, 2_000, 42);
        map.merge_positions(cloud.iter().copied()).unwrap();

        let queries = make_random_sphere([0.0, 0.0, 0.0], 4.0, 50, 7);
        for query in &queries {
            let center = map.voxel_of(query).unwrap();
            let in_cube: Vec<_> = cloud
                .iter()
                .copied()
                .filter(|p| {
                    Voxel::from_point(p, voxel_size)
                        .unwrap()
                        .chebyshev_distance(&center)
                        <= radius
                })
                .collect();

            let expected = brute_force_nearest(&in_cube, query, 5);
            let actual = map.query_nearest(query, 5).unwrap();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_query_radius() {
        let mut map = map_with(1.0, 10, 1);
        let points = [
            Vector3::new(0.5, 0.5, 0.5),
            Vector3::new(0.9, 0.5, 0.5),
            Vector3::new(1.6, 0.5, 0.5),
            Vector3::new(0.5, 1.4, 0.5),
        ];
        for p in &points {
            map.insert(p).unwrap();
        }

        let result = map.query_radius(&Vector3::new(0.5, 0.5, 0.5), 1.0).unwrap();
        assert_eq!(result, vec![points[0], points[1], points[3]]);

        assert!(map
            .query_radius(&Vector3::new(0.5, 0.5, 0.5), 0.0)
            .unwrap()
            .contains(&points[0]));
    }

    #[test]
    fn test_query_radius_rejects_negative_radius() {
        let mut map = map_with(1.0, 10, 1);
        let p = Vector3::new(0.5, 0.5, 0.5);
        map.insert(&p).unwrap();

        assert!(map.query_radius(&p, -1.0).unwrap().is_empty());
        assert!(map.query_radius(&p, f64::NAN).unwrap().is_empty());
        assert_eq!(map.query_radius(&p, 1.0).unwrap(), vec![p]);
    }

    #[test]
    fn test_large_radius_on_sparse_map() {
        // A cube of (2 * 20_000 + 1)^3 cells would be far too many to visit
        let mut map = map_with(1.0, 10, 20_000);
        let near = Vector3::new(0.5, 0.5, 0.5);
        let far = Vector3::new(-15_000.5, 12_000.5, 30.5);
        let outside = Vector3::new(25_000.5, 0.5, 0.5);
        for p in [far, near, outside] {
            map.insert(&p).unwrap();
        }

        let query = Vector3::new(1.0, 1.0, 1.0);
        assert_eq!(map.query_nearest(&query, 5).unwrap(), vec![near, far]);
        assert_eq!(map.query_radius(&query, 1.0).unwrap(), vec![near]);
    }

    #[test]
    fn test_sparse_scan_matches_brute_force() {
        // 27 cells per cube against a handful of occupied voxels
        let voxel_size = 2.0;
        let mut map = map_with(voxel_size, 100, 1);
        let cloud = make_random_sphere([0.0, 0.0, 0.0], 1.5, 60, 5);
        map.merge_positions(cloud.iter().copied()).unwrap();
        assert!(map.len() < 27);

        for query in make_random_sphere([0.0, 0.0, 0.0], 2.0, 20, 13) {
            let center = map.voxel_of(&query).unwrap();
            let in_cube: Vec<_> = cloud
                .iter()
                .copied()
                .filter(|p| {
                    Voxel::from_point(p, voxel_size)
                        .unwrap()
                        .chebyshev_distance(&center)
                        <= 1
                })
                .collect();
            assert_eq!(
                map.query_nearest(&query, 4).unwrap(),
                brute_force_nearest(&in_cube, &query, 4)
            );
        }
    }

    #[test]
    fn test_cube_cells() {
        assert_eq!(cube_cells(0), 1);
        assert_eq!(cube_cells(1), 27);
        assert_eq!(cube_cells(u32::MAX), (2 * u128::from(u32::MAX) + 1).pow(3));
    }

    #[test]
    fn test_query_out_of_range() {
        let map = map_with(1.0, 10, 1);
        assert!(map.query_nearest(&Vector3::new(1.0e9, 0.0, 0.0), 1).is_err());
        assert!(map
            .query_nearest(&Vector3::new(0.0, f64::INFINITY, 0.0), 1)
            .is_err());
    }

    #[test]
    fn test_evicted_points_unreachable() {
        let mut map = map_with(1.0, 10, 2);
        map.insert(&Vector3::new(0.5, 0.5, 0.5)).unwrap();
        map.insert(&Vector3::new(1.5, 0.5, 0.5)).unwrap();

        map.evict(|voxel| *voxel == Voxel::new(0, 0, 0));
        let result = map.query_nearest(&Vector3::new(0.5, 0.5, 0.5), 10).unwrap();
        assert_eq!(result, vec![Vector3::new(1.5, 0.5, 0.5)]);
    }

    #[test]
    fn test_batch_matches_sequential() {
        let mut map = map_with(1.0, 20, 1);
        let cloud = make_random_sphere([0.0, 0.0, 0.0], 3.0, 500, 3);
        map.merge_positions(cloud.iter().copied()).unwrap();

        let queries = make_random_sphere([0.0, 0.0, 0.0], 3.0, 64, 11);
        let batch = map.query_nearest_batch(&queries, 3).unwrap();
        assert_eq!(batch.len(), queries.len());
        for (query, result) in queries.iter().zip(&batch) {
            assert_eq!(result, &map.query_nearest(query, 3).unwrap());
        }

        let mut bad = queries.clone();
        bad.push(Vector3::new(f64::NAN, 0.0, 0.0));
        assert!(map.query_nearest_batch(&bad, 3).is_err());
    }
}
