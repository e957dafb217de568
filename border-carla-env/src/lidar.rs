//! Lidar perception: from a raw point cloud to a fixed-size range histogram.
//!
//! A tick's measurement is parsed into a [`PointCloud`], projected to polar
//! coordinates with [`project`] and reduced by an [`AngularHistogram`] to one
//! range per angular bin.
//!
//! ```
//! use border_carla_env::{AngularHistogram, LidarConfig, PointCloud};
//!
//! let config = LidarConfig::default().n_bins(4).range(50.0);
//! let histogram = AngularHistogram::new(&config);
//!
//! // Two points in front of the vehicle, none elsewhere.
//! let cloud = PointCloud::from_points(vec![[10.0, 1.0, 0.0, 1.0], [20.0, 1.0, 0.0, 1.0]]);
//! let ranges = histogram.compute(&border_carla_env::lidar::project(&cloud));
//!
//! assert_eq!(ranges.len(), 4);
//! assert_eq!(ranges[0], 50.0);
//! assert!((ranges[2] - 20.025).abs() < 1e-3);
//! ```
use crate::{simulator::Vector3, CarlaEnvError};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Size of a point in a raw lidar measurement, `(x, y, z, intensity)` as `f32`.
pub const POINT_STRIDE: usize = 16;

/// Configuration of the ray-cast lidar and of its histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarConfig {
    /// Number of angular bins of the histogram.
    pub n_bins: usize,

    /// Range of the sensor in meters. Also reported for bins without points.
    pub range: f32,

    /// Number of lasers.
    pub channels: u32,

    /// Angle in degrees of the highest laser.
    pub upper_fov: f32,

    /// Angle in degrees of the lowest laser.
    pub lower_fov: f32,

    /// Rotation frequency in Hz.
    pub rotation_frequency: f32,

    /// Points generated by all lasers per second.
    pub points_per_second: u32,

    /// Proportion of points randomly dropped.
    pub dropoff_general_rate: f32,

    /// Intensity above which no points are dropped.
    pub dropoff_intensity_limit: f32,

    /// Probability of dropping points with zero intensity.
    pub dropoff_zero_intensity: f32,

    /// Mounting position relative to the vehicle.
    pub location: Vector3,

    /// Which point of a bin is reported.
    pub selection: BinSelection,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            n_bins: 81,
            range: 50.0,
            channels: 32,
            upper_fov: 10.0,
            lower_fov: -30.0,
            rotation_frequency: 20.0,
            points_per_second: 56000,
            dropoff_general_rate: 0.45,
            dropoff_intensity_limit: 0.8,
            dropoff_zero_intensity: 0.4,
            location: Vector3::new(1.6, 0.0, 1.7),
            selection: BinSelection::Farthest,
        }
    }
}

impl LidarConfig {
    /// Sets the number of angular bins.
    pub fn n_bins(mut self, v: usize) -> Self {
        self.n_bins = v;
        self
    }

    /// Sets the sensor range.
    pub fn range(mut self, v: f32) -> Self {
        self.range = v;
        self
    }

    /// Sets the selection strategy of the histogram.
    pub fn selection(mut self, v: BinSelection) -> Self {
        self.selection = v;
        self
    }
}

/// A raw lidar measurement, `(x, y, z, intensity)` per point, in the sensor frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f32; 4]>,
}

impl PointCloud {
    /// Parses the little-endian buffer delivered by the simulator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CarlaEnvError> {
        if bytes.len() % POINT_STRIDE != 0 {
            return Err(CarlaEnvError::MalformedSensorData {
                len: bytes.len(),
                stride: POINT_STRIDE,
            });
        }

        let points = bytes
            .chunks_exact(POINT_STRIDE)
            .map(|p| {
                let mut point = [0f32; 4];
                for (v, b) in point.iter_mut().zip(p.chunks_exact(4)) {
                    *v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                point
            })
            .collect();

        Ok(Self { points })
    }

    pub fn from_points(points: Vec<[f32; 4]>) -> Self {
        Self { points }
    }

    /// Serializes the points in the layout accepted by [`PointCloud::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        self.points
            .iter()
            .flat_map(|p| p.iter().flat_map(|v| v.to_le_bytes()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f32; 4]] {
        &self.points
    }
}

/// A lidar point in cylindrical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarPoint {
    /// Horizontal distance from the sensor.
    pub range: f32,
    /// Azimuth in `(-π, π]`, zero along the sensor's x axis.
    pub angle: f32,
    pub height: f32,
}

/// Converts `(x, y)` to `(range, angle)`.
///
/// The origin maps to angle zero.
pub fn cart2pol(x: f32, y: f32) -> (f32, f32) {
    ((x * x + y * y).sqrt(), y.atan2(x))
}

/// Projects every point of the cloud, keeping the height.
pub fn project(cloud: &PointCloud) -> Vec<PolarPoint> {
    cloud
        .points()
        .iter()
        .map(|&[x, y, z, _]| {
            let (range, angle) = cart2pol(x, y);
            PolarPoint {
                range,
                angle,
                height: z,
            }
        })
        .collect()
}

/// Which point of a bin is reported by [`AngularHistogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinSelection {
    /// The farthest return of the sector.
    Farthest,
    /// The closest return of the sector.
    Nearest,
}

/// Reduces polar points to one range per angular sector.
///
/// The azimuth is split into `n_bins` sectors of equal width, bin `i` covering the
/// open interval `(2π(i - n/2)/n, 2π(i - n/2 + 1)/n)`. A point lying exactly on a
/// sector edge belongs to neither neighbour and is ignored. A sector without points
/// reports the sensor range.
#[derive(Debug, Clone)]
pub struct AngularHistogram {
    edges: Vec<f64>,
    max_range: f32,
    selection: BinSelection,
}

impl AngularHistogram {
    pub fn new(config: &LidarConfig) -> Self {
        let n = config.n_bins as f64;
        let edges = (0..=config.n_bins)
            .map(|i| 2.0 * PI * (i as f64 - n / 2.0) / n)
            .collect();

        Self {
            edges,
            max_range: config.range,
            selection: config.selection,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower and upper edge of bin `i`.
    pub fn bin_edges(&self, i: usize) -> (f64, f64) {
        (self.edges[i], self.edges[i + 1])
    }

    /// Returns the histogram, of length [`AngularHistogram::n_bins`].
    pub fn compute(&self, points: &[PolarPoint]) -> Vec<f32> {
        let mut bins: Vec<Option<f32>> = vec![None; self.n_bins()];

        for p in points.iter() {
            let Some(ix) = self.bin_index(p.angle as f64) else {
                continue;
            };
            let range = p.range.min(self.max_range);
            bins[ix] = Some(match (bins[ix], self.selection) {
                (None, _) => range,
                (Some(r), BinSelection::Farthest) => r.max(range),
                (Some(r), BinSelection::Nearest) => r.min(range),
            });
        }

        bins.into_iter()
            .map(|r| r.unwrap_or(self.max_range))
            .collect()
    }

    /// Index of the bin strictly containing `angle`, if any.
    fn bin_index(&self, angle: f64) -> Option<usize> {
        // First edge strictly above the angle.
        let upper = self.edges.partition_point(|&e| e <= angle);
        if upper == 0 || upper == self.edges.len() {
            return None;
        }
        let ix = upper - 1;
        if angle > self.edges[ix] {
            Some(ix)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn histogram(n_bins: usize, range: f32) -> AngularHistogram {
        AngularHistogram::new(&LidarConfig::default().n_bins(n_bins).range(range))
    }

    fn point(range: f32, angle: f32) -> PolarPoint {
        PolarPoint {
            range,
            angle,
            height: 0.0,
        }
    }

    #[test]
    fn test_cart2pol() {
        let (r, a) = cart2pol(3.0, 4.0);
        assert!((r - 5.0).abs() < 1e-6);
        assert!((a - (4f32).atan2(3.0)).abs() < 1e-6);

        assert_eq!(cart2pol(0.0, 0.0), (0.0, 0.0));
        assert!((cart2pol(-1.0, 0.0).1 - std::f32::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_parse_point_cloud() {
        let cloud = PointCloud::from_points(vec![[1.0, -2.0, 0.5, 0.9], [0.0, 3.0, -1.0, 0.1]]);
        let bytes = cloud.to_bytes();
        assert_eq!(bytes.len(), 2 * POINT_STRIDE);
        assert_eq!(PointCloud::from_bytes(&bytes).unwrap(), cloud);

        assert_eq!(
            PointCloud::from_bytes(&bytes[..20]),
            Err(CarlaEnvError::MalformedSensorData { len: 20, stride: 16 })
        );
        assert!(PointCloud::from_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_empty_cloud_is_all_sentinel() {
        for n_bins in [1, 4, 36, 81] {
            let ranges = histogram(n_bins, 50.0).compute(&[]);
            assert_eq!(ranges, vec![50.0; n_bins]);
        }
    }

    #[test]
    fn test_length_is_independent_of_cloud_size() {
        let h = histogram(36, 50.0);
        for n_points in [0, 1, 7, 1000] {
            let points: Vec<_> = (0..n_points)
                .map(|_| point(fastrand::f32() * 50.0, (fastrand::f32() * 2.0 - 1.0) * 3.14))
                .collect();
            let ranges = h.compute(&points);
            assert_eq!(ranges.len(), 36);
            assert!(ranges.iter().all(|&r| (0.0..=50.0).contains(&r)));
        }
    }

    #[test]
    fn test_farthest_point_per_bin() {
        let h = histogram(4, 50.0);
        // Bin 2 covers (0, π/2).
        let points = [point(3.0, 0.3), point(12.0, 0.7), point(7.0, 1.2)];
        let ranges = h.compute(&points);

        assert_eq!(ranges, vec![50.0, 50.0, 12.0, 50.0]);
    }

    #[test]
    fn test_nearest_selection() {
        let h = AngularHistogram::new(
            &LidarConfig::default()
                .n_bins(4)
                .selection(BinSelection::Nearest),
        );
        let points = [point(3.0, 0.3), point(12.0, 0.7), point(7.0, -2.0)];
        let ranges = h.compute(&points);

        assert_eq!(ranges, vec![7.0, 50.0, 3.0, 50.0]);
    }

    #[test]
    fn test_matches_brute_force_maximum() {
        let h = histogram(36, 80.0);
        let points: Vec<_> = (0..500)
            .map(|_| point(fastrand::f32() * 80.0, (fastrand::f32() * 2.0 - 1.0) * 3.1))
            .collect();
        let ranges = h.compute(&points);

        for (i, &r) in ranges.iter().enumerate() {
            let (low, high) = h.bin_edges(i);
            let expected = points
                .iter()
                .filter(|p| (p.angle as f64) > low && (p.angle as f64) < high)
                .map(|p| p.range)
                .fold(None, |acc: Option<f32>, r| Some(acc.map_or(r, |a| a.max(r))))
                .unwrap_or(80.0);
            assert_eq!(r, expected, "bin {}", i);
        }
    }

    #[test]
    fn test_points_on_bin_edges_are_excluded() {
        let h = histogram(4, 50.0);
        // Edges of 4 bins are -π, -π/2, 0, π/2, π.
        let on_edges = [point(5.0, 0.0), point(6.0, std::f32::consts::PI)];
        assert_eq!(h.compute(&on_edges), vec![50.0; 4]);

        // π/2 is not representable in f32, the rounded angle falls into one neighbour.
        let (low, _) = h.bin_edges(3);
        let near_edge = point(5.0, low as f32);
        let ranges = h.compute(&[near_edge]);
        assert_eq!(ranges.iter().filter(|&&r| r == 5.0).count(), 1);
    }

    #[test]
    fn test_ranges_are_clipped() {
        let ranges = histogram(4, 50.0).compute(&[point(75.0, 0.5)]);
        assert_eq!(ranges[2], 50.0);
    }
}
