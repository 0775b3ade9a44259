use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

use super::Dataset;

pub type DistanceFn = Arc<dyn Fn([f64; 2], [f64; 2]) -> f64 + Send + Sync>;

/// Distance between two cities.
#[derive(Clone)]
pub enum Distance {
    Euclid,
    Manhattan,
    /// Great-circle angle on the unit sphere; coordinates are (longitude, latitude) in degrees.
    Spheric,
    User(DistanceFn),
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Distance {
    pub fn name(&self) -> &'static str {
        match self {
            Distance::Euclid => "euclid",
            Distance::Manhattan => "manhattan",
            Distance::Spheric => "spheric",
            Distance::User(_) => "user",
        }
    }

    pub fn between(&self, a: [f64; 2], b: [f64; 2]) -> f64 {
        match self {
            Distance::Euclid => (a[0] - b[0]).hypot(a[1] - b[1]),
            Distance::Manhattan => (a[0] - b[0]).abs() + (a[1] - b[1]).abs(),
            Distance::Spheric => {
                let (lon1, lat1) = (a[0].to_radians(), a[1].to_radians());
                let (lon2, lat2) = (b[0].to_radians(), b[1].to_radians());
                let h = (0.5 * (lat2 - lat1)).sin().powi(2)
                    + lat1.cos() * lat2.cos() * (0.5 * (lon2 - lon1)).sin().powi(2);
                2.0 * h.sqrt().min(1.0).asin()
            }
            Distance::User(f) => f(a, b),
        }
    }
}

/// City coordinates with a precomputed distance table.
#[derive(Debug, Clone)]
pub struct Tour {
    coords: Vec<[f64; 2]>,
    distance: Distance,
    table: Arc<DMatrix<f64>>,
}

impl Tour {
    pub(super) fn new(data: &Dataset, distance: Distance) -> Self {
        let coords: Vec<[f64; 2]> = data
            .xdata
            .iter()
            .enumerate()
            .map(|(i, x)| [*x, data.y(i, 0)])
            .collect();
        let n = coords.len();
        let table = DMatrix::from_fn(n, n, |i, j| distance.between(coords[i], coords[j]));
        Self {
            coords,
            distance,
            table: Arc::new(table),
        }
    }

    pub fn ncities(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[[f64; 2]] {
        &self.coords
    }

    pub fn distance(&self) -> &Distance {
        &self.distance
    }

    /// Table distance between cities `a` and `b`; NaN for an invalid city.
    pub fn leg(&self, a: f64, b: f64) -> f64 {
        match (city(a, self.ncities()), city(b, self.ncities())) {
            (Some(i), Some(j)) => self.table[(i, j)],
            _ => f64::NAN,
        }
    }

    /// Leg lengths of the closed tour visiting `order` in sequence.
    pub fn legs(&self, order: &[f64]) -> Vec<f64> {
        let n = order.len();
        (0..n).map(|k| self.leg(order[k], order[(k + 1) % n])).collect()
    }

    pub fn length(&self, order: &[f64]) -> f64 {
        self.legs(order).iter().sum()
    }
}

fn city(value: f64, ncities: usize) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0 && (value as usize) < ncities).then_some(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels() {
        assert!((Distance::Euclid.between([0.0, 0.0], [3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert!((Distance::Manhattan.between([0.0, 0.0], [3.0, -4.0]) - 7.0).abs() < 1e-12);
        let quarter = Distance::Spheric.between([0.0, 0.0], [90.0, 0.0]);
        assert!((quarter - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let user = Distance::User(Arc::new(|a, b| (a[0] - b[0]).abs()));
        assert_eq!(user.between([1.0, 5.0], [4.0, -5.0]), 3.0);
        assert_eq!(user.name(), "user");
    }
}
