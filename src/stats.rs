use crate::error::Result;
use crate::pool::TaskPool;
use ndarray::{ArrayView3, ArrayView4, Axis};

/// Running count/mean/M2 for one band; partial results merge exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn merge(self, other: Moments) -> Moments {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        Moments { count, mean, m2 }
    }
}

/// Per-band moments of one `[bands, height, width]` image.
fn image_moments(image: ArrayView3<'_, u16>) -> Vec<Moments> {
    image
        .axis_iter(Axis(0))
        .map(|band| {
            let count = band.len() as u64;
            if count == 0 {
                return Moments::default();
            }
            let sum: u64 = band.iter().map(|&v| v as u64).sum();
            let mean = sum as f64 / count as f64;
            let m2 = band
                .iter()
                .map(|&v| {
                    let d = v as f64 - mean;
                    d * d
                })
                .sum();
            Moments { count, mean, m2 }
        })
        .collect()
}

/// Mean and population standard deviation per band over rows, rows and columns.
///
/// Must only run once every row of `images` has been written.
pub fn band_statistics(
    pool: &TaskPool,
    images: ArrayView4<'_, u16>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let bands = images.len_of(Axis(1));
    let rows: Vec<ArrayView3<'_, u16>> = images.outer_iter().collect();

    let partials = pool.map_ordered(&rows, |row| Ok(image_moments(row.view())))?;
    let totals = partials
        .into_iter()
        .fold(vec![Moments::default(); bands], |acc, row| {
            acc.into_iter().zip(row).map(|(a, b)| a.merge(b)).collect()
        });

    let means = totals.iter().map(|m| m.mean).collect();
    let stds = totals
        .iter()
        .map(|m| {
            if m.count == 0 {
                0.0
            } else {
                (m.m2 / m.count as f64).sqrt()
            }
        })
        .collect();
    Ok((means, stds))
}
