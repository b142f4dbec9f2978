//! Climate fields: temperature from latitude, elevation lapse, and noise;
//! moisture from ocean proximity, a tropical bonus, and noise.

use std::collections::VecDeque;

use contracts::SEA_LEVEL;

use super::noise::NoiseField;

const LAPSE_RATE: f64 = 2.0;
const TEMP_NOISE_AMPLITUDE: f64 = 3.0;
const MOISTURE_NOISE_AMPLITUDE: f64 = 10.0;

/// Fraction of the distance from the equator row to the pole, in [0, 1].
fn latitude_fraction(y: i64, height: i64) -> f64 {
    if height <= 1 {
        return 0.0;
    }
    let equator = (height - 1) as f64 / 2.0;
    ((y as f64 - equator).abs() / equator.max(0.5)).min(1.0)
}

/// Temperature per cell, clamped to [-20, 40].
pub fn temperature_field(
    width: i64,
    height: i64,
    elevation: &[i64],
    noise: &NoiseField,
    offset: i64,
) -> Vec<i64> {
    let mut field = Vec::with_capacity(elevation.len());
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let base = 35.0 - 50.0 * latitude_fraction(y, height);
            let lapse = -((elevation[idx] - SEA_LEVEL).max(0) as f64 / 10.0) * LAPSE_RATE;
            let jitter = noise.sample(x as f64 * 0.35, y as f64 * 0.35) * TEMP_NOISE_AMPLITUDE;
            let value = (base + lapse + jitter).floor() as i64 + offset;
            field.push(value.clamp(-20, 40));
        }
    }
    field
}

/// Multi-source BFS distance (in tiles, 4-connected) from every ocean cell.
/// Ocean cells are distance zero; on a world with no ocean every cell is
/// `i64::MAX`.
pub fn ocean_distance(width: i64, height: i64, elevation: &[i64]) -> Vec<i64> {
    let len = elevation.len();
    let mut distance = vec![i64::MAX; len];
    let mut queue = VecDeque::new();

    for idx in 0..len {
        if elevation[idx] < SEA_LEVEL {
            distance[idx] = 0;
            queue.push_back(idx);
        }
    }

    while let Some(idx) = queue.pop_front() {
        let x = idx as i64 % width;
        let y = idx as i64 / width;
        let next = distance[idx] + 1;
        for (dx, dy) in [(0_i64, -1_i64), (-1, 0), (1, 0), (0, 1)] {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            let nidx = (ny * width + nx) as usize;
            if distance[nidx] > next {
                distance[nidx] = next;
                queue.push_back(nidx);
            }
        }
    }
    distance
}

/// Moisture per cell, clamped to [0, 100].
pub fn moisture_field(
    width: i64,
    height: i64,
    elevation: &[i64],
    noise: &NoiseField,
    offset: i64,
) -> Vec<i64> {
    let distances = ocean_distance(width, height, elevation);
    let reach = ((width + height) / 4).max(1);

    let mut field = Vec::with_capacity(elevation.len());
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            let ocean_term = if distances[idx] == i64::MAX {
                0.0
            } else {
                let d = distances[idx].min(reach) as f64;
                55.0 * (1.0 - d / reach as f64)
            };
            let tropical = if latitude_fraction(y, height) < 0.2 { 15.0 } else { 0.0 };
            let jitter =
                noise.sample(x as f64 * 0.3 + 57.0, y as f64 * 0.3 - 57.0) * MOISTURE_NOISE_AMPLITUDE;
            let value = (20.0 + ocean_term + tropical + jitter).floor() as i64 + offset;
            field.push(value.clamp(0, 100));
        }
    }
    field
}
