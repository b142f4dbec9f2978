//! Hash-lattice value noise with fractal layering.
//!
//! The lattice is derived from the seed by integer mixing only; sampling
//! uses plain f64 arithmetic (no transcendental functions), so fields are
//! reproducible across platforms.

#[derive(Debug, Clone, Copy)]
pub struct NoiseField {
    seed: u64,
}

fn mix(seed: u64, xi: i64, yi: i64) -> u64 {
    let mut hash = seed ^ (xi as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    hash ^= (yi as u64).wrapping_mul(0x517c_c1b7_2722_0a95);
    hash ^= hash >> 32;
    hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(0x94d0_49bb_1331_11eb);
    hash ^ (hash >> 32)
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

impl NoiseField {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Lattice value in [-1, 1] at an integer corner.
    fn corner(&self, xi: i64, yi: i64) -> f64 {
        let hash = mix(self.seed, xi, yi);
        (hash >> 11) as f64 / (1u64 << 52) as f64 - 1.0
    }

    /// Bilinear value noise in [-1, 1].
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let sx = smoothstep(fx);
        let sy = smoothstep(fy);

        let top = lerp(self.corner(x0, y0), self.corner(x0 + 1, y0), sx);
        let bottom = lerp(self.corner(x0, y0 + 1), self.corner(x0 + 1, y0 + 1), sx);
        lerp(top, bottom, sy)
    }

    /// Layered fractal sample. Each octave doubles frequency by `lacunarity`
    /// and scales amplitude by `persistence`; output stays in [-1, 1].
    pub fn fbm(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut total = 0.0;
        let mut norm = 0.0;
        for octave in 0..octaves {
            // Offset each octave so layers do not share lattice corners.
            let offset = octave as f64 * 12.45;
            total += amplitude * self.sample(x * frequency + offset, y * frequency - offset);
            norm += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }
        if norm > 0.0 {
            total / norm
        } else {
            0.0
        }
    }
}
