//! River tracing: steepest-descent flow with flux accumulation. Flow is
//! strictly downhill, so the segment set is acyclic by construction.

use contracts::{RiverSegment, SEA_LEVEL};

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct FlowMap {
    /// Index of the strictly-lower neighbor each cell drains into, if any.
    pub downstream: Vec<Option<usize>>,
    pub flux: Vec<i64>,
}

/// Compute drainage. Each land cell drains to its lowest strictly-lower
/// 8-neighbor (first in scan order on ties); pits and ocean drain nowhere.
/// Flux seeds at 1 plus a moisture term and accumulates downstream.
pub fn compute_flow(width: i64, height: i64, elevation: &[i64], moisture: &[i64]) -> FlowMap {
    let len = elevation.len();
    let mut downstream = vec![None; len];

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if elevation[idx] < SEA_LEVEL {
                continue;
            }
            let mut best: Option<(i64, usize)> = None;
            for (dx, dy) in NEIGHBORS {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let nidx = (ny * width + nx) as usize;
                if elevation[nidx] < elevation[idx] {
                    match best {
                        Some((lowest, _)) if elevation[nidx] >= lowest => {}
                        _ => best = Some((elevation[nidx], nidx)),
                    }
                }
            }
            downstream[idx] = best.map(|(_, nidx)| nidx);
        }
    }

    // Descending-elevation order is a topological order of the drainage DAG.
    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by_key(|&idx| {
        let x = idx as i64 % width;
        let y = idx as i64 / width;
        (std::cmp::Reverse(elevation[idx]), y, x)
    });

    let mut flux = vec![0_i64; len];
    for &idx in &order {
        if elevation[idx] >= SEA_LEVEL {
            flux[idx] += 1 + moisture[idx] / 25;
        }
        if let Some(next) = downstream[idx] {
            flux[next] += flux[idx];
        }
    }

    FlowMap { downstream, flux }
}

/// Threshold scaled to map area; small maps still get a river or two.
pub fn river_threshold(width: i64, height: i64) -> i64 {
    ((width * height) / 60).max(8)
}

/// Emit one directed segment per river cell, pointing at its downstream
/// neighbor. The mouth segment may end on an ocean cell.
pub fn river_segments(
    world_id: &str,
    width: i64,
    elevation: &[i64],
    flow: &FlowMap,
    threshold: i64,
) -> Vec<RiverSegment> {
    let mut segments = Vec::new();
    for idx in 0..flow.flux.len() {
        if elevation[idx] < SEA_LEVEL || flow.flux[idx] < threshold {
            continue;
        }
        let Some(next) = flow.downstream[idx] else {
            continue;
        };
        segments.push(RiverSegment {
            world_id: world_id.to_string(),
            from_x: idx as i64 % width,
            from_y: idx as i64 / width,
            to_x: next as i64 % width,
            to_y: next as i64 / width,
            flux: flow.flux[idx],
        });
    }
    segments
}
