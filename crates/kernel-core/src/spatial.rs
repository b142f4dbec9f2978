//! Grid geometry: pathfinding, line of sight, and area-of-effect shapes.
//!
//! Coordinates are integer tiles on the 5-foot convention. All geometry
//! predicates are integer-exact so results never depend on floating-point
//! platform behavior.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use contracts::{GridPoint, KernelError, FEET_PER_TILE};

pub fn feet_to_tiles(feet: i64) -> i64 {
    feet / FEET_PER_TILE
}

pub fn tiles_to_feet(tiles: i64) -> i64 {
    tiles * FEET_PER_TILE
}

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

/// Per-tile entry cost in feet. Difficult terrain doubles the base cost.
pub fn step_cost_feet(tile: GridPoint, difficult: &BTreeSet<GridPoint>) -> i64 {
    if difficult.contains(&tile) {
        FEET_PER_TILE * 2
    } else {
        FEET_PER_TILE
    }
}

/// A* over the 8-connected grid with a Chebyshev-distance heuristic.
///
/// Ties in f-score break lexicographically by (y, x), so equal-cost searches
/// expand in a fixed order and the returned path is deterministic. A
/// diagonal step is allowed unless both orthogonal neighbors it slips
/// between are obstacles. Returns the path including both endpoints, or
/// `None` when unreachable. A path from a tile to itself has length 1.
pub fn find_path(
    from: GridPoint,
    to: GridPoint,
    obstacles: &BTreeSet<GridPoint>,
    difficult: &BTreeSet<GridPoint>,
) -> Option<Vec<GridPoint>> {
    if from == to {
        return Some(vec![from]);
    }
    if obstacles.contains(&to) {
        return None;
    }

    // Reverse<(f, y, x)> makes the max-heap a deterministic min-heap.
    let mut open: BinaryHeap<Reverse<(i64, i64, i64)>> = BinaryHeap::new();
    let mut g_score: BTreeMap<GridPoint, i64> = BTreeMap::new();
    let mut came_from: BTreeMap<GridPoint, GridPoint> = BTreeMap::new();

    let heuristic = |point: GridPoint| point.chebyshev(&to) * FEET_PER_TILE;

    g_score.insert(from, 0);
    open.push(Reverse((heuristic(from), from.y, from.x)));

    while let Some(Reverse((_, y, x))) = open.pop() {
        let current = GridPoint::new(x, y);
        if current == to {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(previous) = came_from.get(&cursor) {
                cursor = *previous;
                path.push(cursor);
            }
            path.reverse();
            return Some(path);
        }

        let current_g = g_score.get(&current).copied().unwrap_or(i64::MAX);
        for (dx, dy) in NEIGHBORS {
            let next = GridPoint::new(current.x + dx, current.y + dy);
            if obstacles.contains(&next) {
                continue;
            }
            if dx != 0 && dy != 0 {
                let side_a = GridPoint::new(current.x + dx, current.y);
                let side_b = GridPoint::new(current.x, current.y + dy);
                if obstacles.contains(&side_a) && obstacles.contains(&side_b) {
                    continue;
                }
            }
            let tentative = current_g + step_cost_feet(next, difficult);
            if tentative < g_score.get(&next).copied().unwrap_or(i64::MAX) {
                g_score.insert(next, tentative);
                came_from.insert(next, current);
                open.push(Reverse((tentative + heuristic(next), next.y, next.x)));
            }
        }
    }
    None
}

/// Total cost in feet to walk `path`, not counting the starting tile.
pub fn path_cost_feet(path: &[GridPoint], difficult: &BTreeSet<GridPoint>) -> i64 {
    path.iter()
        .skip(1)
        .map(|tile| step_cost_feet(*tile, difficult))
        .sum()
}

/// Bresenham traversal from `from` to `to`. Sight is blocked by any obstacle
/// strictly between the endpoints.
pub fn line_of_sight(from: GridPoint, to: GridPoint, obstacles: &BTreeSet<GridPoint>) -> bool {
    for point in bresenham(from, to) {
        if point == from || point == to {
            continue;
        }
        if obstacles.contains(&point) {
            return false;
        }
    }
    true
}

fn bresenham(from: GridPoint, to: GridPoint) -> Vec<GridPoint> {
    let mut points = Vec::new();
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (from.x, from.y);

    loop {
        points.push(GridPoint::new(x, y));
        if x == to.x && y == to.y {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += sx;
        }
        if doubled <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

/// Area-of-effect shapes. Distances are specified in feet; membership tests
/// are exact on the scaled-integer grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AoeShape {
    Sphere {
        center: GridPoint,
        radius_feet: i64,
    },
    Cube {
        origin: GridPoint,
        size_feet: i64,
    },
    Cone {
        origin: GridPoint,
        direction: GridPoint,
        length_feet: i64,
    },
    Line {
        origin: GridPoint,
        direction: GridPoint,
        length_feet: i64,
        width_feet: i64,
    },
}

impl AoeShape {
    pub fn contains(&self, point: GridPoint) -> bool {
        match *self {
            AoeShape::Sphere { center, radius_feet } => {
                let dx = point.x - center.x;
                let dy = point.y - center.y;
                // Euclidean distance in tiles <= radius/5, squared and
                // scaled by 25 to stay integral.
                25 * (dx * dx + dy * dy) <= radius_feet * radius_feet
            }
            AoeShape::Cube { origin, size_feet } => {
                let size_tiles = feet_to_tiles(size_feet).max(1);
                point.x >= origin.x
                    && point.x < origin.x + size_tiles
                    && point.y >= origin.y
                    && point.y < origin.y + size_tiles
            }
            AoeShape::Cone { origin, direction, length_feet } => {
                let vx = point.x - origin.x;
                let vy = point.y - origin.y;
                if vx == 0 && vy == 0 {
                    return true;
                }
                let dx = direction.x;
                let dy = direction.y;
                if dx == 0 && dy == 0 {
                    return false;
                }
                let dot = vx * dx + vy * dy;
                if dot < 0 {
                    return false;
                }
                let v_sq = vx * vx + vy * vy;
                let d_sq = dx * dx + dy * dy;
                if 25 * v_sq > length_feet * length_feet {
                    return false;
                }
                // Half-angle pi/6: cos^2(30 deg) = 3/4, compared squared.
                4 * dot * dot >= 3 * v_sq * d_sq
            }
            AoeShape::Line { origin, direction, length_feet, width_feet } => {
                let vx = point.x - origin.x;
                let vy = point.y - origin.y;
                let dx = direction.x;
                let dy = direction.y;
                if dx == 0 && dy == 0 {
                    return false;
                }
                let dot = vx * dx + vy * dy;
                let d_sq = dx * dx + dy * dy;
                if dot < 0 {
                    return false;
                }
                // Projection along the axis within [0, length] tiles.
                let length_tiles_sq = {
                    let t = length_feet;
                    t * t
                };
                if 25 * dot * dot > length_tiles_sq * d_sq {
                    return false;
                }
                // Perpendicular distance <= width/2 feet.
                let cross = vx * dy - vy * dx;
                100 * cross * cross <= width_feet * width_feet * d_sq
            }
        }
    }
}

/// Participants whose positions fall inside `shape`. `include_self` keeps or
/// drops `self_id` from the result; ids come back in sorted order.
pub fn members_in_shape(
    shape: &AoeShape,
    positions: &BTreeMap<String, GridPoint>,
    self_id: &str,
    include_self: bool,
) -> Vec<String> {
    positions
        .iter()
        .filter(|(id, point)| {
            if !include_self && id.as_str() == self_id {
                return false;
            }
            shape.contains(**point)
        })
        .map(|(id, _)| id.clone())
        .collect()
}

/// Validate a direction vector for cone/line shapes.
pub fn validate_direction(direction: GridPoint) -> Result<(), KernelError> {
    if direction.x == 0 && direction.y == 0 {
        return Err(KernelError::spatial("direction vector must be nonzero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(points: &[(i64, i64)]) -> BTreeSet<GridPoint> {
        points.iter().map(|&(x, y)| GridPoint::new(x, y)).collect()
    }

    #[test]
    fn path_to_self_is_length_one() {
        let path = find_path(GridPoint::new(3, 3), GridPoint::new(3, 3), &set(&[]), &set(&[]))
            .expect("trivial path");
        assert_eq!(path, vec![GridPoint::new(3, 3)]);
    }

    #[test]
    fn straight_run_costs_five_per_tile() {
        let path = find_path(GridPoint::new(0, 0), GridPoint::new(7, 0), &set(&[]), &set(&[]))
            .expect("open run");
        assert_eq!(path.len(), 8);
        assert_eq!(path_cost_feet(&path, &set(&[])), 35);
    }

    #[test]
    fn diagonal_counts_single_step() {
        let path = find_path(GridPoint::new(0, 0), GridPoint::new(3, 3), &set(&[]), &set(&[]))
            .expect("diagonal run");
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn walls_force_detour_or_block() {
        let wall = set(&[(1, -1), (1, 0), (1, 1)]);
        let path = find_path(GridPoint::new(0, 0), GridPoint::new(2, 0), &wall, &set(&[]))
            .expect("detour exists");
        assert!(path.len() > 3);

        // Sealed box: no path at all.
        let box_walls = set(&[(1, 0), (0, 1), (1, 1), (-1, 0), (0, -1), (-1, -1), (1, -1), (-1, 1)]);
        assert!(find_path(GridPoint::new(0, 0), GridPoint::new(5, 5), &box_walls, &set(&[])).is_none());
    }

    #[test]
    fn corner_cutting_blocked_when_both_sides_walled() {
        let corners = set(&[(1, 0), (0, 1)]);
        let path = find_path(GridPoint::new(0, 0), GridPoint::new(1, 1), &corners, &set(&[]))
            .expect("detour around the pinch");
        // The direct diagonal is illegal when both flanks are walls, so the
        // path must route around.
        assert!(path.len() > 2);
        assert!(!path.windows(2).any(|w| w == [GridPoint::new(0, 0), GridPoint::new(1, 1)]));
    }

    #[test]
    fn difficult_terrain_doubles_cost() {
        let difficult = set(&[(1, 0), (2, 0)]);
        let path = vec![GridPoint::new(0, 0), GridPoint::new(1, 0), GridPoint::new(2, 0), GridPoint::new(3, 0)];
        assert_eq!(path_cost_feet(&path, &difficult), 25);
    }

    #[test]
    fn line_of_sight_blocked_by_interior_only() {
        let obstacles = set(&[(2, 0)]);
        assert!(!line_of_sight(GridPoint::new(0, 0), GridPoint::new(4, 0), &obstacles));
        // Obstacles on the endpoints never block.
        let endpoint = set(&[(0, 0), (4, 0)]);
        assert!(line_of_sight(GridPoint::new(0, 0), GridPoint::new(4, 0), &endpoint));
    }

    #[test]
    fn sphere_membership_is_euclidean() {
        let shape = AoeShape::Sphere { center: GridPoint::new(0, 0), radius_feet: 15 };
        assert!(shape.contains(GridPoint::new(3, 0)));
        assert!(shape.contains(GridPoint::new(2, 2)));
        assert!(!shape.contains(GridPoint::new(3, 1)));
    }

    #[test]
    fn cone_covers_sixty_degrees() {
        let shape = AoeShape::Cone {
            origin: GridPoint::new(0, 0),
            direction: GridPoint::new(1, 0),
            length_feet: 30,
        };
        assert!(shape.contains(GridPoint::new(4, 0)));
        assert!(shape.contains(GridPoint::new(4, 2)));
        assert!(!shape.contains(GridPoint::new(4, 4)));
        assert!(!shape.contains(GridPoint::new(-2, 0)));
        assert!(!shape.contains(GridPoint::new(7, 0)));
    }

    #[test]
    fn line_width_five_is_a_single_file() {
        let shape = AoeShape::Line {
            origin: GridPoint::new(0, 0),
            direction: GridPoint::new(1, 0),
            length_feet: 30,
            width_feet: 5,
        };
        assert!(shape.contains(GridPoint::new(5, 0)));
        assert!(!shape.contains(GridPoint::new(5, 1)));
        assert!(!shape.contains(GridPoint::new(7, 0)));
    }

    #[test]
    fn members_respect_self_flag() {
        let mut positions = BTreeMap::new();
        positions.insert("caster".to_string(), GridPoint::new(0, 0));
        positions.insert("ally".to_string(), GridPoint::new(1, 0));
        let shape = AoeShape::Sphere { center: GridPoint::new(0, 0), radius_feet: 10 };

        let with_self = members_in_shape(&shape, &positions, "caster", true);
        assert_eq!(with_self, vec!["ally".to_string(), "caster".to_string()]);
        let without = members_in_shape(&shape, &positions, "caster", false);
        assert_eq!(without, vec!["ally".to_string()]);
    }
}
