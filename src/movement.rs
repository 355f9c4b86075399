use crate::level::LevelData;
use crate::types::Vec3;

/// Validates a candidate position against tile walkability and closed-door
/// occupancy. On failure the move degrades to axis sliding: the X component
/// is tried first, then the Y component, and if both fail the current
/// position is kept. Rejection is silent; callers just commit the result.
pub fn validate_position(
    level: &LevelData,
    closed_door_cells: &[(i32, i32)],
    current: Vec3,
    candidate: Vec3,
    radius: f32,
) -> Vec3 {
    if position_clear(level, closed_door_cells, candidate.x, candidate.y, radius) {
        return with_elevation(level, candidate.x, candidate.y, candidate.z);
    }
    if position_clear(level, closed_door_cells, candidate.x, current.y, radius) {
        return with_elevation(level, candidate.x, current.y, current.z);
    }
    if position_clear(level, closed_door_cells, current.x, candidate.y, radius) {
        return with_elevation(level, current.x, candidate.y, current.z);
    }
    current
}

/// All four corners of the collision box must land on walkable tiles and
/// must not overlap a closed door footprint.
pub fn position_clear(
    level: &LevelData,
    closed_door_cells: &[(i32, i32)],
    x: f32,
    y: f32,
    radius: f32,
) -> bool {
    let corners = [
        (x - radius, y - radius),
        (x + radius, y - radius),
        (x - radius, y + radius),
        (x + radius, y + radius),
    ];
    for (cx, cy) in corners {
        let ix = cx.floor() as i32;
        let iy = cy.floor() as i32;
        if !level.is_walkable(ix, iy) {
            return false;
        }
        if closed_door_cells.contains(&(ix, iy)) {
            return false;
        }
    }
    true
}

fn with_elevation(level: &LevelData, x: f32, y: f32, _z: f32) -> Vec3 {
    Vec3::new(x, y, level.elevation_at(x, y))
}
