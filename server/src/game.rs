//! Authoritative 2048 rules: slide, merge, spawn, and the resulting status

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Command, Direction, Field, GameStatus, Tile, FIELD_SIZE, POWER_DEFAULT};

/// Probability that a spawned tile is a 4 (exponent 2) rather than a 2.
pub const DEFAULT_DOUBLE_TILE_CHANCE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPolicy {
    double_chance: f64,
}

impl SpawnPolicy {
    /// Returns `None` unless `double_chance` is a probability.
    pub fn new(double_chance: f64) -> Option<Self> {
        (0.0..=1.0)
            .contains(&double_chance)
            .then_some(Self { double_chance })
    }

    pub fn double_chance(&self) -> f64 {
        self.double_chance
    }
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            double_chance: DEFAULT_DOUBLE_TILE_CHANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rules {
    /// Exponent that wins the game (11 means 2048).
    pub win_power: u8,
    pub spawn: SpawnPolicy,
}

impl Rules {
    pub fn new(win_power: u8, spawn: SpawnPolicy) -> Self {
        Self { win_power, spawn }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::new(POWER_DEFAULT, SpawnPolicy::default())
    }
}

/// Empty field with one random starting tile.
pub fn new_field<R: Rng + ?Sized>(spawn: &SpawnPolicy, rng: &mut R) -> Field {
    let mut field = Field::new();
    spawn_tile(&mut field, spawn, rng);
    field
}

/// Computes the field and status that follow `command`.
///
/// Delete and disconnect leave the field untouched. A directional move that
/// changes nothing answers `NoMove` with the original field. Otherwise a win
/// is checked before a new tile is spawned.
pub fn resolve<R: Rng + ?Sized>(
    field: &Field,
    command: Command,
    rules: &Rules,
    rng: &mut R,
) -> (Field, GameStatus) {
    let direction = match command {
        Command::Left => Direction::Left,
        Command::Right => Direction::Right,
        Command::Up => Direction::Up,
        Command::Down => Direction::Down,
        Command::Delete => return (*field, GameStatus::Deleted),
        Command::Disconnect => return (*field, GameStatus::Halted),
        Command::Unset => return (*field, GameStatus::NoMove),
    };

    let mut next = *field;
    let moved = slide(&mut next, direction);
    next.clear_merges();

    if next.contains_value(rules.win_power) {
        return (next, GameStatus::Won);
    }
    if !moved {
        return (*field, GameStatus::NoMove);
    }

    let status = spawn_or_lose(&mut next, &rules.spawn, rng);
    (next, status)
}

/// Places a new tile, or reports `Lost` when no cell is free or the field
/// is left without any possible move.
pub fn spawn_or_lose<R: Rng + ?Sized>(
    field: &mut Field,
    spawn: &SpawnPolicy,
    rng: &mut R,
) -> GameStatus {
    if !spawn_tile(field, spawn, rng) {
        return GameStatus::Lost;
    }
    if has_moves(field) {
        GameStatus::On
    } else {
        GameStatus::Lost
    }
}

/// Puts a 2 or a 4 on a uniformly chosen empty cell. False if there is none.
pub fn spawn_tile<R: Rng + ?Sized>(field: &mut Field, spawn: &SpawnPolicy, rng: &mut R) -> bool {
    let empty = field.empty_cells();
    let Some(&(row, col)) = empty.choose(rng) else {
        return false;
    };
    let value = if rng.gen_bool(spawn.double_chance) {
        2
    } else {
        1
    };
    *field.get_mut(row, col) = Tile::new(value);
    true
}

/// True if some cell is empty or two neighbours hold the same value.
pub fn has_moves(field: &Field) -> bool {
    for row in 0..FIELD_SIZE {
        for col in 0..FIELD_SIZE {
            let tile = field.get(row, col);
            if tile.is_empty() {
                return true;
            }
            for direction in [Direction::Right, Direction::Down] {
                if let Some((r, c)) = neighbor((row, col), direction) {
                    if field.get(r, c).value == tile.value {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Slides and merges every lane towards the edge `direction` points at.
/// Merge flags are left set so callers can inspect them. Returns whether
/// any tile moved or merged.
pub fn slide(field: &mut Field, direction: Direction) -> bool {
    let mut moved = false;
    for lane in 0..FIELD_SIZE {
        // Cells nearest the target edge go first; none is visited twice.
        for cell in lane_from_edge(direction, lane) {
            moved |= shift_tile(field, cell, direction);
        }
    }
    moved
}

/// Moves one tile as far as it goes, merging into an equal blocker that
/// has not merged yet this turn.
fn shift_tile(field: &mut Field, start: (usize, usize), direction: Direction) -> bool {
    let tile = field.get(start.0, start.1);
    if tile.is_empty() {
        return false;
    }

    let mut target = start;
    while let Some(next) = neighbor(target, direction) {
        if !field.get(next.0, next.1).is_empty() {
            break;
        }
        target = next;
    }

    let mut moved = false;
    if target != start {
        *field.get_mut(target.0, target.1) = tile;
        *field.get_mut(start.0, start.1) = Tile::EMPTY;
        moved = true;
    }

    if let Some(blocker_cell) = neighbor(target, direction) {
        let blocker = field.get(blocker_cell.0, blocker_cell.1);
        if blocker.value == tile.value && !blocker.merged_this_turn && !tile.merged_this_turn {
            debug!("Merge {:?} into {:?}", target, blocker_cell);
            *field.get_mut(target.0, target.1) = Tile::EMPTY;
            let merged = field.get_mut(blocker_cell.0, blocker_cell.1);
            merged.value += 1;
            merged.merged_this_turn = true;
            moved = true;
        }
    }

    moved
}

/// The cell one step from `cell` in `direction`, if it is on the field.
fn neighbor(cell: (usize, usize), direction: Direction) -> Option<(usize, usize)> {
    let (dr, dc) = direction.vector();
    let row = cell.0.checked_add_signed(dr)?;
    let col = cell.1.checked_add_signed(dc)?;
    (row < FIELD_SIZE && col < FIELD_SIZE).then_some((row, col))
}

/// Cells of one row (horizontal moves) or column (vertical moves), ordered
/// from the target edge inwards.
fn lane_from_edge(direction: Direction, lane: usize) -> [(usize, usize); FIELD_SIZE] {
    let last = FIELD_SIZE - 1;
    let mut cells = [(0, 0); FIELD_SIZE];
    for (step, cell) in cells.iter_mut().enumerate() {
        *cell = match direction {
            Direction::Left => (lane, step),
            Direction::Right => (lane, last - step),
            Direction::Up => (step, lane),
            Direction::Down => (last - step, lane),
        };
    }
    cells
}
