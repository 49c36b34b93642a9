//! Types and inter-process plumbing shared by the 2048 server, its game
//! workers and the clients.
//!
//! Game state never travels over a socket. It lives in POSIX shared-memory
//! segments whose layout is defined here, and every hand-off between
//! processes is a P/V pair on a named counting semaphore. The [`ipc`] module
//! wraps the kernel objects, [`session`] defines the segment layouts and the
//! two protocol endpoints ([`session::LobbyHandle`], [`session::GameHandle`]).

pub mod ipc;
pub mod session;
pub mod signals;

pub use ipc::{IpcError, Namespace};

/// Width and height of the square playing field.
pub const FIELD_SIZE: usize = 4;

pub const POWER_DEFAULT: u8 = 11;
pub const POWER_MIN: u8 = 2;
pub const POWER_MAX: u8 = 13;

/// Game identifiers are 1..=65535; zero means "new game" in a request and
/// "no game" in a lobby response.
pub type GameId = u16;
pub const NEW_GAME: GameId = 0;

/// One cell of the field. `value` is an exponent: `v > 0` shows as `2^v`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    pub value: u8,
    pub merged_this_turn: bool,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        value: 0,
        merged_this_turn: false,
    };

    pub fn new(value: u8) -> Self {
        Self {
            value,
            merged_this_turn: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    /// The number shown to the player, or `None` for an empty cell.
    pub fn display_value(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            1u32.checked_shl(u32::from(self.value))
        }
    }
}

/// Row-major 4x4 grid addressed by `(row, col)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Field {
    pub tiles: [[Tile; FIELD_SIZE]; FIELD_SIZE],
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a field from exponents, with every merge flag cleared.
    pub fn from_values(values: [[u8; FIELD_SIZE]; FIELD_SIZE]) -> Self {
        let mut field = Self::new();
        for (row, line) in values.iter().enumerate() {
            for (col, value) in line.iter().enumerate() {
                field.tiles[row][col] = Tile::new(*value);
            }
        }
        field
    }

    pub fn values(&self) -> [[u8; FIELD_SIZE]; FIELD_SIZE] {
        let mut values = [[0; FIELD_SIZE]; FIELD_SIZE];
        for (row, line) in self.tiles.iter().enumerate() {
            for (col, tile) in line.iter().enumerate() {
                values[row][col] = tile.value;
            }
        }
        values
    }

    pub fn get(&self, row: usize, col: usize) -> Tile {
        self.tiles[row][col]
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut Tile {
        &mut self.tiles[row][col]
    }

    pub fn empty_cells(&self) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for row in 0..FIELD_SIZE {
            for col in 0..FIELD_SIZE {
                if self.tiles[row][col].is_empty() {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    pub fn contains_value(&self, value: u8) -> bool {
        self.tiles.iter().flatten().any(|tile| tile.value == value)
    }

    pub fn clear_merges(&mut self) {
        for tile in self.tiles.iter_mut().flatten() {
            tile.merged_this_turn = false;
        }
    }
}

/// Status written by a worker after each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    On,
    Won,
    Lost,
    Deleted,
    Halted,
    NoMove,
}

impl GameStatus {
    pub fn code(self) -> u32 {
        match self {
            GameStatus::Won => 0,
            GameStatus::Lost => 1,
            GameStatus::NoMove => 2,
            GameStatus::On => 3,
            GameStatus::Deleted => 4,
            GameStatus::Halted => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(GameStatus::Won),
            1 => Some(GameStatus::Lost),
            2 => Some(GameStatus::NoMove),
            3 => Some(GameStatus::On),
            4 => Some(GameStatus::Deleted),
            5 => Some(GameStatus::Halted),
            _ => None,
        }
    }

    /// Won, lost and deleted games release their segment and semaphores.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::Won | GameStatus::Lost | GameStatus::Deleted
        )
    }
}

/// Direction of travel for a sliding move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// `(row, col)` step of one cell in the direction of travel.
    pub fn vector(self) -> (isize, isize) {
        match self {
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
        }
    }
}

/// Command posted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Left,
    Right,
    Up,
    Down,
    Delete,
    Disconnect,
    Unset,
}

impl Command {
    pub const DIRECTIONS: [Command; 4] = [
        Command::Left,
        Command::Right,
        Command::Up,
        Command::Down,
    ];

    pub fn code(self) -> u32 {
        match self {
            Command::Left => 0,
            Command::Right => 1,
            Command::Up => 2,
            Command::Down => 3,
            Command::Delete => 4,
            Command::Disconnect => 5,
            Command::Unset => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Command::Left),
            1 => Some(Command::Right),
            2 => Some(Command::Up),
            3 => Some(Command::Down),
            4 => Some(Command::Delete),
            5 => Some(Command::Disconnect),
            6 => Some(Command::Unset),
            _ => None,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Command::Left => Some(Direction::Left),
            Command::Right => Some(Direction::Right),
            Command::Up => Some(Direction::Up),
            Command::Down => Some(Direction::Down),
            _ => None,
        }
    }
}
