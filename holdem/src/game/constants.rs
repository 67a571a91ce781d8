// Seat counts stay small so seat lookups can be linear scans.
pub const DEFAULT_MAX_SEATS: usize = 9;
pub const MAX_SEATS: usize = 10;
// Heads-up is the smallest game we deal.
pub const DEFAULT_MIN_PLAYERS: usize = 2;
pub const HOLE_CARDS: usize = 2;
pub const BOARD_CARDS: usize = 5;
pub const MAX_USER_INPUT_LENGTH: usize = 64;
