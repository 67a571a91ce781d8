use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom, thread_rng};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;

use super::{constants, functional};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Diamond,
    Heart,
    Spade,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Self::Club, Self::Diamond, Self::Heart, Self::Spade];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "c",
            Self::Diamond => "d",
            Self::Heart => "h",
            Self::Spade => "s",
        };
        write!(f, "{repr}")
    }
}

/// Card strength. Deuces are 2 and aces are always 14; the wheel
/// straight is special-cased by the evaluator instead of doubling aces.
pub type Value = u8;

pub const ACE: Value = 14;

/// A card is a tuple of a value (2u8 ... 14u8) and a suit. Cards order
/// by value first and suit second.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

fn value_repr(value: Value) -> String {
    match value {
        10 => "T".to_string(),
        11 => "J".to_string(),
        12 => "Q".to_string(),
        13 => "K".to_string(),
        14 => "A".to_string(),
        v => v.to_string(),
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", value_repr(self.0), self.1)
    }
}

#[derive(Debug, Eq, Error, PartialEq)]
pub enum ParseCardError {
    #[error("unknown card value in {0:?}")]
    Value(String),
    #[error("unknown card suit in {0:?}")]
    Suit(String),
}

impl FromStr for Card {
    type Err = ParseCardError;

    /// Parse short codes such as `"As"`, `"Td"`, `"10h"` or `"2c"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(suit_char) = s.chars().last() else {
            return Err(ParseCardError::Value(s.to_string()));
        };
        let suit = match suit_char.to_ascii_lowercase() {
            'c' => Suit::Club,
            'd' => Suit::Diamond,
            'h' => Suit::Heart,
            's' => Suit::Spade,
            _ => return Err(ParseCardError::Suit(s.to_string())),
        };
        let value = match s[..s.len() - suit_char.len_utf8()].to_ascii_uppercase().as_str() {
            "T" | "10" => 10,
            "J" => 11,
            "Q" => 12,
            "K" => 13,
            "A" => ACE,
            digit => match digit.parse::<Value>() {
                Ok(v) if (2..=9).contains(&v) => v,
                _ => return Err(ParseCardError::Value(s.to_string())),
            },
        };
        Ok(Card(value, suit))
    }
}

/// Hand categories in increasing strength.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::OnePair => "one pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "straight flush",
            Self::RoyalFlush => "royal flush",
        };
        write!(f, "{repr}")
    }
}

/// An evaluated hand. Field order matters: the derived ordering compares
/// the category first and then the key values element-wise, with the
/// longer list winning when one is a prefix of the other.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandEval {
    pub rank: HandRank,
    /// Tie-break values, most significant first (e.g., the pair value and
    /// then the kickers from high to low).
    pub values: Vec<Value>,
}

impl fmt::Display for HandEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rank)?;
        if let Some(top) = self.values.first() {
            write!(f, ", {} high", value_repr(*top))?;
        }
        Ok(())
    }
}

/// Reorders a deck in place. Implementations must only permute the cards
/// they're given.
pub trait ShuffleStrategy: fmt::Debug + Send + Sync {
    fn shuffle(&self, cards: &mut [Card]);
}

/// Uniform shuffle from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomShuffle;

impl ShuffleStrategy for RandomShuffle {
    fn shuffle(&self, cards: &mut [Card]) {
        cards.shuffle(&mut thread_rng());
    }
}

/// Reproducible shuffles. Each call advances an internal counter so
/// consecutive hands still get different decks.
#[derive(Debug)]
pub struct SeededShuffle {
    seed: u64,
    calls: AtomicU64,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }
}

impl ShuffleStrategy for SeededShuffle {
    fn shuffle(&self, cards: &mut [Card]) {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(call));
        cards.shuffle(&mut rng);
    }
}

/// Moves the listed cards to the top of the deck (in the listed order)
/// and leaves everything else in its original order. Mostly useful for
/// rigging hands in tests.
#[derive(Debug, Default)]
pub struct Stacked(pub Vec<Card>);

impl ShuffleStrategy for Stacked {
    fn shuffle(&self, cards: &mut [Card]) {
        let mut seen = HashSet::with_capacity(self.0.len());
        let top: Vec<Card> = self
            .0
            .iter()
            .filter(|card| cards.contains(card) && seen.insert(**card))
            .copied()
            .collect();
        let rest: Vec<Card> = cards
            .iter()
            .filter(|card| !seen.contains(*card))
            .copied()
            .collect();
        for (slot, card) in cards.iter_mut().zip(top.into_iter().chain(rest)) {
            *slot = card;
        }
    }
}

/// A single hand's deck. Cards are dealt from the front.
#[derive(Debug)]
pub struct Deck {
    cards: VecDeque<Card>,
}

impl Deck {
    /// Create an unshuffled deck without the given cards.
    pub fn new(exclude: &[Card]) -> Self {
        let cards = functional::new_deck()
            .into_iter()
            .filter(|card| !exclude.contains(card))
            .collect();
        Self { cards }
    }

    /// Deal up to `n` cards. Returns fewer when the deck runs short.
    pub fn deal(&mut self, n: usize) -> Vec<Card> {
        let n = n.min(self.cards.len());
        self.cards.drain(..n).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn shuffle(&mut self, strategy: &dyn ShuffleStrategy) {
        strategy.shuffle(self.cards.make_contiguous());
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Type alias for chip amounts. Chips are whole minor units so bets,
/// stacks and pot splits stay exact.
pub type Chips = u32;

/// Type alias for seat positions at a table.
pub type SeatIndex = usize;

// A new player can post the big blind 500 times at the default stakes.
pub const DEFAULT_STARTING_STACK: Chips = 1000;
// Every chip at a full table has to fit in one pot.
pub const MAX_STARTING_STACK: Chips = Chips::MAX / constants::MAX_SEATS as Chips;
pub const DEFAULT_SMALL_BLIND: Chips = 1;
pub const DEFAULT_BIG_BLIND: Chips = 2;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
}

impl Default for Blinds {
    fn default() -> Self {
        Self {
            small: DEFAULT_SMALL_BLIND,
            big: DEFAULT_BIG_BLIND,
        }
    }
}

impl fmt::Display for Blinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}/{}", self.small, self.big)
    }
}

/// A betting decision from the player whose turn it is. Bet and raise
/// amounts are the chips added to the pot by this action.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Action {
    AllIn,
    Bet(Chips),
    Call,
    Check,
    Fold,
    Raise(Chips),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AllIn => write!(f, "goes all-in"),
            Self::Bet(amount) => write!(f, "bets ${amount}"),
            Self::Call => write!(f, "calls"),
            Self::Check => write!(f, "checks"),
            Self::Fold => write!(f, "folds"),
            Self::Raise(amount) => write!(f, "raises ${amount}"),
        }
    }
}

/// Make a display name fit for logs and views.
#[must_use]
pub fn preprocess_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_whitespace() { '_' } else { c })
        .take(constants::MAX_USER_INPUT_LENGTH / 2)
        .collect()
}

/// The occupant of a seat.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Player {
    /// Opaque identity handed to us by whoever authenticated the
    /// connection. Stable for as long as the player is seated.
    pub id: String,
    pub name: String,
    pub stack: Chips,
    pub cards: Vec<Card>,
    pub folded: bool,
    pub all_in: bool,
    /// Chips put in during the current street. Reset every street.
    pub street_bet: Chips,
    /// Chips put in during the whole hand. Only reset when a new
    /// hand starts, so summing these over all seats gives the pot.
    pub hand_total: Chips,
}

impl Player {
    pub fn new(id: &str, name: &str, stack: Chips) -> Self {
        Self {
            id: id.to_string(),
            name: preprocess_name(name),
            stack,
            cards: Vec::with_capacity(constants::HOLE_CARDS),
            folded: false,
            all_in: false,
            street_bet: 0,
            hand_total: 0,
        }
    }

    /// Whether the player can still be asked to act this hand.
    #[must_use]
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    /// Move up to `amount` chips from the stack into this street's bet,
    /// returning how much actually moved. Emptying the stack puts the
    /// player all-in.
    pub fn commit(&mut self, amount: Chips) -> Chips {
        let amount = amount.min(self.stack);
        self.stack -= amount;
        self.street_bet += amount;
        self.hand_total += amount;
        if self.stack == 0 {
            self.all_in = true;
        }
        amount
    }

    pub fn reset(&mut self) {
        self.cards.clear();
        self.folded = false;
        self.all_in = false;
        self.street_bet = 0;
        self.hand_total = 0;
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (${})", self.name, self.stack)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Seat {
    #[default]
    Empty,
    Occupied(Player),
}

impl Seat {
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied(_))
    }

    #[must_use]
    pub fn player(&self) -> Option<&Player> {
        match self {
            Self::Occupied(player) => Some(player),
            Self::Empty => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        match self {
            Self::Occupied(player) => Some(player),
            Self::Empty => None,
        }
    }

    /// Vacate the seat, handing back whoever was sitting in it.
    pub fn take(&mut self) -> Option<Player> {
        match std::mem::take(self) {
            Self::Occupied(player) => Some(player),
            Self::Empty => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Phase {
    #[default]
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Phase {
    /// Whether players are betting, i.e., a hand is live.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "WAITING",
            Self::Preflop => "PREFLOP",
            Self::Flop => "FLOP",
            Self::Turn => "TURN",
            Self::River => "RIVER",
            Self::Showdown => "SHOWDOWN",
        };
        write!(f, "{repr}")
    }
}

/// Who was dealt into the current hand. Captured once when the hand
/// starts and shared until it ends; late joiners never show up here.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Participants {
    /// Seat indices in dealing order (starting left of the previous dealer).
    pub seats: Vec<SeatIndex>,
    pub ids: BTreeSet<String>,
}

impl Participants {
    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn contains_seat(&self, seat_idx: SeatIndex) -> bool {
        self.seats.contains(&seat_idx)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

/// Blind and button positions for the current (or last) hand.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Positions {
    pub dealer: SeatIndex,
    pub small_blind: SeatIndex,
    pub big_blind: SeatIndex,
}

#[derive(Clone, Debug, Default)]
pub struct HandState {
    pub phase: Phase,
    /// Community cards shared amongst all players.
    pub board: Vec<Card>,
    pub pot: Chips,
    /// Highest total any seat has put in this street.
    pub current_bet: Chips,
    /// Whether anyone still able to bet has acted this street.
    pub street_opened: bool,
    pub acting_seat: Option<SeatIndex>,
    /// Seat that opened the action this street. Coming back around to it
    /// with every bet matched ends the betting round.
    pub first_acting_seat: Option<SeatIndex>,
    pub min_raise: Chips,
    pub participants: Arc<Participants>,
}

impl HandState {
    /// Clear everything but the phase and participants between streets.
    pub fn clear_street(&mut self) {
        self.current_bet = 0;
        self.street_opened = false;
    }
}

/// Identifies a single pending decision. If a table reports the same
/// marker for too long, the player it names has stalled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TurnMarker {
    pub hand: u64,
    pub action: u64,
    pub seat: SeatIndex,
}

/// A still-live participant going into showdown.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParticipantHand {
    pub seat: SeatIndex,
    pub id: String,
    pub cards: Vec<Card>,
}

/// A participant's evaluated showdown hand. A rank of 1 means they won
/// (or chopped) the pot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatHandResult {
    pub seat: SeatIndex,
    pub id: String,
    pub cards: Vec<Card>,
    pub eval: HandEval,
    pub rank: usize,
}

impl fmt::Display for SeatHandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} with ", self.rank, self.id)?;
        for card in &self.cards {
            write!(f, "{card} ")?;
        }
        write!(f, "({})", self.eval)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub stack: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub street_bet: Chips,
    /// Empty unless the viewer is this player or the hand is at showdown.
    pub cards: Vec<Card>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatView {
    pub seat: SeatIndex,
    pub player: Option<PlayerView>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandView {
    pub phase: Phase,
    pub board: Vec<Card>,
    pub pot: Chips,
    pub current_bet: Chips,
    pub acting_seat: Option<SeatIndex>,
    pub min_raise: Chips,
    pub positions: Positions,
    pub in_hand_seats: Vec<SeatIndex>,
    pub in_hand_ids: BTreeSet<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableSnapshot {
    pub table_id: String,
    pub blinds: Blinds,
    pub seats: Vec<SeatView>,
    pub hand: HandView,
    /// Hands revealed at the last showdown, best first.
    pub last_showdown: Vec<SeatHandResult>,
}

impl fmt::Display for TableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} pot ${}",
            self.table_id, self.blinds, self.hand.phase, self.hand.pot
        )?;
        if !self.hand.board.is_empty() {
            write!(f, " board")?;
            for card in &self.hand.board {
                write!(f, " {card}")?;
            }
        }
        for view in &self.seats {
            if let Some(player) = &view.player {
                write!(f, "\n  [{}] {} ${}", view.seat, player.name, player.stack)?;
                if player.folded {
                    write!(f, " folded")?;
                } else if player.all_in {
                    write!(f, " all-in")?;
                }
                if self.hand.acting_seat == Some(view.seat) {
                    write!(f, " <- to act")?;
                }
            }
        }
        Ok(())
    }
}
