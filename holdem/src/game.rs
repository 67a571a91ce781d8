use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error;

pub mod constants;
pub mod entities;
pub mod functional;

use constants::{DEFAULT_MAX_SEATS, DEFAULT_MIN_PLAYERS, HOLE_CARDS, MAX_SEATS};
use entities::{
    Action, Blinds, Chips, DEFAULT_STARTING_STACK, Deck, MAX_STARTING_STACK, HandState, HandView, ParticipantHand,
    Participants, Phase, Player, PlayerView, Positions, Seat, SeatHandResult,
    SeatIndex, SeatView, ShuffleStrategy, TableSnapshot, TurnMarker,
};

/// Expected failures caused by whoever sent an action. These never
/// change table state.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum UserError {
    #[error("all-in amount must be positive; no stack to go all-in")]
    NoStack,
    #[error("bet must be at least ${min_raise}")]
    BetTooSmall { min_raise: Chips },
    #[error("cannot check: must call or raise")]
    CannotCheck,
    #[error("hand already in progress")]
    HandInProgress,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("invalid seat index {seat}")]
    InvalidSeat { seat: SeatIndex },
    #[error("table id is required")]
    MissingTableId,
    #[error("no one is due to act")]
    NoActingSeat,
    #[error("not a betting action")]
    NotBetting,
    #[error("no empty seat")]
    NoEmptySeat,
    #[error("not at this table")]
    NotAtTable,
    #[error("need {required}+ players (current {seated})")]
    NotEnoughPlayers { required: usize, seated: usize },
    #[error("not participating this hand, wait for the next one")]
    NotParticipating,
    #[error("not your turn")]
    NotYourTurn,
    #[error("nothing to call")]
    NothingToCall,
    #[error("raise must at least call ${to_call}")]
    RaiseBelowCall { to_call: Chips },
    #[error("raise must be at least ${min} more")]
    RaiseTooSmall { min: Chips },
    #[error("cannot change seats while playing a hand")]
    SeatChangeDuringHand,
    #[error("seat index is required")]
    SeatRequired,
    #[error("seat {seat} is occupied")]
    SeatOccupied { seat: SeatIndex },
    #[error("only the server can time out a turn")]
    SystemOnly,
    #[error("table not found")]
    TableNotFound,
}

/// Broken invariants. Seeing one of these means there's a bug in the
/// engine (or a lock was poisoned by a panicking thread).
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("table {table_id} has no deck during an active hand")]
    MissingDeck { table_id: String },
    #[error("seat {seat} at table {table_id} is unexpectedly empty")]
    EmptySeat { table_id: String, seat: SeatIndex },
    #[error("lock for {0} is poisoned")]
    Poisoned(String),
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableSettings {
    pub max_seats: usize,
    pub min_players: usize,
    pub starting_stack: Chips,
    pub blinds: Blinds,
}

impl TableSettings {
    pub fn new(max_seats: usize, starting_stack: Chips, blinds: Blinds) -> Self {
        Self {
            max_seats,
            min_players: DEFAULT_MIN_PLAYERS,
            starting_stack,
            blinds,
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            max_seats: DEFAULT_MAX_SEATS,
            min_players: DEFAULT_MIN_PLAYERS,
            starting_stack: DEFAULT_STARTING_STACK,
            blinds: Blinds::default(),
        }
    }
}

/// How a join request was satisfied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Joined {
    Seated(SeatIndex),
    AlreadySeated(SeatIndex),
}

/// How a leave request was satisfied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Departure {
    NotSeated,
    Left { seat: SeatIndex, name: String },
    /// The player was in the hand, so they've folded and will be
    /// removed once it's over.
    AfterHand { seat: SeatIndex, name: String },
}

fn display_name(name: Option<&str>, seat_idx: SeatIndex) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => format!("Player-{seat_idx}"),
    }
}

/// A single poker table: a fixed ring of seats and the hand being
/// played on it.
///
/// All mutation goes through `&mut self`, so whoever owns the table
/// (usually the registry, behind a mutex) serializes actions for it.
#[derive(Debug)]
pub struct Table {
    id: String,
    settings: TableSettings,
    seats: Vec<Seat>,
    hand: HandState,
    /// Only present while a hand is being played.
    deck: Option<Deck>,
    positions: Positions,
    shuffler: Arc<dyn ShuffleStrategy>,
    /// Players that asked to leave in the middle of a hand they were
    /// dealt into. We can't safely remove them mid gameplay, so we
    /// instead queue them for removal.
    to_remove: BTreeSet<String>,
    hand_count: u64,
    action_count: u64,
    last_showdown: Vec<SeatHandResult>,
}

impl Table {
    pub fn new(id: &str, mut settings: TableSettings, shuffler: Arc<dyn ShuffleStrategy>) -> Self {
        settings.max_seats = settings.max_seats.clamp(DEFAULT_MIN_PLAYERS, MAX_SEATS);
        settings.starting_stack = settings.starting_stack.min(MAX_STARTING_STACK);
        let seats = vec![Seat::Empty; settings.max_seats];
        Self {
            id: id.to_string(),
            settings,
            seats,
            hand: HandState::default(),
            deck: None,
            positions: Positions::default(),
            shuffler,
            to_remove: BTreeSet::new(),
            hand_count: 0,
            action_count: 0,
            last_showdown: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    #[must_use]
    pub fn hand(&self) -> &HandState {
        &self.hand
    }

    #[must_use]
    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    #[must_use]
    pub fn last_showdown(&self) -> &[SeatHandResult] {
        &self.last_showdown
    }

    /// Number of hands started at this table.
    #[must_use]
    pub fn hand_count(&self) -> u64 {
        self.hand_count
    }

    #[must_use]
    pub fn has_deck(&self) -> bool {
        self.deck.is_some()
    }

    #[must_use]
    pub fn player(&self, seat_idx: SeatIndex) -> Option<&Player> {
        self.seats.get(seat_idx).and_then(Seat::player)
    }

    fn player_mut(&mut self, seat_idx: SeatIndex) -> Result<&mut Player, InternalError> {
        match self.seats.get_mut(seat_idx).and_then(Seat::player_mut) {
            Some(player) => Ok(player),
            None => Err(InternalError::EmptySeat {
                table_id: self.id.clone(),
                seat: seat_idx,
            }),
        }
    }

    /// Find the seat a player is sitting in.
    #[must_use]
    pub fn seat_of(&self, id: &str) -> Option<SeatIndex> {
        self.seats
            .iter()
            .position(|seat| seat.player().is_some_and(|player| player.id == id))
    }

    #[must_use]
    pub fn num_occupied(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_occupied()).count()
    }

    /// Sum of everything put in by seated players this hand. Matches the
    /// pot for as long as the hand is running.
    #[must_use]
    pub fn contributions(&self) -> Chips {
        self.seats
            .iter()
            .filter_map(Seat::player)
            .map(|player| player.hand_total)
            .sum()
    }

    /// The pending decision, if anyone owes one.
    #[must_use]
    pub fn turn_marker(&self) -> Option<TurnMarker> {
        self.hand.acting_seat.map(|seat| TurnMarker {
            hand: self.hand_count,
            action: self.action_count,
            seat,
        })
    }

    pub fn join(
        &mut self,
        id: &str,
        name: Option<&str>,
        requested: Option<SeatIndex>,
    ) -> Result<Joined, UserError> {
        if let Some(seat_idx) = self.seat_of(id) {
            // Rejoining cancels a pending leave.
            self.to_remove.remove(id);
            return Ok(Joined::AlreadySeated(seat_idx));
        }
        let seat_idx = match requested {
            Some(seat_idx) if seat_idx < self.seats.len() => seat_idx,
            _ => self
                .seats
                .iter()
                .position(|seat| !seat.is_occupied())
                .ok_or(UserError::NoEmptySeat)?,
        };
        if self.seats[seat_idx].is_occupied() {
            return Err(UserError::NoEmptySeat);
        }
        let player = Player::new(
            id,
            &display_name(name, seat_idx),
            self.settings.starting_stack,
        );
        info!("{}: {player} sat at seat {seat_idx}", self.id);
        self.seats[seat_idx] = Seat::Occupied(player);
        Ok(Joined::Seated(seat_idx))
    }

    /// Sit at a specific seat, moving there if already seated elsewhere.
    pub fn sit(
        &mut self,
        id: &str,
        name: Option<&str>,
        seat_idx: SeatIndex,
    ) -> Result<(), UserError> {
        match self.seats.get(seat_idx) {
            None => return Err(UserError::InvalidSeat { seat: seat_idx }),
            Some(seat) if seat.is_occupied() => {
                return Err(UserError::SeatOccupied { seat: seat_idx });
            }
            Some(_) => {}
        }
        let moved = match self.seat_of(id) {
            Some(current) => {
                if self.hand.phase.in_progress() && self.hand.participants.contains_id(id) {
                    return Err(UserError::SeatChangeDuringHand);
                }
                self.seats[current].take()
            }
            None => None,
        };
        let player = moved.unwrap_or_else(|| {
            Player::new(
                id,
                &display_name(name, seat_idx),
                self.settings.starting_stack,
            )
        });
        info!("{}: {player} sat at seat {seat_idx}", self.id);
        self.seats[seat_idx] = Seat::Occupied(player);
        Ok(())
    }

    pub fn leave(&mut self, id: &str) -> Result<Departure, InternalError> {
        let Some(seat_idx) = self.seat_of(id) else {
            return Ok(Departure::NotSeated);
        };
        if self.hand.phase.in_progress() && self.hand.participants.contains_id(id) {
            let was_acting = self.hand.acting_seat == Some(seat_idx);
            let player = self.player_mut(seat_idx)?;
            player.folded = true;
            let name = player.name.clone();
            self.to_remove.insert(id.to_string());
            info!("{}: {name} folds and will leave after this hand", self.id);
            if was_acting {
                self.after_player_action(seat_idx)?;
            } else if self.num_live() <= 1 {
                self.award_uncontested()?;
            }
            // The hand may have ended (and the seat been vacated) already.
            return Ok(match self.seat_of(id) {
                Some(_) => Departure::AfterHand {
                    seat: seat_idx,
                    name,
                },
                None => Departure::Left {
                    seat: seat_idx,
                    name,
                },
            });
        }
        let name = self.seats[seat_idx]
            .take()
            .map(|player| player.name)
            .unwrap_or_default();
        info!("{}: {name} left the table", self.id);
        Ok(Departure::Left {
            seat: seat_idx,
            name,
        })
    }

    /// Shared turn check for betting actions. Returns the acting seat of
    /// the player with the given identity.
    pub fn validate_turn(&self, id: &str) -> Result<SeatIndex, UserError> {
        let seat_idx = self.seat_of(id).ok_or(UserError::NotAtTable)?;
        let participants = &self.hand.participants;
        if self.hand.phase.in_progress()
            && !participants.is_empty()
            && !participants.contains_id(id)
        {
            return Err(UserError::NotParticipating);
        }
        if self.hand.acting_seat != Some(seat_idx) {
            return Err(UserError::NotYourTurn);
        }
        Ok(seat_idx)
    }

    /// Occupied seats clockwise starting at (and including) `start`.
    fn occupied_from(&self, start: SeatIndex) -> Vec<SeatIndex> {
        let num_seats = self.seats.len();
        (0..num_seats)
            .map(|offset| (start + offset) % num_seats)
            .filter(|seat_idx| self.seats[*seat_idx].is_occupied())
            .collect()
    }

    /// The player in a seat, if they were dealt into this hand.
    fn participant(&self, seat_idx: SeatIndex) -> Option<&Player> {
        let participants = &self.hand.participants;
        if !participants.contains_seat(seat_idx) {
            return None;
        }
        self.player(seat_idx)
            .filter(|player| participants.contains_id(&player.id))
    }

    fn can_act(&self, seat_idx: SeatIndex) -> bool {
        self.participant(seat_idx).is_some_and(Player::can_act)
    }

    /// Participants that haven't folded.
    fn live_participants(&self) -> impl Iterator<Item = (SeatIndex, &Player)> + '_ {
        self.hand
            .participants
            .seats
            .iter()
            .filter_map(|seat_idx| self.participant(*seat_idx).map(|player| (*seat_idx, player)))
            .filter(|(_, player)| !player.folded)
    }

    fn num_live(&self) -> usize {
        self.live_participants().count()
    }

    fn num_can_act(&self) -> usize {
        self.live_participants()
            .filter(|(_, player)| !player.all_in)
            .count()
    }

    /// First seat at or clockwise after `start` that can still act.
    fn next_can_act_from(&self, start: SeatIndex) -> Option<SeatIndex> {
        let num_seats = self.seats.len();
        (0..num_seats)
            .map(|offset| (start + offset) % num_seats)
            .find(|seat_idx| self.can_act(*seat_idx))
    }

    /// First seat strictly after `seat_idx` that can still act, wrapping
    /// around to `seat_idx` itself last.
    fn next_can_act_after(&self, seat_idx: SeatIndex) -> Option<SeatIndex> {
        self.next_can_act_from((seat_idx + 1) % self.seats.len())
    }

    /// Every live participant that can still act has matched the bet.
    fn all_matched(&self) -> bool {
        self.live_participants()
            .filter(|(_, player)| !player.all_in)
            .all(|(_, player)| player.street_bet == self.hand.current_bet)
    }

    /// The recorded first actor of the street, or whoever's next in line
    /// after them if they've since folded or gone all-in.
    fn round_anchor(&self) -> Option<SeatIndex> {
        self.hand
            .first_acting_seat
            .and_then(|seat_idx| self.next_can_act_from(seat_idx))
    }

    /// Remove players that busted or asked to leave during the last hand.
    fn remove_departed(&mut self) {
        for seat in self.seats.iter_mut() {
            let departing = seat
                .player()
                .is_some_and(|player| player.stack == 0 || self.to_remove.contains(&player.id));
            if departing {
                if let Some(player) = seat.take() {
                    if player.stack == 0 {
                        info!("{}: {} busted", self.id, player.name);
                    } else {
                        info!("{}: {} left the table", self.id, player.name);
                    }
                }
            }
        }
        self.to_remove.clear();
    }

    fn post_blind(&mut self, seat_idx: SeatIndex, blind: Chips) -> Result<(), InternalError> {
        let player = self.player_mut(seat_idx)?;
        let posted = player.commit(blind);
        let name = player.name.clone();
        self.hand.pot += posted;
        debug!("{}: {name} posts ${posted}", self.id);
        Ok(())
    }

    /// Start a new hand: clean up the last one, move the button, deal and
    /// post blinds.
    pub fn start_hand(&mut self) -> Result<(), GameError> {
        if self.hand.phase.in_progress() {
            return Err(UserError::HandInProgress.into());
        }
        self.remove_departed();
        let required = self.settings.min_players.max(DEFAULT_MIN_PLAYERS);
        let seated = self.num_occupied();
        if seated < required {
            return Err(UserError::NotEnoughPlayers { required, seated }.into());
        }

        for seat in self.seats.iter_mut() {
            if let Some(player) = seat.player_mut() {
                player.reset();
            }
        }
        let mut deck = Deck::default();
        deck.shuffle(self.shuffler.as_ref());

        let order = self.occupied_from((self.positions.dealer + 1) % self.seats.len());
        let num_players = order.len();
        let ids = order
            .iter()
            .filter_map(|seat_idx| self.player(*seat_idx).map(|player| player.id.clone()))
            .collect();
        let big_blind_pos = if num_players == 2 { 1 } else { 2 };
        self.positions = Positions {
            dealer: order[0],
            small_blind: order[big_blind_pos - 1],
            big_blind: order[big_blind_pos],
        };
        self.hand = HandState {
            participants: Arc::new(Participants {
                seats: order.clone(),
                ids,
            }),
            ..HandState::default()
        };
        self.last_showdown.clear();
        self.hand_count += 1;

        for seat_idx in &order {
            let cards = deck.deal(HOLE_CARDS);
            self.player_mut(*seat_idx)?.cards = cards;
        }
        self.deck = Some(deck);

        let Blinds { small, big } = self.settings.blinds;
        let Positions {
            small_blind,
            big_blind,
            ..
        } = self.positions;
        self.post_blind(small_blind, small)?;
        self.post_blind(big_blind, big)?;
        self.hand.current_bet = big;
        self.hand.min_raise = big;
        self.hand.phase = Phase::Preflop;

        // Heads-up, the seat after the big blind is the dealer.
        let first = self.next_can_act_from(order[(big_blind_pos + 1) % num_players]);
        self.hand.first_acting_seat = first;
        self.hand.acting_seat = first;
        info!(
            "{}: hand #{} started with {num_players} players, dealer at seat {}",
            self.id, self.hand_count, self.positions.dealer
        );

        if self.all_matched() && self.num_can_act() < 2 {
            self.advance_street()?;
        }
        Ok(())
    }

    /// Apply a betting action for the seat whose turn it is and move the
    /// hand along. Returns the chips the action put into the pot.
    pub fn act(&mut self, seat_idx: SeatIndex, action: Action) -> Result<Chips, GameError> {
        let current_bet = self.hand.current_bet;
        let min_raise = self.hand.min_raise;
        let player = self.player_mut(seat_idx)?;
        let to_call = current_bet.saturating_sub(player.street_bet);
        let committed = match action {
            Action::Fold => {
                player.folded = true;
                0
            }
            Action::Check => {
                if to_call > 0 {
                    return Err(UserError::CannotCheck.into());
                }
                0
            }
            Action::Call => {
                if to_call == 0 {
                    return Err(UserError::NothingToCall.into());
                }
                player.commit(to_call)
            }
            Action::Bet(amount) => {
                if amount == 0 {
                    return Err(UserError::InvalidAmount.into());
                }
                let amount = amount.min(player.stack);
                if current_bet > 0 && amount < min_raise {
                    return Err(UserError::BetTooSmall { min_raise }.into());
                }
                player.commit(amount)
            }
            Action::Raise(amount) => {
                if amount == 0 {
                    return Err(UserError::InvalidAmount.into());
                }
                let amount = amount.min(player.stack);
                let min = to_call + min_raise;
                // Going all-in for less than a full raise is fine.
                if amount < min && amount < player.stack {
                    return Err(UserError::RaiseTooSmall { min }.into());
                }
                if amount < to_call {
                    return Err(UserError::RaiseBelowCall { to_call }.into());
                }
                player.commit(amount)
            }
            Action::AllIn => {
                if player.stack == 0 {
                    return Err(UserError::NoStack.into());
                }
                player.commit(player.stack)
            }
        };
        let street_bet = player.street_bet;
        let name = player.name.clone();
        info!("{}: {name} {action}", self.id);

        self.hand.pot += committed;
        self.hand.current_bet = self.hand.current_bet.max(street_bet);
        self.after_player_action(seat_idx)?;
        Ok(committed)
    }

    /// Fold whoever is due to act. Used when a turn timer runs out.
    pub fn force_fold(&mut self) -> Result<SeatIndex, GameError> {
        let seat_idx = self.hand.acting_seat.ok_or(UserError::NoActingSeat)?;
        if let Some(player) = self.player(seat_idx) {
            warn!("{}: {} ran out of time and is forced to fold", self.id, player.name);
        }
        self.act(seat_idx, Action::Fold)?;
        Ok(seat_idx)
    }

    /// Decide what happens after `seat_idx` acted: pick the next player,
    /// close the betting round, or end the hand.
    pub fn after_player_action(&mut self, seat_idx: SeatIndex) -> Result<(), InternalError> {
        self.action_count += 1;
        if self.num_live() <= 1 {
            return self.award_uncontested();
        }
        // An opener that folds or shoves before anyone else has spoken
        // hands the opening seat to the next player in line.
        let opener_out = !self.hand.street_opened
            && self.hand.first_acting_seat == Some(seat_idx)
            && !self.can_act(seat_idx);
        if self.can_act(seat_idx) {
            self.hand.street_opened = true;
        }
        match self.next_can_act_after(seat_idx) {
            Some(next) => {
                self.hand.acting_seat = Some(next);
                let closes = if opener_out {
                    self.hand.first_acting_seat = Some(next);
                    self.num_can_act() < 2
                } else {
                    Some(next) == self.round_anchor()
                };
                if closes && self.all_matched() {
                    self.advance_street()?;
                }
            }
            None => {
                // Everyone left is all-in.
                if self.all_matched() {
                    self.advance_street()?;
                }
            }
        }
        Ok(())
    }

    /// Move to the next street, dealing community cards. Streets without
    /// two players able to bet are dealt straight through to showdown.
    fn advance_street(&mut self) -> Result<(), InternalError> {
        loop {
            let (phase, num_cards) = match self.hand.phase {
                Phase::Preflop => (Phase::Flop, 3),
                Phase::Flop => (Phase::Turn, 1),
                Phase::Turn => (Phase::River, 1),
                Phase::River => return self.showdown(),
                Phase::Waiting | Phase::Showdown => return Ok(()),
            };

            self.hand.clear_street();
            for seat in self.seats.iter_mut() {
                if let Some(player) = seat.player_mut() {
                    player.street_bet = 0;
                }
            }
            let Some(deck) = self.deck.as_mut() else {
                return Err(InternalError::MissingDeck {
                    table_id: self.id.clone(),
                });
            };
            let cards = deck.deal(num_cards);
            self.hand.board.extend(cards);
            self.hand.phase = phase;

            let start = (self.positions.dealer + 1) % self.seats.len();
            let first = self
                .next_can_act_from(start)
                .or_else(|| self.hand.participants.seats.first().copied());
            self.hand.first_acting_seat = first;
            self.hand.acting_seat = first;

            let board: Vec<String> = self.hand.board.iter().map(ToString::to_string).collect();
            info!("{}: {phase} [{}]", self.id, board.join(" "));
            if self.num_can_act() >= 2 {
                return Ok(());
            }
        }
    }

    /// Give the whole pot to the last player standing, if there is one.
    fn award_uncontested(&mut self) -> Result<(), InternalError> {
        let pot = self.hand.pot;
        let winner = self.live_participants().next().map(|(seat_idx, _)| seat_idx);
        match winner {
            Some(seat_idx) => {
                let player = self.player_mut(seat_idx)?;
                player.stack += pot;
                let name = player.name.clone();
                info!("{}: {name} wins ${pot} uncontested", self.id);
            }
            None => warn!("{}: nobody left to award ${pot} to", self.id),
        }
        self.hand.board.clear();
        self.end_hand();
        Ok(())
    }

    fn showdown(&mut self) -> Result<(), InternalError> {
        self.hand.phase = Phase::Showdown;
        let hands: Vec<ParticipantHand> = self
            .live_participants()
            .map(|(seat_idx, player)| ParticipantHand {
                seat: seat_idx,
                id: player.id.clone(),
                cards: player.cards.clone(),
            })
            .collect();
        if hands.len() <= 1 {
            return self.award_uncontested();
        }

        let results = functional::resolve_winners(&hands, &self.hand.board);
        let mut winners: Vec<SeatIndex> = results
            .iter()
            .filter(|result| result.rank == 1)
            .map(|result| result.seat)
            .collect();
        winners.sort_unstable();

        // Split evenly in whole chips. Whatever doesn't divide goes to the
        // winner in the lowest seat.
        let pot = self.hand.pot;
        let num_winners = winners.len() as Chips;
        let share = pot / num_winners;
        let remainder = pot % num_winners;
        for (i, seat_idx) in winners.into_iter().enumerate() {
            let winnings = if i == 0 { share + remainder } else { share };
            let player = self.player_mut(seat_idx)?;
            player.stack += winnings;
            let name = player.name.clone();
            info!("{}: {name} wins ${winnings}", self.id);
        }
        for result in &results {
            debug!("{}: {result}", self.id);
        }
        self.last_showdown = results;
        self.end_hand();
        Ok(())
    }

    fn end_hand(&mut self) {
        self.hand.pot = 0;
        self.hand.phase = Phase::Waiting;
        self.hand.clear_street();
        self.hand.participants = Arc::default();
        self.hand.acting_seat = None;
        self.hand.first_acting_seat = None;
        self.deck = None;
        self.remove_departed();
    }

    /// Project the table for a viewer. Hole cards are only visible to
    /// their owner; hands shown down are revealed through
    /// `last_showdown` once the pot has been paid out.
    #[must_use]
    pub fn snapshot(&self, viewer: Option<&str>) -> TableSnapshot {
        let seats = self
            .seats
            .iter()
            .enumerate()
            .map(|(seat_idx, seat)| SeatView {
                seat: seat_idx,
                player: seat.player().map(|player| {
                    let visible = viewer == Some(player.id.as_str());
                    PlayerView {
                        id: player.id.clone(),
                        name: player.name.clone(),
                        stack: player.stack,
                        folded: player.folded,
                        all_in: player.all_in,
                        street_bet: player.street_bet,
                        cards: if visible {
                            player.cards.clone()
                        } else {
                            Vec::new()
                        },
                    }
                }),
            })
            .collect();
        TableSnapshot {
            table_id: self.id.clone(),
            blinds: self.settings.blinds.clone(),
            seats,
            hand: HandView {
                phase: self.hand.phase,
                board: self.hand.board.clone(),
                pot: self.hand.pot,
                current_bet: self.hand.current_bet,
                acting_seat: self.hand.acting_seat,
                min_raise: self.hand.min_raise,
                positions: self.positions.clone(),
                in_hand_seats: self.hand.participants.seats.clone(),
                in_hand_ids: self.hand.participants.ids.clone(),
            },
            last_showdown: self.last_showdown.clone(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}/{} seated), pot ${}",
            self.id,
            self.hand.phase,
            self.num_occupied(),
            self.seats.len(),
            self.hand.pot
        )
    }
}
