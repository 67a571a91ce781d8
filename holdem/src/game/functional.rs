use std::collections::BTreeMap;

use super::{
    constants::BOARD_CARDS,
    entities::{ACE, Card, HandEval, HandRank, ParticipantHand, SeatHandResult, Suit, Value},
};

/// Evaluate exactly five cards.
///
/// # Examples
///
/// ```
/// use holdem::{entities::{Card, HandRank}, functional::eval_five};
///
/// let cards: Vec<Card> = ["Ah", "2d", "3c", "4s", "5h"]
///     .iter()
///     .map(|code| code.parse().unwrap())
///     .collect();
/// let hand = eval_five(&[cards[0], cards[1], cards[2], cards[3], cards[4]]);
/// assert_eq!(hand.rank, HandRank::Straight);
/// assert_eq!(hand.values, vec![5]);
/// ```
pub fn eval_five(cards: &[Card; 5]) -> HandEval {
    eval_exact(cards)
}

/// Evaluate two hole cards plus a full board, keeping the best of the
/// 21 five-card subsets.
///
/// # Examples
///
/// ```
/// use holdem::{entities::{Card, HandRank}, functional::eval_seven};
///
/// let cards: Vec<Card> = ["As", "Ad", "Kc", "Kh", "2s", "7d", "9c"]
///     .iter()
///     .map(|code| code.parse().unwrap())
///     .collect();
/// let cards: [Card; 7] = cards.try_into().unwrap();
/// let hand = eval_seven(&cards);
/// assert_eq!(hand.rank, HandRank::TwoPair);
/// assert_eq!(hand.values, vec![14, 13, 9]);
/// ```
pub fn eval_seven(cards: &[Card; 7]) -> HandEval {
    eval(cards)
}

/// Evaluate any number of cards. Five or fewer cards are evaluated as-is
/// (straights and flushes need all five); more than five are reduced to
/// their best five-card subset.
pub fn eval(cards: &[Card]) -> HandEval {
    if cards.len() <= 5 {
        return eval_exact(cards);
    }
    five_card_subsets(cards)
        .map(|subset| eval_exact(&subset))
        .max()
        .unwrap_or(HandEval {
            rank: HandRank::HighCard,
            values: Vec::new(),
        })
}

fn five_card_subsets(cards: &[Card]) -> impl Iterator<Item = [Card; 5]> + '_ {
    let n = cards.len();
    (0..n).flat_map(move |a| {
        (a + 1..n).flat_map(move |b| {
            (b + 1..n).flat_map(move |c| {
                (c + 1..n).flat_map(move |d| {
                    (d + 1..n).map(move |e| [cards[a], cards[b], cards[c], cards[d], cards[e]])
                })
            })
        })
    })
}

/// The top card of a five-card straight. The wheel (A-2-3-4-5) is a
/// 5-high straight.
fn straight_top(values_desc: &[Value]) -> Option<Value> {
    if values_desc.len() != 5 {
        return None;
    }
    let distinct = values_desc.windows(2).all(|pair| pair[0] > pair[1]);
    if !distinct {
        None
    } else if values_desc[0] - values_desc[4] == 4 {
        Some(values_desc[0])
    } else if values_desc == [ACE, 5, 4, 3, 2] {
        Some(5)
    } else {
        None
    }
}

fn eval_exact(cards: &[Card]) -> HandEval {
    let mut values: Vec<Value> = cards.iter().map(|card| card.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.len() == 5 && cards.iter().all(|card| card.1 == cards[0].1);
    let straight = straight_top(&values);

    // Group values by how often they appear. Sorting by (count, value)
    // descending lines the groups up exactly as the tie-break key wants
    // them: quads/trips/pairs first, then kickers from high to low.
    let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
    for value in &values {
        *counts.entry(*value).or_default() += 1;
    }
    let mut groups: Vec<(usize, Value)> = counts.into_iter().map(|(v, c)| (c, v)).collect();
    groups.sort_unstable_by(|a, b| b.cmp(a));
    let grouped: Vec<Value> = groups.iter().map(|(_, value)| *value).collect();
    let largest = groups.first().map_or(0, |group| group.0);
    let second = groups.get(1).map_or(0, |group| group.0);

    match (straight, is_flush) {
        (Some(ACE), true) => HandEval {
            rank: HandRank::RoyalFlush,
            values: vec![ACE],
        },
        (Some(top), true) => HandEval {
            rank: HandRank::StraightFlush,
            values: vec![top],
        },
        _ if largest == 4 => HandEval {
            rank: HandRank::FourOfAKind,
            values: grouped,
        },
        _ if largest == 3 && second == 2 => HandEval {
            rank: HandRank::FullHouse,
            values: grouped,
        },
        (_, true) => HandEval {
            rank: HandRank::Flush,
            values,
        },
        (Some(top), false) => HandEval {
            rank: HandRank::Straight,
            values: vec![top],
        },
        _ if largest == 3 => HandEval {
            rank: HandRank::ThreeOfAKind,
            values: grouped,
        },
        _ if largest == 2 && second == 2 => HandEval {
            rank: HandRank::TwoPair,
            values: grouped,
        },
        _ if largest == 2 => HandEval {
            rank: HandRank::OnePair,
            values: grouped,
        },
        _ => HandEval {
            rank: HandRank::HighCard,
            values,
        },
    }
}

/// Rank every participant's best hand against the board.
///
/// Results come back best first. Equal hands share a rank, so every
/// result with a rank of 1 is a winner. Equal hands keep the order
/// they were passed in, which is dealing order for a table. Without a complete board nothing can be
/// compared, and everyone is tied for first.
pub fn resolve_winners(hands: &[ParticipantHand], board: &[Card]) -> Vec<SeatHandResult> {
    if board.len() != BOARD_CARDS {
        return hands
            .iter()
            .map(|hand| SeatHandResult {
                seat: hand.seat,
                id: hand.id.clone(),
                cards: hand.cards.clone(),
                eval: HandEval {
                    rank: HandRank::HighCard,
                    values: Vec::new(),
                },
                rank: 1,
            })
            .collect();
    }

    let mut results: Vec<SeatHandResult> = hands
        .iter()
        .map(|hand| {
            let mut cards = hand.cards.clone();
            cards.extend_from_slice(board);
            let eval = match <[Card; 7]>::try_from(cards.as_slice()) {
                Ok(seven) => eval_seven(&seven),
                Err(_) => eval(&cards),
            };
            SeatHandResult {
                seat: hand.seat,
                id: hand.id.clone(),
                cards: hand.cards.clone(),
                eval,
                rank: 0,
            }
        })
        .collect();
    // Stable sort, so equal hands keep their input order.
    results.sort_by(|a, b| b.eval.cmp(&a.eval));

    let mut rank = 1;
    for i in 0..results.len() {
        if i > 0 && results[i].eval != results[i - 1].eval {
            rank = i + 1;
        }
        results[i].rank = rank;
    }
    results
}

/// Create a new, unshuffled deck of cards.
///
/// # Examples
///
/// ```
/// use holdem::functional::new_deck;
///
/// let deck = new_deck();
/// assert_eq!(deck.len(), 52);
/// ```
pub fn new_deck() -> [Card; 52] {
    let mut deck: [Card; 52] = [Card(2, Suit::Club); 52];
    for (i, value) in (2u8..=ACE).enumerate() {
        for (j, suit) in Suit::ALL.into_iter().enumerate() {
            deck[4 * i + j] = Card(value, suit);
        }
    }
    deck
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{eval, eval_five, eval_seven, five_card_subsets, new_deck, resolve_winners};
    use crate::game::entities::{
        Card, Deck, HandEval, HandRank, ParticipantHand, SeededShuffle,
    };

    fn cards(codes: &str) -> Vec<Card> {
        codes
            .split_whitespace()
            .map(|code| code.parse().unwrap())
            .collect()
    }

    macro_rules! eval_tests {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (codes, expected_rank, expected_values): (&str, HandRank, Vec<u8>) = $value;
                let hand = eval(&cards(codes));
                assert_eq!(hand.rank, expected_rank);
                assert_eq!(hand.values, expected_values);
            }
        )*
        }
    }

    eval_tests! {
        royal_flush: ("Ts Js Qs Ks As", HandRank::RoyalFlush, vec![14]),
        straight_flush: ("5h 6h 7h 8h 9h", HandRank::StraightFlush, vec![9]),
        steel_wheel: ("Ad 2d 3d 4d 5d", HandRank::StraightFlush, vec![5]),
        four_of_a_kind: ("4c 4h 4d 4s Qh", HandRank::FourOfAKind, vec![4, 12]),
        full_house: ("4c 4h 4d 6s 6h", HandRank::FullHouse, vec![4, 6]),
        flush: ("2d 4d 5d 6d 9d", HandRank::Flush, vec![9, 6, 5, 4, 2]),
        straight: ("4h 5h 6c 7h 8h", HandRank::Straight, vec![8]),
        broadway: ("Tc Jd Qh Ks Ac", HandRank::Straight, vec![14]),
        wheel: ("Ah 2d 3c 4s 5h", HandRank::Straight, vec![5]),
        three_of_a_kind: ("7c 7h 7d Ks 2h", HandRank::ThreeOfAKind, vec![7, 13, 2]),
        two_pair: ("4c 4h Qd Qs 9h", HandRank::TwoPair, vec![12, 4, 9]),
        one_pair: ("Jc Jh 3d 8s Ah", HandRank::OnePair, vec![11, 14, 8, 3]),
        high_card: ("2c 5h 9d Js Kh", HandRank::HighCard, vec![13, 11, 9, 5, 2]),
        not_a_wrapping_straight: ("Qc Kh Ad 2s 3h", HandRank::HighCard, vec![14, 13, 12, 3, 2]),
        seven_card_flush_over_straight: ("4h 5h 6c 7h 8h 9h 2d", HandRank::Flush, vec![9, 8, 7, 5, 4]),
        seven_card_full_house_from_two_trips: ("4c 4h 4d 6s 6h 6c Qs", HandRank::FullHouse, vec![6, 4]),
        seven_card_best_two_pair: ("4c 4h 6s 6h Qd Qs 2c", HandRank::TwoPair, vec![12, 6, 4]),
        seven_card_wheel_with_six: ("Ah 2d 3c 4s 5h 6d Kc", HandRank::Straight, vec![6]),
        partial_pair: ("4c 4h Js", HandRank::OnePair, vec![4, 11]),
    }

    #[test]
    fn wheel_loses_to_six_high_straight() {
        let wheel = eval(&cards("Ah 2d 3c 4s 5h"));
        let six_high = eval(&cards("2d 3c 4s 5h 6c"));
        assert!(wheel < six_high);
        assert_eq!(wheel.rank, six_high.rank);

        let steel_wheel = eval(&cards("Ad 2d 3d 4d 5d"));
        let six_high_flush = eval(&cards("2h 3h 4h 5h 6h"));
        assert!(steel_wheel < six_high_flush);
    }

    #[test]
    fn kickers_break_ties() {
        let better = eval(&cards("Jc Jh Ad 8s 3h"));
        let worse = eval(&cards("Jd Js Kd 8c 3c"));
        assert!(better > worse);

        let chop1 = eval(&cards("Jc Jh Ad 8s 3h"));
        let chop2 = eval(&cards("Jd Js Ac 8c 3d"));
        assert_eq!(chop1, chop2);
    }

    #[test]
    fn longer_key_wins_on_prefix_tie() {
        let short = HandEval {
            rank: HandRank::HighCard,
            values: vec![13, 11],
        };
        let long = HandEval {
            rank: HandRank::HighCard,
            values: vec![13, 11, 2],
        };
        assert!(long > short);
    }

    #[test]
    fn category_beats_key_values() {
        let pair = eval(&cards("2c 2h 3d 4s 6h"));
        let high_card = eval(&cards("Ac Kh Qd Js 9h"));
        assert!(pair > high_card);
    }

    #[test]
    fn seven_cards_beat_every_subset() {
        let shuffle = SeededShuffle::new(1234);
        for _ in 0..200 {
            let mut deck = Deck::default();
            deck.shuffle(&shuffle);
            let seven: [Card; 7] = deck.deal(7).try_into().unwrap();
            let best = eval_seven(&seven);
            let subsets: Vec<[Card; 5]> = five_card_subsets(&seven).collect();
            assert_eq!(subsets.len(), 21);
            for subset in subsets {
                assert!(best >= eval_five(&subset));
            }
        }
    }

    #[test]
    fn comparator_is_a_total_order() {
        let shuffle = SeededShuffle::new(99);
        let mut hands = Vec::new();
        for _ in 0..60 {
            let mut deck = Deck::default();
            deck.shuffle(&shuffle);
            hands.push(eval(&deck.deal(7)));
        }
        for a in &hands {
            for b in &hands {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
                for c in &hands {
                    if a <= b && b <= c {
                        assert!(a <= c);
                    }
                }
            }
        }
    }

    #[test]
    fn new_deck_is_unique() {
        let deck: HashSet<Card> = new_deck().into_iter().collect();
        assert_eq!(deck.len(), 52);
    }

    #[test]
    fn resolve_ties_share_rank() {
        let board = cards("As 7d 8c 2h 3s");
        let hands = vec![
            ParticipantHand {
                seat: 0,
                id: "a".to_string(),
                cards: cards("Ad Kc"),
            },
            ParticipantHand {
                seat: 1,
                id: "b".to_string(),
                cards: cards("9c 9d"),
            },
            ParticipantHand {
                seat: 2,
                id: "c".to_string(),
                cards: cards("Ah Kd"),
            },
        ];
        let results = resolve_winners(&hands, &board);
        let ranks: Vec<(usize, usize)> = results.iter().map(|r| (r.seat, r.rank)).collect();
        assert_eq!(ranks, vec![(0, 1), (2, 1), (1, 3)]);
        assert_eq!(results[0].eval.rank, HandRank::OnePair);
    }

    #[test]
    fn resolve_without_full_board_ties_everyone() {
        let hands = vec![
            ParticipantHand {
                seat: 3,
                id: "a".to_string(),
                cards: cards("Ad Kc"),
            },
            ParticipantHand {
                seat: 5,
                id: "b".to_string(),
                cards: cards("2c 7d"),
            },
        ];
        let results = resolve_winners(&hands, &cards("As 7h 8c"));
        assert!(results.iter().all(|r| r.rank == 1));
        assert!(results.iter().all(|r| r.eval.values.is_empty()));
    }
}
