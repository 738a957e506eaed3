//! Single-hand blackjack against an automatic dealer.
//!
//! One session per user, in memory only. The stake is deducted when the
//! hand is dealt; settlements credit the payout (stake included).
//!
//! | Result  | Credited                       |
//! |---------|--------------------------------|
//! | Natural | `ceil(bet * 5 / 2)`            |
//! | Win     | `2 * bet`                      |
//! | Push    | `bet`                          |
//! | Lose    | nothing                        |
//! | Bust    | nothing                        |

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::account::account_key;
use crate::bank::Bank;
use crate::bet::BetSpec;
use crate::config::BlackjackConfig;
use crate::error::{EconomyError, Result};

const GAME: &str = "blackjack";

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// Card suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    /// ♠
    Spades,
    /// ♥
    Hearts,
    /// ♦
    Diamonds,
    /// ♣
    Clubs,
}

impl Suit {
    /// All four suits.
    pub const ALL: [Self; 4] = [Self::Spades, Self::Hearts, Self::Diamonds, Self::Clubs];

    fn symbol(self) -> char {
        match self {
            Self::Spades => '♠',
            Self::Hearts => '♥',
            Self::Diamonds => '♦',
            Self::Clubs => '♣',
        }
    }
}

/// Card rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    /// All thirteen ranks, low to high.
    pub const ALL: [Self; 13] = [
        Self::Two,
        Self::Three,
        Self::Four,
        Self::Five,
        Self::Six,
        Self::Seven,
        Self::Eight,
        Self::Nine,
        Self::Ten,
        Self::Jack,
        Self::Queen,
        Self::King,
        Self::Ace,
    ];

    /// Blackjack value; an ace counts 11 here and is demoted in [`hand_value`].
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
            Self::Ten | Self::Jack | Self::Queen | Self::King => 10,
            Self::Ace => 11,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Ten => "10",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
            Self::Ace => "A",
        }
    }
}

/// A playing card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    /// Rank.
    pub rank: Rank,
    /// Suit.
    pub suit: Suit,
}

impl Card {
    /// Shorthand constructor.
    #[must_use]
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.label(), self.suit.symbol())
    }
}

/// Value of a hand: aces count 11, demoted to 1 one at a time while over 21.
#[must_use]
pub fn hand_value(cards: &[Card]) -> u32 {
    let mut total: u32 = cards.iter().map(|c| c.rank.value()).sum();
    let mut soft_aces = cards.iter().filter(|c| c.rank == Rank::Ace).count();
    while total > 21 && soft_aces > 0 {
        total -= 10;
        soft_aces -= 1;
    }
    total
}

/// Cards left to draw, owned by one session.
#[derive(Debug, Clone)]
pub struct Deck {
    // Drawn from the back.
    cards: Vec<Card>,
}

impl Deck {
    /// Unshuffled 52-card deck.
    #[must_use]
    pub fn standard() -> Self {
        let cards = Suit::ALL
            .iter()
            .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card::new(rank, suit)))
            .collect();
        Self { cards }
    }

    /// Freshly shuffled 52-card deck.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::standard();
        deck.cards.shuffle(rng);
        deck
    }

    /// A deck that deals `cards` in the order given.
    #[must_use]
    pub fn stacked(mut cards: Vec<Card>) -> Self {
        cards.reverse();
        Self { cards }
    }

    /// Take the next card.
    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// Cards remaining.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the deck is used up.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Where a hand stands after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOutcome {
    /// Waiting for hit or stand.
    InProgress,
    /// Player dealt 21.
    Natural,
    /// Equal totals, stake returned.
    Push,
    /// Player beat the dealer or the dealer bust.
    Win,
    /// Dealer beat the player.
    Lose,
    /// Player went over 21.
    Bust,
}

impl HandOutcome {
    /// Whether the session is over.
    #[must_use]
    pub fn is_final(self) -> bool {
        self != Self::InProgress
    }
}

/// View of a hand after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackjackRound {
    /// Result so far.
    pub outcome: HandOutcome,
    /// Stake.
    pub bet: u64,
    /// Stars credited on settlement (0 while in progress).
    pub payout: u64,
    /// Player cards.
    pub player: Vec<Card>,
    /// Dealer cards. While in progress only the first one is meant to be shown.
    pub dealer: Vec<Card>,
    /// Player total.
    pub player_total: u32,
    /// Dealer total.
    pub dealer_total: u32,
    /// Balance after the action.
    pub balance: u64,
}

#[derive(Debug)]
struct Session {
    bet: u64,
    deck: Deck,
    player: Vec<Card>,
    dealer: Vec<Card>,
}

/// Open blackjack hands, one per user.
#[derive(Debug)]
pub struct BlackjackEngine {
    config: BlackjackConfig,
    sessions: HashMap<String, Session>,
}

impl BlackjackEngine {
    /// Engine with no open hands.
    #[must_use]
    pub fn new(config: BlackjackConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Whether `user` has an open hand.
    #[must_use]
    pub fn is_playing(&self, user: &str) -> bool {
        self.sessions.contains_key(&account_key(user))
    }

    /// Deal a hand from a freshly shuffled deck.
    ///
    /// # Errors
    /// [`EconomyError::SessionConflict`] with a hand already open, or the
    /// stake errors of [`BetSpec::resolve`].
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        bank: &mut Bank,
        user: &str,
        spec: BetSpec,
        rng: &mut R,
    ) -> Result<BlackjackRound> {
        self.start_with_deck(bank, user, spec, Deck::shuffled(rng))
    }

    /// Deal a hand from `deck`: two cards to the player, then two to the dealer.
    ///
    /// # Errors
    /// As [`Self::start`].
    pub fn start_with_deck(
        &mut self,
        bank: &mut Bank,
        user: &str,
        spec: BetSpec,
        mut deck: Deck,
    ) -> Result<BlackjackRound> {
        let key = account_key(user);
        if self.sessions.contains_key(&key) {
            return Err(EconomyError::SessionConflict { game: GAME });
        }
        if deck.len() < 4 {
            return Err(EconomyError::InvalidInput("deck too small to deal".into()));
        }
        let bet = bank.update(&key, |account| {
            let bet = spec.resolve(account.balance)?;
            account.debit(bet)?;
            Ok(bet)
        })?;

        let mut session = Session {
            bet,
            player: Vec::with_capacity(4),
            dealer: Vec::with_capacity(4),
            deck,
        };
        for _ in 0..2 {
            session.player.extend(session.deck.draw());
        }
        for _ in 0..2 {
            session.dealer.extend(session.deck.draw());
        }
        info!(user = %key, bet, "Blackjack hand dealt");

        if hand_value(&session.player) == 21 {
            let outcome = if hand_value(&session.dealer) == 21 {
                HandOutcome::Push
            } else {
                HandOutcome::Natural
            };
            return Ok(self.settle(bank, &key, session, outcome));
        }

        let round = Self::view(&session, HandOutcome::InProgress, 0, bank.balance(&key));
        self.sessions.insert(key, session);
        Ok(round)
    }

    /// Draw one card. Over 21 busts; exactly 21 stands automatically.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open hand.
    pub fn hit(&mut self, bank: &mut Bank, user: &str) -> Result<BlackjackRound> {
        let key = account_key(user);
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or(EconomyError::NoSession { game: GAME })?;
        let Some(card) = session.deck.draw() else {
            return self.stand(bank, &key);
        };
        session.player.push(card);

        match hand_value(&session.player) {
            t if t > 21 => {
                let session = self.take(&key)?;
                Ok(self.settle(bank, &key, session, HandOutcome::Bust))
            }
            21 => self.stand(bank, &key),
            _ => Ok(Self::view(session, HandOutcome::InProgress, 0, bank.balance(&key))),
        }
    }

    /// Let the dealer play out and settle the hand.
    ///
    /// # Errors
    /// [`EconomyError::NoSession`] without an open hand.
    pub fn stand(&mut self, bank: &mut Bank, user: &str) -> Result<BlackjackRound> {
        let key = account_key(user);
        let mut session = self.take(&key)?;
        let stand_total = u32::from(self.config.dealer_stand_total);
        while hand_value(&session.dealer) < stand_total {
            let Some(card) = session.deck.draw() else { break };
            session.dealer.push(card);
        }

        let player = hand_value(&session.player);
        let dealer = hand_value(&session.dealer);
        let outcome = if dealer > 21 || player > dealer {
            HandOutcome::Win
        } else if player == dealer {
            HandOutcome::Push
        } else {
            HandOutcome::Lose
        };
        Ok(self.settle(bank, &key, session, outcome))
    }

    fn take(&mut self, key: &str) -> Result<Session> {
        self.sessions
            .remove(key)
            .ok_or(EconomyError::NoSession { game: GAME })
    }

    /// Stars credited for a final outcome.
    #[must_use]
    pub fn payout(&self, outcome: HandOutcome, bet: u64) -> u64 {
        match outcome {
            HandOutcome::Natural => {
                let num = u128::from(bet) * u128::from(self.config.natural_payout_numerator);
                let den = u128::from(self.config.natural_payout_denominator.max(1));
                u64::try_from(num.div_ceil(den)).unwrap_or(u64::MAX)
            }
            HandOutcome::Win => bet.saturating_mul(2),
            HandOutcome::Push => bet,
            HandOutcome::Lose | HandOutcome::Bust | HandOutcome::InProgress => 0,
        }
    }

    fn settle(&self, bank: &mut Bank, key: &str, session: Session, outcome: HandOutcome) -> BlackjackRound {
        let payout = self.payout(outcome, session.bet);
        let balance = if payout > 0 {
            bank.update(key, |account| Ok(account.credit(payout)))
                .unwrap_or_else(|_| bank.balance(key))
        } else {
            bank.balance(key)
        };
        info!(user = %key, bet = session.bet, payout, ?outcome, "Blackjack hand settled");
        Self::view(&session, outcome, payout, balance)
    }

    fn view(session: &Session, outcome: HandOutcome, payout: u64, balance: u64) -> BlackjackRound {
        BlackjackRound {
            outcome,
            bet: session.bet,
            payout,
            player: session.player.clone(),
            dealer: session.dealer.clone(),
            player_total: hand_value(&session.player),
            dealer_total: hand_value(&session.dealer),
            balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::sync::Arc;

    use super::Rank::{Ace, Five, King, Nine, Queen, Six, Ten, Three, Two};

    fn c(rank: Rank) -> Card {
        Card::new(rank, Suit::Spades)
    }

    fn deck(ranks: &[Rank]) -> Deck {
        Deck::stacked(ranks.iter().map(|&r| c(r)).collect())
    }

    fn funded(amount: u64) -> Bank {
        let mut bank = Bank::load(Arc::new(MemoryStore::new()), 1000);
        bank.update("alice", |a| Ok(a.credit(amount))).expect("fund");
        bank
    }

    #[test]
    fn hand_value_demotes_aces_one_at_a_time() {
        assert_eq!(hand_value(&[c(Ace), c(King)]), 21);
        assert_eq!(hand_value(&[c(Ace), c(Ace)]), 12);
        assert_eq!(hand_value(&[c(Ace), c(Ace), c(Nine)]), 21);
        assert_eq!(hand_value(&[c(Ace), c(King), c(Queen)]), 21);
        assert_eq!(hand_value(&[c(Ten), c(Nine), c(Five)]), 24);
    }

    #[test]
    fn standard_deck_has_52_distinct_cards() {
        let mut deck = Deck::standard();
        let mut seen = std::collections::HashSet::new();
        while let Some(card) = deck.draw() {
            assert!(seen.insert(card));
        }
        assert_eq!(seen.len(), 52);
    }

    #[test]
    fn forced_deck_dealer_draws_to_21_and_wins() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        let round = engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ten, Nine, Ten, Six, Five]))
            .expect("deal");
        assert_eq!(round.outcome, HandOutcome::InProgress);
        assert_eq!(round.player_total, 19);
        assert_eq!(round.dealer_total, 16);
        assert_eq!(bank.balance("alice"), 900);

        let round = engine.stand(&mut bank, "alice").expect("stand");
        assert_eq!(round.dealer_total, 21);
        assert_eq!(round.outcome, HandOutcome::Lose);
        assert_eq!(round.payout, 0);
        assert_eq!(bank.balance("alice"), 900);
        assert!(!engine.is_playing("alice"));
    }

    #[test]
    fn forced_deck_dealer_busts() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ten, Nine, Ten, Six, King]))
            .expect("deal");
        let round = engine.stand(&mut bank, "alice").expect("stand");
        assert_eq!(round.outcome, HandOutcome::Win);
        assert_eq!(round.payout, 200);
        assert_eq!(bank.balance("alice"), 1100);
    }

    #[test]
    fn forced_deck_push_refunds() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ten, Nine, Ten, Six, Three]))
            .expect("deal");
        let round = engine.stand(&mut bank, "alice").expect("stand");
        assert_eq!(round.outcome, HandOutcome::Push);
        assert_eq!(bank.balance("alice"), 1000);
    }

    #[test]
    fn natural_pays_two_and_a_half_rounded_up() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        let round = engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(101), deck(&[Ace, King, Ten, Six]))
            .expect("deal");
        assert_eq!(round.outcome, HandOutcome::Natural);
        assert_eq!(round.payout, 253);
        assert_eq!(bank.balance("alice"), 1000 - 101 + 253);
        assert!(!engine.is_playing("alice"));
    }

    #[test]
    fn natural_against_dealer_21_is_push() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        let round = engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ace, King, Ace, Queen]))
            .expect("deal");
        assert_eq!(round.outcome, HandOutcome::Push);
        assert_eq!(bank.balance("alice"), 1000);
    }

    #[test]
    fn hit_bust_forfeits_and_ends_session() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ten, Nine, Ten, Six, King]))
            .expect("deal");
        let round = engine.hit(&mut bank, "alice").expect("hit");
        assert_eq!(round.outcome, HandOutcome::Bust);
        assert_eq!(bank.balance("alice"), 900);
        assert!(matches!(engine.hit(&mut bank, "alice"), Err(EconomyError::NoSession { .. })));
    }

    #[test]
    fn hit_to_21_stands_automatically() {
        let mut bank = funded(1000);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(100), deck(&[Ten, Five, Ten, Six, Six, Two]))
            .expect("deal");
        let round = engine.hit(&mut bank, "alice").expect("hit");
        assert_eq!(round.player_total, 21);
        assert_eq!(round.dealer_total, 18);
        assert_eq!(round.outcome, HandOutcome::Win);
        assert_eq!(bank.balance("alice"), 1100);
    }

    #[test]
    fn second_hand_conflicts_and_bad_bets_rejected() {
        let mut bank = funded(100);
        let mut engine = BlackjackEngine::new(BlackjackConfig::default());
        assert!(matches!(
            engine.start_with_deck(&mut bank, "alice", BetSpec::Amount(0), deck(&[Ten, Five, Ten, Six])),
            Err(EconomyError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.start_with_deck(&mut bank, "alice", BetSpec::Amount(101), deck(&[Ten, Five, Ten, Six])),
            Err(EconomyError::InsufficientFunds { .. })
        ));
        engine
            .start_with_deck(&mut bank, "alice", BetSpec::Amount(50), deck(&[Ten, Five, Ten, Six]))
            .expect("deal");
        assert!(matches!(
            engine.start_with_deck(&mut bank, "Alice", BetSpec::Amount(10), deck(&[Ten, Five, Ten, Six])),
            Err(EconomyError::SessionConflict { .. })
        ));
        assert_eq!(bank.balance("alice"), 50);
    }
}
