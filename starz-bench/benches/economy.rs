//! starz Benchmark Suite
//!
//! Hot paths hit once per chat message or once per scheduler tick:
//!   time_input_parse ................ every `!remind`
//!   hand_value_five_cards ........... every blackjack action
//!   on_message_known_user ........... every chat line
//!   loan_tick_500_accounts .......... every loan sweep
//!   reminder_tick_1000_pending ...... every reminder sweep

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use starz_core::blackjack::{Card, Rank, Suit, hand_value};
use starz_core::config::{EconomyConfig, LoanConfig};
use starz_core::persistence::MemoryStore;
use starz_core::time::parse_time_input;
use starz_core::{BetSpec, Economy};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

fn economy() -> Economy {
    let config = EconomyConfig {
        loan: LoanConfig {
            amount_min: 1000,
            amount_max: 1000,
            ..LoanConfig::default()
        },
        ..EconomyConfig::default()
    };
    Economy::with_rng(
        config,
        Arc::new(MemoryStore::new()),
        StdRng::seed_from_u64(42),
        t0(),
    )
}

/// Economy with `n` chatters, each holding an open loan half spent.
fn indebted_economy(n: usize) -> Economy {
    let mut eco = economy();
    for i in 0..n {
        let user = format!("user{i}");
        eco.on_message(&user, "#bench");
        let _ = eco.take_loan(&user, t0());
        let _ = eco.invest(&user, BetSpec::Half);
    }
    eco
}

fn bench_time_parse(c: &mut Criterion) {
    let tokens = ["14.02.2027", "11:40", "kaffee", "holen"];
    c.bench_function("time_input_parse", |b| {
        b.iter(|| black_box(parse_time_input(black_box(tokens.as_slice()), t0())));
    });
}

fn bench_hand_value(c: &mut Criterion) {
    let hand = [
        Card::new(Rank::Ace, Suit::Spades),
        Card::new(Rank::Ace, Suit::Hearts),
        Card::new(Rank::Five, Suit::Clubs),
        Card::new(Rank::Nine, Suit::Diamonds),
        Card::new(Rank::Two, Suit::Spades),
    ];
    c.bench_function("hand_value_five_cards", |b| {
        b.iter(|| black_box(hand_value(black_box(&hand))));
    });
}

fn bench_on_message(c: &mut Criterion) {
    let mut eco = indebted_economy(100);
    c.bench_function("on_message_known_user", |b| {
        b.iter(|| black_box(eco.on_message(black_box("user50"), "#bench")));
    });
}

fn bench_loan_tick(c: &mut Criterion) {
    c.bench_function("loan_tick_500_accounts", |b| {
        b.iter_batched(
            || indebted_economy(500),
            |mut eco| black_box(eco.loan_tick(t0() + Duration::hours(1))),
            BatchSize::LargeInput,
        );
    });
}

fn bench_reminder_tick(c: &mut Criterion) {
    c.bench_function("reminder_tick_1000_pending", |b| {
        b.iter_batched(
            || {
                let mut eco = economy();
                for i in 0..1000 {
                    let phrase = [format!("{}min", i % 120 + 1), "ping".to_string()];
                    let _ = eco.remind("bench", &format!("user{i}"), phrase.as_slice(), "#bench", t0());
                }
                eco
            },
            |mut eco| black_box(eco.reminder_tick(t0() + Duration::minutes(60))),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_time_parse,
    bench_hand_value,
    bench_on_message,
    bench_loan_tick,
    bench_reminder_tick,
);
criterion_main!(benches);
