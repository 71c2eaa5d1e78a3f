//! Speedtest Example Unit
//!
//! A fixture, two prefixed entries and a parametrized marked entry. The file
//! is both the benchmark unit and the binary that times it.
//!
//! Run with:
//!   cargo run --example speed_basic -- speedtest/examples             # Time this unit
//!   cargo run --example speed_basic -- speedtest/examples --nreps 5   # Best of five
//!   cargo run --example speed_basic -- speedtest/examples --tocsv     # Also write run.csv
//!   cargo run --example speed_basic -- --help                         # Show all options

use speedtest::{export, fixture, mark, parametrize};
use std::hint::black_box;

// ============================================================================
// Fixtures
// ============================================================================

#[fixture]
fn number() -> u64 {
    42
}

#[fixture]
fn words() -> Vec<String> {
    ["delta", "alpha", "charlie", "bravo"]
        .iter()
        .cycle()
        .take(1000)
        .map(|w| w.to_string())
        .collect()
}

// ============================================================================
// Entries
// ============================================================================

#[export]
fn speed_square_list() -> Vec<u64> {
    (0..100_000u64).map(|x| x * x).collect()
}

/// Uses the `number` fixture
#[export]
fn speed_square_list_scaled(number: u64) -> Vec<u64> {
    (0..100_000u64).map(|x| (x * number).pow(2) % 1_000_003).collect()
}

#[export]
fn speed_sort_words(words: &[String]) {
    let mut sorted = words.to_vec();
    sorted.sort_unstable();
    black_box(sorted);
}

#[parametrize("n, reverse", [(1_000, false), (1_000, true), (100_000, false)])]
#[mark]
fn collect_range(n: u64, reverse: bool) -> Vec<u64> {
    if reverse {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    }
}

#[export]
fn speed_parse_floats() -> Result<f64, std::num::ParseFloatError> {
    let mut total = 0.0;
    for s in ["1.5", "2.25", "3.125", "4.0625"] {
        total += s.parse::<f64>()?;
    }
    Ok(total)
}

fn main() {
    if let Err(err) = speedtest::run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
