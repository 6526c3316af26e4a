//! Fuzz target for room code parsing and generation
//!
//! # Strategy
//!
//! - Arbitrary strings through the parser, including non-ASCII,
//!   whitespace-padded, and wrong-length input
//! - Generated codes from seeded environment randomness
//!
//! # Invariants
//!
//! - Accepted codes are exactly 6 uppercase base-36 characters
//! - Parsing is a fixed point on the normalized form
//! - A well-formed input (6 ASCII alphanumerics after trim) is NEVER rejected
//! - Generated codes always parse back to themselves

#![no_main]

use alcove_core::RoomCode;
use alcove_harness::SimEnv;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct CodeInput {
    raw: String,
    seed: u64,
}

fuzz_target!(|input: CodeInput| {
    match input.raw.parse::<RoomCode>() {
        Ok(code) => {
            let text = code.as_str();
            assert_eq!(text.len(), RoomCode::LEN);
            assert!(
                text.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()),
                "code {text:?} left the base-36 alphabet"
            );
            assert_eq!(text.parse::<RoomCode>(), Ok(code));
            assert_eq!(input.raw.trim().to_ascii_uppercase(), text);
        },
        Err(_) => {
            let trimmed = input.raw.trim();
            let well_formed = trimmed.chars().count() == RoomCode::LEN
                && trimmed.chars().all(|ch| ch.is_ascii_alphanumeric());
            assert!(!well_formed, "rejected well-formed code {trimmed:?}");
        },
    }

    let env = SimEnv::new(input.seed);
    let generated = RoomCode::generate(&env);
    assert_eq!(generated.as_str().parse::<RoomCode>(), Ok(generated));
});
