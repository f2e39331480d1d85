#![no_main]

use fnx::query::{MatchOptions, compile};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, bool, bool)| {
    // Either a plan or a SyntaxError, never a panic
    let (text, regex, match_case) = input;
    let options = MatchOptions {
        regex,
        match_case,
        ..Default::default()
    };
    let _ = compile(text, &options);
});
