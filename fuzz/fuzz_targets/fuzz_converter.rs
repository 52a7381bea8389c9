#![no_main]

use arbitrary::Arbitrary;
use easy_switcher::converter::Converter;
use libfuzzer_sys::fuzz_target;

// Cap per-case work so the fuzzer explores sequences instead of grinding
// through one enormous buffer.
const MAX_EVENTS_PER_CASE: usize = 2048;

#[derive(Arbitrary, Debug)]
struct Case {
    conv_key: u8,
    ls_primary: u8,
    ls_secondary: u8,
    events: Vec<(u16, i8)>,
}

fuzz_target!(|case: Case| {
    let mut conv = Converter::new();
    conv.conv_key = u16::from(case.conv_key);
    conv.ls_keys = [u16::from(case.ls_primary), u16::from(case.ls_secondary)];

    for &(code, value) in case.events.iter().take(MAX_EVENTS_PER_CASE) {
        conv.push(code, i32::from(value));
        if let Some(action) = conv.process() {
            // The replay must be well-formed for any buffer the admission
            // rules can produce; building it twice checks purity too.
            let first = conv.convert(action);
            let second = conv.convert(action);
            assert_eq!(first, second);
        }
    }

    let _ = conv.buffer_dump();
});
