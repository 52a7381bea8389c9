//! Property tests for the converter's buffer and replay invariants.

use easy_switcher::converter::{
    is_killer, is_shift, is_text_key, Action, Converter, KeyEvent, KEY_BACKSPACE, KEY_DOWN,
    KEY_UP,
};
use proptest::prelude::*;

const MAX_EVENTS: usize = 300;

// Key codes drawn from the ranges the daemon actually classifies, plus
// the mouse buttons, so sequences exercise every admission rule.
fn arb_keycode() -> impl Strategy<Value = u16> {
    prop_oneof![
        4 => 0..128u16,
        1 => Just(272u16), // BTN_LEFT
        1 => Just(273u16), // BTN_RIGHT
        1 => Just(274u16), // BTN_MIDDLE
    ]
}

fn arb_keyvalue() -> impl Strategy<Value = i32> {
    prop_oneof![Just(0), Just(1), Just(2)]
}

fn arb_event() -> impl Strategy<Value = (u16, i32)> {
    (arb_keycode(), arb_keyvalue())
}

fn arb_sequence() -> impl Strategy<Value = Vec<(u16, i32)>> {
    prop::collection::vec(arb_event(), 0..=MAX_EVENTS)
}

fn push_all(conv: &mut Converter, events: &[(u16, i32)]) {
    for &(code, value) in events {
        conv.push(code, value);
    }
}

proptest! {
    /// A buffer killer empties the buffer no matter what preceded it.
    #[test]
    fn killer_always_clears(prefix in arb_sequence(), killer_value in arb_keyvalue()) {
        let mut conv = Converter::new();
        push_all(&mut conv, &prefix);
        conv.push(272, killer_value);
        prop_assert!(conv.events().is_empty());
    }

    /// Typing a text key (down then up) leaves exactly one DOWN entry.
    #[test]
    fn text_key_normalisation(code in 0..128u16) {
        prop_assume!(is_text_key(code));
        let mut conv = Converter::new();
        conv.push(code, KEY_DOWN);
        conv.push(code, KEY_UP);
        prop_assert_eq!(conv.events(), &[KeyEvent::new(code, KEY_DOWN)]);
    }

    /// Backspace removes at most one entry, never a shift entry, and
    /// backspace-up removes nothing.
    #[test]
    fn backspace_preserves_shifts(events in arb_sequence()) {
        let mut conv = Converter::new();
        push_all(&mut conv, &events);

        let before: Vec<KeyEvent> = conv.events().to_vec();
        let shifts_before = before.iter().filter(|ev| is_shift(ev.code)).count();

        conv.push(KEY_BACKSPACE, KEY_UP);
        prop_assert_eq!(conv.events(), &before[..], "backspace release must be a no-op");

        conv.push(KEY_BACKSPACE, KEY_DOWN);
        let after = conv.events();
        let shifts_after = after.iter().filter(|ev| is_shift(ev.code)).count();

        prop_assert_eq!(shifts_before, shifts_after);
        let non_shift_before = before.len() - shifts_before;
        let expected_len = if non_shift_before > 0 { before.len() - 1 } else { before.len() };
        prop_assert_eq!(after.len(), expected_len);
    }

    /// The buffer never admits killers or backspace entries, and every
    /// non-shift, non-trigger entry it holds is a DOWN.
    #[test]
    fn buffer_only_holds_classified_entries(events in arb_sequence()) {
        let mut conv = Converter::new();
        push_all(&mut conv, &events);

        for ev in conv.events() {
            prop_assert!(!is_killer(ev.code));
            prop_assert_ne!(ev.code, KEY_BACKSPACE);
            if !is_shift(ev.code) {
                prop_assert!(is_text_key(ev.code));
                prop_assert_eq!(ev.value, KEY_DOWN);
            }
        }
    }

    /// `convert` is pure: repeated calls yield identical programs and the
    /// buffer is untouched.
    #[test]
    fn convert_is_pure(events in arb_sequence(), word in proptest::bool::ANY) {
        let mut conv = Converter::new();
        conv.ls_keys = [125, 0];
        push_all(&mut conv, &events);

        let action = if word { Action::ConvertWord } else { Action::ConvertAll };
        let before: Vec<KeyEvent> = conv.events().to_vec();
        let first = conv.convert(action);
        let second = conv.convert(action);

        prop_assert_eq!(first, second);
        prop_assert_eq!(conv.events(), &before[..]);
    }

    /// Round-trip cancellation: the replay deletes exactly as many
    /// characters as it retypes. Shift entries are replayed but neither
    /// deleted nor counted.
    #[test]
    fn backspaces_match_replayed_keys(events in arb_sequence(), word in proptest::bool::ANY) {
        let mut conv = Converter::new();
        conv.ls_keys = [125, 0];
        push_all(&mut conv, &events);

        let action = if word { Action::ConvertWord } else { Action::ConvertAll };
        let replay = conv.convert(action);

        // Skip the layout-switch prefix (single-key shortcut: one pair).
        let body = &replay[2..];
        let backspace_pairs = body
            .iter()
            .filter(|ev| ev.code == KEY_BACKSPACE && ev.value == KEY_DOWN)
            .count();
        let replayed_non_shift = body
            .iter()
            .filter(|ev| ev.code != KEY_BACKSPACE && !is_shift(ev.code) && ev.value == KEY_DOWN)
            .count();

        prop_assert_eq!(backspace_pairs, replayed_non_shift);
    }

    /// The matcher plus trim never panic and never grow the buffer.
    #[test]
    fn process_never_grows_buffer(events in arb_sequence(), conv_key in 0..=255u16) {
        let mut conv = Converter::new();
        conv.conv_key = conv_key;
        conv.ls_keys = [125, 0];

        for &(code, value) in &events {
            conv.push(code, value);
            let len_before = conv.events().len();
            let _ = conv.process();
            prop_assert!(conv.events().len() <= len_before);
        }
    }
}
