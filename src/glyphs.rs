//! 7-segment glyph tables and the display interpreter.
//!
//! A glyph is the 8-bit segment pattern of one digit, active-low, with bit 7
//! driving the decimal dot. [`SegInterpreter`] is a pure function over a
//! reconstructed display state (one byte per digit, leftmost digit first)
//! that decodes digits, characters, whole numbers and text. Every operation
//! reports failure through an in-band sentinel; nothing here can abort a
//! test on its own.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::bitarray::BitArray;

/// Glyph of an empty digit (all segments dark).
pub const BLANK: u8 = 0b1111_1111;
/// Glyph of a dash (only the middle segment lit).
pub const DASH: u8 = 0b1011_1111;
/// Mask with every segment except the decimal dot (bit 7 is the dot, 0 = lit).
pub const DOT_MASK: u8 = 0b0111_1111;

/// Active-low glyphs of the decimal digits '0'..'9'.
pub const DIGIT_GLYPHS: [u8; 10] = [
    0b1100_0000, // 0
    0b1111_1001, // 1
    0b1010_0100, // 2
    0b1011_0000, // 3
    0b1001_1001, // 4
    0b1001_0010, // 5
    0b1000_0010, // 6
    0b1111_1000, // 7
    0b1000_0000, // 8
    0b1001_0000, // 9
];

/// Active-low glyphs of the letters 'a'..'z' (as far as seven segments allow).
pub const LETTER_GLYPHS: [u8; 26] = [
    0b1000_1000, // a
    0b1000_0011, // b
    0b1100_0110, // c
    0b1010_0001, // d
    0b1000_0110, // e
    0b1000_1110, // f
    0b1000_0010, // g
    0b1000_1001, // h
    0b1111_1001, // i
    0b1110_0001, // j
    0b1000_0101, // k
    0b1100_0111, // l
    0b1100_1000, // m
    0b1010_1011, // n
    0b1010_0011, // o
    0b1000_1100, // p
    0b1001_1000, // q
    0b1010_1111, // r
    0b1001_0010, // s
    0b1000_0111, // t
    0b1100_0001, // u
    0b1110_0011, // v
    0b1000_0001, // w
    0b1011_0110, // x
    0b1001_0001, // y
    0b1010_0100, // z
];

/// Sentinel returned when a glyph does not decode to any known character.
pub const INVALID_CHAR: char = '\u{7f}';
/// Sentinel returned when the display does not show a valid number.
pub const INVALID_NUMBER: i32 = -1;

/// The glyph showing a decimal digit (`digit` must be below ten).
pub fn digit_glyph(digit: u8) -> u8 {
    DIGIT_GLYPHS[usize::from(digit) % DIGIT_GLYPHS.len()]
}

/// The glyph showing a lowercase letter, if one exists.
pub fn letter_glyph(letter: char) -> Option<u8> {
    letter
        .is_ascii_lowercase()
        .then(|| LETTER_GLYPHS[letter as usize - 'a' as usize])
}

fn digit_lookup() -> &'static HashMap<u8, char> {
    static LOOKUP: OnceLock<HashMap<u8, char>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        DIGIT_GLYPHS
            .iter()
            .enumerate()
            .map(|(i, &glyph)| (glyph, (b'0' + i as u8) as char))
            .collect()
    })
}

fn other_lookup() -> &'static HashMap<u8, char> {
    static LOOKUP: OnceLock<HashMap<u8, char>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        let mut map: HashMap<u8, char> = LETTER_GLYPHS
            .iter()
            .enumerate()
            .map(|(i, &glyph)| (glyph, (b'a' + i as u8) as char))
            .collect();
        map.insert(BLANK, ' ');
        map.insert(DASH, '-');
        map
    })
}

/// Interprets a reconstructed 7-segment display state.
///
/// Digit positions are indexed left to right, position 0 being the leftmost
/// digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegInterpreter {
    state: BitArray
}

impl SegInterpreter {
    /// Wraps a display state (one active-low glyph byte per digit).
    pub fn new(state: BitArray) -> Self {
        Self { state }
    }

    /// Number of digit positions covered by the state.
    pub fn digits(&self) -> usize {
        usize::from(self.state.len() / 8)
    }

    /// Raw glyph byte of the given position, optionally with the decimal
    /// dot masked out.
    pub fn raw_digit(&self, idx: usize, mask_dot: bool) -> u8 {
        let mut glyph = self.state.get_byte(idx as u32);
        if mask_dot {
            glyph |= !DOT_MASK;
        }
        glyph
    }

    /// Whether the decimal dot is lit at the given position.
    pub fn has_dot(&self, idx: usize) -> bool {
        self.raw_digit(idx, false) & !DOT_MASK == 0 // 0 = LED is lit
    }

    /// Whether more than one decimal dot is lit.
    pub fn dot_ambiguous(&self) -> bool {
        (0..self.digits()).filter(|&i| self.has_dot(i)).count() > 1
    }

    /// Index of the leftmost lit decimal dot.
    ///
    /// The rightmost position is the implicit decimal position when no dot
    /// is lit at all.
    pub fn dot_position(&self) -> usize {
        (0..self.digits())
            .find(|&i| self.has_dot(i))
            .unwrap_or(self.digits().saturating_sub(1))
    }

    /// Decodes the numeric digit at the given position, or
    /// [`INVALID_NUMBER`].
    ///
    /// A blank position decodes to zero iff `blank_as_zero` is set.
    pub fn digit(&self, idx: usize, blank_as_zero: bool) -> i32 {
        let ch = self.character(idx, true);
        if blank_as_zero && ch == ' ' {
            return 0;
        }
        match ch.to_digit(10) {
            Some(d) => d as i32,
            None => INVALID_NUMBER
        }
    }

    /// Decodes the character at the given position (letters are lowercase,
    /// the empty glyph is a space), or [`INVALID_CHAR`].
    ///
    /// Some glyphs show both a digit and a letter; `prefer_digits` picks
    /// which reading wins.
    pub fn character(&self, idx: usize, prefer_digits: bool) -> char {
        let glyph = self.raw_digit(idx, true);
        let digit = digit_lookup().get(&glyph).copied();
        let other = other_lookup().get(&glyph).copied();

        match (digit, other) {
            (Some(d), Some(o)) => if prefer_digits { d } else { o },
            (Some(d), None) => d,
            (None, Some(o)) => o,
            (None, None) => INVALID_CHAR
        }
    }

    /// Decodes the number shown on the whole display, or [`INVALID_NUMBER`].
    ///
    /// Leading blanks are skipped, a dash is taken as the sign, decimal
    /// dots are ignored.
    pub fn number(&self) -> i32 {
        let digits = self.digits();
        let mut idx = 0;
        while idx < digits && self.raw_digit(idx, true) == BLANK {
            idx += 1;
        }

        let negative = idx < digits && self.raw_digit(idx, true) == DASH;
        if negative {
            idx += 1;
        }

        if idx >= digits {
            return INVALID_NUMBER; // no digits available
        }

        let mut res = 0;
        while idx < digits {
            let digit = self.digit(idx, false);
            if digit == INVALID_NUMBER {
                return INVALID_NUMBER;
            }
            res = res * 10 + digit;
            idx += 1;
        }

        if negative { -res } else { res }
    }

    /// Text content of the display.
    ///
    /// Positions that do not decode are substituted with `replacement`; with
    /// the `'\0'` replacement any undecodable position yields an empty
    /// string instead.
    pub fn text(&self, replacement: char) -> String {
        let mut res = String::with_capacity(self.digits());
        for idx in 0..self.digits() {
            let mut ch = self.character(idx, false);
            if ch == INVALID_CHAR {
                if replacement == '\0' {
                    return String::new();
                }
                ch = replacement;
            }
            res.push(ch);
        }
        res
    }
}
