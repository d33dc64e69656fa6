//! Kana handling for drawing shiritori
//!
//! Words are restricted to hiragana, katakana (full or half width) and the
//! long-vowel mark. Two words connect when the last syllable of one and the
//! first syllable of the next share the same base kana after folding
//! katakana to hiragana, small kana to large and dropping voicing marks.

pub const LONG_VOWEL: char = 'ー';

const HALFWIDTH_KATAKANA: &str =
    "ｦｧｨｩｪｫｬｭｮｯｰｱｲｳｴｵｶｷｸｹｺｻｼｽｾｿﾀﾁﾂﾃﾄﾅﾆﾇﾈﾉﾊﾋﾌﾍﾎﾏﾐﾑﾒﾓﾔﾕﾖﾗﾘﾙﾚﾛﾜﾝ";
const FULLWIDTH_KATAKANA: &str =
    "ヲァィゥェォャュョッーアイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワン";

/// Halfwidth voiced and semi-voiced sound marks
const HALFWIDTH_MARKS: [char; 2] = ['\u{FF9E}', '\u{FF9F}'];

fn widen(c: char) -> char {
    HALFWIDTH_KATAKANA
        .chars()
        .position(|h| h == c)
        .and_then(|i| FULLWIDTH_KATAKANA.chars().nth(i))
        .unwrap_or(c)
}

fn is_hiragana(c: char) -> bool {
    ('\u{3041}'..='\u{3096}').contains(&c)
}

fn is_katakana(c: char) -> bool {
    ('\u{30A1}'..='\u{30F6}').contains(&c)
}

fn to_hiragana(c: char) -> char {
    if is_katakana(c) {
        char::from_u32(c as u32 - 0x60).unwrap_or(c)
    } else {
        c
    }
}

fn enlarge(c: char) -> char {
    match c {
        'ぁ' => 'あ',
        'ぃ' => 'い',
        'ぅ' => 'う',
        'ぇ' => 'え',
        'ぉ' => 'お',
        'っ' => 'つ',
        'ゃ' => 'や',
        'ゅ' => 'ゆ',
        'ょ' => 'よ',
        'ゎ' => 'わ',
        'ゕ' => 'か',
        'ゖ' => 'け',
        _ => c,
    }
}

fn strip_voicing(c: char) -> char {
    match c {
        'が' => 'か',
        'ぎ' => 'き',
        'ぐ' => 'く',
        'げ' => 'け',
        'ご' => 'こ',
        'ざ' => 'さ',
        'じ' => 'し',
        'ず' => 'す',
        'ぜ' => 'せ',
        'ぞ' => 'そ',
        'だ' => 'た',
        'ぢ' => 'ち',
        'づ' => 'つ',
        'で' => 'て',
        'ど' => 'と',
        'ば' | 'ぱ' => 'は',
        'び' | 'ぴ' => 'ひ',
        'ぶ' | 'ぷ' => 'ふ',
        'べ' | 'ぺ' => 'へ',
        'ぼ' | 'ぽ' => 'ほ',
        'ゔ' => 'う',
        _ => c,
    }
}

/// Fold a single kana to its base hiragana syllable
pub fn normalize_char(c: char) -> char {
    strip_voicing(enlarge(to_hiragana(widen(c))))
}

/// Width-fold and drop halfwidth voicing marks, keeping everything else as typed
fn fold_width(word: &str) -> Vec<char> {
    word.trim()
        .chars()
        .filter(|c| !HALFWIDTH_MARKS.contains(c))
        .map(widen)
        .collect()
}

/// Only kana and the long-vowel mark, not starting with the mark
pub fn is_valid_word(word: &str) -> bool {
    let chars = fold_width(word);
    match chars.first() {
        None => false,
        Some(&LONG_VOWEL) => false,
        Some(_) => chars
            .iter()
            .all(|&c| c == LONG_VOWEL || is_hiragana(c) || is_katakana(c)),
    }
}

pub fn first_syllable(word: &str) -> Option<char> {
    fold_width(word)
        .into_iter()
        .find(|&c| c != LONG_VOWEL)
        .map(normalize_char)
}

/// Last syllable, ignoring a trailing long-vowel mark
pub fn last_syllable(word: &str) -> Option<char> {
    fold_width(word)
        .into_iter()
        .rev()
        .find(|&c| c != LONG_VOWEL)
        .map(normalize_char)
}

/// Whether `next` may follow `prev` in a shiritori chain
pub fn connects(prev: &str, next: &str) -> bool {
    match (last_syllable(prev), first_syllable(next)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Words ending in ん traditionally lose the game
pub fn ends_with_n(word: &str) -> bool {
    last_syllable(word) == Some('ん')
}

/// Comparable form of a free-text answer: trimmed, lowercase, katakana folded to hiragana
pub fn normalize_answer(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !HALFWIDTH_MARKS.contains(c))
        .map(|c| to_hiragana(widen(c)))
        .collect::<String>()
        .to_lowercase()
}
