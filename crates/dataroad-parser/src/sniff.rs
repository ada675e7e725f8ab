use crate::model::Delimiter;

/// Picks the delimiter that occurs most often in `header_line`, ignoring quoted text.
/// Falls back to comma for single-column headers.
pub fn sniff_delimiter(header_line: &str) -> Delimiter {
    let mut counts = [0usize; Delimiter::CANDIDATES.len()];
    let mut in_quotes = false;

    for ch in header_line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = Delimiter::CANDIDATES
            .iter()
            .position(|candidate| candidate.as_char() == ch)
        {
            counts[idx] += 1;
        }
    }

    let mut best = Delimiter::Comma;
    let mut best_count = 0;
    for (candidate, count) in Delimiter::CANDIDATES.iter().zip(counts) {
        if count > best_count {
            best = *candidate;
            best_count = count;
        }
    }
    best
}
