//! Shared utility functions.

/// Truncates a string to a maximum number of characters with ellipsis.
pub fn truncate_string(input: &str, max_length: usize) -> String {
    if input.chars().count() <= max_length {
        input.to_string()
    } else {
        let kept: String = input.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Integer percentage of `done` over `total`, rounded down and capped at 100.
pub fn percent_floor(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done) * 100) / u128::from(total);
    pct.min(100) as u8
}

/// Mask all but the last four characters of a secret for log output.
pub fn redact_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        let input = "This is a very long string that should be truncated";
        assert_eq!(truncate_string(input, 20), "This is a very lo...");
        assert_eq!(truncate_string("Short", 20), "Short");
    }

    #[test]
    fn test_percent_floor() {
        assert_eq!(percent_floor(0, 100), 0);
        assert_eq!(percent_floor(25, 30), 83);
        assert_eq!(percent_floor(1, 3), 33);
        assert_eq!(percent_floor(30, 30), 100);
        assert_eq!(percent_floor(5, 0), 0);
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(redact_token("abcdefgh"), "****efgh");
        assert_eq!(redact_token("abc"), "***");
    }
}
