//! Open fonts and font name matching

use super::table::ResourceTable;
use crate::backend::FontHandle;
use crate::protocol::X11Error;

/// A font opened by a client
#[derive(Debug, Clone)]
pub struct XFont {
    pub id: u32,
    /// Name as given to OpenFont
    pub requested: String,
    pub handle: FontHandle,
}

pub type FontTable = ResourceTable<XFont>;

pub fn new_font_table() -> FontTable {
    ResourceTable::new(X11Error::bad_font)
}

/// X font pattern match: `*` is any run, `?` any one character, and case is
/// ignored.
pub fn font_pattern_matches(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let n: Vec<char> = name.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut pi, mut ni) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ni));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ni = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(font_pattern_matches("*", "fixed"));
        assert!(font_pattern_matches("FIXED", "fixed"));
        assert!(font_pattern_matches("9x1?", "9x15"));
        assert!(font_pattern_matches("-misc-*-iso8859-1", "-misc-fixed-medium-r-normal--15-140-75-75-c-90-iso8859-1"));
        assert!(!font_pattern_matches("9x1?", "9x15bold"));
        assert!(!font_pattern_matches("-adobe-*", "fixed"));
        assert!(font_pattern_matches("a*b*c", "aXXbYYc"));
        assert!(!font_pattern_matches("a*b*c", "aXXbYY"));
    }
}
