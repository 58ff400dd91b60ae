/// Derive an identifier-safe slug from a display name.
///
/// The name is lowercased and every run of characters other than ASCII
/// letters and digits becomes a single hyphen. Leading and trailing hyphens
/// are dropped, so `"  Vice-President (North) "` becomes `"vice-president-north"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(slugify("President"), "president");
        assert_eq!(slugify("Vice President"), "vice-president");
        assert_eq!(slugify("  Vice-President (North) "), "vice-president-north");
        assert_eq!(slugify("P.R.O."), "p-r-o");
    }

    #[test]
    fn non_ascii_is_a_separator() {
        assert_eq!(slugify("Trésorier Général"), "tr-sorier-g-n-ral");
    }

    #[test]
    fn nothing_alphanumeric_gives_empty_slug() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("--!!--"), "");
    }
}
