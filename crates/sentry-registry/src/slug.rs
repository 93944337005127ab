/// Lowercases and replaces runs of non-alphanumeric characters with a single `-`,
/// trimming leading/trailing dashes. Falls back to "project" for names with no
/// alphanumeric content at all.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_punctuation() {
        assert_eq!(slugify("My Cool App!!"), "my-cool-app");
    }

    #[test]
    fn falls_back_for_empty_input() {
        assert_eq!(slugify("***"), "project");
    }

    #[test]
    fn trims_trailing_dashes() {
        assert_eq!(slugify("trailing---"), "trailing");
    }
}
