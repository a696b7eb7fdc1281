//! Message personalization.

/// First whitespace-delimited token of a display name.
pub fn first_name(display_name: &str) -> &str {
    display_name.split_whitespace().next().unwrap_or("")
}

/// Replace every case-insensitive occurrence of `placeholder` in `template` with `name`.
pub fn render(template: &str, placeholder: &str, name: &str) -> String {
    if placeholder.is_empty() {
        return template.to_string();
    }
    let needle: Vec<char> = placeholder.chars().flat_map(char::to_lowercase).collect();
    let chars: Vec<char> = template.chars().collect();

    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < chars.len() {
        match match_at(&chars[i..], &needle) {
            Some(consumed) => {
                out.push_str(name);
                i += consumed;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

/// Number of template chars consumed if `needle` (already lowercased) matches at the
/// start of `chars`.
fn match_at(chars: &[char], needle: &[char]) -> Option<usize> {
    let mut n = 0;
    let mut consumed = 0;
    for &c in chars {
        if n == needle.len() {
            break;
        }
        for lc in c.to_lowercase() {
            if needle.get(n) != Some(&lc) {
                return None;
            }
            n += 1;
        }
        consumed += 1;
    }
    (n == needle.len()).then_some(consumed)
}
