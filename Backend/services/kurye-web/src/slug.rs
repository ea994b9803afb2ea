/// Turkish letters that have a plain ASCII stand-in in URLs.
const TURKISH_MAP: &[(char, char)] = &[
    ('ğ', 'g'),
    ('Ğ', 'g'),
    ('ü', 'u'),
    ('Ü', 'u'),
    ('ş', 's'),
    ('Ş', 's'),
    ('ı', 'i'),
    ('İ', 'i'),
    ('I', 'i'),
    ('ö', 'o'),
    ('Ö', 'o'),
    ('ç', 'c'),
    ('Ç', 'c'),
];

fn transliterate(c: char) -> char {
    TURKISH_MAP
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// Derive the URL slug for a district, neighborhood or post title.
///
/// Location slugs are never stored: routes resolve a slug by running every
/// candidate name through this function and comparing, so the output must stay
/// stable across releases.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().map(transliterate) {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// True when `name` maps onto `slug`.
pub fn matches(name: &str, slug: &str) -> bool {
    slugify(name) == slug
}
