//! Wildcard matching for action and resource patterns.

/// Matches `value` against `pattern`, where `*` matches any run of
/// characters (including none) and `?` matches exactly one character.
///
/// # Examples
///
/// ```
/// use iamsys_iam::policy::wildcard_match;
///
/// assert!(wildcard_match("s3:Get*", "s3:GetObject"));
/// assert!(wildcard_match("photos/20??/*", "photos/2024/cat.jpg"));
/// assert!(!wildcard_match("photos/*", "videos/clip.mp4"));
/// ```
#[must_use]
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let (mut p, mut v) = (0usize, 0usize);
    let (mut star, mut resume) = (None, 0usize);

    while v < value.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some(p);
                resume = v;
                p += 1;
            },
            Some(&c) if c == '?' || c == value[v] => {
                p += 1;
                v += 1;
            },
            _ => match star {
                Some(s) => {
                    p = s + 1;
                    resume += 1;
                    v = resume;
                },
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
