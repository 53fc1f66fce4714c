//! Matching free-text area names against pre-seeded boundaries.

use settlr_core::region::AreaBoundary;

/// Lowercase, drop punctuation, collapse whitespace, and strip a leading
/// "the" and a trailing ", london".
pub fn normalize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.first() == Some(&"the") {
        words.remove(0);
    }
    if words.len() > 1 && words.last() == Some(&"london") {
        words.pop();
    }
    words.join(" ")
}

/// Find the boundary for `query`.
///
/// An exact match on the name or any alias wins. Otherwise the boundary with
/// the longest name or alias appearing as whole words inside the query is
/// chosen, so "Shoreditch High Street" resolves to "Shoreditch".
pub fn find<'a>(boundaries: &'a [AreaBoundary], query: &str) -> Option<&'a AreaBoundary> {
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }

    let names = |b: &'a AreaBoundary| {
        std::iter::once(b.name.as_str())
            .chain(b.aliases.iter().map(String::as_str))
            .map(normalize)
            .filter(|n| !n.is_empty())
    };

    if let Some(exact) = boundaries.iter().find(|b| names(*b).any(|n| n == query)) {
        return Some(exact);
    }

    let padded = format!(" {query} ");
    boundaries
        .iter()
        .filter_map(|b| {
            names(b)
                .filter(|n| padded.contains(&format!(" {n} ")))
                .map(|n| n.len())
                .max()
                .map(|len| (len, b))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, b)| b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlr_core::geo::{Coordinate, Ring};

    fn boundary(name: &str, aliases: &[&str]) -> AreaBoundary {
        AreaBoundary {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ring: Ring::new(vec![
                Coordinate::new(-0.1, 51.5),
                Coordinate::new(-0.1, 51.6),
                Coordinate::new(0.0, 51.6),
            ])
            .unwrap(),
        }
    }

    fn fixtures() -> Vec<AreaBoundary> {
        vec![
            boundary("Hackney", &["Dalston"]),
            boundary("Hackney Wick", &[]),
            boundary("City of London", &["The City", "Square Mile"]),
            boundary("Shoreditch", &[]),
        ]
    }

    #[test]
    fn normalize_strips_noise() {
        assert_eq!(normalize("  The Angel, London "), "angel");
        assert_eq!(normalize("King's Cross"), "king s cross");
        assert_eq!(normalize("London"), "london");
    }

    #[test]
    fn exact_and_alias_match() {
        let b = fixtures();
        assert_eq!(find(&b, "hackney").unwrap().name, "Hackney");
        assert_eq!(find(&b, "Dalston").unwrap().name, "Hackney");
        assert_eq!(find(&b, "the square mile").unwrap().name, "City of London");
    }

    #[test]
    fn longest_contained_name_wins() {
        let b = fixtures();
        assert_eq!(find(&b, "Hackney Wick area").unwrap().name, "Hackney Wick");
        assert_eq!(find(&b, "Shoreditch High Street").unwrap().name, "Shoreditch");
    }

    #[test]
    fn partial_words_do_not_match() {
        let b = fixtures();
        assert!(find(&b, "Hackneyville").is_none());
        assert!(find(&b, "Stratford").is_none());
        assert!(find(&b, "   ").is_none());
    }
}
