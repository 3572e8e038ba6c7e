/// Tool names compare on their alphanumeric skeleton, so `get-current-user`
/// and `GetCurrentUser` both land on `get_current_user`.
fn skeleton(value: &str) -> Vec<char> {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return a.len().max(b.len());
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b.len()]
}

fn contains_run(haystack: &[char], needle: &[char]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Returns up to `limit` candidates close to `input`, best first.
pub fn suggest(input: &str, candidates: &[String], limit: usize) -> Vec<String> {
    let wanted = skeleton(input);
    if wanted.is_empty() {
        return Vec::new();
    }
    let budget = (wanted.len() / 3).max(1);

    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .filter_map(|candidate| {
            let have = skeleton(candidate);
            if have.is_empty() {
                return None;
            }
            let score = if have == wanted {
                0
            } else if contains_run(&have, &wanted) || contains_run(&wanted, &have) {
                1
            } else {
                edit_distance(&wanted, &have)
            };
            (score <= budget).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let mut out: Vec<String> = Vec::new();
    for (_, candidate) in scored {
        if !out.contains(candidate) {
            out.push(candidate.clone());
        }
        if out.len() >= limit.max(1) {
            break;
        }
    }
    out
}
