use std::collections::HashMap;

use crate::model::Target;

const MAX_STEM_CHARS: usize = 100;

/// Windows-safe file stem for a target title.
pub fn sanitize_file_stem(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();

    // Collapse multiple underscores
    let mut compacted = String::with_capacity(replaced.len());
    let mut prev_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = compacted.trim_matches(&['_', ' ', '.'][..]);
    let mut stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    stem = stem.trim_end_matches(&[' ', '.'][..]).to_string();
    if stem.is_empty() {
        stem = "untitled".to_string();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    stem
}

/// One file stem per target, in input order.
///
/// Within one family (dialogs or communities) stems are compared
/// case-insensitively. Every target whose stem is shared gets an `_{id}`
/// suffix, and this repeats until a suffixed stem no longer shadows a plain
/// title, so the result never depends on harvest or input order. Ids are
/// unique within a family and contain no `_`, hence two suffixed stems can
/// only be equal for the same target.
pub fn assign_file_stems(targets: &[Target]) -> Vec<String> {
    let family = |t: &Target| matches!(t, Target::Community(_));
    let bases: Vec<String> = targets
        .iter()
        .map(|t| sanitize_file_stem(t.display_name()))
        .collect();
    let mut suffixed = vec![false; targets.len()];
    let stem = |i: usize, suffixed: &[bool]| {
        if suffixed[i] {
            format!("{}_{}", bases[i], targets[i].id())
        } else {
            bases[i].clone()
        }
    };

    loop {
        let mut occupancy: HashMap<(bool, String), usize> = HashMap::new();
        for i in 0..targets.len() {
            *occupancy
                .entry((family(&targets[i]), stem(i, &suffixed).to_lowercase()))
                .or_default() += 1;
        }
        let mut changed = false;
        for i in 0..targets.len() {
            let key = (family(&targets[i]), stem(i, &suffixed).to_lowercase());
            if !suffixed[i] && occupancy.get(&key).is_some_and(|n| *n > 1) {
                suffixed[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    (0..targets.len()).map(|i| stem(i, &suffixed)).collect()
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
