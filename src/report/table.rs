//! Terminal table rendering for snapshot listings.
//!
//! One row per snapshot, sorted by identity, followed by the files that failed to load
//! and a total.

use super::Listing;
use crate::util::format_bytes;

pub fn render(listing: &Listing) -> String {
    if listing.entries.is_empty() && listing.problems.is_empty() {
        return format!("No snapshots in {}.\n", listing.dir.display());
    }

    let mut output = String::new();

    output.push_str(&format!("\n{}\n", listing.dir.display()));
    output.push_str(&"-".repeat(72));
    output.push('\n');

    let mut entries: Vec<_> = listing.entries.iter().collect();
    entries.sort_by(|a, b| a.identity.cmp(&b.identity));

    let mut total: u64 = 0;
    for entry in entries {
        total += entry.body_bytes;
        let os = if entry.limit_to_os {
            format!("{} only", entry.os)
        } else {
            String::from("any")
        };
        output.push_str(&format!(
            "  {:40} {:6} {:12} {:>8}\n",
            truncate(&entry.identity, 40),
            entry.extension,
            os,
            format_bytes(entry.body_bytes)
        ));
    }

    if !listing.problems.is_empty() {
        output.push_str("\nunreadable:\n");
        for problem in &listing.problems {
            output.push_str(&format!("  {}: {}\n", problem.file_name, problem.error));
        }
    }

    output.push_str(&format!(
        "\n{} snapshots, {}\n",
        listing.entries.len(),
        format_bytes(total)
    ));

    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Entry, Problem};
    use std::path::PathBuf;

    fn entry(identity: &str, limit_to_os: bool) -> Entry {
        Entry {
            identity: identity.to_string(),
            file_name: format!("{identity}.txt"),
            extension: "txt".to_string(),
            os: "linux".to_string(),
            limit_to_os,
            body_bytes: 10,
        }
    }

    #[test]
    fn empty_listing() {
        let listing = Listing {
            dir: PathBuf::from("snaps"),
            entries: vec![],
            problems: vec![],
        };
        assert_eq!(render(&listing), "No snapshots in snaps.\n");
    }

    #[test]
    fn rows_are_sorted_and_totalled() {
        let listing = Listing {
            dir: PathBuf::from("snaps"),
            entries: vec![entry("zeta", false), entry("alpha", true)],
            problems: vec![Problem {
                file_name: "bad".to_string(),
                error: "malformed".to_string(),
            }],
        };

        let output = render(&listing);

        let alpha = output.find("alpha").unwrap();
        let zeta = output.find("zeta").unwrap();
        assert!(alpha < zeta);
        assert!(output.contains("linux only"));
        assert!(output.contains("  bad: malformed\n"));
        assert!(output.ends_with("\n2 snapshots, 20 B\n"));
    }

    #[test]
    fn long_identities_are_truncated() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("short", 8), "short");
    }
}
