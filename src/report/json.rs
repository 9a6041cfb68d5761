//! JSON output for snapshot listings, for scripting and piping.

use super::Listing;

pub fn render(listing: &Listing) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Entry;
    use std::path::PathBuf;

    #[test]
    fn renders_entries() {
        let listing = Listing {
            dir: PathBuf::from("snaps"),
            entries: vec![Entry {
                identity: "a b".to_string(),
                file_name: "a%20b.json".to_string(),
                extension: "json".to_string(),
                os: "linux".to_string(),
                limit_to_os: false,
                body_bytes: 2,
            }],
            problems: vec![],
        };

        let value: serde_json::Value = serde_json::from_str(&render(&listing).unwrap()).unwrap();

        assert_eq!(value["dir"], "snaps");
        assert_eq!(value["entries"][0]["identity"], "a b");
        assert_eq!(value["entries"][0]["body_bytes"], 2);
        assert_eq!(value["problems"], serde_json::json!([]));
    }
}
