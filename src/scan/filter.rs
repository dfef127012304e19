//! Package whitelist/blacklist policy, translated once into rooted path
//! prefixes and consulted for every directory and archive entry visited.
//!
//! A caller-supplied filter entry is a dotted package prefix; entries
//! starting with `-` exclude their subtree. `com.example` becomes the
//! prefix `/com/example/`, and the scan-everything marker (an empty entry,
//! or no entries at all) becomes the single prefix `/`. Scope tests run
//! against rooted, slash-separated relative paths.

use indexmap::IndexSet;

/// Normalized scope policy for one scanner instance.
#[derive(Debug, Clone, PartialEq)]
pub(in crate::scan) struct PackageFilter {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

/// What directory traversal should do below a visited directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(in crate::scan) struct DirScope {
    /// Plain files in this directory are in scope.
    pub scan_files: bool,
    /// Some whitelisted package lies at or below this directory.
    pub recurse: bool,
}

impl PackageFilter {
    pub fn new(packages: &[&str]) -> Self {
        let mut whitelist: IndexSet<String> = IndexSet::new();
        let mut blacklist: IndexSet<String> = IndexSet::new();
        let mut scan_all = packages.is_empty();

        for package in packages {
            if let Some(excluded) = package.strip_prefix('-') {
                blacklist.insert(prefix_of(excluded));
            } else if package.is_empty() {
                scan_all = true;
            } else {
                whitelist.insert(prefix_of(package));
            }
        }

        if scan_all || whitelist.is_empty() {
            whitelist = std::iter::once("/".to_owned()).collect();
        }
        // a prefix present in both lists is an exclusion
        whitelist.retain(|prefix| !blacklist.contains(prefix));

        PackageFilter {
            whitelist: whitelist.into_iter().collect(),
            blacklist: blacklist.into_iter().collect(),
        }
    }

    /// Scope test for a rooted file path (`/w/A.class`, `/w/notes.txt`).
    pub fn file_in_scope(&self, rooted: &str) -> bool {
        self.whitelist.iter().any(|prefix| rooted.starts_with(prefix))
            && !self.blacklist.iter().any(|prefix| rooted.starts_with(prefix))
    }

    /// Disposition of a visited directory, given its rooted path with a
    /// trailing slash. `None` prunes the whole subtree.
    pub fn dir_scope(&self, rooted_dir: &str) -> Option<DirScope> {
        if self.blacklist.iter().any(|prefix| prefix == rooted_dir) {
            return None;
        }

        let scan_files = self
            .whitelist
            .iter()
            .any(|prefix| rooted_dir.starts_with(prefix.as_str()));
        let above_whitelist = rooted_dir == "/"
            || self
                .whitelist
                .iter()
                .any(|prefix| prefix.starts_with(rooted_dir) && prefix.len() > rooted_dir.len());

        Some(DirScope {
            scan_files,
            recurse: scan_files || above_whitelist,
        })
    }
}

fn prefix_of(package: &str) -> String {
    if package.is_empty() {
        return "/".to_owned();
    }
    format!("/{}/", package.replace('.', "/"))
}
