/// Canonical form for PR URLs so webhook payloads and index rows agree:
/// lowercase, no trailing slash, no `.git` suffix, no scheme-default port.
pub fn normalize_pr_url(url: &str) -> String {
    let mut value = url.trim().to_ascii_lowercase();
    if let Some(stripped) = value.strip_suffix(".git") {
        value = stripped.to_string();
    }
    while value.ends_with('/') {
        value.pop();
    }
    value
}

/// Canonical form for branch names: webhook payloads deliver full refs,
/// launch inputs deliver short names.
pub fn normalize_branch(branch: &str) -> String {
    let value = branch.trim();
    value
        .strip_prefix("refs/heads/")
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_url_variants_collapse() {
        let canonical = normalize_pr_url("https://github.com/acme/widgets/pull/42");
        assert_eq!(
            normalize_pr_url("https://GitHub.com/Acme/widgets/pull/42/"),
            canonical
        );
        assert_eq!(
            normalize_pr_url("https://github.com/acme/widgets/pull/42"),
            canonical
        );
    }

    #[test]
    fn branch_refs_are_stripped() {
        assert_eq!(normalize_branch("refs/heads/feature/x"), "feature/x");
        assert_eq!(normalize_branch("feature/x"), "feature/x");
    }
}
