//! Derive a browsable pull-request link from a git remote address.

/// Build `<https base>/pull/new/<branch>` from a remote URL.
///
/// `git@host:owner/repo.git` and `ssh://git@host/owner/repo.git` become
/// `https://host/owner/repo`; other addresses only lose a trailing `.git`.
pub fn pull_request_url(remote_url: &str, branch: &str) -> String {
    format!("{}/pull/new/{branch}", browse_base(remote_url))
}

fn browse_base(remote_url: &str) -> String {
    let trimmed = remote_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if let Some(rest) = trimmed.strip_prefix("ssh://") {
        let rest = rest.split_once('@').map_or(rest, |(_, host_path)| host_path);
        return format!("https://{rest}");
    }
    if let Some(rest) = trimmed.strip_prefix("git@")
        && let Some((host, path)) = rest.split_once(':')
    {
        return format!("https://{host}/{path}");
    }
    if let Some(rest) = trimmed.strip_prefix("http://") {
        return format!("https://{rest}");
    }
    trimmed.to_string()
}
