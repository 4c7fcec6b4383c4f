//! Repository parameters forwarded to the agent entrypoint as CLI flags.

use serde::Deserialize;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_GIT_USER_NAME: &str = "AI";
pub const DEFAULT_GIT_USER_EMAIL: &str = "ai@example.com";

/// Optional repository and git-identity parameters accepted by every task
/// endpoint.
///
/// Clients omit fields freely and some send empty strings instead; both are
/// treated as "not provided". The entrypoint bakes in the same defaults
/// (`main`, `AI`, `ai@example.com`), so values matching a default produce
/// no flag at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoParams {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub github_token: Option<String>,
    pub ssh_private_key: Option<String>,
    pub ssh_public_key: Option<String>,
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
}

impl RepoParams {
    /// Render the `--flag=value` arguments for the agent entrypoint.
    ///
    /// Argument order is stable; the caller appends the prompt as the final
    /// positional argument.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(repo) = non_empty(&self.repo_url) {
            args.push(format!("--repo={repo}"));
        }
        if let Some(branch) = non_empty(&self.branch) {
            if branch != DEFAULT_BRANCH {
                args.push(format!("--branch={branch}"));
            }
        }
        if let Some(token) = non_empty(&self.github_token) {
            args.push(format!("--github-token={token}"));
        }
        if let Some(key) = non_empty(&self.ssh_private_key) {
            args.push(format!("--ssh-private-key={key}"));
        }
        if let Some(key) = non_empty(&self.ssh_public_key) {
            args.push(format!("--ssh-public-key={key}"));
        }
        if let Some(name) = non_empty(&self.git_user_name) {
            if name != DEFAULT_GIT_USER_NAME {
                args.push(format!("--git-user-name={name}"));
            }
        }
        if let Some(email) = non_empty(&self.git_user_email) {
            if email != DEFAULT_GIT_USER_EMAIL {
                args.push(format!("--git-user-email={email}"));
            }
        }
        args
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
