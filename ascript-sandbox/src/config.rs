/// Host-supplied, per-deployment knobs that shape the otherwise-fixed
/// sandbox ruleset (§4.6, §4.7). Constructed once at host startup and handed
/// to [`crate::whitelist::CommandWhitelist::build`] and
/// [`crate::url::validate`]; nothing downstream mutates it.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    pub allow_plain_http: bool,
    pub runtime: crate::whitelist::RuntimeConfig,
}

impl SandboxConfig {
    pub fn new(project_bases: Vec<String>, git_remote_urls: Vec<String>, allow_plain_http: bool) -> Self {
        SandboxConfig {
            allow_plain_http,
            runtime: crate::whitelist::RuntimeConfig {
                project_bases,
                git_remote_urls,
            }
            .validated(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn truncates_oversized_bases_and_remotes() {
        let bases: Vec<String> = (0..40).map(|i| format!("base{i}")).collect();
        let remotes: Vec<String> = (0..20).map(|i| format!("https://example.com/{i}")).collect();
        let config = SandboxConfig::new(bases, remotes, false);
        assert_eq!(config.runtime.project_bases.len(), 32);
        assert_eq!(config.runtime.git_remote_urls.len(), 16);
    }
}
